//! Terminal observer: turns published snapshots into console output.

use chrono::Local;
use colored::Colorize;
use vigil_types::{FaceObservation, FeedTimestamp, MonitorConfig, MonitorState, SensorReading};

pub fn print_banner() {
    println!();
    println!("{}", r#"  _   __  _          _  "#.bold().cyan());
    println!("{}", r#" | | / / (_) ___ _  (_) /"#.bold().cyan());
    println!("{}", r#" | |/ / / / / _ `/ / / / "#.bold().cyan());
    println!("{}", r#" |___/ /_/  \_, / /_/_/  "#.bold().cyan());
    println!("{}", r#"           /___/         "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Vigil".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Intruder monitor");
    println!();
}

pub fn print_config(cfg: &MonitorConfig) {
    println!("  Feed service:  {}", cfg.base_url.bold());
    println!(
        "  Thresholds:    distance < {} cm  or  light > {}",
        cfg.ultrasonic_threshold, cfg.light_threshold
    );
    println!("  Poll interval: {} ms", cfg.poll_interval_ms);
    println!();
}

pub fn print_snapshot(state: &MonitorState) {
    println!("{}", render_snapshot(state));
}

/// Render one snapshot as a block of lines.
pub fn render_snapshot(state: &MonitorState) -> String {
    let mut lines = Vec::new();

    let stamp = state
        .updated_at
        .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string());
    lines.push(format!("── tick {} @ {} ──", state.ticks, stamp).dimmed().to_string());

    if state.intruder_detected {
        lines.push(format!("  {}", "⚠  INTRUDER DETECTED  ⚠".red().bold()));
    }

    match &state.sensor_reading {
        Some(reading) => lines.extend(sensor_lines(reading)),
        None => lines.push(format!("  {}", "No sensor readings yet".dimmed())),
    }

    match &state.face_observation {
        Some(observation) => lines.extend(face_lines(observation)),
        None => lines.push("  Camera: no faces detected".to_string()),
    }

    if let Some(error) = &state.error {
        let prefix = if state.sensor_reading.is_some() || state.face_observation.is_some() {
            "Showing last known readings."
        } else {
            "No data received yet."
        };
        lines.push(format!("  {} {} {}", "Error:".red(), error, prefix.dimmed()));
    }

    lines.join("\n")
}

fn sensor_lines(reading: &SensorReading) -> Vec<String> {
    vec![
        format!("  Distance:    {} cm", reading.ultrasonic_reading),
        format!("  Light level: {}", reading.light_level),
        format!("  Sampled:     {}", local_time(&reading.timestamp)),
    ]
}

fn face_lines(observation: &FaceObservation) -> Vec<String> {
    let mut lines = vec![format!(
        "  Camera: {} ({} face(s), captured {})",
        "Face Detected!".yellow().bold(),
        observation.faces.len(),
        local_time(&observation.timestamp)
    )];
    if let Some(primary) = observation.primary() {
        let mut detail = format!("    primary confidence {:.0}%", primary.confidence * 100.0);
        if let Some(b) = primary.bbox {
            detail.push_str(&format!(" at ({}, {}) {}x{}", b.x, b.y, b.width, b.height));
        }
        lines.push(detail);
    }
    // Base64 carries 3 bytes per 4 characters.
    lines.push(format!("    frame ≈ {} KiB", observation.image.len() * 3 / 4 / 1024));
    lines
}

fn local_time(ts: &FeedTimestamp) -> String {
    match ts.to_datetime() {
        Some(dt) => dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts.to_string(),
    }
}
