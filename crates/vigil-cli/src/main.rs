//! `vigil-cli` – Vigil command line monitor.
//!
//! This binary:
//!
//! 1. Loads `~/.vigil/config.toml` (or `$VIGIL_CONFIG`), writing a default
//!    file on first run, and applies `VIGIL_*` environment overrides.
//! 2. Starts a [`Scheduler`] polling the configured feed service.
//! 3. Prints every published snapshot to the terminal.
//! 4. Intercepts **Ctrl-C** to stop the monitor and exit cleanly.

mod config;
mod render;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use futures_util::StreamExt;
use tokio::sync::Notify;
use tracing::warn;

use vigil_monitor::{MonitorError, Scheduler};
use vigil_types::MonitorConfig;

fn main() -> ExitCode {
    let _tracing = vigil_monitor::init_tracing("vigil");

    render::print_banner();

    let cfg = load_or_create_config();
    render::print_config(&cfg.monitor);

    // ── Ctrl-C handler ────────────────────────────────────────────────────
    let shutdown = Arc::new(Notify::new());
    let shutdown_signal = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping monitor …".yellow().bold());
        shutdown_signal.notify_one();
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; use SIGKILL to stop the monitor");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start async runtime".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cfg.monitor, shutdown)) {
        Ok(()) => {
            println!("{}", "  ✓ Monitor stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {}", "Monitor error".red(), e);
            ExitCode::FAILURE
        }
    }
}

/// Run the monitor until Ctrl-C, printing each snapshot as it is published.
async fn run(monitor_cfg: MonitorConfig, shutdown: Arc<Notify>) -> Result<(), MonitorError> {
    let mut monitor = Scheduler::connect(monitor_cfg)?;
    let mut updates = monitor.updates();
    monitor.start()?;
    println!(
        "  Polling every {} ms. Press {} to stop.\n",
        monitor.config().poll_interval_ms,
        "Ctrl-C".bold()
    );

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            next = updates.next() => match next {
                Some(state) => render::print_snapshot(&state),
                None => break,
            },
        }
    }

    monitor.stop();
    Ok(())
}

/// Load the config file, or write the defaults (with env overrides) when it
/// does not exist yet.  A broken file falls back to defaults.
fn load_or_create_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}
