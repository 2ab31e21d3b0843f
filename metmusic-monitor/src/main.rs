//! MeTMusic Listen-Along - Terminal Listener
//!
//! Follows a session's feed with a virtual output device that probes each
//! stream, and shows what the player is doing.
//!
//! Usage:
//!   cargo run --release -- <session-id>
//!   cargo run --release -- <session-id> --no-dashboard   # Plain logging mode
//!   cargo run --release -- <session-id> --config player.toml

mod dashboard;
mod metrics;
mod probe;

use metmusic_core::{player, DisplayBindings, PlayerConfig, PlayerObserver};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const USAGE: &str = "usage: metmusic-monitor <session-id> [--no-dashboard] [--config <path>]";

/// Command line options
#[derive(Debug, PartialEq)]
struct Options {
    session_id: String,
    use_dashboard: bool,
    config_path: Option<PathBuf>,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut session_id = None;
    let mut use_dashboard = true;
    let mut config_path = None;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--no-dashboard" => use_dashboard = false,
            "--config" => {
                let path = iter.next().ok_or("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            other if other.starts_with("--") => return Err(format!("unknown option {}", other)),
            other => {
                if session_id.replace(other.to_string()).is_some() {
                    return Err("only one session id may be given".to_string());
                }
            }
        }
    }

    Ok(Options {
        session_id: session_id.ok_or("missing session id")?,
        use_dashboard,
        config_path,
    })
}

/// Observer for plain logging mode
fn logging_bindings() -> DisplayBindings {
    DisplayBindings {
        status_text: Some(Box::new(|s| info!("Status: {}", s))),
        track_text: Some(Box::new(|s| info!("Track: {}", s))),
        start_time_text: Some(Box::new(|s| info!("Started: {}", s))),
        duration_text: Some(Box::new(|s| info!("Duration: {}", s))),
        volume_value: Some(Box::new(|v| info!("Volume: {:.0}%", v * 100.0))),
        ..DisplayBindings::default()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    if !options.use_dashboard {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "metmusic_core=info,metmusic_monitor=info".into()),
            )
            .init();
    }

    let config = match &options.config_path {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };

    // Shared metrics state
    let metrics = Arc::new(RwLock::new(metrics::Metrics::new(options.session_id.clone())));

    let observer: Arc<dyn PlayerObserver> = if options.use_dashboard {
        Arc::new(metrics::MetricsObserver(Arc::clone(&metrics)))
    } else {
        Arc::new(logging_bindings())
    };

    let (device, mut device_rx) = probe::StreamProbe::new()?;
    let handle = player::start(&config, &options.session_id, Box::new(device), Some(observer))?;

    // Probe notifications go back into the player
    let forward = handle.clone();
    tokio::spawn(async move {
        while let Some(event) = device_rx.recv().await {
            forward.device_event(event);
        }
    });

    if options.use_dashboard {
        // Run with TUI dashboard
        dashboard::run(metrics, handle.clone()).await?;
    } else {
        // Run with plain logging
        info!("Listening to session {}, Ctrl-C to stop", options.session_id);
        tokio::signal::ctrl_c().await?;
    }

    handle.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        assert_eq!(
            parse_args(&args(&["abc", "--no-dashboard", "--config", "p.toml"])),
            Ok(Options {
                session_id: "abc".to_string(),
                use_dashboard: false,
                config_path: Some(PathBuf::from("p.toml")),
            })
        );
        assert_eq!(parse_args(&args(&["abc"])).map(|o| o.use_dashboard), Ok(true));
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_args(&args(&[])).is_err());
        assert!(parse_args(&args(&["a", "b"])).is_err());
        assert!(parse_args(&args(&["a", "--config"])).is_err());
        assert!(parse_args(&args(&["a", "--verbose"])).is_err());
    }
}
