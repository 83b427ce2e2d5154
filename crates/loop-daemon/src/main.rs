use std::sync::Arc;

use anyhow::Context;
use loop_daemon::{LoopCore, LoopEvent, LoopHandle, NightscoutSource, SystemClock};
use loop_proto::config::Config;
use loop_proto::settings::FileSettings;
use loop_proto::LoopSummary;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let data_dir = loop_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;

    let log_path = loop_proto::platform::log_file();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    // Allow RUST_LOG override; keep HTTP client internals quiet by default.
    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,loop_daemon=debug,hyper_util=warn,reqwest=warn",
                )
            }),
        )
        .with_ansi(false)
        .init();

    eprintln!("loopwatch log: {}", log_path.display());
    info!("loopwatch starting…");

    let config = Config::load()?;
    info!("Config loaded from: {:?}", Config::config_path());
    if config.nightscout.base_url.is_empty() {
        warn!("nightscout.base_url is empty; every fetch will fail");
        eprintln!(
            "loopwatch: set nightscout.base_url in {}",
            Config::config_path().display()
        );
    }

    let source = NightscoutSource::new(&config.nightscout)?;
    info!("Polling {}", source.url());
    let settings = FileSettings::new(config.daemon.settings_file.clone());

    // Event channel: all external inputs funnel into LoopCore
    let (event_tx, event_rx) = tokio::sync::mpsc::channel::<LoopEvent>(256);
    let (core, handle) = LoopCore::new(
        Arc::new(source),
        Arc::new(SystemClock),
        Arc::new(settings),
        event_tx,
    );
    let core_task = tokio::spawn(core.run(event_rx));

    spawn_printer(handle.clone());

    if config.daemon.start_active {
        handle.set_app_active(true).await?;
    }

    tokio::select! {
        res = command_loop(&handle) => res?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    handle.shutdown().await?;
    core_task.await??;
    info!("loopwatch stopped");
    Ok(())
}

/// Print a status line whenever the snapshot changes.
fn spawn_printer(handle: LoopHandle) {
    let mut sub = handle.subscribe();
    tokio::spawn(async move {
        while sub.changed().await {
            if let Some(snapshot) = handle.current_snapshot().await {
                println!("{}", LoopSummary::new(&snapshot, chrono::Utc::now()));
            }
        }
    });
}

/// Line commands on stdin stand in for the app lifecycle and the settings
/// switch. Returns on `quit` or EOF.
async fn command_loop(handle: &LoopHandle) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "enable" => handle.set_enabled(true).await?,
            "disable" => handle.set_enabled(false).await?,
            "active" => handle.set_app_active(true).await?,
            "inactive" => handle.set_app_active(false).await?,
            "refresh" => handle.refresh().await?,
            "status" => print_status(handle).await,
            "stats" => {
                let stats = handle.stats().await;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            "quit" | "exit" => break,
            other => {
                eprintln!(
                    "unknown command {:?} (enable, disable, active, inactive, refresh, status, stats, quit)",
                    other
                );
            }
        }
    }
    Ok(())
}

async fn print_status(handle: &LoopHandle) {
    let status = handle.status().await;
    println!(
        "enabled={} active={} scheduler={:?}",
        status.enabled, status.app_active, status.scheduler
    );
    match status.snapshot {
        Some(snapshot) => println!("{}", LoopSummary::new(&snapshot, chrono::Utc::now())),
        None => println!("no loop data yet"),
    }
}
