use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use rust_slideshow::config::{Configuration, PlaybackOrder};
use rust_slideshow::events::ScanEvent;
use rust_slideshow::playback::{PlaybackSnapshot, ScanStatus, simulate_playback};
use rust_slideshow::tasks::scanner::TreeScanner;
use rust_slideshow::tasks::sequencer::SequencerHandle;

#[derive(Debug, Parser)]
#[command(
    name = "slideshow",
    version,
    about = "Streams a folder of images into a headless slideshow"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,
    /// Folder to scan (overrides library-path)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,
    /// Only scan the folder itself, not its subfolders
    #[arg(long = "no-recurse")]
    no_recurse: bool,
    /// Play in shuffled order
    #[arg(long)]
    random: bool,
    /// Slide interval, e.g. "3s" or "750ms"
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    interval: Option<Duration>,
    /// Deterministic RNG seed for shuffling
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,
    /// Scan, print the first N playback steps and exit
    #[arg(long = "dry-run", value_name = "STEPS")]
    dry_run: Option<usize>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cfg = load_configuration(&args)?;
    tracing::debug!("effective configuration:\n{:#?}", cfg);

    if let Some(steps) = args.dry_run {
        return run_dry_run(&cfg, steps).await;
    }
    run_live(cfg).await
}

fn load_configuration(args: &Args) -> Result<Configuration> {
    let mut cfg = match &args.config {
        Some(path) => Configuration::from_yaml_file(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => Configuration::default(),
    };
    if let Some(root) = &args.root {
        cfg.library_path = root.clone();
    }
    if args.no_recurse {
        cfg.recursive = false;
    }
    if args.random {
        cfg.slideshow.order = PlaybackOrder::Random;
    }
    if let Some(interval) = args.interval {
        cfg.slideshow.slide_interval = interval;
    }
    if args.seed.is_some() {
        cfg.slideshow.shuffle_seed = args.seed;
    }
    if cfg.library_path.as_os_str().is_empty() {
        bail!("no folder to scan: pass --root or set library-path in the config");
    }
    cfg.validated().context("invalid configuration values")
}

async fn run_dry_run(cfg: &Configuration, steps: usize) -> Result<()> {
    let mut scanner = TreeScanner::new(cfg.sequencer_options().scan);
    let mut stream = scanner.start_streaming(cfg.library_path.clone(), cfg.recursive);
    let mut found = Vec::new();
    let mut dirs = 0;
    while let Some(event) = stream.recv().await {
        match event {
            ScanEvent::ItemFound { path, .. } => found.push(path),
            ScanEvent::ItemBatch { paths, .. } => found.extend(paths),
            ScanEvent::Progress { .. } => {}
            ScanEvent::Complete {
                total_directories, ..
            } => dirs = total_directories,
            ScanEvent::Error { message, .. } => bail!(message),
        }
    }

    println!(
        "# playback dry run\n# items: {}\n# directories: {}\n# order: {}\n# seed: {}\n",
        found.len(),
        dirs,
        cfg.slideshow.order,
        cfg.slideshow
            .shuffle_seed
            .map_or_else(|| "(random)".to_string(), |s| s.to_string())
    );
    if found.is_empty() {
        println!("(no media found under {})", cfg.library_path.display());
        return Ok(());
    }

    let plan = simulate_playback(found, cfg.slideshow.order, steps, cfg.slideshow.shuffle_seed);
    for (step, path) in plan.iter().enumerate() {
        println!("{:>4}: {}", step, path.display());
    }
    Ok(())
}

async fn run_live(cfg: Configuration) -> Result<()> {
    // Keep the sender alive so the sequencer can keep sampling settings.
    let (_settings_tx, settings_rx) = watch::channel(cfg.slideshow.clone());
    let (handle, task) = SequencerHandle::spawn(settings_rx, cfg.sequencer_options());

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            tracing::info!("ctrl-c received; shutting down");
            handle.dispose();
        });
    }

    if std::io::stdin().is_terminal() {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !dispatch_line(&handle, line.trim()).await {
                    break;
                }
            }
            tracing::info!("stdin closed; shutting down");
            handle.dispose();
        });
    }

    handle
        .start(cfg.library_path.clone(), cfg.recursive)
        .await
        .context("sequencer stopped before the scan could start")?;

    let mut snapshots = handle.subscribe();
    let mut last = PlaybackSnapshot::default();
    while snapshots.changed().await.is_ok() {
        let snap = snapshots.borrow_and_update().clone();
        report(&last, &snap);
        last = snap;
    }

    task.await.context("sequencer task panicked")?;
    Ok(())
}

/// Returns `false` when the user asked to quit.
async fn dispatch_line(handle: &SequencerHandle, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let sent = match (parts.next(), parts.next()) {
        (None, _) | (Some("t"), _) => handle.toggle_play_pause().await,
        (Some("n"), _) => handle.next_image().await,
        (Some("p"), _) => handle.previous_image().await,
        (Some("s"), _) => handle.cancel_scan().await,
        (Some("r"), _) => {
            let order = handle.snapshot().order.toggled();
            handle.set_order(order).await
        }
        (Some("g"), Some(raw)) => match raw.parse::<usize>() {
            Ok(position) if position > 0 => handle.goto_index(position - 1).await,
            _ => {
                tracing::warn!("usage: g <position>");
                Ok(())
            }
        },
        (Some("q"), _) => return false,
        (Some(other), _) => {
            tracing::warn!("unknown command {other:?}; use n, p, t, g <i>, r, s or q");
            Ok(())
        }
    };
    sent.is_ok()
}

fn report(prev: &PlaybackSnapshot, snap: &PlaybackSnapshot) {
    if snap.current_item != prev.current_item
        && let Some(item) = &snap.current_item
    {
        tracing::info!(
            position = %snap.position_label().unwrap_or_default(),
            "showing {}",
            item.display()
        );
    }
    if snap.is_playing != prev.is_playing {
        tracing::info!(playing = snap.is_playing, "playback state changed");
    }
    if snap.order != prev.order {
        tracing::info!(order = %snap.order, "playback order changed");
    }
    if snap.status != prev.status {
        match &snap.status {
            ScanStatus::Idle => {}
            ScanStatus::Streaming => tracing::info!("scanning"),
            ScanStatus::Completed { total_directories } => tracing::info!(
                items = snap.total_items,
                dirs = total_directories,
                "scan complete"
            ),
            ScanStatus::NoMediaFound {
                directories_scanned,
            } => tracing::warn!(
                dirs = directories_scanned,
                "no media found; pick another folder"
            ),
            ScanStatus::Cancelled => tracing::info!(items = snap.total_items, "scan cancelled"),
            ScanStatus::Failed { message } => tracing::error!("scan failed: {message}"),
        }
    } else if snap.scan_in_progress() && snap.directories_scanned != prev.directories_scanned {
        tracing::debug!(
            dirs = snap.directories_scanned,
            dir = %snap.current_directory_name().unwrap_or_default(),
            "scanning"
        );
    }
}
