use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use smoothiehost::{
    get_line_count, init_logging, LinkConfig, LinkEvent, LinkEvents, SettingsManager,
    SmoothieLink, StreamMode, StreamProgress,
};
use std::path::PathBuf;
use std::time::Duration;

/// Startup chatter from the controller is shown before streaming starts
const STARTUP_WAIT: Duration = Duration::from_secs(2);

/// Stream or upload a G-code file to a Smoothieware controller
#[derive(Parser, Debug)]
#[command(name = "smoothiehost", version, author, long_about = None)]
struct Cli {
    /// Controller endpoint: serial://<device>[?baud=<n>] or net://<host>[:<port>]
    endpoint: String,

    /// G-code file to send
    file: PathBuf,

    /// Upload the file to the SD card instead of running it
    #[arg(short, long)]
    upload: bool,

    /// Fast stream, relying on the controller's buffering
    #[arg(short, long)]
    fast: bool,

    /// Configuration file (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<LinkConfig> {
    match path {
        Some(path) => {
            let mut manager = SettingsManager::new(path);
            Ok(manager.load()?.clone())
        }
        None => {
            let loaded = SettingsManager::with_default_path()
                .and_then(|mut manager| manager.load().cloned());
            Ok(loaded.unwrap_or_else(|e| {
                tracing::warn!("Using default settings: {}", e);
                LinkConfig::default()
            }))
        }
    }
}

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn format_progress(progress: &StreamProgress) -> String {
    let mut text = match progress.total {
        Some(total) if total > 0 => format!(
            "progress: {}/{} {:.0}%",
            progress.line,
            total,
            progress.line as f64 * 100.0 / total as f64
        ),
        _ => format!("progress: {}", progress.line),
    };
    if let Some(eta) = progress.eta {
        text.push_str(&format!(" ETA {}", format_hms(eta)));
    }
    text
}

/// Print console output until connected
async fn wait_connected(events: &mut LinkEvents, endpoint: &str) -> anyhow::Result<()> {
    loop {
        match events.recv().await {
            Some(LinkEvent::Connected(name)) => {
                println!("Connected to {}", name);
                return Ok(());
            }
            Some(LinkEvent::Log(line)) => println!("{}", line),
            Some(LinkEvent::Disconnected) | None => bail!("Could not connect to {}", endpoint),
            Some(_) => {}
        }
    }
}

/// Show whatever the controller prints right after connecting
async fn show_startup(events: &mut LinkEvents) {
    let settle = tokio::time::sleep(STARTUP_WAIT);
    tokio::pin!(settle);
    loop {
        tokio::select! {
            _ = &mut settle => return,
            event = events.recv() => match event {
                Some(LinkEvent::Log(line)) => println!("{}", line),
                Some(_) => {}
                None => return,
            },
        }
    }
}

/// Follow the stream until it finishes; Ctrl-C aborts it
async fn follow_stream(link: &SmoothieLink, events: &mut LinkEvents) -> bool {
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(LinkEvent::StreamProgress(progress)) => println!("{}", format_progress(&progress)),
                Some(LinkEvent::StreamDone { ok, lines }) => {
                    println!("{} lines sent", lines);
                    return ok;
                }
                Some(LinkEvent::Log(line)) => println!("{}", line),
                Some(LinkEvent::Notify(text)) => println!("NOTIFY: {}", text),
                Some(LinkEvent::Alarm { message, .. }) => {
                    eprintln!("ALARM: {}", message);
                    if let Err(e) = link.abort() {
                        tracing::debug!("Abort after alarm: {}", e);
                    }
                }
                Some(LinkEvent::WaitOnM0) => {
                    println!("M0 reached, continuing");
                    if let Err(e) = link.release_m0() {
                        tracing::debug!("Release M0: {}", e);
                    }
                }
                Some(LinkEvent::ToolChange { line, .. }) => {
                    println!("Tool change requested ({}), continuing", line);
                    if let Err(e) = link.resume() {
                        tracing::debug!("Resume after tool change: {}", e);
                    }
                }
                Some(LinkEvent::Disconnected) | None => return false,
                Some(_) => {}
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("Interrupted, aborting stream");
                if let Err(e) = link.abort() {
                    tracing::debug!("Abort on interrupt: {}", e);
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let mode = if cli.fast || config.streaming.fast_stream {
        StreamMode::Fast
    } else {
        StreamMode::PingPong
    };
    let total = get_line_count(&cli.file, cli.upload || mode == StreamMode::Fast)
        .with_context(|| format!("Cannot read {}", cli.file.display()))?;
    println!("{} has {} lines", cli.file.display(), total);

    let (link, mut events) = SmoothieLink::new(config);
    link.connect(&cli.endpoint)?;

    let result = async {
        wait_connected(&mut events, &cli.endpoint).await?;
        show_startup(&mut events).await;

        let started = Local::now();
        println!("Print started at: {}", started.format("%Y-%m-%d %H:%M:%S"));
        if cli.upload {
            link.upload_file(&cli.file)?;
        } else {
            link.stream_file(&cli.file, mode)?;
        }
        let ok = follow_stream(&link, &mut events).await;

        let ended = Local::now();
        println!("Print ended at: {}", ended.format("%Y-%m-%d %H:%M:%S"));
        let elapsed = (ended - started).to_std().unwrap_or_default();
        println!("Elapsed time: {}", format_hms(elapsed));
        anyhow::Ok(ok)
    }
    .await;

    link.stop();
    if !result? {
        bail!("Stream of {} failed", cli.file.display());
    }
    Ok(())
}
