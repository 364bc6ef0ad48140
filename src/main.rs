// src/main.rs - Controller entry point: run G-code from a serial link, a file or stdin
use std::path::{Path, PathBuf};

use clap::Parser;
use krusty_engraver::communication::{run_session, AsyncSink, AsyncSource, SessionError};
use krusty_engraver::hardware::serial::SerialLink;
use krusty_engraver::hardware::{MonotonicClock, SimulatedBoard};
use krusty_engraver::{load_config, Config, Machine};

const DEFAULT_CONFIG: &str = "engraver.toml";

#[derive(Debug, Parser)]
#[command(name = "engraver", version, about = "Three-axis G-code motion controller")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Serial port, overrides serial.port
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate, overrides serial.baud
    #[arg(short, long)]
    baud: Option<u32>,

    /// Read G-code from stdin and answer on stdout instead of the serial port
    #[arg(long, conflicts_with = "file")]
    stdio: bool,

    /// Run a G-code file and answer on stdout
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[arg(long, default_value_t = tracing::Level::INFO)]
    log_level: tracing::Level,
}

fn resolve_config(path: &Path) -> Result<Config, SessionError> {
    if path == Path::new(DEFAULT_CONFIG) && !path.exists() {
        tracing::warn!("No {} found, using built-in defaults", DEFAULT_CONFIG);
        return Ok(Config::default());
    }
    tracing::info!("Loading configuration from: {}", path.display());
    Ok(load_config(&path.to_string_lossy())?)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout may be carrying the protocol.
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting krusty-engraver {}", env!("CARGO_PKG_VERSION"));

    let mut config = resolve_config(&cli.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", cli.config.display(), e);
        e
    })?;
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }
    tracing::info!(
        "{} steps/mm, rapid {} mm/min, cut {} mm/min",
        config.machine.steps_per_mm,
        config.machine.rapid_feed_rate,
        config.machine.cut_feed_rate
    );

    let serial = config.serial.clone();
    let mut machine = Machine::new(config, SimulatedBoard::new(), MonotonicClock::new());

    let result = if let Some(path) = cli.file {
        tracing::info!("Running G-code file: {}", path.display());
        let file = tokio::fs::File::open(&path).await?;
        run_session(&mut machine, AsyncSource(file), AsyncSink(tokio::io::stdout())).await
    } else if cli.stdio {
        run_session(&mut machine, AsyncSource(tokio::io::stdin()), AsyncSink(tokio::io::stdout())).await
    } else {
        let link = SerialLink::open(&serial)?;
        let (reader, writer) = link.split();
        run_session(&mut machine, reader, writer).await
    };

    if let Err(e) = result {
        tracing::error!("Session failed: {}", e);
        return Err(e.into());
    }

    let board = machine.board();
    tracing::info!(
        "Done: {} step pulses, final position {:?} steps",
        board.total_pulses(),
        machine.state().position
    );
    Ok(())
}
