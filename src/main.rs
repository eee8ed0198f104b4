use anyhow::Context;
use clap::{Parser, ValueEnum};
use console::Term;
use davrelay::prompt::{ask, ask_credentials, ask_required};
use davrelay::{
    run_consumer, run_producer, CommandAcquirer, Config, ProducerRequest, Source, WebDavRelay,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Acquire a file and feed it to the relay (run on the sending machine)
    Producer,
    /// Take chunks off the relay and rebuild the file (run on the receiving machine)
    Consumer,
}

#[derive(Parser, Debug)]
#[command(name = "davrelay")]
#[command(about = "Relay large files through a quota-limited WebDAV folder", long_about = None)]
#[command(version)]
struct Args {
    /// Which side of the transfer to run
    #[arg(short, long, value_enum)]
    mode: Mode,

    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebDAV root URL
    #[arg(long)]
    base_url: Option<String>,

    /// Relay directory below the WebDAV root
    #[arg(long)]
    remote_dir: Option<String>,

    /// Local scratch directory
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Where merged files are written (consumer)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Chunk size in bytes
    #[arg(long)]
    chunk_size: Option<u64>,

    /// Interval between relay presence checks (e.g. "5s")
    #[arg(long, value_parser = humantime::parse_duration)]
    poll_interval: Option<Duration>,

    /// Interval between quota checks while the relay is full (e.g. "10s")
    #[arg(long, value_parser = humantime::parse_duration)]
    quota_interval: Option<Duration>,

    /// Give up on a relay response that stays silent this long (e.g. "60s")
    #[arg(long, value_parser = humantime::parse_duration)]
    read_timeout: Option<Duration>,

    /// Give up any single wait after this long (default: wait forever)
    #[arg(long, value_parser = humantime::parse_duration)]
    max_wait: Option<Duration>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("reading config {}", path.display()))?,
            None => Config::default(),
        };
        if let Some(v) = self.base_url {
            config.base_url = v;
        }
        if let Some(v) = self.remote_dir {
            config.remote_dir = v;
        }
        if let Some(v) = self.work_dir {
            config.work_dir = v;
        }
        if let Some(v) = self.output_dir {
            config.output_dir = Some(v);
        }
        if let Some(v) = self.chunk_size {
            config.chunk_size = v;
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval = v;
        }
        if let Some(v) = self.quota_interval {
            config.quota_poll_interval = v;
        }
        if let Some(v) = self.read_timeout {
            config.read_timeout = v;
        }
        if let Some(v) = self.max_wait {
            config.max_wait = Some(v);
        }
        config.validate()?;
        Ok(config)
    }
}

async fn run(mode: Mode, config: Config) -> anyhow::Result<()> {
    let term = Term::stderr();
    let credentials = ask_credentials(&term)?;
    let relay = WebDavRelay::new(&config, credentials)?;

    match mode {
        Mode::Producer => {
            info!("=== PRODUCER MODE ===");
            let link = ask(&term, "Download link (magnet/http/https/local path): ")?;
            let source = Source::parse(&link)?;
            let file_name = match &source {
                Source::Local(path) => {
                    let own = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let answer = ask(
                        &term,
                        &format!("FileName to use (Enter keeps {}): ", own),
                    )?;
                    if answer.is_empty() {
                        own
                    } else {
                        answer
                    }
                }
                _ => ask_required(
                    &term,
                    "FileName to use (base name, no path, e.g., movie.mkv): ",
                    "file name",
                )?,
            };
            let acquirer = CommandAcquirer::new(config.torrent_command.clone());
            let request = ProducerRequest { source, file_name };

            let summary = run_producer(&config, &relay, &acquirer, &request).await?;
            info!(
                "✅ Relayed {} chunk(s), {} bytes",
                summary.chunks, summary.bytes
            );
        }
        Mode::Consumer => {
            info!("=== CONSUMER MODE ===");
            let summary = run_consumer(&config, &relay).await?;
            for output in &summary.outputs {
                info!("✅ Merged file written to: {}", output.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!("davrelay={}", log_level))
        .init();

    info!("🚀 davrelay - WebDAV chunk relay");
    let mode = args.mode;
    let result = match args.into_config() {
        Ok(config) => run(mode, config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
