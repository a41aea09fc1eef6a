//! Binary entrypoint for the uplink CLI.
//!
//! Commands:
//! - `start [--pid-file <path>]` - run the agent in the foreground
//! - `init [--force]` - write a default configuration file
//! - `check-endpoint [--timeout <s>]` - verify the remote endpoint accepts connections
//! - `send --dest <hint> [--qos <0-99>] <payload>` - inject a message into a running agent
//!
//! The agent is designed to run under a process supervisor (systemd or
//! similar); `--pid-file` holds an exclusive lock so a second instance
//! refuses to start instead of competing for the producer socket.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use fs2::FileExt;
use log::info;

use uplink::agent::Agent;
use uplink::config::Config;
use uplink::egress::TcpEgress;
use uplink::frame;
use uplink::message::{Message, Priority};

#[derive(Parser)]
#[command(name = "uplink")]
#[command(about = "A store-and-forward relay agent for local producers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "uplink.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the agent
    Start {
        /// PID file to lock against concurrent instances
        #[arg(long, default_value = "/tmp/uplink.pid")]
        pid_file: String,
    },
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check that the configured remote endpoint accepts connections
    CheckEndpoint {
        /// Seconds to wait before giving up
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
    },
    /// Send a test message to a running agent's producer socket
    Send {
        /// Destination hint passed through to the remote service
        #[arg(short, long)]
        dest: String,
        /// Numeric quality of service, 0-99 (banded into low/medium/high/critical)
        #[arg(short, long, default_value_t = 0)]
        qos: u8,
        /// Message payload text
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early so logging can honor the configured level/file.
    // Init runs before a config exists, so a missing file is fine here.
    let pre_config = Config::load(&cli.config).await.ok();
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { pid_file } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let _pid_lock = acquire_pid_lock(&pid_file)?;
            info!("Starting uplink v{}", env!("CARGO_PKG_VERSION"));
            Agent::new(config)?.run().await?;
            Ok(())
        }
        Commands::Init { force } => {
            if !force && tokio::fs::metadata(&cli.config).await.is_ok() {
                return Err(anyhow!(
                    "{} already exists; use --force to overwrite",
                    cli.config
                ));
            }
            Config::create_default(&cli.config).await?;
            println!("Wrote default configuration to {}", cli.config);
            Ok(())
        }
        Commands::CheckEndpoint { timeout } => {
            let mut config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            config.endpoint.connect_timeout_seconds = timeout;
            let addr = config.endpoint.addr();
            match TcpEgress::new(config.endpoint).probe().await {
                Ok(()) => {
                    println!("Endpoint {} is reachable", addr);
                    Ok(())
                }
                Err(err) => Err(anyhow!("Endpoint {} is not reachable: {:#}", addr, err)),
            }
        }
        Commands::Send { dest, qos, payload } => {
            let config = match pre_config {
                Some(config) => config,
                None => Config::load(&cli.config).await?,
            };
            let msg = Message::new(dest, Priority::from_qos(qos), payload.into_bytes());
            let mut stream = tokio::net::TcpStream::connect(&config.ingress.bind)
                .await
                .map_err(|e| {
                    anyhow!(
                        "Failed to reach agent at {} (is it running?): {}",
                        config.ingress.bind,
                        e
                    )
                })?;
            frame::write_frame(&mut stream, &msg)
                .await
                .map_err(|e| anyhow!("Failed to send message: {}", e))?;
            println!("Sent {} as {} to {}", msg.id, msg.priority, config.ingress.bind);
            Ok(())
        }
    }
}

/// Take an exclusive lock on the PID file and record our PID in it. The
/// returned handle must stay alive for the lifetime of the process; dropping
/// it releases the lock.
fn acquire_pid_lock(path: &str) -> Result<std::fs::File> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)
        .map_err(|e| anyhow!("Failed to open pid file {}: {}", path, e))?;
    file.try_lock_exclusive()
        .map_err(|_| anyhow!("another uplink instance already holds {}", path))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config.as_ref().and_then(|cfg| cfg.logging.file.clone());
    if let Some(ref file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file)
        {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

            // When stdout is redirected (supervised runs) skip the console
            // echo so lines are not duplicated into the supervisor's capture.
            let is_tty = atty::is(atty::Stream::Stdout);

            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());

                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }

                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        } else {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    } else {
        builder.format(|fmt, record| {
            writeln!(
                fmt,
                "{} [{}] {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                record.level(),
                record.args()
            )
        });
    }
    let _ = builder.try_init();
}
