use std::{fs::File, io, sync::Mutex, time::Duration};

use anyhow::{Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Player URL or host, e.g. "http://volumio.local:3000".
    /// Takes precedence over `VOLUMIO_URL`, `VOLUMIO_HOST` and network discovery.
    #[clap(long, short = 'H')]
    pub host: Option<String>,
    /// Poll the player state every X seconds
    #[clap(long, short, default_value_t = 2.0)]
    pub refresh_every: f64,
    /// Browse the local network for a player for at most X seconds
    #[clap(long, default_value_t = 5.0)]
    pub discovery_timeout: f64,
    /// File to write the log to. If not specified, logs will be written to stderr.
    #[clap(long, short)]
    log_file: Option<String>,
}

impl Args {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(self.refresh_every)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.discovery_timeout)
    }

    /// Build the tracing subscriber using parameters from the command line arguments
    ///
    /// # Errors
    ///
    /// Fails if the log file cannot be created.
    pub fn init_tracing_subscriber(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env());

        match self.log_file.as_ref() {
            None => builder.with_writer(io::stderr).init(),
            Some(f) => builder
                .with_ansi(false)
                .with_writer(Mutex::new(
                    File::create(f).with_context(|| format!("Failed to create log file {f}"))?,
                ))
                .init(),
        }
        Ok(())
    }
}
