//! HTTP control client for the Volumio REST API


use std::{fmt, io, time::Duration};

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::{net::TcpStream, time::timeout};
use tracing::{debug, instrument};
use url::Url;

use crate::state::{clamp_volume, PlayerState};

/// Upper bound on every command and state query
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on each connection attempt of a probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Port Volumio serves its UI and API on
pub const PLAYER_PORT: u16 = 3000;

const STATE_QUERY: &str = "getState";

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid player address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("failed to build HTTP client")]
    Http(#[source] reqwest::Error),
    #[error("{command} failed: status {status}")]
    Status { command: String, status: StatusCode },
    #[error("{command} failed: {source}")]
    Transport {
        command: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("getState returned a malformed body: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("connect {target}: {source}")]
    Probe {
        target: String,
        #[source]
        source: io::Error,
    },
}

/// Transport-level directive understood by the player
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Play,
    Pause,
    Stop,
    Toggle,
    /// Absolute volume, already within `0..=100`
    SetVolume(u8),
}
impl Command {
    /// The `cmd` token sent to the player
    pub const fn name(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::Toggle => "toggle",
            Self::SetVolume(_) => "volume",
        }
    }
}
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetVolume(v) => write!(f, "command \"volume\" ({v})"),
            c => write!(f, "command {:?}", c.name()),
        }
    }
}

/// Stateless wrapper around one player's base address.
///
/// Every call builds its own request; the client can be shared between
/// concurrent operations and is replaced wholesale when the address changes.
#[derive(Debug)]
pub struct ControlClient {
    base: Url,
    http: Client,
    fallback_port: u16,
}

impl ControlClient {
    /// Create a client for `address`, defaulting to `http` when no scheme is given.
    ///
    /// # Errors
    ///
    /// Fails when the address does not parse as a URL or names no host.
    pub fn new(address: &str) -> Result<Self, ControlError> {
        let address = address.trim();
        let invalid = |reason: String| ControlError::InvalidAddress {
            address: address.to_owned(),
            reason,
        };
        let with_scheme = if address.contains("://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };
        let base = Url::parse(&with_scheme).map_err(|e| invalid(e.to_string()))?;
        if base.host_str().map_or(true, str::is_empty) {
            return Err(invalid("URL must include a host".to_owned()));
        }
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(ControlError::Http)?;
        Ok(Self {
            base,
            http,
            fallback_port: PLAYER_PORT,
        })
    }

    /// Override the port the probe falls back to.
    #[cfg(test)]
    #[must_use]
    pub const fn with_fallback_port(mut self, port: u16) -> Self {
        self.fallback_port = port;
        self
    }

    /// Normalized base address, without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    pub async fn play(&self) -> Result<(), ControlError> {
        self.send(Command::Play).await
    }
    pub async fn pause(&self) -> Result<(), ControlError> {
        self.send(Command::Pause).await
    }
    pub async fn stop(&self) -> Result<(), ControlError> {
        self.send(Command::Stop).await
    }
    pub async fn toggle(&self) -> Result<(), ControlError> {
        self.send(Command::Toggle).await
    }

    /// Set the absolute volume, clamping it into `0..=100` first.
    pub async fn set_volume(&self, volume: i64) -> Result<(), ControlError> {
        self.send(Command::SetVolume(clamp_volume(volume))).await
    }

    /// Issue a command. Any 2xx response is a success.
    #[instrument(skip(self), fields(base = %self.base_url()))]
    pub async fn send(&self, command: Command) -> Result<(), ControlError> {
        let mut request = self
            .http
            .get(self.endpoint("/api/v1/commands/"))
            .query(&[("cmd", command.name())]);
        if let Command::SetVolume(volume) = command {
            // Keep the value out of the command token
            request = request.query(&[("volume", volume)]);
        }
        let response = request
            .send()
            .await
            .map_err(|source| ControlError::Transport {
                command: command.to_string(),
                source,
            })?;
        let status = response.status();
        debug!(%status, "Command acknowledged");
        if !status.is_success() {
            return Err(ControlError::Status {
                command: command.to_string(),
                status,
            });
        }
        Ok(())
    }

    /// Query the player state.
    #[instrument(skip(self), fields(base = %self.base_url()))]
    pub async fn get_state(&self) -> Result<PlayerState, ControlError> {
        let transport = |source| ControlError::Transport {
            command: STATE_QUERY.to_owned(),
            source,
        };
        let response = self
            .http
            .get(self.endpoint("/api/v1/getState"))
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::Status {
                command: STATE_QUERY.to_owned(),
                status,
            });
        }
        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(ControlError::Decode)
    }

    /// `host:port` pairs a probe connects to: the port of the base address
    /// (the scheme's default, else 80), then the fallback player port.
    fn probe_targets(&self) -> Result<(String, String), ControlError> {
        let Some(host) = self.base.host() else {
            return Err(ControlError::InvalidAddress {
                address: self.base_url().to_owned(),
                reason: "URL must include a host".to_owned(),
            });
        };
        let port = self.base.port_or_known_default().unwrap_or(80);
        Ok((
            format!("{host}:{port}"),
            format!("{host}:{}", self.fallback_port),
        ))
    }

    /// Check that anything accepts TCP connections on the player host.
    ///
    /// Tries the port of the base address, then the fallback player port on
    /// the same host.
    #[instrument(skip(self), fields(base = %self.base_url()))]
    pub async fn probe(&self) -> Result<(), ControlError> {
        let (primary, fallback) = self.probe_targets()?;
        let Err(primary_error) = Self::connect(&primary).await else {
            return Ok(());
        };
        debug!(%primary, ?primary_error, "Probe failed, trying player port");

        match Self::connect(&fallback).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(%fallback, ?e, "Fallback probe failed");
                Err(ControlError::Probe {
                    target: primary,
                    source: primary_error,
                })
            }
        }
    }

    async fn connect(target: &str) -> io::Result<()> {
        match timeout(PROBE_TIMEOUT, TcpStream::connect(target)).await {
            Ok(stream) => stream.map(drop),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {PROBE_TIMEOUT:?}"),
            )),
        }
    }
}
