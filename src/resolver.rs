//! Figures out which player to talk to at startup

use std::{env, net::IpAddr, time::Duration};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use thiserror::Error;
use tokio::time::{timeout_at, Instant};
use tracing::instrument;

use crate::client::PLAYER_PORT;

/// Service type Volumio advertises itself under
pub const SERVICE_TYPE: &str = "_Volumio._tcp.local.";
/// Environment variable holding a full player URL
pub const URL_VAR: &str = "VOLUMIO_URL";
/// Environment variable holding a bare player host or IP
pub const HOST_VAR: &str = "VOLUMIO_HOST";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to start mDNS daemon")]
    Daemon(#[source] mdns_sd::Error),
    #[error("failed to browse for Volumio players")]
    Browse(#[source] mdns_sd::Error),
}

/// Where a player address may come from, in order of preference
#[derive(Clone, Debug, Default)]
pub struct HostSources {
    /// Given on the command line
    pub explicit: Option<String>,
    /// Full URL, used verbatim
    pub url: Option<String>,
    /// Bare host or IP, normalized before use
    pub host: Option<String>,
}
impl HostSources {
    /// Combine the command line override with the environment.
    pub fn from_env(explicit: Option<String>) -> Self {
        Self {
            explicit,
            url: env::var(URL_VAR).ok(),
            host: env::var(HOST_VAR).ok(),
        }
    }

    /// The configured address, if any source is set.
    pub fn configured(&self) -> Option<String> {
        let non_empty = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
        };
        non_empty(&self.explicit)
            .map(|s| with_scheme(&s))
            .or_else(|| non_empty(&self.url))
            .or_else(|| non_empty(&self.host).map(|s| with_port(&with_scheme(&s))))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// Taken from the command line or environment
    Configured(String),
    /// Found by browsing the local network
    Discovered(String),
    /// Discovery finished without hearing from any player
    NotFound,
}

fn with_scheme(address: &str) -> String {
    if address.contains("://") {
        address.to_owned()
    } else {
        format!("http://{address}")
    }
}

fn with_port(address: &str) -> String {
    let (scheme, rest) = address.split_once("://").unwrap_or(("http", address));
    let (authority, path) = rest.find('/').map_or((rest, ""), |i| rest.split_at(i));
    let has_port = match authority.rfind(']') {
        // Bracketed IPv6 literal
        Some(end) => authority[end..].contains(':'),
        None => authority.contains(':'),
    };
    if has_port {
        address.to_owned()
    } else {
        format!("{scheme}://{authority}:{PLAYER_PORT}{path}")
    }
}

/// A resolved service record, reduced to what is needed to build an address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub hostname: String,
    pub port: u16,
    pub addresses: Vec<IpAddr>,
}
impl From<&ServiceInfo> for Advertisement {
    fn from(info: &ServiceInfo) -> Self {
        let mut addresses: Vec<_> = info.get_addresses().iter().copied().collect();
        // Sets carry no order; sort so the same record always yields the same address
        addresses.sort();
        Self {
            hostname: info.get_hostname().to_owned(),
            port: info.get_port(),
            addresses,
        }
    }
}
impl Advertisement {
    /// Base URL preferring IPv4, then IPv6, then the hostname.
    pub fn base_url(&self) -> Option<String> {
        let v4 = self.addresses.iter().find(|a| a.is_ipv4());
        let v6 = self.addresses.iter().find(|a| a.is_ipv6());
        let host = match (v4, v6) {
            (Some(a), _) => a.to_string(),
            (None, Some(a)) => format!("[{a}]"),
            (None, None) => {
                let name = self.hostname.trim_end_matches('.');
                if name.is_empty() {
                    return None;
                }
                name.to_owned()
            }
        };
        Some(format!("http://{host}:{}", self.port))
    }
}

/// Pick the player address: explicit override, environment, then mDNS discovery.
///
/// # Errors
///
/// Fails only when discovery is needed and the mDNS machinery cannot be set up.
pub async fn resolve(sources: &HostSources, wait: Duration) -> Result<Resolution, ResolveError> {
    if let Some(address) = sources.configured() {
        tracing::info!(%address, "Using configured player address");
        return Ok(Resolution::Configured(address));
    }
    Ok(match discover(wait).await? {
        Some(address) => Resolution::Discovered(address),
        None => Resolution::NotFound,
    })
}

/// Browse for players for up to `wait`, returning the first usable address.
#[instrument]
pub async fn discover(wait: Duration) -> Result<Option<String>, ResolveError> {
    let daemon = ServiceDaemon::new().map_err(ResolveError::Daemon)?;
    let receiver = match daemon.browse(SERVICE_TYPE) {
        Ok(r) => r,
        Err(e) => {
            shut_down(&daemon);
            return Err(ResolveError::Browse(e));
        }
    };

    let deadline = Instant::now() + wait;
    let found = loop {
        let event = match timeout_at(deadline, receiver.recv_async()).await {
            Err(_) => {
                tracing::info!("No player answered before the discovery deadline");
                break None;
            }
            Ok(Err(e)) => {
                tracing::warn!(?e, "mDNS browse channel closed");
                break None;
            }
            Ok(Ok(event)) => event,
        };
        let info = match event {
            ServiceEvent::ServiceResolved(info) => info,
            other => {
                tracing::trace!(?other, "Ignoring mDNS event");
                continue;
            }
        };
        let advertisement = Advertisement::from(&info);
        tracing::debug!(fullname = info.get_fullname(), ?advertisement, "Player advertised");
        if let Some(address) = advertisement.base_url() {
            tracing::info!(%address, "Discovered player");
            break Some(address);
        }
    };

    if let Err(e) = daemon.stop_browse(SERVICE_TYPE) {
        tracing::debug!(?e, "Failed to stop mDNS browse");
    }
    shut_down(&daemon);
    Ok(found)
}

fn shut_down(daemon: &ServiceDaemon) {
    if let Err(e) = daemon.shutdown() {
        tracing::debug!(?e, "Failed to shut down mDNS daemon");
    }
}
