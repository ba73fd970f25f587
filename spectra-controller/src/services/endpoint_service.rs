use std::sync::RwLock;

use tokio::net::lookup_host;
use tracing::Span;

use crate::configs::settings::Device;

/// Address of the device, refreshed from its hostname before each
/// connection attempt.
pub struct Endpoint {
    hostname: Option<String>,
    current: RwLock<String>,
    span: Span,
}

impl Endpoint {
    pub fn new(device: &Device, span: Span) -> Self {
        Self {
            hostname: device.hostname.clone().filter(|hostname| !hostname.is_empty()),
            current: RwLock::new(device.address.clone()),
            span,
        }
    }

    pub fn current(&self) -> String {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Resolves the hostname and keeps the last known address when the
    /// lookup fails.
    pub async fn refresh(&self) -> String {
        let Some(hostname) = &self.hostname else {
            return self.current();
        };

        match lookup_host((hostname.as_str(), 0)).await {
            Ok(addresses) => {
                let mut addresses: Vec<_> = addresses.collect();
                addresses.sort_by_key(|address| !address.is_ipv4());

                if let Some(address) = addresses.first() {
                    let ip = address.ip().to_string();
                    tracing::info!(parent: &self.span, "resolved {hostname} to {ip}");
                    *self.current.write().unwrap_or_else(|e| e.into_inner()) = ip.clone();
                    return ip;
                }
                tracing::warn!(parent: &self.span, "no address for {hostname}, using {}", self.current());
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, "cannot resolve {hostname}: {e}, using {}", self.current());
            }
        }

        self.current()
    }
}
