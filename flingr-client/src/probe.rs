//! Network availability check.
//!
//! Connect and the daemon install step are skipped, not retried, when the
//! machine is offline.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Answers whether the network is usable right now.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Check connectivity.
    async fn is_available(&self) -> bool;
}

/// Considers the network available when `host` resolves.
#[derive(Debug, Clone)]
pub struct ResolveProbe {
    host: String,
    timeout: Duration,
}

impl ResolveProbe {
    /// Probe by resolving `host` (no port, no scheme).
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            timeout,
        }
    }
}

#[async_trait]
impl NetworkProbe for ResolveProbe {
    async fn is_available(&self) -> bool {
        let target = format!("{}:443", self.host);
        match tokio::time::timeout(self.timeout, tokio::net::lookup_host(target)).await {
            Ok(Ok(mut addrs)) => addrs.next().is_some(),
            Ok(Err(e)) => {
                tracing::debug!(host = %self.host, error = %e, "network probe failed");
                false
            }
            Err(_) => {
                tracing::debug!(host = %self.host, "network probe timed out");
                false
            }
        }
    }
}

/// A probe with a settable answer, for tests and offline use.
#[derive(Debug, Clone)]
pub struct StaticProbe {
    available: Arc<AtomicBool>,
}

impl StaticProbe {
    /// Create a probe that answers `available`.
    pub fn new(available: bool) -> Self {
        Self {
            available: Arc::new(AtomicBool::new(available)),
        }
    }

    /// Change the answer.
    pub fn set(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}
