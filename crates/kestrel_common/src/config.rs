use serde::{Deserialize, Serialize};

/// Cluster setting controlling whether transactional writes are buffered
/// on the client.
pub const WRITE_BUFFERING_ENABLED: &str = "kv.transaction.write_buffering.enabled";

/// Write-buffering configuration section. Evaluated once, at interceptor
/// construction; toggling the setting mid-transaction has no effect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteBufferingConfig {
    /// If enabled, transactional writes are buffered on the client until
    /// commit time (default: false).
    #[serde(default)]
    pub enabled: bool,
    /// Per-transaction budget on the sum of buffered key and value bytes.
    /// When adding a write would exceed it, the buffer is flushed as a
    /// prefix of the current batch and buffering continues. 0 disables
    /// the budget (default: 4 MiB).
    #[serde(default = "default_max_buffered_bytes")]
    pub max_buffered_bytes: u64,
}

fn default_max_buffered_bytes() -> u64 {
    4 << 20
}

impl Default for WriteBufferingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_buffered_bytes: default_max_buffered_bytes(),
        }
    }
}

impl WriteBufferingConfig {
    /// An enabled config with the default budget. Used by tests and by
    /// callers that read the cluster setting themselves.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }
}
