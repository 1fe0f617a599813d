use serde::{Deserialize, Serialize};

/// Resource lock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocksConfig {
    /// Locks held longer than this are reported as stale in status logs.
    /// Stale locks are only reported, never released automatically.
    #[serde(default = "d_stale_after")]
    pub stale_after_secs: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: d_stale_after(),
        }
    }
}

fn d_stale_after() -> u64 {
    3_600
}
