use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session lifecycle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Idle timeout applied to designer sessions regardless of configuration.
pub const DESIGNER_TIMEOUT_SECS: u64 = 12 * 60 * 60;

/// Session lifecycle configuration: idle timeout, capacity bounds and the
/// request rate used to bound how long the sweeper may sleep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// When `false`, regular requests receive a transient session that is
    /// never stored.  Designer/admin requests are always stored.
    #[serde(default = "d_true")]
    pub enabled: bool,

    /// Idle timeout for anonymous and authenticated sessions.
    #[serde(default = "d_request_timeout")]
    pub request_timeout_secs: u64,

    /// Above this many open sessions the sweeper starts evicting.
    #[serde(default = "d_max_open")]
    pub max_open_sessions: usize,

    /// Extra headroom freed when authenticated sessions have to be evicted.
    /// Defaults to a quarter of `max_open_sessions`.
    #[serde(default)]
    pub release_offset: Option<usize>,

    /// Expected peak request rate.  Only used to derive the sweep sleep
    /// ceiling (`max_open_sessions / max_requests_per_second`).
    #[serde(default = "d_max_rps")]
    pub max_requests_per_second: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            request_timeout_secs: d_request_timeout(),
            max_open_sessions: d_max_open(),
            release_offset: None,
            max_requests_per_second: d_max_rps(),
        }
    }
}

impl SessionsConfig {
    /// The configured release offset, or `max_open_sessions / 4`.
    pub fn effective_release_offset(&self) -> usize {
        self.release_offset
            .unwrap_or(self.max_open_sessions / 4)
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_true() -> bool {
    true
}
fn d_request_timeout() -> u64 {
    900
}
fn d_max_open() -> usize {
    1000
}
fn d_max_rps() -> usize {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_offset_defaults_to_quarter() {
        let cfg = SessionsConfig {
            max_open_sessions: 400,
            ..Default::default()
        };
        assert_eq!(cfg.effective_release_offset(), 100);
    }

    #[test]
    fn explicit_release_offset_wins() {
        let cfg = SessionsConfig {
            max_open_sessions: 10,
            release_offset: Some(2),
            ..Default::default()
        };
        assert_eq!(cfg.effective_release_offset(), 2);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: SessionsConfig = toml::from_str("").unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.request_timeout_secs, 900);
        assert_eq!(cfg.max_requests_per_second, 120);
        assert!(cfg.release_offset.is_none());
    }
}
