use sk_domain::config::{Config, ConfigSeverity, DESIGNER_TIMEOUT_SECS};

#[test]
fn default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_empty());
}

#[test]
fn default_session_limits() {
    let config = Config::default();
    assert_eq!(config.sessions.request_timeout_secs, 900);
    assert_eq!(config.sessions.max_open_sessions, 1000);
    assert_eq!(config.sessions.effective_release_offset(), 250);
    assert_eq!(config.sessions.max_requests_per_second, 120);
}

#[test]
fn sessions_section_parses() {
    let toml_str = r#"
[sessions]
enabled = false
request_timeout_secs = 60
max_open_sessions = 10
release_offset = 2
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert!(!config.sessions.enabled);
    assert_eq!(config.sessions.request_timeout_secs, 60);
    assert_eq!(config.sessions.effective_release_offset(), 2);
    // Untouched sections keep their defaults.
    assert_eq!(config.locks.stale_after_secs, 3_600);
}

#[test]
fn disabled_sessions_is_a_warning() {
    let toml_str = r#"
[sessions]
enabled = false
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].severity, ConfigSeverity::Warning);
    assert_eq!(issues[0].field, "sessions.enabled");
}

#[test]
fn zero_timeout_and_oversized_offset_are_errors() {
    let toml_str = r#"
[sessions]
request_timeout_secs = 0
max_open_sessions = 10
release_offset = 10
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let fields: Vec<_> = config
        .validate()
        .into_iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .map(|e| e.field)
        .collect();
    assert!(fields.contains(&"sessions.request_timeout_secs".to_string()));
    assert!(fields.contains(&"sessions.release_offset".to_string()));
}

#[test]
fn issue_display_is_tagged() {
    let config = Config {
        sessions: sk_domain::config::SessionsConfig {
            max_requests_per_second: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let issue = config.validate().remove(0);
    assert_eq!(
        issue.to_string(),
        "[ERROR] sessions.max_requests_per_second: request rate must be greater than 0"
    );
}

#[test]
fn timeout_past_designer_grace_is_an_error() {
    let mut config = Config::default();
    config.sessions.request_timeout_secs = DESIGNER_TIMEOUT_SECS + 1;
    let issues = config.validate();
    assert!(issues.iter().any(|e| e.severity == ConfigSeverity::Error
        && e.field == "sessions.request_timeout_secs"));

    config.sessions.request_timeout_secs = DESIGNER_TIMEOUT_SECS;
    assert!(config.validate().is_empty());
}
