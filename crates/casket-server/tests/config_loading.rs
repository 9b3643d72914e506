use std::time::Duration;
use std::{env, fs};

use casket_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("casket.toml");

    let toml_content = r#"
[logging]
level = "debug"
ansi = false

[cas.tickets.ticket_granting]
time_to_live = "8h"
time_to_idle = "1h"

[cas.tickets.service]
time_to_live = "30s"

[cas.registry]
sweep_interval = "5m"

[[cas.services]]
id = 1
name = "portal"
service_pattern = "^https://portal\\.example\\.org/.*"
allowed_to_proxy = true

[users.alice]
password_hash = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo"

[users.bob]
password_hash = "$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$aGFzaGhhc2hoYXNo"
disabled = true
expires_at = "2030-01-01T00:00:00Z"

[attributes.alice]
mail = ["alice@example.org"]
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.logging.level, "debug");
    assert!(!cfg.logging.ansi);
    assert!(cfg.logging.with_target);
    assert_eq!(
        cfg.cas.tickets.ticket_granting.time_to_live,
        Duration::from_secs(8 * 3600)
    );
    assert_eq!(cfg.cas.tickets.service.time_to_live, Duration::from_secs(30));
    assert_eq!(cfg.cas.registry.sweep_interval, Duration::from_secs(300));
    assert_eq!(cfg.cas.services.len(), 1);
    assert!(cfg.cas.services[0].allowed_to_proxy);
    assert_eq!(cfg.users.len(), 2);
    assert!(cfg.users["bob"].disabled);
    assert!(cfg.users["bob"].expires_at.is_some());
    assert_eq!(cfg.attributes["alice"]["mail"].len(), 1);
    // Untouched sections keep their defaults.
    assert!(cfg.cas.proxy.require_https);

    // 2) Env override should win over file
    unsafe {
        env::set_var("CASKET__CAS__TICKETS__SERVICE__TIME_TO_LIVE", "45s");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(
        cfg_env.cas.tickets.service.time_to_live,
        Duration::from_secs(45)
    );
    unsafe {
        env::remove_var("CASKET__CAS__TICKETS__SERVICE__TIME_TO_LIVE");
    }

    // 3) Invalid values fail validation
    let bad_path = dir.path().join("bad.toml");
    fs::write(
        &bad_path,
        r#"
[cas.authentication]
handler_timeout = "0s"
"#,
    )
    .expect("write bad toml");
    assert!(load_config(bad_path.to_str()).is_err());
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults should load");
    assert_eq!(cfg.logging.level, "info");
    assert!(cfg.users.is_empty());
    assert_eq!(cfg.cas.proxy.callback_timeout, Duration::from_secs(5));
}
