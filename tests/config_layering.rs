use std::fs;
use std::time::Duration;

use nice::api::NodeSettings;
use nice::config::{Config, ConfigOverrides, Settings};
use nice::constants::{DEFAULT_MAX_CHILDREN, DEFAULT_PORT};
use nice::error::NiceError;
use nice::topology::SchedWindow;

#[test]
fn file_values_then_flags() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nice.toml");
    fs::write(
        &path,
        r#"
port = 5000
bind = "127.0.0.1"
parent = "127.0.0.1:4400"
max_children = 6
window = "22:00-06:00"
priority = 10

[timing]
exchange_secs = 20
child_drop_factor = 3.0

[logging]
disable_console = true

[api]
port = 5001
"#,
    )
    .unwrap();

    let mut cfg = Config::from_file(&path).unwrap().expect("file exists");
    ConfigOverrides {
        max_children: Some(3),
        barrier: Some(true),
        ..Default::default()
    }
    .apply(&mut cfg);

    let s = Settings::from_config(&cfg).unwrap();
    assert_eq!(s.listen, "127.0.0.1:5000");
    assert_eq!(s.api_listen, "127.0.0.1:5001");
    assert_eq!(s.parent, Some("127.0.0.1:4400".parse().unwrap()));
    assert_eq!(s.root, s.parent, "root defaults to the parent");
    assert_eq!(s.max_children, 3);
    assert!(s.barrier);
    assert!(!s.is_root);
    assert_eq!(s.window, SchedWindow::from_hm(22, 0, 6, 0));
    assert_eq!(s.priority, 10);
    assert_eq!(s.timing.exchange, Duration::from_secs(20));
    assert_eq!(s.timing.child_drop, Duration::from_secs(60));
    assert_eq!(cfg.logging.and_then(|l| l.disable_console), Some(true));
}

#[test]
fn missing_file_is_not_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let loaded = Config::from_file(tmp.path().join("absent.toml")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn malformed_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("nice.toml");
    fs::write(&path, "port = \"not a number\"\n").unwrap();
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn root_needs_no_parent_and_gets_defaults() {
    let cfg = Config {
        is_root: Some(true),
        ..Default::default()
    };
    let s = Settings::from_config(&cfg).unwrap();
    assert!(s.is_root);
    assert_eq!(s.parent, None);
    assert_eq!(s.max_children, DEFAULT_MAX_CHILDREN);
    assert_eq!(s.listen, format!("0.0.0.0:{}", DEFAULT_PORT));
    assert_eq!(s.window, SchedWindow::ALWAYS);
}

#[test]
fn invalid_settings_are_reported() {
    let cases = [
        Config::default(), // no parent, not root
        Config {
            is_root: Some(true),
            max_children: Some(0),
            ..Default::default()
        },
        Config {
            is_root: Some(true),
            max_children: Some(33),
            ..Default::default()
        },
        Config {
            is_root: Some(true),
            window: Some("noon-ish".into()),
            ..Default::default()
        },
        Config {
            is_root: Some(true),
            priority: Some(20),
            ..Default::default()
        },
        Config::from_toml_str("is_root = true\n[timing]\nparent_drop_factor = 1.0\n").unwrap(),
        Config::from_toml_str("is_root = true\n[timing]\nchild_drop_factor = nan\n").unwrap(),
        Config::from_toml_str("is_root = true\n[timing]\nparent_drop_factor = inf\n").unwrap(),
        Config::from_toml_str("is_root = true\n[timing]\nchild_drop_factor = 1e30\n").unwrap(),
    ];
    for cfg in cases {
        match Settings::from_config(&cfg) {
            Err(NiceError::Config(_)) => {}
            other => panic!("expected config error for {:?}, got {:?}", cfg, other),
        }
    }
}

#[test]
fn api_section_configures_application_nodes() {
    let cfg = Config::from_toml_str(
        r#"
is_root = true
bind = "127.0.0.1"
barrier = true

[timing]
connect_timeout_secs = 3

[api]
port = 4501
signal_capacity = 16
"#,
    )
    .unwrap();
    let settings = Settings::from_config(&cfg).unwrap();
    let node = NodeSettings::from_settings(&settings);
    assert_eq!(node.listen, "127.0.0.1:4501");
    assert_eq!(node.signal_capacity, 16);
    assert!(node.is_root);
    assert!(node.barrier);
    assert_eq!(node.pid, None);
    assert_eq!(node.timeouts.connect, Duration::from_secs(3));
}
