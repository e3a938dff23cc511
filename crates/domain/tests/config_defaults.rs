use sa_domain::config::Config;

#[test]
fn default_storage_root_is_relative_data_dir() {
    let config = Config::default();
    assert_eq!(config.storage.root, "./data");
}

#[test]
fn explicit_storage_root_parses() {
    let toml_str = r#"
[storage]
root = "/var/lib/scheduler-core"
retention_days = 90
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.storage.root, "/var/lib/scheduler-core");
    assert_eq!(config.storage.retention_days, 90);
}
