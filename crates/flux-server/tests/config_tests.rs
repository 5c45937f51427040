use flux_server::config::{AppConfig, FanoutBackend, StorageBackend};
use std::time::Duration;

#[test]
fn test_empty_config_uses_defaults() -> anyhow::Result<()> {
    let config = AppConfig::from_toml_str("")?;

    assert!(config.mqtt.enabled);
    assert_eq!(config.mqtt.broker_host, "localhost");
    assert_eq!(config.mqtt.broker_port, 1883);
    assert_eq!(config.mqtt.client_id, "data-collector");
    assert_eq!(config.mqtt.topic, "devices/+/telemetry");
    assert_eq!(config.mqtt.keep_alive_secs, 30);

    assert_eq!(config.storage.backend, StorageBackend::Timescale);
    assert_eq!(config.storage.max_connections, 20);
    assert_eq!(config.storage.min_connections, 5);

    assert_eq!(config.fanout.backend, FanoutBackend::Redis);
    assert_eq!(config.fanout.channel_prefix, "iot:telemetry");
    assert_eq!(config.relay.handoff_capacity, 1024);
    assert_eq!(config.broker.queue_capacity, 10);
    assert_eq!(config.logging.level, "info");
    assert!(!config.metrics.enabled);
    assert!(config.relay_active());
    Ok(())
}

#[test]
fn test_sections_override_defaults() -> anyhow::Result<()> {
    let config = AppConfig::from_toml_str(
        r#"
[server]
host = "127.0.0.1"
port = 3001

[mqtt]
broker_host = "mqtt.internal"
client_id = "collector-2"
username = "ingest"
password = "secret"

[storage]
backend = "memory"

[fanout]
backend = "local"

[broker]
queue_capacity = 32

[logging]
level = "debug,flux_mqtt=trace"
json = true
"#,
    )?;

    assert_eq!(config.http_addr()?.port(), 3001);
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.fanout.backend, FanoutBackend::Local);
    assert_eq!(config.broker.queue_capacity, 32);
    assert!(config.logging.json);
    // 本地分发时没有中继
    assert!(!config.relay_active());

    let ingest = config.mqtt.to_ingest_config();
    assert_eq!(ingest.broker_addr(), "mqtt.internal:1883");
    assert_eq!(ingest.client_id, "collector-2");
    assert_eq!(ingest.username.as_deref(), Some("ingest"));
    assert_eq!(ingest.reconnect_delay(), Duration::from_secs(5));
    Ok(())
}

#[test]
fn test_relay_settings() -> anyhow::Result<()> {
    let config = AppConfig::from_toml_str(
        r#"
[fanout]
channel_prefix = "site-a:telemetry"

[relay]
handoff_capacity = 64
reconnect_delay_secs = 2
"#,
    )?;

    let relay = config.relay.to_relay_config(&config.fanout.channel_prefix);
    assert_eq!(relay.channel_prefix, "site-a:telemetry");
    assert_eq!(relay.handoff_capacity, 64);
    assert_eq!(relay.reconnect_delay, Duration::from_secs(2));
    Ok(())
}

#[test]
fn test_invalid_values_rejected() {
    assert!(AppConfig::from_toml_str("[storage]\nbackend = \"cassandra\"").is_err());
    assert!(AppConfig::from_toml_str("[broker]\nqueue_capacity = 0").is_err());
    assert!(AppConfig::from_toml_str("[server]\nhost = \"not a host\"").is_err());
    assert!(AppConfig::from_toml_str(
        "[storage]\nmax_connections = 2\nmin_connections = 5"
    )
    .is_err());
    assert!(
        AppConfig::from_toml_str("[metrics]\nenabled = true\nlisten = \"nowhere\"").is_err()
    );
}

#[test]
fn test_load_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("flux.toml");
    std::fs::write(
        &path,
        r#"
[storage]
backend = "memory"

[metrics]
enabled = true
listen = "127.0.0.1:9200"
"#,
    )?;

    let config = AppConfig::load(&path)?;
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.metrics_addr()?.port(), 9200);
    Ok(())
}

#[test]
fn test_missing_file_falls_back_to_defaults() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let config = AppConfig::load(dir.path().join("absent.toml"))?;
    assert_eq!(config.server.port, 8080);
    Ok(())
}
