//! TimescaleDB 表结构
//!
//! `device_telemetry` 为数据点表（hypertable），`device_telemetry_latest`
//! 由触发器维护，作为最新值查询的快速路径。

pub const CREATE_EXTENSION: &str = "CREATE EXTENSION IF NOT EXISTS timescaledb";

pub const CREATE_TELEMETRY_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS device_telemetry (
    time        TIMESTAMPTZ      NOT NULL,
    device_id   TEXT             NOT NULL,
    metric_name TEXT             NOT NULL,
    value       DOUBLE PRECISION NOT NULL,
    unit        TEXT,
    metadata    JSONB            NOT NULL DEFAULT '{}'::jsonb
)
"#;

pub const CREATE_HYPERTABLE: &str =
    "SELECT create_hypertable('device_telemetry', 'time', if_not_exists => TRUE)";

pub const CREATE_SERIES_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_device_telemetry_series
    ON device_telemetry (device_id, metric_name, time DESC)
"#;

pub const CREATE_LATEST_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS device_telemetry_latest (
    device_id   TEXT             NOT NULL,
    metric_name TEXT             NOT NULL,
    time        TIMESTAMPTZ      NOT NULL,
    value       DOUBLE PRECISION NOT NULL,
    unit        TEXT,
    PRIMARY KEY (device_id, metric_name)
)
"#;

pub const CREATE_LATEST_FUNCTION: &str = r#"
CREATE OR REPLACE FUNCTION update_device_telemetry_latest() RETURNS TRIGGER AS $$
BEGIN
    INSERT INTO device_telemetry_latest (device_id, metric_name, time, value, unit)
    VALUES (NEW.device_id, NEW.metric_name, NEW.time, NEW.value, NEW.unit)
    ON CONFLICT (device_id, metric_name) DO UPDATE
        SET time = EXCLUDED.time, value = EXCLUDED.value, unit = EXCLUDED.unit
        WHERE device_telemetry_latest.time <= EXCLUDED.time;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql
"#;

pub const DROP_LATEST_TRIGGER: &str =
    "DROP TRIGGER IF EXISTS trg_device_telemetry_latest ON device_telemetry";

pub const CREATE_LATEST_TRIGGER: &str = r#"
CREATE TRIGGER trg_device_telemetry_latest
    AFTER INSERT ON device_telemetry
    FOR EACH ROW EXECUTE FUNCTION update_device_telemetry_latest()
"#;

/// 数据点表之后创建的对象，按顺序执行且必须成功
pub const SERIES_OBJECTS: &[&str] = &[
    CREATE_SERIES_INDEX,
    CREATE_LATEST_TABLE,
    CREATE_LATEST_FUNCTION,
    DROP_LATEST_TRIGGER,
    CREATE_LATEST_TRIGGER,
];
