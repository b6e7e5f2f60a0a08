use config::{Config, ConfigError, File};
use serde::Deserialize;

use crate::session::SessionConfig;
use crate::wire::ResumeMode;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub trader_front: String,
    pub md_front: String,
    pub flow_dir: String,
    pub flow_md_dir: String,
    pub connect_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_grace_ms: u64,
    pub request_timeout_ms: u64,
    pub reconnect_initial_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
}

impl AppConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms),
            heartbeat_grace: Duration::from_millis(self.heartbeat_grace_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            reconnect_initial_delay: Duration::from_millis(self.reconnect_initial_delay_ms),
            reconnect_max_delay: Duration::from_millis(self.reconnect_max_delay_ms),
            reconnect_max_attempts: self.reconnect_max_attempts,
            resume: ResumeMode::Resume,
        }
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from("config/config.yaml")
}

pub fn load_config_from(path: &str) -> Result<AppConfig, ConfigError> {
    let s = Config::builder()
        // Set defaults
        .set_default("log_level", "info")?
        .set_default("log_to_file", false)?
        .set_default("log_file", "log/front_client.log")?
        .set_default("trader_front", "tcp://180.168.146.187:10202")?
        .set_default("md_front", "tcp://180.168.146.187:10212")?
        .set_default("flow_dir", "flow")?
        .set_default("flow_md_dir", "flowMd")?
        .set_default("connect_timeout_ms", 5000)?
        .set_default("heartbeat_interval_ms", 15000)?
        .set_default("heartbeat_grace_ms", 15000)?
        .set_default("request_timeout_ms", 10000)?
        .set_default("reconnect_initial_delay_ms", 1000)?
        .set_default("reconnect_max_delay_ms", 30000)?
        .set_default("reconnect_max_attempts", 10)?
        // Add configuration from a file
        .add_source(File::with_name(path).required(false))
        // Add configuration from environment variables
        .add_source(config::Environment::with_prefix("APP"))
        .build()?;

    s.try_deserialize()
}
