use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub port: u16,
    pub log_level: String,
    pub jwt_secret: String,
    /// Broadcast buffer per room; a receiver that lags past this many
    /// events starts losing them and must re-sync over REST.
    pub realtime_room_buffer: usize,
    pub ws_heartbeat_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("port", 3000)?
            .set_default("log_level", "info")?
            .set_default("jwt_secret", "dev-secret")?
            .set_default("realtime_room_buffer", 256)?
            .set_default("ws_heartbeat_secs", 15)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }
}
