//! Server configuration
//!
//! Configuration is loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::session::{ReconnectPolicy, SessionManagerConfig};
use crate::transport::BridgeConfig;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,

    /// WhatsApp session configuration
    pub whatsapp: WhatsappConfig,
}

/// WhatsApp session configuration
#[derive(Debug, Clone)]
pub struct WhatsappConfig {
    /// Fixed session name credentials are stored under
    pub session_name: String,
    /// Directory holding per-session credential folders
    pub auth_dir: PathBuf,
    /// Start the session at boot
    pub auto_start: bool,
    /// WebSocket URL of the protocol sidecar
    pub bridge_url: String,
    /// Where to look up the latest protocol version (optional)
    pub version_url: Option<String>,
    /// Bound on connection establishment
    pub connect_timeout: Duration,
    /// Bound on a single send
    pub send_timeout: Duration,
    /// Delay before the first reconnect
    pub reconnect_initial_delay: Duration,
    /// Cap on any single reconnect delay
    pub reconnect_max_delay: Duration,
    /// Consecutive failures before giving up (0 = never)
    pub reconnect_max_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            whatsapp: WhatsappConfig::default(),
        }
    }
}

impl Default for WhatsappConfig {
    fn default() -> Self {
        let reconnect = ReconnectPolicy::default();
        Self {
            session_name: "default".to_string(),
            auth_dir: PathBuf::from("auth_info"),
            auto_start: true,
            bridge_url: BridgeConfig::default().url,
            version_url: None,
            connect_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            reconnect_initial_delay: reconnect.initial_delay,
            reconnect_max_delay: reconnect.max_delay,
            reconnect_max_attempts: reconnect.max_attempts,
        }
    }
}

impl WhatsappConfig {
    pub fn session_manager_config(&self) -> SessionManagerConfig {
        SessionManagerConfig {
            session_name: self.session_name.clone(),
            connect_timeout: self.connect_timeout,
            send_timeout: self.send_timeout,
            reconnect: ReconnectPolicy {
                initial_delay: self.reconnect_initial_delay,
                max_delay: self.reconnect_max_delay,
                max_attempts: self.reconnect_max_attempts,
            },
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            url: self.bridge_url.clone(),
            version_url: self.version_url.clone(),
            ..Default::default()
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // Server config
        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }

        // WhatsApp config
        let wa = &mut config.whatsapp;
        if let Some(name) = lookup("WA_SESSION_NAME")
            && !name.is_empty()
        {
            wa.session_name = name;
        }
        if let Some(dir) = lookup("WA_AUTH_DIR")
            && !dir.is_empty()
        {
            wa.auth_dir = PathBuf::from(dir);
        }
        if let Some(val) = lookup("WA_AUTO_START") {
            wa.auto_start = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(url) = lookup("WA_BRIDGE_URL")
            && !url.is_empty()
        {
            wa.bridge_url = url;
        }
        if let Some(url) = lookup("WA_VERSION_URL")
            && !url.is_empty()
        {
            wa.version_url = Some(url);
        }
        if let Some(val) = lookup("WA_CONNECT_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            wa.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("WA_SEND_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            wa.send_timeout = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("WA_RECONNECT_INITIAL_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            wa.reconnect_initial_delay = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("WA_RECONNECT_MAX_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            wa.reconnect_max_delay = Duration::from_secs(secs);
        }
        if let Some(val) = lookup("WA_RECONNECT_MAX_ATTEMPTS")
            && let Ok(n) = val.parse()
        {
            wa.reconnect_max_attempts = n;
        }

        config
    }
}
