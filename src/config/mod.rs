//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::connection::{ConnectionSettings, Credentials, Endpoint};
use crate::events::ListenerSettings;

const APP_DIR_NAME: &str = "squeeze-control";

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    /// Player used when none is given explicitly (last-used player)
    #[serde(default)]
    pub player: Option<String>,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_cli_port")]
    pub cli_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_listen_command")]
    pub listen_command: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_cli_port() -> u16 {
    crate::connection::DEFAULT_CLI_PORT
}

fn default_http_port() -> u16 {
    crate::connection::DEFAULT_HTTP_PORT
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_response_timeout_secs() -> u64 {
    10
}

fn default_listen_command() -> String {
    crate::events::DEFAULT_LISTEN_COMMAND.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            cli_port: default_cli_port(),
            http_port: default_http_port(),
            username: None,
            password: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            listen_command: default_listen_command(),
        }
    }
}

impl ServerConfig {
    /// Credentials, only when both parts are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            endpoint: Endpoint {
                host: self.host.clone(),
                cli_port: self.cli_port,
                http_port: self.http_port,
            },
            credentials: self.credentials(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            response_timeout: Duration::from_secs(self.response_timeout_secs),
        }
    }

    pub fn listener_settings(&self) -> ListenerSettings {
        ListenerSettings::for_connection(&self.connection_settings())
            .with_listen_command(self.listen_command.clone())
    }
}

#[derive(Debug, Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

fn default_initial_delay_secs() -> u64 {
    2
}

fn default_max_delay_secs() -> u64 {
    60
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_initial_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

/// Get config directory (SQUEEZE_CONFIG_DIR or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SQUEEZE_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library/Application Support")
                .join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg).join(APP_DIR_NAME);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".config").join(APP_DIR_NAME);
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join(APP_DIR_NAME);
        }
    }

    // Fallback to current directory
    PathBuf::from(".")
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        .set_default("server.host", default_host())?
        // config.toml / config.json / config.yaml, whichever exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // SQUEEZE_SERVER__HOST, SQUEEZE_PLAYER, SQUEEZE_RECONNECT__MAX_DELAY_SECS, ...
        .add_source(
            ::config::Environment::with_prefix("SQUEEZE")
                .separator("__")
                .try_parsing(true),
        );

    // Legacy LMS_* variables win over everything else; unparsable ports are ignored
    if let Ok(host) = std::env::var("LMS_HOST") {
        builder = builder.set_override("server.host", host)?;
    }
    for (var, key) in [
        ("LMS_CLI_PORT", "server.cli_port"),
        ("LMS_PORT", "server.http_port"),
    ] {
        if let Ok(port) = std::env::var(var) {
            match port.parse::<u16>() {
                Ok(port_num) => builder = builder.set_override(key, port_num as i64)?,
                Err(_) => tracing::warn!("Ignoring invalid {}={}", var, port),
            }
        }
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "SQUEEZE_CONFIG_DIR",
        "SQUEEZE_SERVER__HOST",
        "SQUEEZE_SERVER__CLI_PORT",
        "SQUEEZE_PLAYER",
        "LMS_HOST",
        "LMS_CLI_PORT",
        "LMS_PORT",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_without_file_or_env() {
        clear_env();
        env::set_var("SQUEEZE_CONFIG_DIR", "/tmp/squeeze-test-nonexistent");

        let config = load_config().expect("config should load");

        clear_env();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.cli_port, 9090);
        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.listen_command, "listen 1");
        assert!(config.server.credentials().is_none());
        assert_eq!(config.player, None);
        assert_eq!(config.reconnect.initial_delay_secs, 2);
        assert_eq!(config.reconnect.max_delay_secs, 60);
    }

    #[test]
    #[serial]
    fn test_lms_host_and_ports_env() {
        clear_env();
        env::set_var("SQUEEZE_CONFIG_DIR", "/tmp/squeeze-test-nonexistent");
        env::set_var("LMS_HOST", "192.168.1.100");
        env::set_var("LMS_CLI_PORT", "9191");
        env::set_var("LMS_PORT", "9001");

        let config = load_config().expect("config should load");

        clear_env();

        assert_eq!(config.server.host, "192.168.1.100");
        assert_eq!(config.server.cli_port, 9191);
        assert_eq!(config.server.http_port, 9001);
    }

    #[test]
    #[serial]
    fn test_invalid_legacy_port_uses_default() {
        clear_env();
        env::set_var("SQUEEZE_CONFIG_DIR", "/tmp/squeeze-test-nonexistent");
        env::set_var("LMS_CLI_PORT", "not-a-number");

        let config = load_config().expect("config should load");

        clear_env();

        assert_eq!(config.server.cli_port, 9090);
    }

    #[test]
    #[serial]
    fn test_legacy_host_takes_precedence_over_prefixed_env() {
        clear_env();
        env::set_var("SQUEEZE_CONFIG_DIR", "/tmp/squeeze-test-nonexistent");
        env::set_var("SQUEEZE_SERVER__HOST", "from-prefixed");
        env::set_var("SQUEEZE_SERVER__CLI_PORT", "9292");
        env::set_var("SQUEEZE_PLAYER", "00:04:20:aa:bb:cc");
        env::set_var("LMS_HOST", "from-legacy");

        let config = load_config().expect("config should load");

        clear_env();

        assert_eq!(config.server.host, "from-legacy");
        assert_eq!(config.server.cli_port, 9292);
        assert_eq!(config.player.as_deref(), Some("00:04:20:aa:bb:cc"));
    }

    #[test]
    #[serial]
    fn test_config_file_is_read() {
        clear_env();
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        std::fs::write(
            temp_dir.path().join("config.toml"),
            r#"
player = "00:04:20:aa:bb:cc"

[server]
host = "lms.local"
username = "admin"
password = "secret"
response_timeout_secs = 3

[reconnect]
max_delay_secs = 30
"#,
        )
        .expect("write config");
        env::set_var("SQUEEZE_CONFIG_DIR", temp_dir.path());

        let config = load_config().expect("config should load");

        clear_env();

        assert_eq!(config.server.host, "lms.local");
        assert_eq!(config.server.cli_port, 9090);
        assert_eq!(config.player.as_deref(), Some("00:04:20:aa:bb:cc"));
        assert_eq!(config.reconnect.max_delay_secs, 30);
        assert_eq!(config.reconnect.initial_delay_secs, 2);

        let settings = config.server.connection_settings();
        assert_eq!(settings.endpoint.cli_addr(), "lms.local:9090");
        assert_eq!(settings.response_timeout, Duration::from_secs(3));
        let creds = settings.credentials.expect("credentials configured");
        assert_eq!(creds.username, "admin");
        assert_eq!(creds.password, "secret");
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let server = ServerConfig {
            username: Some("admin".to_string()),
            ..Default::default()
        };
        assert!(server.credentials().is_none());

        let server = ServerConfig {
            username: Some(String::new()),
            password: Some("x".to_string()),
            ..Default::default()
        };
        assert!(server.credentials().is_none());
    }

    #[test]
    fn test_listener_settings_carry_listen_command() {
        let server = ServerConfig {
            host: "lms.local".to_string(),
            listen_command: "subscribe playlist,time".to_string(),
            ..Default::default()
        };
        let settings = server.listener_settings();
        assert_eq!(settings.addr, "lms.local:9090");
        assert_eq!(settings.listen_command, "subscribe playlist,time");
    }

    #[test]
    #[serial]
    fn test_config_dir_env_override() {
        let temp_dir = tempfile::tempdir().expect("create temp dir");
        env::set_var("SQUEEZE_CONFIG_DIR", temp_dir.path());

        let dir = get_config_dir();

        env::remove_var("SQUEEZE_CONFIG_DIR");

        assert_eq!(dir, temp_dir.path());
    }
}
