use std::{env, net::SocketAddr};

use thiserror::Error;

pub const DEFAULT_BIND_PORT: u16 = 8006;
pub const DEFAULT_USER_SERVICE_URL: &str = "http://localhost:8041";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub user_service_url: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("USER_SERVICE_URL must be an http(s) URL")]
    InvalidUserServiceUrl,
    #[error("invalid bind address or port")]
    InvalidSocket,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
        let bind_port = env::var("BIND_PORT")
            .ok()
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(DEFAULT_BIND_PORT);
        let user_service_url = env::var("USER_SERVICE_URL")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_USER_SERVICE_URL.to_string());

        if !(user_service_url.starts_with("http://") || user_service_url.starts_with("https://")) {
            return Err(ConfigError::InvalidUserServiceUrl);
        }

        let config = Self {
            bind_addr,
            bind_port,
            user_service_url,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    // Tests mutate process-wide environment variables.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear() {
        env::remove_var("BIND_ADDR");
        env::remove_var("BIND_PORT");
        env::remove_var("USER_SERVICE_URL");
    }

    #[test]
    fn parse_defaults() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();

        let config = Config::from_env().expect("config should parse");
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 8006);
        assert_eq!(config.user_service_url, "http://localhost:8041");
    }

    #[test]
    fn invalid_port_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();
        env::set_var("BIND_PORT", "70000");

        let err = Config::from_env().expect_err("expected invalid port error");
        assert!(matches!(err, ConfigError::InvalidPort));
        clear();
    }

    #[test]
    fn user_service_url_requires_http_scheme() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();
        env::set_var("USER_SERVICE_URL", "ftp://users");

        let err = Config::from_env().expect_err("expected invalid url error");
        assert!(matches!(err, ConfigError::InvalidUserServiceUrl));
        clear();
    }

    #[test]
    fn invalid_bind_address_fails() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();
        env::set_var("BIND_ADDR", "not an address");

        let err = Config::from_env().expect_err("expected invalid socket error");
        assert!(matches!(err, ConfigError::InvalidSocket));
        clear();
    }
}
