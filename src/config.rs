use std::net::SocketAddr;

const DEFAULT_HUB_URL: &str = "https://api.smo.data-unknown.com/signalr";

/// Dashboard configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub hub_url: String,
    /// Simulation server to subscribe to on connect.
    pub server_code: String,
    pub focus_zoom: u8,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's
    /// value if it is set.
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = lookup("RAILMAP_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RAILMAP_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let hub_url = lookup("RAILMAP_HUB_URL").unwrap_or_else(|| DEFAULT_HUB_URL.to_string());
        if !(hub_url.starts_with("http://") || hub_url.starts_with("https://")) {
            return Err(ConfigError::Invalid(
                "RAILMAP_HUB_URL",
                "must be an http:// or https:// URL",
            ));
        }

        let server_code = lookup("RAILMAP_SERVER")
            .unwrap_or_else(|| "PL1".to_string())
            .trim()
            .to_string();
        if server_code.is_empty() {
            return Err(ConfigError::Missing("RAILMAP_SERVER"));
        }

        let focus_zoom = match lookup("RAILMAP_FOCUS_ZOOM") {
            Some(value) => value
                .parse::<u8>()
                .ok()
                .filter(|zoom| *zoom <= 20)
                .ok_or(ConfigError::Invalid(
                    "RAILMAP_FOCUS_ZOOM",
                    "must be a zoom level between 0 and 20",
                ))?,
            None => 14,
        };

        Ok(Config {
            listen_addr,
            hub_url,
            server_code,
            focus_zoom,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str, &'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing(var) => write!(f, "Missing required variable: {}", var),
            ConfigError::Invalid(var, msg) => write!(f, "Invalid value for {}: {}", var, msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.listen_addr.to_string(), "0.0.0.0:3000");
        assert_eq!(config.hub_url, DEFAULT_HUB_URL);
        assert_eq!(config.server_code, "PL1");
        assert_eq!(config.focus_zoom, 14);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("RAILMAP_LISTEN_ADDR", "127.0.0.1:8080"),
            ("RAILMAP_HUB_URL", "http://localhost:5000/signalr"),
            ("RAILMAP_SERVER", "DE2"),
            ("RAILMAP_FOCUS_ZOOM", "12"),
        ])
        .unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.hub_url, "http://localhost:5000/signalr");
        assert_eq!(config.server_code, "DE2");
        assert_eq!(config.focus_zoom, 12);
    }

    #[test]
    fn test_invalid_listen_addr() {
        let err = load(&[("RAILMAP_LISTEN_ADDR", "nowhere")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("RAILMAP_LISTEN_ADDR", _)));
    }

    #[test]
    fn test_invalid_hub_url() {
        let err = load(&[("RAILMAP_HUB_URL", "ftp://example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("RAILMAP_HUB_URL", _)));
    }

    #[test]
    fn test_blank_server_code() {
        let err = load(&[("RAILMAP_SERVER", "  ")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RAILMAP_SERVER")));
        assert_eq!(err.to_string(), "Missing required variable: RAILMAP_SERVER");
    }

    #[test]
    fn test_zoom_out_of_range() {
        assert!(load(&[("RAILMAP_FOCUS_ZOOM", "21")]).is_err());
        assert!(load(&[("RAILMAP_FOCUS_ZOOM", "close")]).is_err());
    }
}
