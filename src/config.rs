//! Configuration types for `MockNet`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{MockError, Result};

/// Default port for the stub listener
pub const DEFAULT_PORT: u16 = 9090;

/// Default port for the control API
pub const DEFAULT_ADMIN_PORT: u16 = 9091;

/// Main configuration, read once at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Address both listeners bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the stub listener binds to (0 picks an ephemeral port)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port the control API binds to (0 picks an ephemeral port)
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    /// Directory holding persisted endpoint documents
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Origins allowed to call the control API; `"*"` allows any
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Register the DocuSign preset stubs from stored documents at startup
    #[serde(default)]
    pub seed_docusign: bool,
    /// Resource limits
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_admin_port() -> u16 {
    DEFAULT_ADMIN_PORT
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("mocks")
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            admin_port: DEFAULT_ADMIN_PORT,
            storage_dir: default_storage_dir(),
            allowed_origins: default_allowed_origins(),
            seed_docusign: false,
            limits: LimitsConfig::default(),
        }
    }
}

/// Resource limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum concurrent connections on the stub listener
    pub max_connections: usize,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Maximum upstream response body size in bytes while recording
    pub max_response_size: usize,
    /// Maximum headers per request
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: 1024,
            max_request_size: 16 * 1024 * 1024,   // 16 MB
            max_response_size: 64 * 1024 * 1024,  // 64 MB
            max_headers: 128,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MockError::Config(format!("Failed to read config file: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MockError::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| MockError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(MockError::Config("host cannot be empty".to_string()));
        }

        if self.port != 0 && self.port == self.admin_port {
            return Err(MockError::Config(format!(
                "port and admin_port must differ (both {})",
                self.port
            )));
        }

        if self.storage_dir.as_os_str().is_empty() {
            return Err(MockError::Config(
                "storage_dir cannot be empty".to_string(),
            ));
        }

        if let Some(origin) = self.allowed_origins.iter().find(|o| o.trim().is_empty()) {
            return Err(MockError::Config(format!(
                "allowed_origins contains a blank entry: {origin:?}"
            )));
        }

        let limits = &self.limits;
        for (name, value) in [
            ("max_connections", limits.max_connections),
            ("max_request_size", limits.max_request_size),
            ("max_response_size", limits.max_response_size),
            ("max_headers", limits.max_headers),
        ] {
            if value == 0 {
                return Err(MockError::Config(format!("limits.{name} must be > 0")));
            }
        }

        if u32::try_from(limits.max_connections).is_err() {
            return Err(MockError::Config(format!(
                "limits.max_connections too large: {}",
                limits.max_connections
            )));
        }

        Ok(())
    }

    /// Check whether a browser origin may call the control API
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed.eq_ignore_ascii_case(origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_parse() {
        let config_toml = r#"
            port = 8080
            admin_port = 8081
            storage_dir = "/tmp/mocks"
            allowed_origins = ["http://localhost:3000"]
        "#;

        let config: Config = toml::from_str(config_toml).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.admin_port, 8081);
        assert_eq!(config.allowed_origins, vec!["http://localhost:3000"]);
        assert!(!config.seed_docusign);
    }

    #[test]
    fn test_config_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.admin_port, DEFAULT_ADMIN_PORT);
        assert_eq!(config.storage_dir, PathBuf::from("mocks"));
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert_eq!(config.host, "127.0.0.1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config_toml = r#"
            port = 9000
            seed_docusign = true

            [limits]
            max_connections = 8
            max_request_size = 1024
            max_response_size = 2048
            max_headers = 16
        "#;
        file.write_all(config_toml.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.port, 9000);
        assert!(config.seed_docusign);
        assert_eq!(config.limits.max_connections, 8);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str("listen = 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_same_ports_invalid() {
        let config = Config {
            port: 9000,
            admin_port: 9000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limit_invalid() {
        let mut config = Config::default();
        config.limits.max_headers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_origin_allowed() {
        let mut config = Config::default();
        assert!(config.origin_allowed("http://anything"));

        config.allowed_origins = vec!["http://localhost:3000".to_string()];
        assert!(config.origin_allowed("http://localhost:3000"));
        assert!(!config.origin_allowed("http://evil.example"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let rendered = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.port, config.port);
    }
}
