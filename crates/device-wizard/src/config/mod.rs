use serde::Deserialize;
use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

const NGSI_LD_CORE_CONTEXT: &str = "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld";

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub platform_file: PathBuf,
    pub platform: PlatformConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8090".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let platform_file = PathBuf::from(
            env::var("DEVICE_WIZARD_CONFIG").unwrap_or_else(|_| "device_wizard.json".to_string()),
        );
        let platform = PlatformConfig::from_path(&platform_file)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            platform_file,
            platform,
        })
    }

    /// Swap the platform file, e.g. when `--config` is given on the command line.
    pub fn with_platform_file(mut self, path: PathBuf) -> Result<Self, ConfigError> {
        self.platform = PlatformConfig::from_path(&path)?;
        self.platform_file = path;
        Ok(self)
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Backend endpoints and datamodel layout, read from the JSON platform file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub fiware: FiwareConfig,
    pub device_idm: DeviceIdmConfig,
    pub datamodel: DatamodelConfig,
    pub idm: PortalConfig,
    pub oidc: Option<OidcConfig>,
}

impl PlatformConfig {
    /// A missing file yields the built-in defaults.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::PlatformFile {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw).map_err(|source| ConfigError::PlatformParse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FiwareConfig {
    pub orion: String,
    pub iotagent: String,
    pub fiware_service: String,
    pub fiware_servicepath: String,
    pub timeout_secs: u64,
}

impl Default for FiwareConfig {
    fn default() -> Self {
        Self {
            orion: "http://orion:1026".to_string(),
            iotagent: "http://iot-agent:4041".to_string(),
            fiware_service: "openiot".to_string(),
            fiware_servicepath: "/".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Keycloak realm holding one user per registered device.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceIdmConfig {
    pub server: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub topic_prefix: String,
}

impl Default for DeviceIdmConfig {
    fn default() -> Self {
        Self {
            server: "http://keycloak:8080".to_string(),
            realm: "devices".to_string(),
            client_id: "device-wizard".to_string(),
            client_secret: String::new(),
            topic_prefix: "/devices".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatamodelConfig {
    pub root: PathBuf,
    pub classes: String,
    pub devices: String,
    pub iotdevices: String,
    pub context: Vec<String>,
}

impl Default for DatamodelConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("datamodel"),
            classes: "classes".to_string(),
            devices: "devices".to_string(),
            iotdevices: "iotdevices".to_string(),
            context: vec![NGSI_LD_CORE_CONTEXT.to_string()],
        }
    }
}

/// Links into the operator-facing identity portal.
/// Operator-facing links; an empty `logout_link` falls back to the
/// provider's end-session endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PortalConfig {
    pub logout_link: String,
    pub account_url: String,
}

/// OpenID Connect client registration used for operator login.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: i64,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".into(), "email".into(), "profile".into()]
}

fn default_session_ttl() -> i64 {
    8 * 60 * 60
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    PlatformFile {
        path: PathBuf,
        source: std::io::Error,
    },
    PlatformParse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::PlatformFile { path, .. } => {
                write!(f, "unable to read platform file {}", path.display())
            }
            ConfigError::PlatformParse { path, .. } => {
                write!(f, "platform file {} is not valid JSON", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::PlatformFile { source, .. } => Some(source),
            ConfigError::PlatformParse { source, .. } => Some(source),
        }
    }
}
