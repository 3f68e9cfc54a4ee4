use crate::error::{to_env_var, ConfigError};
use aichat::providers::azure::DEFAULT_API_VERSION;
use config::{Config, Environment, File, Map, Value};
use serde::Deserialize;
use std::fmt;
use std::net::SocketAddr;
use url::Url;

#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatSettings {
    /// Which connection string holds the endpoint and key
    #[serde(default = "default_connection_name")]
    pub connection_name: String,
    /// Only reported at startup, direct deployments serve a single model
    #[serde(default = "default_deployment")]
    pub deployment: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<i32>,
    #[serde(default = "default_translate_api_key")]
    pub translate_api_key: bool,
    #[serde(default)]
    pub path_prefix: Option<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            connection_name: default_connection_name(),
            deployment: default_deployment(),
            api_version: default_api_version(),
            temperature: None,
            max_tokens: None,
            translate_api_key: default_translate_api_key(),
            path_prefix: None,
        }
    }
}

/// Endpoint and optional key read from a `Endpoint=...;Key=...` connection string
#[derive(Clone, PartialEq)]
pub struct ConnectionInfo {
    pub endpoint: Url,
    pub key: Option<String>,
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("endpoint", &self.endpoint.as_str())
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionInfo {
    /// Parse a connection string. Entries are `;` separated `name=value` pairs,
    /// names are case insensitive and the first occurrence wins. An empty key
    /// counts as no key.
    pub fn parse(connection_string: &str) -> Result<Self, ConfigError> {
        let mut entries: Vec<(String, String)> = Vec::new();
        for entry in connection_string.split(';') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                ConfigError::InvalidConnectionString(format!("expected name=value, got '{}'", entry))
            })?;
            entries.push((name.trim().to_string(), value.trim().to_string()));
        }

        let lookup = |wanted: &str| {
            entries
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, value)| value.clone())
        };

        let endpoint = lookup("Endpoint")
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| ConfigError::InvalidConnectionString("missing Endpoint".to_string()))?;
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            ConfigError::InvalidConnectionString(format!("invalid Endpoint '{}': {}", endpoint, e))
        })?;
        let key = lookup("Key").filter(|key| !key.is_empty());

        Ok(Self { endpoint, key })
    }
}

#[derive(Debug, Deserialize)]
struct LayeredSettings {
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    chat: ChatSettings,
}

#[derive(Debug)]
pub struct Settings {
    pub server: ServerSettings,
    pub chat: ChatSettings,
    pub connection: ConnectionInfo,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // An optional aichat.toml next to the binary
            .add_source(File::with_name("aichat").required(false))
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("AICHAT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let layered: LayeredSettings = config.clone().try_deserialize().map_err(|err| {
            tracing::debug!("Configuration error: {:?}", &err);
            ConfigError::Other(err)
        })?;

        let connection_string = resolve_connection_string(&config, &layered.chat.connection_name)?;
        let connection = ConnectionInfo::parse(&connection_string)?;

        Ok(Self {
            server: layered.server,
            chat: layered.chat,
            connection,
        })
    }
}

/// Look the named connection string up under `connection_strings.<name>`,
/// falling back to the flat `connectionstrings--<name>` key.
fn resolve_connection_string(config: &Config, name: &str) -> Result<String, ConfigError> {
    let root: Map<String, Value> = config.clone().try_deserialize()?;

    let find = |table: &Map<String, Value>, wanted: &str| {
        table
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value.clone())
    };

    let nested = match find(&root, "connection_strings") {
        Some(table) => find(&table.into_table()?, name),
        None => None,
    };
    let flat = find(&root, &format!("connectionstrings--{}", name));

    for value in nested.into_iter().chain(flat) {
        let value = value.into_string()?;
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }

    Err(ConfigError::MissingEnvVar {
        env_var: to_env_var(&format!("connection_strings.{}", name)),
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_connection_name() -> String {
    "openai".to_string()
}

fn default_deployment() -> String {
    "DeepSeek-R1".to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_translate_api_key() -> bool {
    true
}
