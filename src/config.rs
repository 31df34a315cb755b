use crate::error::Result;
use crate::token::Token;
use serde::Deserialize;

/// Token under which the application [`Config`] is registered in the
/// container, so components can declare it as a dependency.
pub const CONFIG: Token<Config> = Token::new("Config");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    pub hostname: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            hostname: "127.0.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigData {
    pub environment: String,
    pub http: HttpConfig,
}

impl Default for ConfigData {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            http: HttpConfig::default(),
        }
    }
}

/// Read-only view over the application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    data: ConfigData,
}

impl Config {
    pub fn new(data: ConfigData) -> Self {
        Self { data }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn environment(&self) -> &str {
        &self.data.environment
    }

    pub fn http(&self) -> &HttpConfig {
        &self.data.http
    }
}
