use anyhow::{Result, bail};
use clap::Parser;
use serde::Deserialize;
use serde_yaml;
use std::env;
use std::fs;
use std::path::PathBuf;

const EXAMPLE_CONFIG: &str = include_str!("../config.example.yaml");

#[derive(Parser, Debug)]
#[command(name = "starboard")]
#[command(about = "Runs the starboard repository search service", long_about = None)]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,
}

pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".starboard")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct App {
    port: u16,
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_environment() -> String {
    "development".to_string()
}

impl App {
    pub fn get_port(&self) -> u16 {
        self.port
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Storage {
    pub url: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub auth_token: Option<String>,
}

impl Storage {
    pub fn is_remote(&self) -> bool {
        ["libsql://", "https://", "http://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Identity {
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub verify_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Github {
    pub api_url: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub token: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "starboard".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Cors {
    #[serde(default)]
    pub origins: Vec<String>,
    #[serde(default)]
    pub origin_suffixes: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: App,
    pub database: Storage,
    pub identity: Identity,
    pub github: Github,
    #[serde(default)]
    pub cors: Cors,
}

// `${VAR:-}` leaves an empty scalar behind, which should mean "not set".
fn non_empty<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

impl Config {
    pub fn new(path: &str) -> Result<Self> {
        let cfg = Config::load_config(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Builds the config from the bundled example file, so every value comes
    /// from the environment or its default.
    pub fn from_env() -> Result<Self> {
        let cfg = Config::parse(EXAMPLE_CONFIG)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn load_config(path: &str) -> Result<Config> {
        let yaml_str = fs::read_to_string(path)?;
        Config::parse(&yaml_str)
    }

    fn parse(yaml_str: &str) -> Result<Config> {
        let yaml_with_env = Config::substitute_env_vars(yaml_str)?;
        let config: Config = serde_yaml::from_str(&yaml_with_env)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity.secret_key.trim().is_empty() {
            bail!("identity.secret_key must be set (IDENTITY_SECRET_KEY)");
        }
        if self.identity.verify_url.trim().is_empty() {
            bail!("identity.verify_url must be set (IDENTITY_VERIFY_URL)");
        }
        if self.database.url.trim().is_empty() {
            bail!("database.url must be set (DATABASE_URL)");
        }
        Ok(())
    }

    fn substitute_env_vars(yaml_str: &str) -> Result<String> {
        let mut result = yaml_str.to_string();
        let mut offset = 0;

        while let Some(start) = result[offset..].find("${") {
            let actual_start = offset + start;
            if let Some(end) = result[actual_start..].find("}") {
                let var_name = &result[actual_start + 2..actual_start + end];

                let env_value = if let Some(default_start) = var_name.find(":-") {
                    let actual_var = &var_name[..default_start];
                    let default_val = &var_name[default_start + 2..];
                    env::var(actual_var).unwrap_or_else(|_| default_val.to_string())
                } else {
                    env::var(var_name).unwrap_or_else(|_| {
                        tracing::warn!(var = var_name, "environment variable not found");
                        String::new()
                    })
                };

                result.replace_range(actual_start..actual_start + end + 1, &env_value);
                offset = actual_start + env_value.len();
            } else {
                break;
            }
        }

        Ok(result)
    }
}
