//! Configuration management

use anyhow::Result;
use chrono::NaiveDate;
use serde::Deserialize;

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub filters: FiltersConfig,
    pub seed: SeedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the SQLite database file, created on first start
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiltersConfig {
    /// Seconds between scheduled filter runs; 0 leaves runs to the HTTP endpoint
    pub run_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    pub demo_students: bool,
    pub mock_attendance: bool,
    pub mock_attendance_date: String,
}

impl SeedConfig {
    pub fn attendance_date(&self) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(&self.mock_attendance_date, "%Y-%m-%d").map_err(|e| {
            anyhow::anyhow!(
                "Invalid mock_attendance_date '{}': {}",
                self.mock_attendance_date,
                e
            )
        })
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name(CONFIG_PATH).required(false))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 4001)?
            .set_default("database.url", "roll_groups.db")?
            .set_default("database.max_connections", 5)?
            .set_default("logging.level", "info")?
            .set_default("filters.run_interval_secs", 0)?
            .set_default("seed.demo_students", true)?
            .set_default("seed.mock_attendance", false)?
            .set_default("seed.mock_attendance_date", "2021-10-14")?
            .add_source(file)
            .add_source(config::Environment::with_prefix("ROLL_GROUPS").separator("__"));

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Invalid port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        if self.seed.mock_attendance {
            self.seed.attendance_date()?;
        }

        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};

    fn from_toml(toml: &str) -> Result<Config> {
        Config::build(File::from_str(toml, FileFormat::Toml))
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = from_toml("").unwrap();
        assert_eq!(config.server.port, 4001);
        assert_eq!(config.database.url, "roll_groups.db");
        assert_eq!(config.filters.run_interval_secs, 0);
        assert!(config.seed.demo_students);
        assert!(!config.seed.mock_attendance);
    }

    #[test]
    fn file_values_override_defaults() {
        let config = from_toml(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [filters]
            run_interval_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");
        assert_eq!(config.filters.run_interval_secs, 600);
    }

    #[test]
    fn rejects_unknown_log_level() {
        let err = from_toml("[logging]\nlevel = \"loud\"").unwrap_err();
        assert!(err.to_string().contains("Invalid logging level"));
    }

    #[test]
    fn rejects_bad_attendance_date_only_when_enabled() {
        assert!(from_toml("[seed]\nmock_attendance_date = \"yesterday\"").is_ok());

        let err = from_toml("[seed]\nmock_attendance = true\nmock_attendance_date = \"yesterday\"")
            .unwrap_err();
        assert!(err.to_string().contains("mock_attendance_date"));
    }
}
