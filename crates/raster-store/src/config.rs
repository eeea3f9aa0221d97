//! Backend configuration.

use std::path::PathBuf;

use crate::chunk::DEFAULT_MAX_CHUNK_SIZE;

/// File backend configuration.
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    /// Directory holding primary and sidecar raster files.
    pub root_dir: PathBuf,
}

impl Default for FileBackendConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./data/rasters"),
        }
    }
}

impl FileBackendConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("RASTER_FILE_ROOT") {
            config.root_dir = PathBuf::from(val);
        }
        config
    }
}

/// Database backend configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    pub database_url: String,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Upper bound on one stored chunk's payload, in bytes.
    pub max_chunk_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/rasters".to_string(),
            max_connections: 10,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
        }
    }
}

impl DatabaseConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("DATABASE_URL") {
            config.database_url = val;
        }
        if let Ok(val) = std::env::var("RASTER_DB_MAX_CONNECTIONS") {
            if let Ok(parsed) = val.parse() {
                config.max_connections = parsed;
            }
        }
        if let Ok(val) = std::env::var("RASTER_DB_MAX_CHUNK_SIZE") {
            if let Ok(parsed) = val.parse() {
                config.max_chunk_size = parsed;
            }
        }
        config
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("database_url must not be empty".to_string());
        }
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.max_chunk_size == 0 {
            return Err("max_chunk_size must be at least 1 byte".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_defaults() {
        let config = FileBackendConfig::default();
        assert_eq!(config.root_dir, PathBuf::from("./data/rasters"));
    }

    #[test]
    fn test_database_defaults_validate() {
        let config = DatabaseConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_chunk_size, DEFAULT_MAX_CHUNK_SIZE);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    fn test_database_validate_rejects_bad_values() {
        let mut config = DatabaseConfig::default();
        config.database_url.clear();
        assert!(config.validate().is_err());

        let mut config = DatabaseConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = DatabaseConfig::default();
        config.max_chunk_size = 0;
        assert!(config.validate().is_err());
    }
}
