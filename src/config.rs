use crate::error::{ErrorKind, Result};
use serde::Deserialize;
use std::io::Read;
use std::str::FromStr;

/// Settings shared by every pool flavour.
///
/// Missing fields fall back to [`PoolConfig::default`]:
///
/// ```
/// use workpool::config::PoolConfig;
///
/// let config: PoolConfig = r#"{ "size": 3 }"#.parse().unwrap();
/// assert_eq!(config.size, 3);
/// assert_eq!(config.name, "workpool");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of worker threads, fixed for the pool lifetime.
    pub size: usize,
    /// Prefix of worker thread names and value of the `pool` log key.
    pub name: String,
}

impl PoolConfig {
    pub fn with_size(size: usize) -> Self {
        PoolConfig {
            size,
            ..PoolConfig::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let config: PoolConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// A pool without workers accepts jobs but never drains.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(ErrorKind::InvalidPoolSize(self.size).into());
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            size: num_cpus::get(),
            name: "workpool".to_string(),
        }
    }
}

impl FromStr for PoolConfig {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let config: PoolConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
