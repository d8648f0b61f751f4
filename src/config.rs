use crate::archive::Compression;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration shared by every archive opened through one registry
///
/// ```toml
/// readonly = false
/// gzip_level = 6
/// bzip2_level = 9
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PharConfig {
    /// Refuse every mutation and report `can_write() == false`
    pub readonly: bool,

    /// DEFLATE level for GZIP (0-9)
    pub gzip_level: u32,

    /// bzip2 block size level (1-9)
    pub bzip2_level: u32,
}

impl Default for PharConfig {
    fn default() -> Self {
        Self {
            readonly: false,
            gzip_level: 6,
            bzip2_level: 9,
        }
    }
}

impl PharConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source)?;
        Ok(config.clamped())
    }

    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Compression level to use for a codec
    pub fn level(&self, codec: Compression) -> u32 {
        match codec {
            Compression::None => 0,
            Compression::Gzip => self.gzip_level,
            Compression::Bzip2 => self.bzip2_level,
        }
    }

    fn clamped(mut self) -> Self {
        self.gzip_level = self.gzip_level.min(9);
        self.bzip2_level = self.bzip2_level.clamp(1, 9);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PharConfig::default();
        assert!(!config.readonly);
        assert_eq!(config.level(Compression::Gzip), 6);
        assert_eq!(config.level(Compression::Bzip2), 9);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PharConfig::from_toml_str("readonly = true\n").unwrap();
        assert!(config.readonly);
        assert_eq!(config.gzip_level, 6);
    }

    #[test]
    fn test_levels_are_clamped() {
        let config = PharConfig::from_toml_str("gzip_level = 42\nbzip2_level = 0\n").unwrap();
        assert_eq!(config.gzip_level, 9);
        assert_eq!(config.bzip2_level, 1);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PharConfig {
            readonly: true,
            gzip_level: 3,
            bzip2_level: 5,
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(PharConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml() {
        let result = PharConfig::from_toml_str("readonly = \"maybe\"");
        assert!(matches!(result, Err(crate::PharError::Config(_))));
    }
}
