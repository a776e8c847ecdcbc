//! Runtime configuration
//!
//! ```toml
//! max_symlink_hops = 16
//! lookup_paths = ["/vendor/node_modules"]
//! extensions = [".js", ".json", ".node"]
//! ```

use crate::error::Result;
use serde::Deserialize;
use std::path::Path;

/// Default bound on symlink hops followed by `stat` and `read_file`
pub const DEFAULT_MAX_SYMLINK_HOPS: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Symlinks followed before a lookup fails with `SymlinkLoop`
    pub max_symlink_hops: usize,

    /// Extra directories searched after the `node_modules` walk
    pub lookup_paths: Vec<String>,

    /// Resolution order for extensions, replacing the registered order
    pub extensions: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_symlink_hops: DEFAULT_MAX_SYMLINK_HOPS,
            lookup_paths: Vec::new(),
            extensions: None,
        }
    }
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load a TOML configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsarError;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_symlink_hops, 32);
    }

    #[test]
    fn test_parse() {
        let config = Config::from_toml_str(
            r#"
            max_symlink_hops = 4
            lookup_paths = ["/vendor"]
            extensions = [".json", ".js"]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_symlink_hops, 4);
        assert_eq!(config.lookup_paths, vec!["/vendor"]);
        assert_eq!(
            config.extensions,
            Some(vec![".json".to_string(), ".js".to_string()])
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Config::from_toml_str("max_hops = 3");
        assert!(matches!(result, Err(AsarError::Config(_))));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "lookup_paths = [\"/lib\"]")?;
        let config = Config::load(file.path())?;
        assert_eq!(config.lookup_paths, vec!["/lib"]);
        Ok(())
    }
}
