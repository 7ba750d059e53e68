//! TOML description of an import.
//!
//! ```toml
//! input_dir = "/data/ni_stack"
//! extension = "ang"
//! start_index = 1
//! end_index = 120
//! stacking_order = "high_to_low"
//! z_resolution = 0.25
//! ```
//!
//! Template fields left out are filled in by scanning `input_dir`.

use crate::{
    enums::StackingOrder,
    slice_pattern::{ImportRange, resolve, resolve_directory},
    volume_assembler::AssemblyOptions,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportConfig {
    pub input_dir: Option<PathBuf>,
    pub extension: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub start_index: Option<u64>,
    pub end_index: Option<u64>,
    pub digit_width: Option<usize>,
    pub stacking_order: StackingOrder,
    /// `[xpoints, ypoints, zpoints]`, zero entries are inferred
    pub dimensions: Option<[usize; 3]>,
    pub z_resolution: Option<f32>,
}

impl ImportConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(z) = self.z_resolution {
            if !(z.is_finite() && z > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "z_resolution must be positive, found {z}"
                )));
            }
        }
        if let (Some(start), Some(end)) = (self.start_index, self.end_index) {
            if end < start {
                return Err(ConfigError::Invalid(format!(
                    "end_index {end} is below start_index {start}"
                )));
            }
        }
        if let Some(ext) = &self.extension {
            if ext.is_empty() || ext.starts_with('.') {
                return Err(ConfigError::Invalid(format!(
                    "extension must be non-empty and given without a dot, found '{ext}'"
                )));
            }
        }
        Ok(())
    }

    /// Scan `directory` and let every template field set in the config
    /// override the scanned value.
    ///
    /// When the scan matches nothing the overrides only apply if the config
    /// names the extension and both ends of the range itself, otherwise the
    /// range stays empty.
    pub fn resolve_range(&self, directory: &Path) -> ImportRange {
        let mut range = match &self.extension {
            Some(ext) => resolve(directory, ext),
            None => resolve_directory(directory),
        };
        if range.is_empty() && !self.describes_full_range() {
            return range;
        }

        if let Some(ext) = &self.extension {
            range.extension = ext.clone();
        }
        if let Some(prefix) = &self.prefix {
            range.prefix = prefix.clone();
        }
        if let Some(suffix) = &self.suffix {
            range.suffix = suffix.clone();
        }
        if let Some(start) = self.start_index {
            range.start_index = start;
        }
        if let Some(end) = self.end_index {
            range.end_index = end;
        }
        if let Some(digits) = self.digit_width {
            range.digit_width = digits;
        }
        range
    }

    fn describes_full_range(&self) -> bool {
        self.extension.is_some() && self.start_index.is_some() && self.end_index.is_some()
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            dimensions: self.dimensions.map(|[x, y, z]| (x, y, z)),
            stacking_order: self.stacking_order,
            z_resolution: self.z_resolution.unwrap_or(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    #[test]
    fn parses_full_config() {
        let config = ImportConfig::from_toml_str(
            r#"
            input_dir = "/data/stack"
            extension = "ctf"
            prefix = "Slice_"
            start_index = 2
            end_index = 9
            digit_width = 3
            stacking_order = "high_to_low"
            dimensions = [100, 80, 0]
            z_resolution = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.input_dir.as_deref(), Some(Path::new("/data/stack")));
        assert_eq!(config.stacking_order, StackingOrder::HighToLow);
        let options = config.assembly_options();
        assert_eq!(options.dimensions, Some((100, 80, 0)));
        assert_eq!(options.z_resolution, 0.25);
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ImportConfig::from_toml_str("").unwrap();
        assert_eq!(config, ImportConfig::default());
        assert_eq!(config.assembly_options(), AssemblyOptions::default());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            ImportConfig::from_toml_str("colour = 3"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("z_resolution = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("extension = \".ang\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ImportConfig::from_toml_str("start_index = 9\nend_index = 2"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn extension_alone_does_not_invent_a_range() {
        let dir = TempDir::new().unwrap();
        let config = ImportConfig {
            extension: Some("ang".into()),
            prefix: Some("Slice_".into()),
            ..Default::default()
        };
        let range = config.resolve_range(dir.path());
        assert!(range.is_empty());
        assert_eq!(range.len(), 0);
    }

    #[test]
    fn explicit_range_applies_without_matching_files() {
        let dir = TempDir::new().unwrap();
        let config = ImportConfig {
            extension: Some("ang".into()),
            prefix: Some("Slice_".into()),
            start_index: Some(1),
            end_index: Some(4),
            digit_width: Some(3),
            ..Default::default()
        };
        let range = config.resolve_range(dir.path());
        assert_eq!(range.extension, "ang");
        assert_eq!(range.len(), 4);
        assert_eq!(range.total_files, 0);
    }

    #[test]
    fn config_fields_override_scan() {
        let dir = TempDir::new().unwrap();
        for name in ["scan_05.ang", "scan_06.ang", "scan_07.ang"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let config = ImportConfig {
            end_index: Some(6),
            ..Default::default()
        };

        let range = config.resolve_range(dir.path());
        assert_eq!(range.prefix, "scan_");
        assert_eq!((range.start_index, range.end_index), (5, 6));
        assert_eq!(range.digit_width, 2);
        assert_eq!(range.total_files, 3);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = ImportConfig::load("/no/such/config.toml").unwrap_err();
        assert!(err.to_string().contains("/no/such/config.toml"));
    }
}
