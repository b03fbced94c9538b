use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;
use snafu::ResultExt;

use crate::error;
use crate::util::Result;

pub trait ConfigElement {
    const KEY: &'static str;
}

/// Settings of one ingest pipeline
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// capacity of the channel between a decoder worker and its consumer
    pub row_buffer_size: usize,
    /// directory for scratch files, the system temp dir if unset
    pub scratch_dir: Option<PathBuf>,
    pub scratch_prefix: String,
    /// inputs of at least this many bytes are summarized from their first feature only
    pub abbreviate_summary_size: u64,
    pub geometry_column: String,
}

impl ConfigElement for PipelineConfig {
    const KEY: &'static str = "pipeline";
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            row_buffer_size: 1024,
            scratch_dir: None,
            scratch_prefix: "geoingest_".to_string(),
            abbreviate_summary_size: 64 * 1024 * 1024,
            geometry_column: "the_geom".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Reads the `[pipeline]` section of a settings file.
    ///
    /// A missing file yields the defaults. Environment variables that start with
    /// `GEOINGEST__`, e.g. `GEOINGEST__PIPELINE__ROW_BUFFER_SIZE=64`, override the file.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(path).required(false))
            // Note: Since variables contain underscores, we need to use something different
            // for separating groups, for instance double underscores `__`
            .add_source(Environment::with_prefix("geoingest").separator("__"))
            .build()
            .context(error::ConfigSnafu)?;

        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self> {
        match settings.get::<Self>(Self::KEY) {
            Ok(config) => Ok(config),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(source) => Err(error::Error::Config { source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = PipelineConfig::load(Path::new("does/not/exist.toml")).unwrap();

        assert_eq!(config.row_buffer_size, 1024);
        assert_eq!(config.geometry_column, "the_geom");
        assert_eq!(config.abbreviate_summary_size, 64 * 1024 * 1024);
    }

    #[test]
    fn partial_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\nrow_buffer_size = 16\ngeometry_column = \"geom\"").unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();

        assert_eq!(
            config,
            PipelineConfig {
                row_buffer_size: 16,
                geometry_column: "geom".to_string(),
                ..Default::default()
            }
        );
    }

    #[test]
    fn shipped_defaults_match() {
        let config = PipelineConfig::load(
            &Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("..")
                .join("Settings-default.toml"),
        )
        .unwrap();

        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn invalid_value() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[pipeline]\nrow_buffer_size = \"many\"").unwrap();

        let error = PipelineConfig::load(file.path()).unwrap_err();

        assert_eq!(error.kind(), "ConfigError");
    }
}
