//! Loading and saving the sequencer configuration as TOML

use std::io;
use std::path::{Path, PathBuf};

use stepseq_core::{SequencerConfig, SequencerError};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to write {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(transparent)]
    Invalid(#[from] SequencerError),
}

/// Default location: `<config dir>/stepseq/config.toml`
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stepseq")
        .join("config.toml")
}

/// Parse and validate a TOML document. Omitted fields take their defaults.
pub fn parse_config(text: &str) -> Result<SequencerConfig, ConfigError> {
    let config: SequencerConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Read the config at `path`. A missing file yields the default config.
pub fn load_config(path: &Path) -> Result<SequencerConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No config file, using defaults");
            return Ok(SequencerConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let config = parse_config(&text)?;
    info!(path = %path.display(), tracks = config.tracks.len(), "Config loaded");
    Ok(config)
}

pub fn save_config(path: &Path, config: &SequencerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let text = toml::to_string_pretty(config)?;
    std::fs::write(path, text).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = parse_config("bpm = 120.0\nsteps = 16\n").unwrap();
        assert_eq!(config.bpm, 120.0);
        assert_eq!(config.steps, 16);
        assert_eq!(config.steps_per_beat, 4);
        assert_eq!(config.tracks.len(), 8);
    }

    #[test]
    fn test_explicit_tracks() {
        let text = r#"
            outputs = ["fluid", "hydrogen"]
            input = "keystation"

            [[tracks]]
            name = "kick"
            device = 1
            note = 36

            [[tracks]]
            name = "keys"
            channel = 0
            note = 60
            looper = true
            arpeggiator = { enabled = true, offsets = [4, 7] }
        "#;
        let config = parse_config(text).unwrap();
        assert_eq!(config.tracks.len(), 2);
        assert_eq!(config.tracks[0].device, 1);
        assert_eq!(config.tracks[0].channel, 9);
        assert!(config.tracks[1].looper);
        assert_eq!(config.tracks[1].arpeggiator.offsets, vec![4, 7]);
        assert_eq!(config.input.as_deref(), Some("keystation"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let text = "[[tracks]]\nname = \"bad\"\nchannel = 16\n";
        assert!(matches!(parse_config(text), Err(ConfigError::Invalid(_))));
        assert!(matches!(parse_config("bpm = \"fast\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config, SequencerConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stepseq").join("config.toml");
        let mut config = SequencerConfig::default();
        config.bpm = 96.0;
        config.tracks.truncate(3);
        save_config(&path, &config).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }
}
