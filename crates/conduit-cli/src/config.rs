//! Layered configuration for the demo binary: built-in defaults, optionally
//! overridden by a TOML file, further overridden by CLI flags. The library
//! itself takes a plain [`conduit_core::Options`] with no file/environment
//! parsing of its own; this loader exists only at the demo's edge.

use std::path::Path;
use std::time::Duration;

use conduit_core::Options;
use serde::Deserialize;

/// On-disk shape of the optional TOML config file. Every field is optional so
/// a file may override just the knobs it cares about.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub max_connections_per_peer: Option<usize>,
    pub stream_max_inactive_secs: Option<u64>,
    pub connection_max_inactive_secs: Option<u64>,
    pub max_frame_size: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        Ok(config)
    }
}

/// Build the [`Options`] the switch runs with, starting from
/// [`Options::default`], applying an optional file, then optional CLI
/// overrides, in that order.
pub fn build_options(
    file: Option<&FileConfig>,
    cli_max_connections_per_peer: Option<usize>,
    cli_stream_max_inactive_secs: Option<u64>,
    cli_connection_max_inactive_secs: Option<u64>,
) -> Options {
    let mut options = Options::default();

    if let Some(file) = file {
        if let Some(cap) = file.max_connections_per_peer {
            options.max_connections_per_peer = cap;
        }
        if let Some(secs) = file.stream_max_inactive_secs {
            options.stream_max_inactive = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connection_max_inactive_secs {
            options.connection_max_inactive = Duration::from_secs(secs);
        }
        if let Some(size) = file.max_frame_size {
            options.max_frame_size = size;
        }
    }

    if let Some(cap) = cli_max_connections_per_peer {
        options.max_connections_per_peer = cap;
    }
    if let Some(secs) = cli_stream_max_inactive_secs {
        options.stream_max_inactive = Duration::from_secs(secs);
    }
    if let Some(secs) = cli_connection_max_inactive_secs {
        options.connection_max_inactive = Duration::from_secs(secs);
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_file_or_flags() {
        let options = build_options(None, None, None, None);
        assert_eq!(options, Options::default());
    }

    #[test]
    fn file_values_override_defaults() {
        let file = FileConfig {
            max_connections_per_peer: Some(7),
            stream_max_inactive_secs: Some(30),
            connection_max_inactive_secs: None,
            max_frame_size: None,
        };
        let options = build_options(Some(&file), None, None, None);
        assert_eq!(options.max_connections_per_peer, 7);
        assert_eq!(options.stream_max_inactive, Duration::from_secs(30));
        assert_eq!(options.connection_max_inactive, Options::default().connection_max_inactive);
    }

    #[test]
    fn cli_flags_override_file_values() {
        let file = FileConfig {
            max_connections_per_peer: Some(7),
            ..Default::default()
        };
        let options = build_options(Some(&file), Some(2), None, None);
        assert_eq!(options.max_connections_per_peer, 2);
    }

    #[test]
    fn rejects_an_unreadable_file() {
        let err = FileConfig::load(Path::new("/nonexistent/conduit-demo.toml")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
