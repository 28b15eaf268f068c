//! Bridge configuration
//!
//! Settings are read from `gdb-coda/config.toml` in the user's configuration
//! directory, or from an explicit path. Every field has a default so an empty
//! or missing file is a valid configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Largest unterminated packet buffered from GDB before it is dropped.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024;

/// Chunk size for buffered memory reads.
pub const DEFAULT_CHUNK_SIZE: u64 = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no device named {0:?} is configured")]
    UnknownDevice(String),

    #[error("no device configured")]
    NoDevice,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gdb: GdbConfig,
    pub memory: MemoryConfig,
    pub devices: Vec<Device>,
    /// Name of the device in `devices` to connect to. The first one is used
    /// when unset.
    pub device: Option<String>,
    pub inferior: InferiorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GdbConfig {
    pub listen: SocketAddr,
    pub max_packet_size: usize,
}

impl Default for GdbConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 2222)),
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Fetch whole chunks and serve later reads from the cache.
    pub buffered: bool,
    pub chunk_size: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            buffered: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A target reachable over TCP.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub name: String,
    /// `host:port` of the debug agent.
    pub address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct InferiorConfig {
    /// Path of the executable on the device.
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: String,
    pub libraries: Vec<String>,
    /// Host side copy of the executable with symbols.
    pub symbol_file: Option<PathBuf>,
}

impl Config {
    /// `<config dir>/gdb-coda/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gdb-coda").join("config.toml"))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load an explicitly named file, or the default file if one exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            tracing::debug!(path = %path.display(), "loading configuration");
            return Self::from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.is_file() => {
                tracing::debug!(path = %path.display(), "loading default configuration");
                Self::from_file(path)
            }
            _ => {
                tracing::debug!("no configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn selected_device(&self) -> Result<&Device, ConfigError> {
        match &self.device {
            Some(name) => self
                .devices
                .iter()
                .find(|d| &d.name == name)
                .ok_or_else(|| ConfigError::UnknownDevice(name.clone())),
            None => self.devices.first().ok_or(ConfigError::NoDevice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.gdb.listen.port(), 2222);
        assert!(!config.memory.buffered);
        assert_eq!(config.memory.chunk_size, 256);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
device = "phone"

[gdb]
listen = "0.0.0.0:3333"

[memory]
buffered = true

[[devices]]
name = "emulator"
address = "127.0.0.1:1534"

[[devices]]
name = "phone"
address = "192.168.0.4:1534"

[inferior]
executable = "C:\\sys\\bin\\app.exe"
arguments = ["-v"]
symbol_file = "/tmp/app.sym"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.gdb.listen.port(), 3333);
        assert_eq!(config.gdb.max_packet_size, DEFAULT_MAX_PACKET_SIZE);
        assert!(config.memory.buffered);
        assert_eq!(config.memory.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.selected_device().unwrap().address, "192.168.0.4:1534");
        assert_eq!(config.inferior.arguments, vec!["-v".to_string()]);
        assert_eq!(
            config.inferior.symbol_file.as_deref(),
            Some(Path::new("/tmp/app.sym"))
        );
    }

    #[test]
    fn device_selection() {
        let mut config = Config::default();
        assert!(matches!(config.selected_device(), Err(ConfigError::NoDevice)));

        config.devices.push(Device {
            name: "emulator".to_string(),
            address: "127.0.0.1:1534".to_string(),
        });
        assert_eq!(config.selected_device().unwrap().name, "emulator");

        config.device = Some("phone".to_string());
        assert!(matches!(
            config.selected_device(),
            Err(ConfigError::UnknownDevice(name)) if name == "phone"
        ));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[gdb]\nlisten = 12").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
