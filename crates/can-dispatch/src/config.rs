use crate::{BusTransport, ConfigError, FrameTransport, InterfaceRegistry, ProcessorOptions, Role};
use can_transport::{CanBus, MockBus, MockHandle};
use serde::{Deserialize, Serialize};
use signal_db::{load_database_dir, load_database_file, SignalDatabase};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Mock,
    Slcan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default = "default_backend")]
    pub backend: Backend,
    /// Serial device for slcan; ignored by the mock backend.
    #[serde(default)]
    pub channel: Option<String>,
    /// Short bitrate name such as `500k` or `1m`.
    #[serde(default)]
    pub bitrate: Option<String>,
    pub role: Role,
}

fn default_backend() -> Backend {
    Backend::Mock
}

/// Engine configuration file.
///
/// ```yaml
/// database: signals.yaml
/// interfaces:
///   - { name: can0, backend: mock, role: both }
/// processor:
///   queue_capacity: 512
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Descriptor file or directory; relative paths resolve against the config file.
    pub database: PathBuf,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
    #[serde(default)]
    pub processor: ProcessorOptions,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

/// Interfaces that opened successfully, plus the injection side of any mock buses.
pub struct OpenedInterfaces {
    pub registry: InterfaceRegistry,
    pub mock_handles: BTreeMap<String, MockHandle>,
    /// Interfaces whose transport failed to open, with the reason.
    pub skipped: Vec<(String, String)>,
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: EngineConfig =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.base_dir = path.parent().map(Path::to_path_buf);
        info!(path = %path.display(), interfaces = cfg.interfaces.len(), "engine config loaded");
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(base) if self.database.is_relative() => base.join(&self.database),
            _ => self.database.clone(),
        }
    }

    pub fn load_database(&self) -> Result<SignalDatabase, ConfigError> {
        let path = self.database_path();
        let db = if path.is_dir() {
            load_database_dir(&path)?
        } else {
            load_database_file(&path)?
        };
        Ok(db)
    }

    /// Open every configured interface. A transport that fails to open is logged and
    /// skipped; configuration mistakes and duplicate names are errors.
    pub fn open_interfaces(&self) -> Result<OpenedInterfaces, ConfigError> {
        let mut opened = OpenedInterfaces {
            registry: InterfaceRegistry::new(),
            mock_handles: BTreeMap::new(),
            skipped: Vec::new(),
        };
        for iface in &self.interfaces {
            match open_transport(iface)? {
                Ok((transport, mock)) => {
                    opened.registry.add(iface.name.clone(), iface.role, transport)?;
                    if let Some(handle) = mock {
                        opened.mock_handles.insert(iface.name.clone(), handle);
                    }
                }
                Err(reason) => {
                    warn!(interface = %iface.name, %reason, "interface failed to open; skipping");
                    opened.skipped.push((iface.name.clone(), reason));
                }
            }
        }
        Ok(opened)
    }
}

type Opened = (Arc<dyn FrameTransport>, Option<MockHandle>);

/// Outer error is a configuration problem; inner error is a runtime open failure.
fn open_transport(iface: &InterfaceConfig) -> Result<Result<Opened, String>, ConfigError> {
    match iface.backend {
        Backend::Mock => {
            let bus = MockBus::open(&iface.name).map_err(|e| ConfigError::Interface {
                interface: iface.name.clone(),
                reason: e.to_string(),
            })?;
            let handle = bus.handle();
            Ok(BusTransport::new(bus)
                .map(|t| (Arc::new(t) as Arc<dyn FrameTransport>, Some(handle)))
                .map_err(|e| e.to_string()))
        }
        Backend::Slcan => open_slcan(iface),
    }
}

#[cfg(feature = "slcan")]
fn open_slcan(iface: &InterfaceConfig) -> Result<Result<Opened, String>, ConfigError> {
    use can_transport::{SlcanBitrate, SlcanBus};

    let channel = iface.channel.as_deref().ok_or_else(|| ConfigError::Interface {
        interface: iface.name.clone(),
        reason: "slcan backend needs a serial channel".into(),
    })?;
    let bitrate = match iface.bitrate.as_deref() {
        Some(name) => Some(
            SlcanBitrate::from_name(name).ok_or_else(|| ConfigError::Interface {
                interface: iface.name.clone(),
                reason: format!("unsupported bitrate {name}"),
            })?,
        ),
        None => None,
    };
    Ok(SlcanBus::open_with(channel, bitrate)
        .and_then(BusTransport::new)
        .map(|t| (Arc::new(t) as Arc<dyn FrameTransport>, None))
        .map_err(|e| e.to_string()))
}

#[cfg(not(feature = "slcan"))]
fn open_slcan(iface: &InterfaceConfig) -> Result<Result<Opened, String>, ConfigError> {
    Err(ConfigError::Interface {
        interface: iface.name.clone(),
        reason: "built without the slcan feature".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
database: db/signals.yaml
interfaces:
  - name: can0
    role: receiver
  - name: can1
    backend: mock
    role: both
processor:
  queue_capacity: 16
"#;

    #[test]
    fn test_parse_with_defaults() {
        let cfg = EngineConfig::from_yaml_str(CONFIG).unwrap();
        assert_eq!(cfg.interfaces.len(), 2);
        assert_eq!(cfg.interfaces[0].backend, Backend::Mock);
        assert_eq!(cfg.interfaces[0].role, Role::Receiver);
        assert_eq!(cfg.processor.queue_capacity, 16);
        assert_eq!(cfg.processor.poll_timeout_ms, 100);
        assert!(cfg.processor.decode_choices);
        assert!(cfg.processor.id_fallback);
        assert_eq!(cfg.database_path(), PathBuf::from("db/signals.yaml"));
    }

    #[test]
    fn test_unknown_role_rejected() {
        let raw = "database: x.yaml\ninterfaces: [{ name: a, role: listener }]\n";
        assert!(matches!(
            EngineConfig::from_yaml_str(raw),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_resolves_database_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("db")).unwrap();
        fs::write(
            dir.path().join("db/signals.yaml"),
            "messages:\n  - { frame_id: \"0x100\", name: Aux, byte_length: 2 }\n",
        )
        .unwrap();
        let cfg_path = dir.path().join("engine.yaml");
        fs::write(&cfg_path, CONFIG).unwrap();

        let cfg = EngineConfig::load(&cfg_path).unwrap();
        assert_eq!(cfg.database_path(), dir.path().join("db/signals.yaml"));
        let db = cfg.load_database().unwrap();
        assert!(db.message_by_name("Aux").is_some());

        let by_dir = EngineConfig {
            database: PathBuf::from("db"),
            ..cfg
        };
        assert_eq!(by_dir.load_database().unwrap().len(), 1);
    }

    #[test]
    fn test_open_mock_interfaces() {
        let cfg = EngineConfig::from_yaml_str(CONFIG).unwrap();
        let opened = cfg.open_interfaces().unwrap();
        assert_eq!(opened.registry.len(), 2);
        assert_eq!(opened.mock_handles.len(), 2);
        assert!(opened.skipped.is_empty());
        assert_eq!(opened.registry.get("can1").unwrap().role(), Role::Both);
    }

    #[test]
    fn test_duplicate_interface_is_error() {
        let raw = "database: x.yaml\ninterfaces:\n  - { name: a, role: both }\n  - { name: a, role: sender }\n";
        let cfg = EngineConfig::from_yaml_str(raw).unwrap();
        assert!(matches!(
            cfg.open_interfaces(),
            Err(ConfigError::Registry(_))
        ));
    }

    #[cfg(not(feature = "slcan"))]
    #[test]
    fn test_slcan_needs_feature() {
        let raw = "database: x.yaml\ninterfaces: [{ name: a, backend: slcan, channel: /dev/ttyACM0, role: both }]\n";
        let cfg = EngineConfig::from_yaml_str(raw).unwrap();
        assert!(matches!(
            cfg.open_interfaces(),
            Err(ConfigError::Interface { .. })
        ));
    }

    #[cfg(feature = "slcan")]
    #[test]
    fn test_missing_serial_port_is_skipped() {
        let raw = "database: x.yaml\ninterfaces:\n  - { name: a, backend: slcan, channel: /dev/canvis-missing, role: both }\n  - { name: b, role: both }\n";
        let cfg = EngineConfig::from_yaml_str(raw).unwrap();
        let opened = cfg.open_interfaces().unwrap();
        assert_eq!(opened.registry.len(), 1);
        assert_eq!(opened.skipped.len(), 1);
        assert_eq!(opened.skipped[0].0, "a");
    }
}
