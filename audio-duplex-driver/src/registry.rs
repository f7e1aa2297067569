//! Process-wide backend registry.
//!
//! One-time backend setup shared by all device instances: a
//! lazily-initialized, thread-safe singleton mapping backend names to
//! [`SoundBackend`] instances. Exposed as an internal dependency only;
//! nothing here is public mutable global state beyond registration.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use audio_duplex_core::{DeviceConfig, DeviceError, DeviceType};

use crate::backend::SoundBackend;
use crate::device::DuplexDevice;

static GLOBAL: OnceLock<BackendRegistry> = OnceLock::new();

/// Registry of available sound backends.
pub struct BackendRegistry {
    backends: RwLock<Vec<Arc<dyn SoundBackend>>>,
}

impl BackendRegistry {
    /// Fresh, empty registry. Tests use private registries; production
    /// code goes through [`BackendRegistry::global`].
    pub fn new() -> Self {
        Self {
            backends: RwLock::new(Vec::new()),
        }
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static BackendRegistry {
        GLOBAL.get_or_init(BackendRegistry::new)
    }

    /// Register a backend, replacing a previous one of the same name.
    pub fn register(&self, backend: Arc<dyn SoundBackend>) {
        let mut backends = self.backends.write();
        if let Some(slot) = backends.iter_mut().find(|b| b.name() == backend.name()) {
            log::warn!("backend registry: replacing backend {}", backend.name());
            *slot = backend;
        } else {
            log::debug!("backend registry: registered backend {}", backend.name());
            backends.push(backend);
        }
    }

    /// Find a backend by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn SoundBackend>> {
        self.backends
            .read()
            .iter()
            .find(|b| b.name() == name)
            .map(Arc::clone)
    }

    /// The first registered backend, the default.
    pub fn default_backend(&self) -> Option<Arc<dyn SoundBackend>> {
        self.backends.read().first().map(Arc::clone)
    }

    /// Construct and open a device against a registered backend
    /// (`None` = the default backend / default device).
    pub fn open_device(
        &self,
        backend_name: Option<&str>,
        device_type: DeviceType,
        config: DeviceConfig,
        device: Option<&str>,
    ) -> Result<DuplexDevice, DeviceError> {
        let backend = match backend_name {
            Some(name) => self.lookup(name),
            None => self.default_backend(),
        }
        .ok_or_else(|| {
            DeviceError::BadConfig(format!(
                "no such backend: {}",
                backend_name.unwrap_or("(default)")
            ))
        })?;

        let mut device_obj = DuplexDevice::new(backend, config, device_type)?;
        device_obj.open(device)?;
        Ok(device_obj)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
