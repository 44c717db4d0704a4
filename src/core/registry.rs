//! Registry resolving device-type names to decoder factories.

use crate::core::protocol::{VoltcraftMe32, VoltcraftVc840};
use crate::core::source::DataSource;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Registry lookup error types
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No registered decoder claims the requested device type.
    #[error("unknown device type: {0}")]
    UnknownDevice(String),
}

type SourceFactory = Box<dyn Fn() -> Arc<dyn DataSource> + Send + Sync>;

/// Maps device-type names to decoder factories.
///
/// Built once at startup and passed by reference wherever a device
/// name must be resolved. Each lookup produces a fresh decoder
/// instance, since a source runs at most once.
#[derive(Default)]
pub struct SourceRegistry {
    factories: Vec<SourceFactory>,
    by_name: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in meter decoder registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(|| Arc::new(VoltcraftMe32::new()));
        registry.register(|| Arc::new(VoltcraftVc840::new()));
        registry
    }

    /// Register a decoder factory under every device-type name a
    /// freshly built instance reports.
    pub fn register<F>(&mut self, factory: F)
    where
        F: Fn() -> Arc<dyn DataSource> + Send + Sync + 'static,
    {
        let factory: SourceFactory = Box::new(factory);
        let names: Vec<String> = factory()
            .supported_devices()
            .iter()
            .map(|name| (*name).to_string())
            .collect();
        let index = self.factories.len();
        self.factories.push(factory);
        for name in names {
            self.by_name.insert(name, index);
        }
    }

    /// Fresh decoder for the given device-type name.
    pub fn create(&self, device_type: &str) -> Result<Arc<dyn DataSource>, RegistryError> {
        let index = self
            .by_name
            .get(device_type)
            .ok_or_else(|| RegistryError::UnknownDevice(device_type.to_string()))?;
        Ok(self.factories[*index]())
    }

    /// Registered device-type names, sorted for stable listings.
    pub fn device_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered device-type names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
