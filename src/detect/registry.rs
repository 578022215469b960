use std::collections::BTreeMap;

use anyhow::{anyhow, Result};

use super::backend::EdgeBackend;
use super::backends::{CannyBackend, SobelBackend};
use super::params::DetectorParams;

/// Named edge backends, one of which is the default.
///
/// The processing lane takes exclusive ownership of the selected backend, so the
/// registry hands out boxes rather than shared handles.
pub struct BackendRegistry {
    backends: BTreeMap<String, Box<dyn EdgeBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Registry with every built-in backend configured from `params`.
    /// `sobel` is the default.
    pub fn with_builtin(params: DetectorParams) -> Self {
        let mut registry = Self::new();
        registry.register(SobelBackend::new(params));
        registry.register(CannyBackend::new(params));
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: EdgeBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Box::new(backend));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// List registered backends, sorted by name.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Remove and return a backend by name.
    pub fn take(&mut self, name: &str) -> Result<Box<dyn EdgeBackend>> {
        let backend = self
            .backends
            .remove(name)
            .ok_or_else(|| anyhow!("backend '{}' not registered", name))?;
        if self.default_name.as_deref() == Some(name) {
            self.default_name = None;
        }
        Ok(backend)
    }

    /// Remove and return the default backend.
    pub fn take_default(&mut self) -> Result<Box<dyn EdgeBackend>> {
        let name = self
            .default_name
            .clone()
            .ok_or_else(|| anyhow!("no default backend registered"))?;
        self.take(&name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
