use anyhow::{anyhow, Result};
use std::collections::HashMap;
use super::drivers::CpalBackend;
use super::handle::BoxedDriver;
use super::mock::SimulatedBackend;
use super::realtime::ProcessCallback;
use super::sound::Sound;

/// Backend used when nothing else is configured
pub const DEFAULT_BACKEND: &str = "cpal";

type DriverFactory = Box<dyn Fn(ProcessCallback) -> Result<BoxedDriver> + Send + Sync>;

/// Registry of available sound backends
pub struct BackendRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the cpal and simulated backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_BACKEND, |callback| {
            Ok(Box::new(Sound::new(CpalBackend::new(), callback)) as BoxedDriver)
        });
        registry.register("simulated", |callback| {
            Ok(Box::new(Sound::new(SimulatedBackend::with_default_host(), callback)) as BoxedDriver)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(ProcessCallback) -> Result<BoxedDriver> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    /// Build a driver that hands audio blocks to `callback`
    pub fn create(&self, name: &str, callback: ProcessCallback) -> Result<BoxedDriver> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown sound backend: {}", name))?;
        factory(callback)
    }

    /// Registered backend names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}
