//! Explicit handles to the active driver.
//!
//! One driver is active per process. Instead of a static instance pointer the
//! application owns a [`SoundSlot`] and passes it (or a [`SoundHandle`] /
//! [`PropertiesView`] taken from it) to the components that need it.

use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use super::traits::SoundDriver;
use super::types::SoundProperties;

/// Writer side of the negotiated properties, held by the driver
#[derive(Clone)]
pub struct SharedProperties {
    inner: Arc<RwLock<SoundProperties>>,
}

impl SharedProperties {
    pub fn new(initial: SoundProperties) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn publish(&self, properties: SoundProperties) {
        *self.inner.write() = properties;
    }

    pub fn snapshot(&self) -> SoundProperties {
        self.inner.read().clone()
    }

    pub fn view(&self) -> PropertiesView {
        PropertiesView {
            inner: self.inner.clone(),
        }
    }
}

/// Read-only view of the negotiated properties
#[derive(Clone)]
pub struct PropertiesView {
    inner: Arc<RwLock<SoundProperties>>,
}

impl PropertiesView {
    pub fn snapshot(&self) -> SoundProperties {
        self.inner.read().clone()
    }

    pub fn buffer_size(&self) -> u32 {
        self.inner.read().buffer_size
    }
}

pub type BoxedDriver = Box<dyn SoundDriver + Send>;

/// Shared ownership of the one driver instance
#[derive(Clone)]
pub struct SoundHandle {
    driver: Arc<Mutex<BoxedDriver>>,
    properties: PropertiesView,
}

impl SoundHandle {
    pub fn new(driver: BoxedDriver) -> Self {
        let properties = driver.properties_view();
        Self {
            driver: Arc::new(Mutex::new(driver)),
            properties,
        }
    }

    /// Run `f` with exclusive access to the driver
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn SoundDriver) -> R) -> R {
        let mut driver = self.driver.lock();
        f(driver.as_mut())
    }

    pub fn properties(&self) -> SoundProperties {
        self.properties.snapshot()
    }

    pub fn view(&self) -> PropertiesView {
        self.properties.clone()
    }
}

/// Holder of the currently active driver, if any
#[derive(Default)]
pub struct SoundSlot {
    active: RwLock<Option<SoundHandle>>,
}

impl SoundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `driver` the active one, returning the handle of the one it replaces
    pub fn install(&self, driver: BoxedDriver) -> (SoundHandle, Option<SoundHandle>) {
        let handle = SoundHandle::new(driver);
        let previous = self.active.write().replace(handle.clone());
        (handle, previous)
    }

    pub fn clear(&self) -> Option<SoundHandle> {
        self.active.write().take()
    }

    pub fn active(&self) -> Option<SoundHandle> {
        self.active.read().clone()
    }

    /// Negotiated properties of the active driver
    pub fn properties(&self) -> Option<SoundProperties> {
        self.active.read().as_ref().map(|handle| handle.properties())
    }
}
