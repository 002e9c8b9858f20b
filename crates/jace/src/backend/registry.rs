//! Runtime backend registry.
//!
//! Backends are registered by name with a constructor, either explicitly through
//! [`register_backend`] or by adding a registrar function to [`BACKEND_REGISTRARS`], which
//! every lookup runs once before consulting the table.

use std::collections::HashMap;
use std::sync::{Arc, Once, OnceLock, RwLock};

use super::{BackendError, BackendResult, SdfgBackend};

/// Factory for a backend instance.
pub type BackendConstructor = Box<dyn Fn() -> Arc<dyn SdfgBackend> + Send + Sync>;

/// Registrar functions contributed by backend crates at link time.
#[linkme::distributed_slice]
pub static BACKEND_REGISTRARS: [fn()] = [..];

struct BackendRegistry {
    backends: RwLock<HashMap<String, BackendConstructor>>,
}

impl BackendRegistry {
    fn new() -> Self {
        Self {
            backends: RwLock::new(HashMap::new()),
        }
    }

    fn register(&self, name: String, constructor: BackendConstructor) {
        self.backends
            .write()
            .expect("backend registry poisoned")
            .insert(name, constructor);
    }

    fn create(&self, name: &str) -> Option<Arc<dyn SdfgBackend>> {
        let registry = self.backends.read().expect("backend registry poisoned");
        let constructor = registry.get(name)?;
        Some(constructor())
    }

    fn list_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .backends
            .read()
            .expect("backend registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

static GLOBAL_REGISTRY: OnceLock<BackendRegistry> = OnceLock::new();
static RUN_REGISTRARS: Once = Once::new();

fn global_registry() -> &'static BackendRegistry {
    let registry = GLOBAL_REGISTRY.get_or_init(BackendRegistry::new);
    RUN_REGISTRARS.call_once(|| {
        for registrar in BACKEND_REGISTRARS {
            registrar();
        }
    });
    registry
}

/// Registers `constructor` under `name`, replacing an earlier registration.
pub fn register_backend<F>(name: impl Into<String>, constructor: F)
where
    F: Fn() -> Arc<dyn SdfgBackend> + Send + Sync + 'static,
{
    let name = name.into();
    log::debug!("registering backend '{name}'");
    GLOBAL_REGISTRY
        .get_or_init(BackendRegistry::new)
        .register(name, Box::new(constructor));
}

/// A fresh instance of the backend registered as `name`.
pub fn create_backend(name: &str) -> BackendResult<Arc<dyn SdfgBackend>> {
    let registry = global_registry();
    registry
        .create(name)
        .ok_or_else(|| BackendError::UnknownBackend {
            name: name.to_string(),
            available: registry.list_backends(),
        })
}

/// Registered backend names, sorted.
pub fn list_backends() -> Vec<String> {
    global_registry().list_backends()
}

pub fn has_backend(name: &str) -> bool {
    global_registry()
        .backends
        .read()
        .expect("backend registry poisoned")
        .contains_key(name)
}
