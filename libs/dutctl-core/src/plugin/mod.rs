//! The Module Plugin Registry: a process-global id-to-factory map that
//! module packages populate at static-init time via [`register_module!`],
//! using `inventory`-based module discovery.

use std::collections::HashMap;

use crate::contracts::Module;
use crate::error::CoreError;

/// A module plugin's constructor. Returns a fresh, ready-to-`init` instance.
pub type ModuleFactory = fn() -> Box<dyn Module>;

/// The value a module package submits to the process-wide inventory at
/// static-init time. Use [`register_module!`] rather than constructing this
/// directly.
pub struct Registrator(pub &'static str, pub ModuleFactory);

inventory::collect!(Registrator);

/// Registers a module plugin under `$id`, constructed by `$factory`.
///
/// ```ignore
/// dutctl_core::register_module!("gpio", || Box::new(GpioModule::default()));
/// ```
#[macro_export]
macro_rules! register_module {
    ($id:expr, $factory:expr) => {
        $crate::inventory::submit! {
            $crate::plugin::Registrator($id, $factory)
        }
    };
}

const RESERVED_IDS: &[&str] = &["help", "info"];

/// The id-to-factory map, built once at startup from every `Registrator`
/// submitted anywhere in the linked binary.
pub struct PluginRegistry {
    factories: HashMap<&'static str, ModuleFactory>,
}

impl PluginRegistry {
    /// Drains the process-wide inventory into a registry. Panics (a startup
    /// fatal error, per C2) on an empty id, a reserved id, or a duplicate.
    pub fn discover() -> Self {
        let mut factories = HashMap::new();
        for registrator in inventory::iter::<Registrator> {
            register_checked(&mut factories, registrator.0, registrator.1);
        }
        Self { factories }
    }

    /// Builds a registry from an explicit list, bypassing the process-wide
    /// inventory. Used by tests that don't want to depend on link-time
    /// registration.
    pub fn from_entries(entries: Vec<(&'static str, ModuleFactory)>) -> Self {
        let mut factories = HashMap::new();
        for (id, factory) in entries {
            register_checked(&mut factories, id, factory);
        }
        Self { factories }
    }

    /// Constructs a fresh instance of the module plugin registered under `id`.
    pub fn new(&self, id: &str) -> Result<Box<dyn Module>, CoreError> {
        self.factories.get(id).map(|f| f()).ok_or_else(|| CoreError::UnknownModule(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }
}

fn register_checked(factories: &mut HashMap<&'static str, ModuleFactory>, id: &'static str, factory: ModuleFactory) {
    if id.is_empty() {
        panic!("module plugin registration with an empty id");
    }
    if RESERVED_IDS.contains(&id) {
        panic!("module plugin id '{id}' is reserved");
    }
    if factories.insert(id, factory).is_some() {
        panic!("module plugin id '{id}' registered more than once");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoModule;

    #[test]
    fn from_entries_builds_a_working_registry() {
        let registry = PluginRegistry::from_entries(vec![("echo", || Box::new(EchoModule::default()))]);
        assert!(registry.contains("echo"));
        assert!(registry.new("echo").is_ok());
        assert!(matches!(registry.new("missing"), Err(CoreError::UnknownModule(id)) if id == "missing"));
    }

    #[test]
    #[should_panic(expected = "reserved")]
    fn reserved_id_is_fatal() {
        let _ = PluginRegistry::from_entries(vec![("help", || Box::new(EchoModule::default()))]);
    }

    #[test]
    #[should_panic(expected = "registered more than once")]
    fn duplicate_id_is_fatal() {
        let _ = PluginRegistry::from_entries(vec![
            ("echo", (|| Box::new(EchoModule::default())) as ModuleFactory),
            ("echo", || Box::new(EchoModule::default())),
        ]);
    }

    #[test]
    #[should_panic(expected = "empty id")]
    fn empty_id_is_fatal() {
        let _ = PluginRegistry::from_entries(vec![("", || Box::new(EchoModule::default()))]);
    }
}
