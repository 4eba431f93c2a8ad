//! Walks the Device Registry in deterministic order and
//! initialises/deinitialises every module instance exactly once, even
//! though the same instance may be bound into more than one command.
//!
//! Modeled on a host runtime's phase sequencing (`wire_system -> db ->
//! init -> rest -> grpc -> start -> wait -> stop`), reduced to the two
//! phases this agent needs: `init_all` and `deinit_all`.

use std::sync::Arc;

use crate::contracts::Module;
use crate::error::ModuleInitFailure;
use crate::registry::DeviceRegistry;

/// One `(device, command, module_id)` location paired with the shared
/// module instance bound there, in registry walk order.
struct Location {
    device: String,
    command: String,
    module_id: String,
    module: Arc<dyn Module>,
}

fn identity(module: &Arc<dyn Module>) -> usize {
    Arc::as_ptr(module) as *const () as usize
}

/// Walks `registry` in `(device, command, module)` order and returns the
/// first `(device, command, module_id)` location at which each distinct
/// module instance appears. Two bindings sharing the same `Arc<dyn Module>`
/// collapse to a single entry, keyed by whichever binding was encountered
/// first.
fn unique_locations(registry: &DeviceRegistry) -> Vec<Location> {
    let mut seen = std::collections::HashSet::new();
    let mut locations = Vec::new();
    for (device_name, device) in registry.devices() {
        for (command_name, command) in &device.commands {
            for binding in &command.modules {
                if seen.insert(identity(&binding.module)) {
                    locations.push(Location {
                        device: device_name.clone(),
                        command: command_name.clone(),
                        module_id: binding.config.module_id.clone(),
                        module: binding.module.clone(),
                    });
                }
            }
        }
    }
    locations
}

/// Runs `Init()` on every distinct module instance in the registry, in
/// deterministic `(device, command, module)` order. Every module is
/// attempted regardless of earlier failures, so a single pass produces
/// complete diagnostics; the caller decides whether a non-empty failure
/// list should abort startup (normal boot) or simply be reported
/// (`--check-config`).
pub async fn init_all(registry: &DeviceRegistry) -> Vec<ModuleInitFailure> {
    let mut failures = Vec::new();
    for loc in unique_locations(registry) {
        if let Err(e) = loc.module.init().await {
            tracing::error!(
                device = %loc.device,
                command = %loc.command,
                module = %loc.module_id,
                error = %e,
                "module Init failed"
            );
            failures.push(ModuleInitFailure {
                device: loc.device,
                command: loc.command,
                module_id: loc.module_id,
                error: e.to_string(),
            });
        }
    }
    failures
}

/// Runs `Deinit()` on every distinct module instance, in the reverse of the
/// order `init_all` would visit them. Called on every module regardless of
/// whether its `Init` succeeded, so a module that partially initialised
/// still gets a chance to release what it acquired. Returns one error
/// message per module whose `Deinit` failed.
pub async fn deinit_all(registry: &DeviceRegistry) -> Vec<ModuleInitFailure> {
    let mut failures = Vec::new();
    for loc in unique_locations(registry).into_iter().rev() {
        if let Err(e) = loc.module.deinit().await {
            tracing::error!(
                device = %loc.device,
                command = %loc.command,
                module = %loc.module_id,
                error = %e,
                "module Deinit failed"
            );
            failures.push(ModuleInitFailure {
                device: loc.device,
                command: loc.command,
                module_id: loc.module_id,
                error: e.to_string(),
            });
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::registry::{Command, Device, ModuleBinding, ModuleConfig};
    use crate::test_support::{EchoModule, FailingInitModule};

    fn binding(module_id: &str, module: Arc<dyn Module>) -> ModuleBinding {
        ModuleBinding {
            config: ModuleConfig {
                module_id: module_id.to_string(),
                forward_args: false,
                static_args: vec![],
                options: serde_json::Value::Null,
            },
            module,
        }
    }

    #[tokio::test]
    async fn shared_instance_is_initialised_exactly_once() {
        struct CountingModule {
            inits: Arc<AtomicUsize>,
        }

        #[async_trait::async_trait]
        impl Module for CountingModule {
            fn help(&self) -> String {
                String::new()
            }
            async fn init(&self) -> anyhow::Result<()> {
                self.inits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn deinit(&self) -> anyhow::Result<()> {
                Ok(())
            }
            async fn run(&self, _ctx: crate::contracts::RunCtx, _s: Arc<dyn crate::session::Session>, _a: Vec<String>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let inits = Arc::new(AtomicUsize::new(0));
        let shared: Arc<dyn Module> = Arc::new(CountingModule { inits: inits.clone() });
        let mut commands = BTreeMap::new();
        commands.insert(
            "cmdA".to_string(),
            Command { description: String::new(), arg_decls: vec![], modules: vec![binding("gpio", shared.clone())] },
        );
        commands.insert(
            "cmdB".to_string(),
            Command { description: String::new(), arg_decls: vec![], modules: vec![binding("gpio", shared.clone())] },
        );
        let mut devices = BTreeMap::new();
        devices.insert("board".to_string(), Device { description: String::new(), commands });
        let registry = DeviceRegistry::build(devices).unwrap();

        let failures = init_all(&registry).await;
        assert!(failures.is_empty());
        assert_eq!(unique_locations(&registry).len(), 1);
        assert_eq!(inits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn init_failure_is_collected_with_location() {
        let mut commands = BTreeMap::new();
        commands.insert(
            "blink".to_string(),
            Command {
                description: String::new(),
                arg_decls: vec![],
                modules: vec![
                    binding("ok", Arc::new(EchoModule::default())),
                    binding("broken", Arc::new(FailingInitModule { message: "pin busy".into() })),
                ],
            },
        );
        let mut devices = BTreeMap::new();
        devices.insert("board".to_string(), Device { description: String::new(), commands });
        let registry = DeviceRegistry::build(devices).unwrap();

        let failures = init_all(&registry).await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].device, "board");
        assert_eq!(failures[0].command, "blink");
        assert_eq!(failures[0].module_id, "broken");
        assert_eq!(failures[0].error, "pin busy");
    }

    #[tokio::test]
    async fn deinit_runs_even_for_modules_that_failed_init() {
        let module = Arc::new(FailingInitModule { message: "boom".into() });
        let mut commands = BTreeMap::new();
        commands.insert(
            "blink".to_string(),
            Command { description: String::new(), arg_decls: vec![], modules: vec![binding("broken", module)] },
        );
        let mut devices = BTreeMap::new();
        devices.insert("board".to_string(), Device { description: String::new(), commands });
        let registry = DeviceRegistry::build(devices).unwrap();

        let init_failures = init_all(&registry).await;
        assert_eq!(init_failures.len(), 1);
        let deinit_failures = deinit_all(&registry).await;
        assert!(deinit_failures.is_empty(), "FailingInitModule's deinit always succeeds");
    }
}
