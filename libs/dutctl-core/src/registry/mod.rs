//! The Device/Command Registry (C1): the static map from device name to
//! command name to an ordered sequence of module bindings, plus the load
//! and lookup operations every other component goes through to reach it.

mod validate;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use validate::LoadError;

use crate::contracts::Module;
use crate::error::CoreError;

/// A named formal argument a command exposes to its non-forwarding modules'
/// `${name}` templates (C1, C7).
#[derive(Debug, Clone)]
pub struct ArgDecl {
    pub name: String,
    pub description: String,
}

/// One module's static configuration within a command (C1).
#[derive(Clone)]
pub struct ModuleConfig {
    pub module_id: String,
    /// When true, this module receives the forwarded surplus of the
    /// runtime argument vector instead of substituted static args.
    pub forward_args: bool,
    /// Static argument templates, each possibly containing `${name}`
    /// placeholders resolved against the command's `ArgDecl`s. Empty when
    /// `forward_args` is set.
    pub static_args: Vec<String>,
    /// Module-specific option bag, opaque to the core.
    pub options: serde_json::Value,
}

impl std::fmt::Debug for ModuleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleConfig")
            .field("module_id", &self.module_id)
            .field("forward_args", &self.forward_args)
            .field("static_args", &self.static_args)
            .finish()
    }
}

/// A module bound into a command's sequence: its static config plus the
/// shared instance that will run it.
#[derive(Clone)]
pub struct ModuleBinding {
    pub config: ModuleConfig,
    pub module: Arc<dyn Module>,
}

impl std::fmt::Debug for ModuleBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBinding").field("config", &self.config).finish()
    }
}

/// A single invocable command on a device (C1).
#[derive(Clone, Debug)]
pub struct Command {
    pub description: String,
    pub arg_decls: Vec<ArgDecl>,
    pub modules: Vec<ModuleBinding>,
}

/// A device under test and the commands it exposes (C1).
#[derive(Clone, Debug)]
pub struct Device {
    pub description: String,
    pub commands: BTreeMap<String, Command>,
}

/// The registry of all known devices and their commands.
///
/// Devices and commands are stored in `BTreeMap`s, so `names()`/`cmd_names()`
/// come back sorted ascending without any extra bookkeeping.
#[derive(Clone, Debug)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Device>,
}

impl DeviceRegistry {
    /// Builds a registry from already-parsed devices, running C1's load-time
    /// validation (non-empty names, >=1 module per command, <=1 forwarding
    /// module, every `${name}` template resolves to a declared argument).
    /// Collects every violation before failing, so a misconfigured registry
    /// reports everything wrong with it in one pass.
    pub fn build(devices: BTreeMap<String, Device>) -> Result<Self, LoadError> {
        validate::validate_registry(&devices)?;
        Ok(Self { devices })
    }

    /// Device names, sorted ascending.
    pub fn names(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    /// Command names for `device`, sorted ascending.
    pub fn cmd_names(&self, device: &str) -> Result<Vec<String>, CoreError> {
        let dev = self.devices.get(device).ok_or_else(|| CoreError::DeviceNotFound(device.to_string()))?;
        Ok(dev.commands.keys().cloned().collect())
    }

    /// Looks up and revalidates one command. Revalidation is cheap and
    /// keeps this the single source of truth for "is this command
    /// runnable", whether called from the FSM or the Lifecycle
    /// Orchestrator.
    pub fn find_cmd(&self, device: &str, command: &str) -> Result<Command, CoreError> {
        let dev = self.devices.get(device).ok_or_else(|| CoreError::DeviceNotFound(device.to_string()))?;
        let cmd = dev
            .commands
            .get(command)
            .ok_or_else(|| CoreError::CommandNotFound { device: device.to_string(), command: command.to_string() })?;
        if cmd.modules.is_empty() {
            return Err(CoreError::NoModules { device: device.to_string(), command: command.to_string() });
        }
        let forwarding = cmd.modules.iter().filter(|b| b.config.forward_args).count();
        if forwarding > 1 {
            return Err(CoreError::MultipleForwardArgsModules { device: device.to_string(), command: command.to_string() });
        }
        if let Some(bad) = cmd.modules.iter().find(|b| b.config.forward_args && !b.config.static_args.is_empty()) {
            return Err(CoreError::ForwardingModuleHasStaticArgs {
                device: device.to_string(),
                command: command.to_string(),
                module_id: bad.config.module_id.clone(),
            });
        }
        Ok(cmd.clone())
    }

    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::EchoModule;

    fn registry_with_one_command(forward: bool, modules: usize) -> DeviceRegistry {
        let mut commands = BTreeMap::new();
        let module_bindings = (0..modules)
            .map(|i| ModuleBinding {
                config: ModuleConfig {
                    module_id: format!("echo{i}"),
                    forward_args: forward && i == 0,
                    static_args: vec![],
                    options: serde_json::Value::Null,
                },
                module: Arc::new(EchoModule::default()),
            })
            .collect();
        commands.insert(
            "blink".to_string(),
            Command { description: "blinks an LED".into(), arg_decls: vec![], modules: module_bindings },
        );
        let mut devices = BTreeMap::new();
        devices.insert("board-a".to_string(), Device { description: "dev board".into(), commands });
        DeviceRegistry::build(devices).expect("valid registry")
    }

    #[test]
    fn names_and_cmd_names_are_sorted() {
        let mut devices = BTreeMap::new();
        for name in ["zeta", "alpha", "mu"] {
            devices.insert(
                name.to_string(),
                Device {
                    description: String::new(),
                    commands: BTreeMap::from([(
                        "noop".to_string(),
                        Command {
                            description: String::new(),
                            arg_decls: vec![],
                            modules: vec![ModuleBinding {
                                config: ModuleConfig {
                                    module_id: "echo".into(),
                                    forward_args: false,
                                    static_args: vec![],
                                    options: serde_json::Value::Null,
                                },
                                module: Arc::new(EchoModule::default()),
                            }],
                        },
                    )]),
                },
            );
        }
        let registry = DeviceRegistry::build(devices).unwrap();
        assert_eq!(registry.names(), vec!["alpha", "mu", "zeta"]);
        assert_eq!(registry.cmd_names("alpha").unwrap(), vec!["noop"]);
    }

    #[test]
    fn unknown_device_is_device_not_found() {
        let registry = registry_with_one_command(false, 1);
        let err = registry.cmd_names("nope").unwrap_err();
        assert!(matches!(err, CoreError::DeviceNotFound(d) if d == "nope"));
    }

    #[test]
    fn unknown_command_is_command_not_found() {
        let registry = registry_with_one_command(false, 1);
        let err = registry.find_cmd("board-a", "nope").unwrap_err();
        assert!(matches!(err, CoreError::CommandNotFound { .. }));
    }

    #[test]
    fn find_cmd_succeeds_with_one_forwarding_module() {
        let registry = registry_with_one_command(true, 2);
        assert!(registry.find_cmd("board-a", "blink").is_ok());
    }

    #[test]
    fn find_cmd_rejects_forwarding_module_with_static_args() {
        let mut commands = BTreeMap::new();
        commands.insert(
            "blink".to_string(),
            Command {
                description: String::new(),
                arg_decls: vec![],
                modules: vec![ModuleBinding {
                    config: ModuleConfig {
                        module_id: "echo".into(),
                        forward_args: true,
                        static_args: vec!["--verbose".into()],
                        options: serde_json::Value::Null,
                    },
                    module: Arc::new(EchoModule::default()),
                }],
            },
        );
        let mut devices = BTreeMap::new();
        devices.insert("board-a".to_string(), Device { description: String::new(), commands });

        // This shape can only arise if something bypassed `DeviceRegistry::build`
        // (whose own validation would already have rejected it), so the
        // registry is assembled directly here to exercise `find_cmd`'s own
        // re-check in isolation.
        let registry = DeviceRegistry { devices };
        let err = registry.find_cmd("board-a", "blink").unwrap_err();
        assert!(matches!(
            err,
            CoreError::ForwardingModuleHasStaticArgs { device, command, module_id }
                if device == "board-a" && command == "blink" && module_id == "echo"
        ));
    }
}
