//! Parses the agent's YAML device-list document into a [`DeviceRegistry`].
//!
//! Owns the wire shape of the config file, resolves each `uses:` entry
//! against the [`PluginRegistry`], and hands the resulting structure to
//! `DeviceRegistry::build` for its load-time validation.
//!
//! Modeled on `AppConfig::load_layered` (figment: defaults -> YAML -> env),
//! trimmed to the one layer this config actually needs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use dutctl_core::error::CoreError;
use dutctl_core::plugin::PluginRegistry;
use dutctl_core::registry::{ArgDecl, Command, Device, DeviceRegistry, LoadError, ModuleBinding, ModuleConfig};
use serde::Deserialize;

/// The single config-file schema version this loader understands.
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io { path: String, source: std::io::Error },

    #[error("failed to parse config file '{path}': {source}")]
    Parse { path: String, source: Box<figment::Error> },

    #[error("unsupported config version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("device '{device}' command '{command}' uses[{index}]: {source}")]
    UnknownModule { device: String, command: String, index: usize, source: CoreError },

    #[error("device registry validation failed: {0}")]
    Validation(#[from] LoadError),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    version: u32,
    #[serde(default)]
    devices: BTreeMap<String, DeviceSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DeviceSpec {
    #[serde(default)]
    desc: String,
    #[serde(default)]
    cmds: BTreeMap<String, CommandSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandSpec {
    #[serde(default)]
    desc: String,
    #[serde(default)]
    args: Vec<ArgDeclSpec>,
    #[serde(default)]
    uses: Vec<ModuleUseSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgDeclSpec {
    name: String,
    #[serde(default)]
    desc: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModuleUseSpec {
    module: String,
    #[serde(default)]
    #[serde(rename = "forwardArgs")]
    forward_args: bool,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    with: serde_json::Value,
}

/// Loads and validates the YAML document at `path` into a [`DeviceRegistry`],
/// resolving every `uses[].module` against `plugins`.
///
/// Module instances are cached by `(module_id, options)`: two `uses` entries
/// that name the same module with identical `with:` option bags share the
/// same instance, since the wire config carries no other notion of
/// instance identity.
pub fn load_registry(path: impl AsRef<Path>, plugins: &PluginRegistry) -> Result<DeviceRegistry, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    load_registry_from_str(&raw, path.display().to_string(), plugins)
}

fn load_registry_from_str(raw: &str, display_path: String, plugins: &PluginRegistry) -> Result<DeviceRegistry, ConfigError> {
    use figment::providers::{Format, Yaml};
    use figment::Figment;

    let file: ConfigFile = Figment::new()
        .merge(Yaml::string(raw))
        .extract()
        .map_err(|source| ConfigError::Parse { path: display_path, source: Box::new(source) })?;

    if file.version != SUPPORTED_VERSION {
        return Err(ConfigError::UnsupportedVersion { found: file.version, expected: SUPPORTED_VERSION });
    }

    let mut instances: HashMap<(String, String), Arc<dyn dutctl_core::contracts::Module>> = HashMap::new();
    let mut devices = BTreeMap::new();

    for (device_name, device_spec) in file.devices {
        let mut commands = BTreeMap::new();
        for (command_name, command_spec) in device_spec.cmds {
            let arg_decls: Vec<ArgDecl> =
                command_spec.args.into_iter().map(|a| ArgDecl { name: a.name, description: a.desc }).collect();

            let mut modules = Vec::with_capacity(command_spec.uses.len());
            for (index, use_spec) in command_spec.uses.into_iter().enumerate() {
                let options_key = canonical_json_key(&use_spec.with);
                let cache_key = (use_spec.module.clone(), options_key);
                let module = match instances.get(&cache_key) {
                    Some(existing) => existing.clone(),
                    None => {
                        let fresh: Arc<dyn dutctl_core::contracts::Module> = plugins.new(&use_spec.module).map_err(|source| {
                            ConfigError::UnknownModule {
                                device: device_name.clone(),
                                command: command_name.clone(),
                                index,
                                source,
                            }
                        })?.into();
                        instances.insert(cache_key, fresh.clone());
                        fresh
                    }
                };
                modules.push(ModuleBinding {
                    config: ModuleConfig {
                        module_id: use_spec.module,
                        forward_args: use_spec.forward_args,
                        static_args: use_spec.args,
                        options: use_spec.with,
                    },
                    module,
                });
            }

            commands.insert(command_name, Command { description: command_spec.desc, arg_decls, modules });
        }
        devices.insert(device_name, Device { description: device_spec.desc, commands });
    }

    DeviceRegistry::build(devices).map_err(ConfigError::from)
}

/// A stable string key for deduplicating option bags. `serde_json::Value`
/// doesn't implement `Hash`, and object key order in the source YAML isn't
/// significant, so compare by canonical (sorted-key) JSON text instead.
fn canonical_json_key(value: &serde_json::Value) -> String {
    fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut sorted: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                for (k, v) in map {
                    sorted.insert(k.clone(), canonicalize(v));
                }
                serde_json::to_value(sorted).expect("BTreeMap<String, Value> always serializes")
            }
            serde_json::Value::Array(items) => serde_json::Value::Array(items.iter().map(canonicalize).collect()),
            other => other.clone(),
        }
    }
    canonicalize(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dutctl_core::test_support::EchoModule;

    fn plugins() -> PluginRegistry {
        PluginRegistry::from_entries(vec![("echo", || Box::new(EchoModule::default()))])
    }

    #[test]
    fn loads_a_minimal_valid_document() {
        let yaml = r#"
version: 1
devices:
  board-a:
    desc: "a dev board"
    cmds:
      blink:
        desc: "blink the LED"
        uses:
          - module: echo
            forwardArgs: true
"#;
        let registry = load_registry_from_str(yaml, "test.yaml".into(), &plugins()).expect("valid config");
        assert_eq!(registry.names(), vec!["board-a"]);
        assert_eq!(registry.cmd_names("board-a").unwrap(), vec!["blink"]);
    }

    #[test]
    fn load_registry_reads_and_parses_a_real_file() {
        let yaml = r#"
version: 1
devices:
  board-a:
    cmds:
      blink:
        uses:
          - module: echo
            forwardArgs: true
"#;
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().expect("create temp config file");
        std::io::Write::write_all(&mut file, yaml.as_bytes()).expect("write temp config file");

        let registry = load_registry(file.path(), &plugins()).expect("valid config file");
        assert_eq!(registry.names(), vec!["board-a"]);
    }

    #[test]
    fn load_registry_reports_io_error_for_a_missing_path() {
        let err = load_registry("/nonexistent/dutctl-agent-config.yaml", &plugins()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn rejects_unsupported_version() {
        let yaml = "version: 2\ndevices: {}\n";
        let err = load_registry_from_str(yaml, "test.yaml".into(), &plugins()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedVersion { found: 2, expected: 1 }));
    }

    #[test]
    fn rejects_unknown_module_id() {
        let yaml = r#"
version: 1
devices:
  board-a:
    cmds:
      blink:
        uses:
          - module: does-not-exist
"#;
        let err = load_registry_from_str(yaml, "test.yaml".into(), &plugins()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownModule { .. }));
    }

    #[test]
    fn rejects_command_with_no_modules() {
        let yaml = r#"
version: 1
devices:
  board-a:
    cmds:
      blink:
        uses: []
"#;
        let err = load_registry_from_str(yaml, "test.yaml".into(), &plugins()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(LoadError::NoModules { .. })));
    }

    #[test]
    fn shares_one_instance_across_identical_module_uses() {
        let yaml = r#"
version: 1
devices:
  board-a:
    cmds:
      a:
        uses:
          - module: echo
            forwardArgs: true
      b:
        uses:
          - module: echo
            forwardArgs: true
"#;
        let registry = load_registry_from_str(yaml, "test.yaml".into(), &plugins()).expect("valid config");
        let cmd_a = registry.find_cmd("board-a", "a").unwrap();
        let cmd_b = registry.find_cmd("board-a", "b").unwrap();
        assert!(std::sync::Arc::ptr_eq(&cmd_a.modules[0].module, &cmd_b.modules[0].module));
    }
}
