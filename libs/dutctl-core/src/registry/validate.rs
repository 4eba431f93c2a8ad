//! Load-time validation for the Device Registry (C1): every command must
//! have at least one module, at most one forwarding module, a forwarding
//! module must not carry static args, and every `${name}` placeholder in a
//! non-forwarding module's static args must name a declared argument.

use std::collections::BTreeMap;

use super::Device;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("empty device name")]
    EmptyDeviceName,

    #[error("device '{device}': empty command name")]
    EmptyCommandName { device: String },

    #[error("device '{device}' command '{command}': has no modules")]
    NoModules { device: String, command: String },

    #[error("device '{device}' command '{command}': has more than one forwarding module")]
    MultipleForwardArgsModules { device: String, command: String },

    #[error("device '{device}' command '{command}' module '{module_id}': a forwarding module must not declare static args")]
    ForwardingModuleHasStaticArgs { device: String, command: String, module_id: String },

    #[error(
        "device '{device}' command '{command}' module '{module_id}': template references \
         undeclared argument '${{{placeholder}}}'"
    )]
    UndeclaredPlaceholder { device: String, command: String, module_id: String, placeholder: String },

    #[error("{}", format_multiple(.0))]
    Multiple(Vec<LoadError>),
}

fn format_multiple(errors: &[LoadError]) -> String {
    let lines: Vec<String> = errors.iter().map(|e| format!("  - {e}")).collect();
    format!("{} configuration error(s):\n{}", errors.len(), lines.join("\n"))
}

pub(super) fn validate_registry(devices: &BTreeMap<String, Device>) -> Result<(), LoadError> {
    let mut errors = Vec::new();

    for (device_name, device) in devices {
        if device_name.is_empty() {
            errors.push(LoadError::EmptyDeviceName);
        }
        for (command_name, command) in &device.commands {
            if command_name.is_empty() {
                errors.push(LoadError::EmptyCommandName { device: device_name.clone() });
                continue;
            }
            if command.modules.is_empty() {
                errors.push(LoadError::NoModules { device: device_name.clone(), command: command_name.clone() });
                continue;
            }
            let forwarding = command.modules.iter().filter(|b| b.config.forward_args).count();
            if forwarding > 1 {
                errors.push(LoadError::MultipleForwardArgsModules {
                    device: device_name.clone(),
                    command: command_name.clone(),
                });
            }
            let declared: std::collections::HashSet<&str> = command.arg_decls.iter().map(|d| d.name.as_str()).collect();
            for binding in &command.modules {
                if binding.config.forward_args {
                    if !binding.config.static_args.is_empty() {
                        errors.push(LoadError::ForwardingModuleHasStaticArgs {
                            device: device_name.clone(),
                            command: command_name.clone(),
                            module_id: binding.config.module_id.clone(),
                        });
                    }
                    continue;
                }
                for template in &binding.config.static_args {
                    for placeholder in extract_placeholders(template) {
                        if !declared.contains(placeholder.as_str()) {
                            errors.push(LoadError::UndeclaredPlaceholder {
                                device: device_name.clone(),
                                command: command_name.clone(),
                                module_id: binding.config.module_id.clone(),
                                placeholder,
                            });
                        }
                    }
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else if errors.len() == 1 {
        Err(errors.into_iter().next().unwrap())
    } else {
        Err(LoadError::Multiple(errors))
    }
}

/// Extracts the names inside `${...}` placeholders from `template`, in
/// order of appearance.
fn extract_placeholders(template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        if let Some(end) = after.find('}') {
            out.push(after[..end].to_string());
            rest = &after[end + 1..];
        } else {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::{Command, ModuleBinding, ModuleConfig};
    use crate::test_support::EchoModule;

    #[test]
    fn extract_placeholders_finds_all_names() {
        assert_eq!(
            extract_placeholders("--port=${port} --baud=${baud}"),
            vec!["port".to_string(), "baud".to_string()]
        );
        assert_eq!(extract_placeholders("no placeholders here"), Vec::<String>::new());
    }

    #[test]
    fn forwarding_module_with_static_args_is_rejected() {
        let binding = ModuleBinding {
            config: ModuleConfig {
                module_id: "echo".into(),
                forward_args: true,
                static_args: vec!["--verbose".into()],
                options: serde_json::Value::Null,
            },
            module: Arc::new(EchoModule::default()),
        };
        let command = Command { description: String::new(), arg_decls: vec![], modules: vec![binding] };
        let mut commands = BTreeMap::new();
        commands.insert("blink".to_string(), command);
        let mut devices = BTreeMap::new();
        devices.insert("board-a".to_string(), Device { description: String::new(), commands });

        let err = validate_registry(&devices).unwrap_err();
        assert!(matches!(
            err,
            LoadError::ForwardingModuleHasStaticArgs { device, command, module_id }
                if device == "board-a" && command == "blink" && module_id == "echo"
        ));
    }
}
