//! The Argument Router (C7): splits a command's runtime argument vector `V`
//! between its declared `ArgDecl`s and its single forwarding module,
//! substituting `${name}` templates for everything else.

use crate::registry::{ArgDecl, Command};

/// Routes `runtime_args` to each module binding in `cmd.modules`, in order.
///
/// Given `K = cmd.arg_decls.len()`, the first `min(K, len(runtime_args))`
/// entries are the named arguments substituted into every non-forwarding
/// module's static-arg templates; anything beyond position `K` is forwarded
/// verbatim to the single forwarding module, if any. If `runtime_args` is
/// shorter than `K`, the undeclared trailing positions substitute the empty
/// string rather than erroring — `find_cmd` has already guaranteed the
/// command is well-formed by the time routing runs.
pub fn route_arguments(cmd: &Command, runtime_args: &[String]) -> Vec<Vec<String>> {
    let k = cmd.arg_decls.len();
    let named_len = std::cmp::min(k, runtime_args.len());
    let named = &runtime_args[..named_len];
    let forwarded: Vec<String> = if runtime_args.len() > k { runtime_args[k..].to_vec() } else { Vec::new() };

    cmd.modules
        .iter()
        .map(|binding| {
            if binding.config.forward_args {
                forwarded.clone()
            } else {
                binding.config.static_args.iter().map(|t| substitute(t, &cmd.arg_decls, named)).collect()
            }
        })
        .collect()
}

fn substitute(template: &str, decls: &[ArgDecl], named: &[String]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if let Some(idx) = decls.iter().position(|d| d.name == name) {
                    result.push_str(named.get(idx).map(String::as_str).unwrap_or(""));
                } else {
                    // Load-time validation already rejects templates naming
                    // an undeclared argument; an unknown name here would
                    // mean that guarantee was bypassed. Leave it verbatim
                    // rather than panic.
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    result.push_str(rest);
    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::registry::{ModuleBinding, ModuleConfig};
    use crate::test_support::EchoModule;

    fn binding(forward: bool, static_args: Vec<&str>) -> ModuleBinding {
        ModuleBinding {
            config: ModuleConfig {
                module_id: "m".into(),
                forward_args: forward,
                static_args: static_args.into_iter().map(String::from).collect(),
                options: serde_json::Value::Null,
            },
            module: Arc::new(EchoModule::default()),
        }
    }

    fn decl(name: &str) -> ArgDecl {
        ArgDecl { name: name.to_string(), description: String::new() }
    }

    #[test]
    fn substitutes_named_args_across_modules() {
        let cmd = Command {
            description: String::new(),
            arg_decls: vec![decl("port"), decl("baud")],
            modules: vec![binding(false, vec!["--port=${port}"]), binding(false, vec!["--baud=${baud}", "verbose"])],
        };
        let routed = route_arguments(&cmd, &["/dev/ttyUSB0".to_string(), "115200".to_string()]);
        assert_eq!(routed[0], vec!["--port=/dev/ttyUSB0"]);
        assert_eq!(routed[1], vec!["--baud=115200", "verbose"]);
    }

    #[test]
    fn forwards_surplus_to_the_forwarding_module() {
        let cmd = Command {
            description: String::new(),
            arg_decls: vec![decl("target")],
            modules: vec![binding(false, vec!["${target}"]), binding(true, vec![])],
        };
        let runtime_args = vec!["board-a".to_string(), "--reset".to_string(), "--verbose".to_string()];
        let routed = route_arguments(&cmd, &runtime_args);
        assert_eq!(routed[0], vec!["board-a"]);
        assert_eq!(routed[1], vec!["--reset", "--verbose"]);
    }

    #[test]
    fn short_runtime_args_substitute_empty_string() {
        let cmd = Command {
            description: String::new(),
            arg_decls: vec![decl("a"), decl("b")],
            modules: vec![binding(false, vec!["[${a}][${b}]"])],
        };
        let routed = route_arguments(&cmd, &["only-a".to_string()]);
        assert_eq!(routed[0], vec!["[only-a][]"]);
    }

    #[test]
    fn no_arg_decls_forwards_everything() {
        let cmd = Command { description: String::new(), arg_decls: vec![], modules: vec![binding(true, vec![])] };
        let routed = route_arguments(&cmd, &["a".to_string(), "b".to_string()]);
        assert_eq!(routed[0], vec!["a", "b"]);
    }
}
