//! Process-level glue for the dutctl agent binary: loading the YAML device
//! list into a [`dutctl_core::registry::DeviceRegistry`], logging setup,
//! and signal-driven shutdown. Everything here is external collaborator
//! territory, kept out of `dutctl-core` so that crate stays free of I/O
//! and process concerns.

pub mod config;
pub mod logging;
pub mod signals;

pub use config::{load_registry, ConfigError};
