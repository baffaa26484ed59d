//! Command handler modules for the `tm` CLI.

pub mod simulate;

use anyhow::Result;
use tm_config::{load_layered_yaml, load_layered_yaml_from_strings, LoadedConfig};

/// Load layered config; no paths means an empty (all-defaults) config.
pub fn load_config(paths: &[String]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        return load_layered_yaml_from_strings(&[]);
    }
    let refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    load_layered_yaml(&refs)
}
