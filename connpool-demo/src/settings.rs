//! Layered pool configuration for the demo client.
//!
//! Precedence, lowest to highest: built-in defaults, `CONNPOOL_*`
//! environment variables, a JSON file, then command-line flags (applied by
//! the binary on top of what this module returns).

use std::path::Path;

use anyhow::{Context, bail};
use connpool::PoolConfig;
use serde_json::Value;

/// Overlay the JSON object in `path` onto `base`.
///
/// Keys absent from the file keep their value from `base`, so a file that
/// only sets `port` does not reset an environment-supplied `capacity`.
pub fn load(base: PoolConfig, path: Option<&Path>) -> anyhow::Result<PoolConfig> {
    let Some(path) = path else {
        return Ok(base);
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let overlay: Value = serde_json::from_str(&text)
        .with_context(|| format!("parsing config file {}", path.display()))?;

    let Value::Object(fields) = overlay else {
        bail!("config file {} must contain a JSON object", path.display());
    };

    let mut merged = serde_json::to_value(&base)?;
    if let Value::Object(target) = &mut merged {
        target.extend(fields);
    }

    serde_json::from_value(merged)
        .with_context(|| format!("invalid pool config in {}", path.display()))
}
