//! Single-hop cross-reference loading.

use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Suffix appended once when a reference does not load by its own name.
pub const FALLBACK_SUFFIX: &str = ".yaml";

/// Key naming a sibling file inside a reference object.
pub const REF_KEY: &str = "$ref";

/// Read and parse one structured-text fragment.
pub fn load_fragment(path: &Path) -> Result<Value, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_yaml::from_str::<Value>(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Resolve `reference` relative to `dir` using the filesystem.
pub fn resolve_reference(dir: &Path, reference: &str) -> Result<Value, String> {
    resolve_with(dir, reference, load_fragment)
}

/// Resolve `reference` with a caller-supplied loader.
///
/// Tries `dir/reference`, then `dir/reference.yaml` exactly once.
pub fn resolve_with<F>(dir: &Path, reference: &str, mut load: F) -> Result<Value, String>
where
    F: FnMut(&Path) -> Result<Value, String>,
{
    let direct = contained_path(dir, reference)?;
    let first = match load(&direct) {
        Ok(doc) => return Ok(doc),
        Err(e) => e,
    };

    let fallback = dir.join(format!("{}{}", reference, FALLBACK_SUFFIX));
    tracing::debug!(reference, fallback = %fallback.display(), "Direct reference failed, trying fallback suffix");
    load(&fallback).map_err(|second| format!("{}; fallback {}", first, second))
}

/// Extract the `$ref` target of a reference object, if it is one.
pub fn reference_target(value: &Value) -> Option<&str> {
    value.get(REF_KEY).and_then(Value::as_str)
}

fn contained_path(dir: &Path, reference: &str) -> Result<PathBuf, String> {
    if reference.is_empty() {
        return Err("empty reference".to_string());
    }
    let rel = Path::new(reference);
    let escapes = rel.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(format!("reference `{}` leaves the bundle directory", reference));
    }
    Ok(dir.join(rel))
}
