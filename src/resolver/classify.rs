//! Fragment classification strategies.
//!
//! Managed bundles are JSON arrays classified by file name prefix. Local
//! authoring directories hold YAML documents classified by shape and may
//! reference sibling files.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::config::DeploymentMode;
use crate::error::SyncError;
use crate::resolver::reference::{load_fragment, reference_target, resolve_reference};
use crate::resolver::Resolution;
use crate::store::{document_key, ModelType, PendingRecord};

/// Turns the files of one bundle directory into typed records.
pub trait FragmentStrategy: Send + Sync {
    fn mode(&self) -> DeploymentMode;

    /// Resolve `files` (names relative to `dir`, sorted).
    fn resolve(&self, dir: &Path, files: &[String]) -> Resolution;
}

/// Strategy for bundles pulled from the management plane.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagedStrategy;

impl ManagedStrategy {
    /// Assign every JSON file to the model type whose prefix it carries.
    pub fn classify(&self, files: &[String]) -> BTreeMap<ModelType, Vec<String>> {
        let mut assigned: BTreeMap<ModelType, Vec<String>> = BTreeMap::new();
        for file in files.iter().filter(|f| f.ends_with(".json")) {
            if let Some(model) = ModelType::ALL
                .into_iter()
                .find(|m| file.starts_with(m.file_prefix()))
            {
                assigned.entry(model).or_default().push(file.clone());
            }
        }
        assigned
    }

    fn parse_file(&self, path: &Path) -> Result<Vec<PendingRecord>, SyncError> {
        let parse_error = |reason: String| SyncError::Parse {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = fs::read(path).map_err(|e| parse_error(e.to_string()))?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| parse_error(e.to_string()))?;
        let Value::Array(items) = value else {
            return Err(parse_error("expected a JSON array of records".to_string()));
        };

        let stem = file_stem(path);
        items
            .into_iter()
            .enumerate()
            .map(|(i, document)| {
                if !document.is_object() {
                    return Err(parse_error(format!("element {} is not an object", i)));
                }
                let key = document_key(&document).unwrap_or_else(|| format!("{}#{}", stem, i));
                Ok(PendingRecord { key, document })
            })
            .collect()
    }
}

impl FragmentStrategy for ManagedStrategy {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::Managed
    }

    fn resolve(&self, dir: &Path, files: &[String]) -> Resolution {
        let mut resolution = Resolution::new(self.mode());
        let assigned = self.classify(files);
        let classified: usize = assigned.values().map(Vec::len).sum();
        resolution.files_ignored = files.len() - classified;

        for (model, model_files) in assigned {
            for file in model_files {
                let path = dir.join(&file);
                match self.parse_file(&path) {
                    Ok(records) => {
                        tracing::debug!(model = %model, file = %file, records = records.len(), "Fragment loaded");
                        resolution.push_records(model, records);
                    }
                    Err(e) => {
                        tracing::warn!(model = %model, file = %file, error = %e, "Fragment dropped");
                        resolution.errors.push(e);
                    }
                }
            }
        }
        resolution
    }
}

/// Strategy for hand-authored YAML directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAuthoringStrategy;

impl LocalAuthoringStrategy {
    /// Resolve a single file into its model type and materialized document.
    ///
    /// Returns `Ok(None)` when the document is neither a product nor an API.
    pub fn resolve_file(
        &self,
        dir: &Path,
        file: &str,
    ) -> Result<Option<(ModelType, PendingRecord)>, SyncError> {
        let path = dir.join(file);
        let document = load_fragment(&path).map_err(|reason| SyncError::Parse {
            path: path.clone(),
            reason,
        })?;
        let Value::Object(mut document) = document else {
            return Ok(None);
        };

        let is_product = has_field(&document, "product");
        let is_api = has_field(&document, "swagger");
        if !is_product && !is_api {
            return Ok(None);
        }

        if is_product {
            inline_product_apis(dir, &path, &mut document)?;
        }
        if is_api {
            inline_assembly(dir, &path, &mut document)?;
        }
        document
            .entry("catalog")
            .or_insert_with(|| Value::Object(Map::new()));

        let model = if is_api { ModelType::Api } else { ModelType::Product };
        let document = Value::Object(document);
        let key = document_key(&document).unwrap_or_else(|| file_stem(&path));
        Ok(Some((model, PendingRecord { key, document })))
    }
}

impl FragmentStrategy for LocalAuthoringStrategy {
    fn mode(&self) -> DeploymentMode {
        DeploymentMode::LocalAuthoring
    }

    fn resolve(&self, dir: &Path, files: &[String]) -> Resolution {
        let mut resolution = Resolution::new(self.mode());
        for file in files.iter().filter(|f| is_yaml(f)) {
            match self.resolve_file(dir, file) {
                Ok(Some((model, record))) => {
                    tracing::debug!(model = %model, file = %file, key = %record.key, "Fragment resolved");
                    resolution.push_records(model, vec![record]);
                }
                Ok(None) => {
                    tracing::trace!(file = %file, "Fragment ignored, neither product nor api");
                    resolution.files_ignored += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %file, error = %e, "Fragment dropped");
                    resolution.errors.push(e);
                }
            }
        }
        resolution.files_ignored += files.iter().filter(|f| !is_yaml(f)).count();
        resolution
    }
}

fn inline_product_apis(
    dir: &Path,
    path: &Path,
    document: &mut Map<String, Value>,
) -> Result<(), SyncError> {
    match document.get_mut("apis") {
        Some(Value::Array(entries)) => {
            for entry in entries.iter_mut() {
                inline_entry(dir, path, entry)?;
            }
        }
        Some(Value::Object(entries)) => {
            for entry in entries.values_mut() {
                inline_entry(dir, path, entry)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn inline_assembly(
    dir: &Path,
    path: &Path,
    document: &mut Map<String, Value>,
) -> Result<(), SyncError> {
    let assembly = document
        .get_mut("x-ibm-configuration")
        .and_then(|c| c.get_mut("assembly"));
    if let Some(assembly) = assembly {
        inline_entry(dir, path, assembly)?;
    }
    Ok(())
}

/// Replace a `{ "$ref": name }` entry with the referenced document.
fn inline_entry(dir: &Path, path: &Path, entry: &mut Value) -> Result<(), SyncError> {
    let Some(reference) = reference_target(entry).map(str::to_owned) else {
        return Ok(());
    };
    let resolved =
        resolve_reference(dir, &reference).map_err(|reason| SyncError::ReferenceResolution {
            path: path.to_path_buf(),
            reference: reference.clone(),
            reason,
        })?;
    *entry = resolved;
    Ok(())
}

fn has_field(document: &Map<String, Value>, field: &str) -> bool {
    document.get(field).is_some_and(|v| !v.is_null())
}

fn is_yaml(file: &str) -> bool {
    file.ends_with(".yaml") || file.ends_with(".yml")
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
