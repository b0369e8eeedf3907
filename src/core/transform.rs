//! Optional per-kind rewriting of resources before they are deployed.
//!
//! A repo may ship `.fabric/_transformers/<kind>.jsonnet`. When it exists,
//! every resource of that kind is staged as JSON under `_tmp/`, imported into
//! the script as `resource`, and the script's output is deployed instead.
//! When it does not exist the resource passes through unchanged.

use jrsonnet_evaluator::{EvaluationState, FileImportResolver};
use serde_json::Value;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::manifest::ResourceKind;
use crate::utils::io;

pub const TRANSFORMERS_DIR: &str = ".fabric/_transformers";
pub const STAGING_DIR: &str = "_tmp";
const SCRIPT_EXTENSION: &str = "jsonnet";

/// Everything a transformation script can see besides the resource itself.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub kind: ResourceKind,
    pub repo_dir: &'a Path,
    pub manifest_file: &'a str,
    pub environment: &'a [(String, String)],
}

pub trait Transformer {
    /// Rewrite `resource`, read from the manifest entry `relative`.
    fn transform(&self, relative: &Path, resource: Value, context: &TransformContext) -> Result<Value>;
}

/// Passes every resource through unchanged.
pub struct IdentityTransformer;

impl Transformer for IdentityTransformer {
    fn transform(&self, _relative: &Path, resource: Value, _context: &TransformContext) -> Result<Value> {
        Ok(resource)
    }
}

pub fn script_path(repo_dir: &Path, kind: ResourceKind) -> PathBuf {
    repo_dir
        .join(TRANSFORMERS_DIR)
        .join(format!("{}.{}", kind.as_str(), SCRIPT_EXTENSION))
}

pub fn staging_dir(repo_dir: &Path) -> PathBuf {
    repo_dir.join(STAGING_DIR)
}

fn staged_path(repo_dir: &Path, relative: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = staging_dir(repo_dir).join(relative).into_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// External variables visible to a script through `std.extVar`: the process
/// environment plus `kind`, `artifactsDir` and `manifestFile`.
pub fn external_vars(context: &TransformContext) -> Vec<(String, String)> {
    let mut vars: Vec<(String, String)> = context.environment.to_vec();
    vars.push(("kind".to_string(), context.kind.as_str().to_string()));
    vars.push(("artifactsDir".to_string(), context.repo_dir.display().to_string()));
    vars.push(("manifestFile".to_string(), context.manifest_file.to_string()));
    vars
}

/// Evaluates transformer scripts with an embedded jsonnet interpreter.
///
/// The transformers directory is on the import path, so scripts can share
/// libraries with `import 'lib.libsonnet'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonnetTransformer;

impl JsonnetTransformer {
    pub fn new() -> Self {
        Self
    }

    fn wrapper(staged: &Path, script: &str) -> String {
        let import = staged.display().to_string().replace('\\', "\\\\").replace('\'', "\\'");
        format!("local resource = import '{}';\n\n{}\n", import, script)
    }

    fn state(context: &TransformContext) -> EvaluationState {
        let state = EvaluationState::default();
        state.with_stdlib();
        state.set_import_resolver(Box::new(FileImportResolver {
            library_paths: vec![context.repo_dir.join(TRANSFORMERS_DIR)],
        }));
        for (name, value) in external_vars(context) {
            state.add_ext_str(name.as_str().into(), value.as_str().into());
        }
        state
    }
}

impl Transformer for JsonnetTransformer {
    fn transform(&self, relative: &Path, resource: Value, context: &TransformContext) -> Result<Value> {
        let script = script_path(context.repo_dir, context.kind);
        if !script.is_file() {
            return Ok(resource);
        }

        let resource_label = relative.display().to_string();
        let script_label = script.display().to_string();
        let fail = |error: String| {
            Error::transform_failed(
                context.kind.as_str(),
                resource_label.clone(),
                script_label.clone(),
                error,
            )
        };

        let staged = staged_path(context.repo_dir, relative, ".json");
        let content = serde_json::to_vec_pretty(&resource).map_err(|e| fail(e.to_string()))?;
        io::write_file(&staged, &content, "stage resource")?;

        let body = io::read_file(&script, "read transformer")?;
        let source = Self::wrapper(&staged, &body);
        let wrapper = staged_path(context.repo_dir, relative, ".jsonnet");
        io::write_file(&wrapper, source.as_bytes(), "write transformer")?;

        tracing::info!("Transforming {} using {}", resource_label, script_label);
        let state = Self::state(context);
        let manifested = state
            .evaluate_snippet_raw(wrapper.clone().into(), source.as_str().into())
            .and_then(|value| state.manifest(value))
            .map_err(|e| fail(state.stringify_err(&e)))?;

        let transformed: Value = serde_json::from_str(&manifested).map_err(|e| fail(e.to_string()))?;

        // Kept next to the input until `_tmp` is removed.
        if let Ok(pretty) = serde_json::to_vec_pretty(&transformed) {
            io::write_file(&staged, &pretty, "stage transformed resource")?;
        }

        Ok(transformed)
    }
}
