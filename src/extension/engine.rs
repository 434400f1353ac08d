//! Extension Engine — compiles model-authored Rust source into a `cdylib`
//! and dlopens it, replacing the duck-typed "class ending in Tool" discovery
//! with one fixed exported symbol, `koda_extension_entry`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::model::ModelAdapter;

const GENERATE_PROMPT_TEMPLATE: &str = "Write a Rust tool module for the Koda framework.\n\nTool Name: {name}\nDescription: {description}\n\nRequirements:\n{requirements}\n\nThe module must:\n1. Define a type implementing the `Tool` trait (an async `execute(&self, method: &str, kwargs: serde_json::Value) -> Result<serde_json::Value, String>`)\n2. Export a `koda_extension_entry` function returning a boxed trait object\n3. Handle errors by returning `Err`, never by panicking\n4. Include doc comments\n\nWrite the complete Rust code:";

const IMPROVE_PROMPT_TEMPLATE: &str = "Improve this tool:\n\nCurrent code:\n```rust\n{code}\n```\n\nImprovement needed: {improvement}\n\nPlease provide the improved code:";

#[cfg(target_os = "macos")]
const DYLIB_SUFFIX: &str = ".dylib";
#[cfg(target_os = "windows")]
const DYLIB_SUFFIX: &str = ".dll";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const DYLIB_SUFFIX: &str = ".so";

/// Signature of the one exported symbol an extension's `cdylib` must provide.
type ExtensionEntry = unsafe extern "C" fn() -> *mut dyn Tool;

/// Capability interface every extension conforms to.
#[async_trait]
pub trait Tool: Send + Sync {
    async fn execute(&self, method: &str, kwargs: serde_json::Value) -> Result<serde_json::Value, String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionInfo {
    pub name: String,
    pub description: String,
    pub code: String,
    pub version: String,
    pub author: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl ExtensionInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            code: code.into(),
            version: "1.0.0".to_string(),
            author: "koda-agent".to_string(),
            dependencies: Vec::new(),
        }
    }
}

/// A dlopen'd extension. `tool` is dropped before `library` (declaration
/// order), so the backing module is never unloaded while still in use.
struct LoadedExtension {
    tool: Box<dyn Tool>,
    #[allow(dead_code)]
    library: Library,
}

/// Owns the registry of generated extensions, the loaded dynamic libraries
/// backing them, and the scratch directory both live under.
pub struct ExtensionEngine {
    extensions: HashMap<String, ExtensionInfo>,
    loaded: HashMap<String, LoadedExtension>,
    generation: HashMap<String, u64>,
    extension_dir: PathBuf,
    compile_timeout: Duration,
}

impl ExtensionEngine {
    pub fn new(extension_dir: PathBuf, compile_timeout: Duration) -> CoreResult<Self> {
        std::fs::create_dir_all(&extension_dir)
            .map_err(|e| CoreError::persistence_failed(extension_dir.display().to_string(), e))?;
        Ok(Self {
            extensions: HashMap::new(),
            loaded: HashMap::new(),
            generation: HashMap::new(),
            extension_dir,
            compile_timeout,
        })
    }

    /// Synthesize a new extension from a capability description. A
    /// tree-sitter parse failure on the model's reply is a hard error.
    pub async fn generate(
        &self,
        name: &str,
        description: &str,
        requirements: &[String],
        model: &ModelAdapter,
    ) -> CoreResult<ExtensionInfo> {
        let requirements_block = requirements.iter().map(|r| format!("- {r}")).collect::<Vec<_>>().join("\n");
        let prompt = GENERATE_PROMPT_TEMPLATE
            .replace("{name}", name)
            .replace("{description}", description)
            .replace("{requirements}", &requirements_block);

        let response = model.generate("You are writing a Koda extension.", &prompt).await?;
        let code = Self::clean_code(&response);

        let parse = crate::ast::RustParse::parse(&code);
        if parse.has_error {
            return Err(CoreError::InvalidSource {
                name: name.to_string(),
                message: parse.error_message.unwrap_or_else(|| "unparseable".to_string()),
            });
        }

        Ok(ExtensionInfo::new(name, description, code))
    }

    pub fn register_extension(&mut self, extension: ExtensionInfo) {
        self.extensions.insert(extension.name.clone(), extension);
    }

    pub fn get_extension(&self, name: &str) -> Option<&ExtensionInfo> {
        self.extensions.get(name)
    }

    pub fn list_extensions(&self) -> Vec<&str> {
        self.extensions.keys().map(String::as_str).collect()
    }

    /// Compile and dlopen the extension's source. Not idempotent with
    /// respect to hot-reload: each call gets a fresh generation so the
    /// dynamic loader never serves a stale cached module.
    pub async fn load(&mut self, extension: &ExtensionInfo) -> CoreResult<()> {
        let generation = self.next_generation(&extension.name);
        let artifact_path = self.compile(&extension.name, generation, &extension.code).await?;

        let library = unsafe { Library::new(&artifact_path) }
            .map_err(|e| CoreError::extension_load_failed(&extension.name, e.to_string()))?;
        let tool = unsafe {
            let constructor: Symbol<ExtensionEntry> = library
                .get(b"koda_extension_entry\0")
                .map_err(|e| CoreError::extension_load_failed(&extension.name, e.to_string()))?;
            Box::from_raw(constructor())
        };

        self.loaded.insert(extension.name.clone(), LoadedExtension { tool, library });
        self.extensions.insert(extension.name.clone(), extension.clone());
        tracing::info!(extension = %extension.name, generation, "load");
        Ok(())
    }

    /// Drop the cached module and re-load from the registered source. Never
    /// returns an error: failure is reported as `false`.
    pub async fn hot_reload(&mut self, name: &str) -> bool {
        let Some(extension) = self.extensions.get(name).cloned() else {
            return false;
        };
        self.loaded.remove(name);
        match self.load(&extension).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(extension = name, error = %e, "hot_reload failed");
                false
            }
        }
    }

    /// Resolve the extension (loading it if registered but not yet loaded)
    /// and invoke `method`. No error escapes; failures become `{"success":
    /// false, "error": ...}`.
    pub async fn execute(&mut self, name: &str, method: &str, kwargs: serde_json::Value) -> serde_json::Value {
        if !self.loaded.contains_key(name) {
            let Some(extension) = self.extensions.get(name).cloned() else {
                return serde_json::json!({"success": false, "error": format!("Extension {name} not found")});
            };
            if let Err(e) = self.load(&extension).await {
                return serde_json::json!({"success": false, "error": e.to_string()});
            }
        }

        let Some(loaded) = self.loaded.get(name) else {
            return serde_json::json!({"success": false, "error": format!("Extension {name} not found")});
        };

        match loaded.tool.execute(method, kwargs).await {
            Ok(result) => serde_json::json!({"success": true, "result": result}),
            Err(error) => serde_json::json!({"success": false, "error": error}),
        }
    }

    /// Prompt the model with the current source plus an improvement
    /// description, bump the version, and hot-reload in place.
    pub async fn improve_tool(&mut self, name: &str, improvement: &str, model: &ModelAdapter) -> CoreResult<ExtensionInfo> {
        let old = self
            .extensions
            .get(name)
            .cloned()
            .ok_or_else(|| CoreError::ExtensionNotFound { name: name.to_string() })?;

        let prompt = IMPROVE_PROMPT_TEMPLATE.replace("{code}", &old.code).replace("{improvement}", improvement);
        let response = model.generate("You are improving a Koda extension.", &prompt).await?;

        let new_extension = ExtensionInfo {
            name: name.to_string(),
            description: old.description.clone(),
            code: Self::clean_code(&response),
            version: Self::bump_version(&old.version),
            author: old.author.clone(),
            dependencies: old.dependencies.clone(),
        };

        self.extensions.insert(name.to_string(), new_extension.clone());
        self.hot_reload(name).await;
        Ok(new_extension)
    }

    /// Remove source, cache, and any backing compiled artifacts. Idempotent.
    pub fn delete(&mut self, name: &str) -> bool {
        let existed = self.extensions.remove(name).is_some();
        self.loaded.remove(name);
        self.generation.remove(name);

        if let Ok(entries) = std::fs::read_dir(&self.extension_dir) {
            let prefix = format!("{name}_");
            for entry in entries.flatten() {
                if entry.file_name().to_string_lossy().starts_with(&prefix) {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }

        existed
    }

    fn next_generation(&mut self, name: &str) -> u64 {
        let counter = self.generation.entry(name.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    async fn compile(&self, name: &str, generation: u64, code: &str) -> CoreResult<PathBuf> {
        let source_path = self.extension_dir.join(format!("{name}_{generation}.rs"));
        std::fs::write(&source_path, code).map_err(|e| CoreError::persistence_failed(source_path.display().to_string(), e))?;

        let artifact_path = self.extension_dir.join(format!("{name}_{generation}{DYLIB_SUFFIX}"));

        let mut cmd = tokio::process::Command::new("rustc");
        cmd.arg("--crate-type").arg("cdylib").arg("-o").arg(&artifact_path).arg(&source_path);

        let output = match tokio::time::timeout(self.compile_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(CoreError::extension_load_failed(name, format!("failed to spawn rustc: {e}"))),
            Err(_) => {
                return Err(CoreError::extension_load_failed(
                    name,
                    format!("compilation timed out after {}s", self.compile_timeout.as_secs()),
                ))
            }
        };

        if !output.status.success() {
            return Err(CoreError::extension_load_failed(name, String::from_utf8_lossy(&output.stderr).to_string()));
        }

        Ok(artifact_path)
    }

    fn clean_code(code: &str) -> String {
        let mut code = code.trim();
        if let Some(rest) = code.strip_prefix("```rust") {
            code = rest;
        } else if let Some(rest) = code.strip_prefix("```") {
            code = rest;
        }
        code.trim().trim_end_matches("```").trim().to_string()
    }

    fn bump_version(version: &str) -> String {
        let parsed: f64 = version.parse().unwrap_or(1.0);
        format!("{:.1}", parsed + 0.1)
    }
}
