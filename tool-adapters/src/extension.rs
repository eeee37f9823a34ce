//! User extensions: directories holding a `manifest.json` and a program.
//!
//! Each call spawns the extension's command with the tool name appended,
//! writes `{"tool", "arguments", "context"}` to its stdin and expects one JSON
//! line on stdout: `{"ok": true, "result": ...}` or `{"ok": false, "error": "..."}`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tool_primitives::{
    ExecutionContext, PermissionLevel, SourceType, ToolArguments, ToolCategory, ToolDescriptor,
};
use tool_registry::{CallableSignature, FormalParameter, HandlerError, HandlerResult, ToolHandler};
use tracing::{debug, warn};

use crate::error::{AdapterError, AdapterResult};
use crate::source::{DiscoveredTool, SourceMetadata, ToolSource};

/// File name looked up in each extension directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Contents of an extension's `manifest.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtensionManifest {
    /// Display name.
    pub name: String,
    /// Program to run, relative paths resolve against the extension directory.
    pub command: String,
    /// Arguments placed before the tool name.
    #[serde(default)]
    pub args: Vec<String>,
    /// Tools the program implements.
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
}

/// One tool declared by a manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestTool {
    /// Tool name.
    pub name: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Longer documentation with an `Args:` block.
    #[serde(default)]
    pub documentation: Option<String>,
    /// Risk level, `elevated` unless stated.
    #[serde(default = "default_extension_permission")]
    pub permission_level: PermissionLevel,
    /// Category.
    #[serde(default)]
    pub category: ToolCategory,
    /// Search tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Formal parameters.
    #[serde(default)]
    pub parameters: Vec<ManifestParameter>,
}

/// One formal parameter declared by a manifest tool.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ManifestParameter {
    /// Parameter name.
    pub name: String,
    /// Declared type such as `integer` or `list[string]`.
    #[serde(default, rename = "type")]
    pub declared_type: Option<String>,
    /// Default value; its presence makes the parameter optional.
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_extension_permission() -> PermissionLevel {
    PermissionLevel::Elevated
}

impl ManifestTool {
    fn signature(&self) -> CallableSignature {
        let mut signature = CallableSignature::new(&self.name);
        for parameter in &self.parameters {
            let mut formal = FormalParameter::new(&parameter.name);
            if let Some(declared) = &parameter.declared_type {
                formal = formal.typed(declared);
            }
            if let Some(default) = &parameter.default {
                formal = formal.with_default(default.clone());
            }
            signature = signature.param(formal);
        }
        match &self.documentation {
            Some(documentation) => signature.documented(documentation),
            None => signature,
        }
    }
}

/// One extension directory.
#[derive(Debug, Clone)]
pub struct ExtensionSource {
    metadata: SourceMetadata,
    root: PathBuf,
}

impl ExtensionSource {
    /// Wraps an extension directory. Its file name becomes the source id.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let id = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |name| name.to_string_lossy().into_owned());
        Self {
            metadata: SourceMetadata::new(id, SourceType::Extension),
            root,
        }
    }

    /// Lists every subdirectory of `dir` that holds a manifest, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when `dir` cannot be read.
    pub fn scan(dir: &Path) -> AdapterResult<Vec<Self>> {
        let entries = std::fs::read_dir(dir).map_err(|err| {
            AdapterError::configuration(format!(
                "cannot read extensions directory {}: {err}",
                dir.display()
            ))
        })?;

        let mut roots: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.join(MANIFEST_FILE).is_file())
            .collect();
        roots.sort();
        Ok(roots.into_iter().map(Self::new).collect())
    }

    /// Directory of the extension.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads and parses the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Configuration`] when the file is missing or
    /// malformed.
    pub async fn load_manifest(&self) -> AdapterResult<ExtensionManifest> {
        let path = self.root.join(MANIFEST_FILE);
        let raw = tokio::fs::read(&path).await.map_err(|err| {
            AdapterError::configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        let manifest: ExtensionManifest = serde_json::from_slice(&raw).map_err(|err| {
            AdapterError::configuration(format!("malformed {}: {err}", path.display()))
        })?;
        if manifest.command.trim().is_empty() {
            return Err(AdapterError::configuration(format!(
                "{} declares an empty command",
                path.display()
            )));
        }
        Ok(manifest)
    }

    fn program(&self, command: &str) -> PathBuf {
        let path = Path::new(command);
        if path.is_relative() && path.components().count() > 1 {
            self.root.join(path)
        } else {
            path.to_path_buf()
        }
    }

    fn describe(&self, tool: &ManifestTool) -> AdapterResult<ToolDescriptor> {
        let derived = tool.signature().derive();
        for parameter in &derived.flagged {
            warn!(extension = %self.metadata.id(), tool = %tool.name, parameter, "parameter type needs review");
        }
        let description = if tool.description.trim().is_empty() {
            derived.summary
        } else {
            tool.description.clone()
        };

        ToolDescriptor::builder(&tool.name)
            .description(description)
            .parameters(derived.parameters)
            .permission(tool.permission_level)
            .category(tool.category)
            .tags(tool.tags.iter().cloned())
            .tag("extension")
            .source(SourceType::Extension, self.metadata.id())
            .build()
            .map_err(|err| AdapterError::configuration(err.to_string()))
    }
}

#[async_trait]
impl ToolSource for ExtensionSource {
    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    async fn discover(&self) -> AdapterResult<Vec<DiscoveredTool>> {
        let id = self.metadata.id();
        let manifest = self
            .load_manifest()
            .await
            .map_err(|err| AdapterError::initialization(id, err.to_string()))?;

        let invocation = Arc::new(Invocation {
            program: self.program(&manifest.command),
            args: manifest.args.clone(),
            workdir: self.root.clone(),
        });

        let mut tools = Vec::with_capacity(manifest.tools.len());
        for tool in &manifest.tools {
            let descriptor = self
                .describe(tool)
                .map_err(|err| AdapterError::initialization(id, err.to_string()))?;
            tools.push(DiscoveredTool {
                descriptor,
                handler: Arc::new(ExtensionHandler {
                    invocation: Arc::clone(&invocation),
                    tool: tool.name.clone(),
                }),
            });
        }
        debug!(extension = %id, name = %manifest.name, tools = tools.len(), "extension loaded");
        Ok(tools)
    }
}

#[derive(Debug)]
struct Invocation {
    program: PathBuf,
    args: Vec<String>,
    workdir: PathBuf,
}

/// Runs one extension tool in a child process per call.
#[derive(Debug)]
struct ExtensionHandler {
    invocation: Arc<Invocation>,
    tool: String,
}

#[derive(Debug, Deserialize)]
struct ExtensionReply {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl ToolHandler for ExtensionHandler {
    fn source_type(&self) -> SourceType {
        SourceType::Extension
    }

    async fn execute(
        &self,
        arguments: ToolArguments,
        context: &ExecutionContext,
    ) -> HandlerResult<Value> {
        let payload = json!({
            "tool": self.tool,
            "arguments": arguments,
            "context": context,
        })
        .to_string();

        let mut child = Command::new(&self.invocation.program)
            .args(&self.invocation.args)
            .arg(&self.tool)
            .current_dir(&self.invocation.workdir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                HandlerError::transport(format!(
                    "cannot start {}: {err}",
                    self.invocation.program.display()
                ))
            })?;

        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return;
            };
            // A program that ignores its input may exit before reading it.
            if let Err(err) = stdin.write_all(payload.as_bytes()).await {
                debug!(tool = %self.tool, error = %err, "extension did not read its input");
            }
        };
        // Output is drained while the input is still being written.
        let ((), output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|err| HandlerError::transport(format!("extension process failed: {err}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let reply = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<ExtensionReply>(line).ok());

        match reply {
            Some(ExtensionReply { ok: true, result, .. }) => Ok(result),
            Some(ExtensionReply { error, .. }) => Err(HandlerError::failed(
                error.unwrap_or_else(|| "extension reported a failure".to_owned()),
            )),
            None => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(HandlerError::failed(format!(
                    "extension exited with {} without a reply: {}",
                    output.status,
                    stderr.trim()
                )))
            }
        }
    }
}
