//! Strongly typed configuration schema.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tool_primitives::{PermissionLevel, PolicyMode};

use crate::error::{ConfigError, ConfigResult};

/// Top-level tool runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Master switch. When false no tool sources are booted.
    pub enabled: bool,
    /// How ELEVATED tools are handled.
    pub permission_mode: PolicyMode,
    /// Per-call handler timeout in seconds.
    pub execution_timeout_secs: u64,
    /// Maximum number of calls from one batch running at once.
    pub max_concurrent_tools: usize,
    /// Built-in modules registered by the local source.
    pub enabled_builtin_modules: Vec<String>,
    /// DANGEROUS tools permitted to run.
    pub dangerous_allow_list: Vec<String>,
    /// Directory holding extension subdirectories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions_dir: Option<PathBuf>,
    /// External tool servers.
    pub remote_servers: Vec<RemoteServerConfig>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            permission_mode: PolicyMode::Prompt,
            execution_timeout_secs: 30,
            max_concurrent_tools: 3,
            enabled_builtin_modules: vec!["text".to_owned(), "files".to_owned()],
            dangerous_allow_list: Vec::new(),
            extensions_dir: None,
            remote_servers: Vec::new(),
        }
    }
}

impl ToolsConfig {
    /// Handler timeout as a [`Duration`].
    #[must_use]
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Remote servers with `enabled = true`.
    pub fn enabled_remote_servers(&self) -> impl Iterator<Item = &RemoteServerConfig> {
        self.remote_servers.iter().filter(|server| server.enabled)
    }

    /// Checks values that deserialise fine but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.execution_timeout_secs == 0 {
            return Err(ConfigError::invalid("execution_timeout_secs must be positive"));
        }
        if self.max_concurrent_tools == 0 {
            return Err(ConfigError::invalid("max_concurrent_tools must be positive"));
        }

        let mut names = HashSet::new();
        for server in &self.remote_servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "remote server '{}' is declared twice",
                    server.name
                )));
            }
        }
        Ok(())
    }
}

/// One external tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteServerConfig {
    /// Unique server name, used as the source identifier of its tools.
    pub name: String,
    /// How to reach the server.
    pub transport: RemoteTransportConfig,
    /// Permission level given to every tool the server exposes.
    #[serde(default = "default_remote_permission")]
    pub permission_level: PermissionLevel,
    /// Whether the server is booted.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds allowed for the initial handshake.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

fn default_remote_permission() -> PermissionLevel {
    PermissionLevel::Elevated
}

fn default_true() -> bool {
    true
}

fn default_handshake_timeout() -> u64 {
    10
}

impl RemoteServerConfig {
    /// Creates an enabled server entry with default permission and timeout.
    #[must_use]
    pub fn new(name: impl Into<String>, transport: RemoteTransportConfig) -> Self {
        Self {
            name: name.into(),
            transport,
            permission_level: default_remote_permission(),
            enabled: true,
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::invalid("remote server name must not be empty"));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::invalid(format!(
                "remote server '{}': handshake_timeout_secs must be positive",
                self.name
            )));
        }
        match &self.transport {
            RemoteTransportConfig::Stdio { command, .. } if command.trim().is_empty() => {
                Err(ConfigError::invalid(format!(
                    "remote server '{}': stdio command must not be empty",
                    self.name
                )))
            }
            RemoteTransportConfig::Http { url }
                if !(url.starts_with("http://") || url.starts_with("https://")) =>
            {
                Err(ConfigError::invalid(format!(
                    "remote server '{}': url '{url}' must use http or https",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Transport used to reach a remote tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemoteTransportConfig {
    /// Child process speaking newline-delimited JSON-RPC over stdio.
    Stdio {
        /// Program to launch.
        command: String,
        /// Program arguments.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables.
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
    /// JSON-RPC over HTTP POST.
    Http {
        /// Endpoint URL.
        url: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stdio(command: &str) -> RemoteTransportConfig {
        RemoteTransportConfig::Stdio {
            command: command.to_owned(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = ToolsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution_timeout(), Duration::from_secs(30));
        assert_eq!(config.permission_mode, PolicyMode::Prompt);
        assert_eq!(config.max_concurrent_tools, 3);
    }

    #[test]
    fn rejects_zero_limits() {
        let config = ToolsConfig {
            max_concurrent_tools: 0,
            ..ToolsConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let config = ToolsConfig {
            execution_timeout_secs: 0,
            ..ToolsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_remote_servers() {
        let duplicate = ToolsConfig {
            remote_servers: vec![
                RemoteServerConfig::new("git", stdio("git-tools")),
                RemoteServerConfig::new("git", stdio("other")),
            ],
            ..ToolsConfig::default()
        };
        let err = duplicate.validate().unwrap_err();
        assert!(err.to_string().contains("declared twice"));

        let empty_command = ToolsConfig {
            remote_servers: vec![RemoteServerConfig::new("git", stdio("  "))],
            ..ToolsConfig::default()
        };
        assert!(empty_command.validate().is_err());

        let bad_url = ToolsConfig {
            remote_servers: vec![RemoteServerConfig::new(
                "web",
                RemoteTransportConfig::Http {
                    url: "ftp://example.com".to_owned(),
                },
            )],
            ..ToolsConfig::default()
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn only_enabled_servers_are_listed() {
        let mut off = RemoteServerConfig::new("off", stdio("x"));
        off.enabled = false;
        let config = ToolsConfig {
            remote_servers: vec![RemoteServerConfig::new("on", stdio("y")), off],
            ..ToolsConfig::default()
        };
        let names: Vec<_> = config
            .enabled_remote_servers()
            .map(|server| server.name.as_str())
            .collect();
        assert_eq!(names, ["on"]);
    }
}
