//! Layered configuration loading.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::ToolsConfig;

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "TOOLGATE_";

/// Builds a [`ToolsConfig`] from defaults, an optional file and the environment.
///
/// Later layers win: defaults, then the file, then variables such as
/// `TOOLGATE_PERMISSION_MODE=auto` (nested keys use `__`).
#[derive(Debug, Clone)]
#[must_use]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading only defaults and `TOOLGATE_*` variables.
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: Some(DEFAULT_ENV_PREFIX.to_owned()),
        }
    }

    /// Adds a TOML, YAML or JSON file, chosen by extension.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replaces the environment prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Ignores the environment entirely.
    pub fn without_env(mut self) -> Self {
        self.env_prefix = None;
        self
    }

    /// Merges every layer and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when the file is missing, has an unknown
    /// extension or fails to deserialise, and [`ConfigError::Invalid`] when
    /// validation rejects the merged values.
    pub fn load(&self) -> ConfigResult<ToolsConfig> {
        let mut figment = Figment::from(Serialized::defaults(ToolsConfig::default()));

        if let Some(path) = &self.file {
            if !path.is_file() {
                return Err(ConfigError::Load {
                    reason: format!("config file {} does not exist", path.display()),
                });
            }
            figment = merge_file(figment, path)?;
        }

        if let Some(prefix) = &self.env_prefix {
            figment = figment.merge(Env::prefixed(prefix).split("__"));
        }

        let config: ToolsConfig = figment.extract().map_err(|err| ConfigError::Load {
            reason: err.to_string(),
        })?;
        config.validate()?;

        debug!(
            mode = %config.permission_mode,
            remote_servers = config.remote_servers.len(),
            "configuration loaded"
        );
        Ok(config)
    }
}

fn merge_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("toml") => Ok(figment.merge(Toml::file(path))),
        Some("yaml" | "yml") => Ok(figment.merge(Yaml::file(path))),
        Some("json") => Ok(figment.merge(Json::file(path))),
        _ => Err(ConfigError::Load {
            reason: format!("unsupported config format: {}", path.display()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use figment::Jail;
    use tool_primitives::{PermissionLevel, PolicyMode};

    use crate::schema::RemoteTransportConfig;

    #[test]
    fn defaults_without_sources() {
        let config = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config, ToolsConfig::default());
    }

    #[test]
    fn toml_file_then_environment() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tools.toml",
                r#"
                permission_mode = "deny"
                max_concurrent_tools = 1

                [[remote_servers]]
                name = "git"
                transport = { type = "stdio", command = "git-tools", args = ["--serve"] }
                "#,
            )?;
            jail.set_env("TOOLGATE_PERMISSION_MODE", "auto");
            jail.set_env("TOOLGATE_EXECUTION_TIMEOUT_SECS", "5");

            let config = ConfigLoader::new()
                .with_file("tools.toml")
                .load()
                .map_err(|err| err.to_string())?;

            assert_eq!(config.permission_mode, PolicyMode::Auto);
            assert_eq!(config.execution_timeout_secs, 5);
            assert_eq!(config.max_concurrent_tools, 1);
            let server = &config.remote_servers[0];
            assert_eq!(server.permission_level, PermissionLevel::Elevated);
            assert!(matches!(
                &server.transport,
                RemoteTransportConfig::Stdio { command, args, .. }
                    if command == "git-tools" && args == &["--serve"]
            ));
            Ok(())
        });
    }

    #[test]
    fn yaml_file_is_recognised() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tools.yaml",
                "enabled_builtin_modules: [text]\ndangerous_allow_list: [delete_file]\n",
            )?;
            let config = ConfigLoader::new()
                .without_env()
                .with_file("tools.yaml")
                .load()
                .map_err(|err| err.to_string())?;
            assert_eq!(config.enabled_builtin_modules, ["text"]);
            assert_eq!(config.dangerous_allow_list, ["delete_file"]);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_fail_validation() {
        Jail::expect_with(|jail| {
            jail.create_file("tools.json", r#"{"max_concurrent_tools": 0}"#)?;
            let err = ConfigLoader::new()
                .without_env()
                .with_file("tools.json")
                .load()
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }));
            Ok(())
        });
    }

    #[test]
    fn missing_or_unknown_files_fail_to_load() {
        let missing = ConfigLoader::new().with_file("/nonexistent/tools.toml").load();
        assert!(matches!(missing, Err(ConfigError::Load { .. })));

        Jail::expect_with(|jail| {
            jail.create_file("tools.ini", "enabled = true")?;
            let err = ConfigLoader::new().with_file("tools.ini").load().unwrap_err();
            assert!(err.to_string().contains("unsupported"));
            Ok(())
        });
    }
}
