use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where in a window a new activity goes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Placement {
    #[default]
    Latest,
    Earliest,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    pub placement: Placement,
    /// Simulate every candidate and reject it if it doesn't run as expected.
    pub check_simulation_before_inserting: bool,
    /// Evaluate goals without creating anything.
    pub analysis_only: bool,
    /// Upper bound on passes over one goal's conflicts.
    pub max_iterations_per_goal: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            placement: Placement::Latest,
            check_simulation_before_inserting: true,
            analysis_only: false,
            max_iterations_per_goal: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }
}

pub const COMMAND_VAR: &str = "SCHEDULING_DSL_COMPILER_COMMAND";
pub const ROOT_VAR: &str = "SCHEDULING_DSL_COMPILER_ROOT";

/// How to start the scheduling DSL compiler subprocess.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DslCompilerConfig {
    pub program: String,
    pub arguments: Vec<String>,
    /// The compiler's entry point, passed after the arguments.
    pub script: PathBuf,
    pub working_directory: Option<PathBuf>,
    pub environment: BTreeMap<String, String>,
}

impl Default for DslCompilerConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            arguments: vec!["--experimental-vm-modules".to_string()],
            script: PathBuf::from("build/main.js"),
            working_directory: None,
            environment: BTreeMap::new(),
        }
    }
}

impl DslCompilerConfig {
    /// The defaults, with the script and working directory taken from the environment.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(command) = var(COMMAND_VAR) {
            config.script = PathBuf::from(command);
        }
        if let Some(root) = var(ROOT_VAR) {
            config.working_directory = Some(PathBuf::from(root));
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_configs_keep_defaults() -> anyhow::Result<()> {
        let config = SchedulerConfig::from_json_str(r#"{ "placement": "earliest" }"#)?;
        assert_eq!(
            SchedulerConfig {
                placement: Placement::Earliest,
                ..SchedulerConfig::default()
            },
            config
        );
        assert!(SchedulerConfig::from_json_str(r#"{ "placement": 3 }"#).is_err());
        Ok(())
    }

    #[test]
    fn compiler_location_comes_from_the_environment() {
        let config = DslCompilerConfig::from_vars(|name| match name {
            COMMAND_VAR => Some("compile.js".to_string()),
            ROOT_VAR => Some("/opt/dsl".to_string()),
            _ => None,
        });
        assert_eq!(PathBuf::from("compile.js"), config.script);
        assert_eq!(Some(PathBuf::from("/opt/dsl")), config.working_directory);
        assert_eq!("node", config.program);
    }
}
