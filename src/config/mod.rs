//! Run configuration for the command-line front end.
//!
//! A TOML file stands in for the host build tool's plugin parameters: it
//! names the descriptor, the output and compiled-classes directories, the
//! resolved dependency list, and the fork settings. The library itself never
//! reads configuration; it only sees the values extracted here.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::fork::{self, ForkCommandBuilder};
use crate::index::{DependencyNode, LocalRepository, ResolutionState};
use crate::layout::Materializer;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub materialize: MaterializeConfig,
    #[serde(default)]
    pub dependency: Vec<DependencyConfig>,
    pub fork: Option<ForkConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterializeConfig {
    /// The module definition descriptor file.
    pub descriptor: PathBuf,
    /// Where the module-path layout is generated.
    pub modules_directory: PathBuf,
    /// Delete and recreate an existing modules directory.
    #[serde(default)]
    pub clean: bool,
    pub classes_directory: PathBuf,
    pub test_classes_directory: PathBuf,
    /// Maven-layout local repository; defaults to `~/.m2/repository`.
    pub local_repository: Option<PathBuf>,
}

/// One resolved node of the host build tool's dependency graph.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DependencyConfig {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    #[serde(default)]
    pub state: DependencyState,
    /// Already-resolved artifact location, when known.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyState {
    #[default]
    Included,
    OmittedForDuplicate,
    OmittedForConflict,
    OmittedForCycle,
}

impl From<DependencyState> for ResolutionState {
    fn from(state: DependencyState) -> Self {
        match state {
            DependencyState::Included => ResolutionState::Included,
            DependencyState::OmittedForDuplicate => ResolutionState::OmittedForDuplicate,
            DependencyState::OmittedForConflict => ResolutionState::OmittedForConflict,
            DependencyState::OmittedForCycle => ResolutionState::OmittedForCycle,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkConfig {
    /// The JVM executable; a bare name is resolved against PATH.
    pub executable: String,
    /// The module loader jar passed to `-jar`.
    pub loader_jar: PathBuf,
    pub working_directory: PathBuf,
    /// Caller-declared module-path roots appended after the generated
    /// modules directory.
    #[serde(default)]
    pub roots: Vec<PathBuf>,
    pub arg_line: Option<String>,
    #[serde(default)]
    pub environment: Vec<EnvironmentBinding>,
    pub debug_line: Option<String>,
    pub log_configuration: Option<PathBuf>,
    pub boot_log_file: Option<PathBuf>,
    pub log_module: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentBinding {
    pub key: String,
    pub value: String,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<RunConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading run config '{}'", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing run config '{}'", path.display()))
    }

    /// The dependency list as graph nodes, in declaration order.
    pub fn dependency_nodes(&self) -> Vec<DependencyNode> {
        self.dependency
            .iter()
            .map(|dep| DependencyNode {
                group_id: dep.group_id.clone(),
                artifact_id: dep.artifact_id.clone(),
                version: dep.version.clone(),
                state: dep.state.into(),
                file: dep.file.clone(),
            })
            .collect()
    }

    pub fn local_repository(&self) -> Result<LocalRepository> {
        match &self.materialize.local_repository {
            Some(base) => Ok(LocalRepository::new(base.clone())),
            None => {
                let home = dirs::home_dir().context("could not determine the home directory")?;
                Ok(LocalRepository::new(home.join(".m2").join("repository")))
            }
        }
    }

    pub fn materializer(&self) -> Materializer {
        Materializer {
            module_definition_file: self.materialize.descriptor.clone(),
            modules_directory: self.materialize.modules_directory.clone(),
            clean_modules_directory: self.materialize.clean,
            classes_directory: self.materialize.classes_directory.clone(),
            test_classes_directory: self.materialize.test_classes_directory.clone(),
        }
    }

    /// Build the fork command builder from the `[fork]` section, wired to
    /// the generated modules directory.
    pub fn fork_builder(&self) -> Result<ForkCommandBuilder> {
        let fork = self
            .fork
            .as_ref()
            .context("run config has no [fork] section")?;
        let module_path = fork::module_path(&self.materialize.modules_directory, &fork.roots)?;

        let mut builder = ForkCommandBuilder::new(
            &fork.executable,
            &fork.working_directory,
            &fork.loader_jar,
            module_path,
        );
        if let Some(line) = &fork.arg_line {
            builder = builder.arg_line(line);
        }
        for binding in &fork.environment {
            builder = builder.environment(&binding.key, &binding.value);
        }
        if let Some(line) = &fork.debug_line {
            builder = builder.debug_line(line);
        }
        if let Some(file) = &fork.log_configuration {
            builder = builder.log_configuration(file);
        }
        if let Some(file) = &fork.boot_log_file {
            builder = builder.boot_log_file(file);
        }
        if let Some(name) = &fork.log_module {
            builder = builder.log_module(name);
        }
        Ok(builder)
    }
}
