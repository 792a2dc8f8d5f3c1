//! Fork command construction for the isolated module-loading runtime.
//!
//! `ForkCommandBuilder` assembles the child JVM invocation bound to a
//! materialized module path. It only builds the `Command`; spawning and
//! waiting are the caller's business.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::layout::BOOTSTRAP_MODULE_NAME;

/// Separator between module-path roots, matching the platform's PATH rules.
pub const MODULE_PATH_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Join the generated modules directory with the caller-declared roots into
/// the `-mp` value. The generated directory always comes first. A declared
/// root that does not exist is fatal.
pub fn module_path(modules_directory: &Path, roots: &[PathBuf]) -> Result<String> {
    let mut joined = modules_directory.display().to_string();
    for root in roots {
        if !root.exists() {
            bail!("roots value does not exist: {}", root.display());
        }
        joined.push(MODULE_PATH_SEPARATOR);
        joined.push_str(&root.display().to_string());
    }
    Ok(joined)
}

/// Builder for the forked JVM command line.
#[derive(Debug)]
pub struct ForkCommandBuilder {
    executable: PathBuf,
    working_directory: PathBuf,
    loader_jar: PathBuf,
    module_path: String,
    arg_line: Option<String>,
    environment: Vec<(String, String)>,
    debug_line: Option<String>,
    log_configuration: Option<PathBuf>,
    boot_log_file: Option<PathBuf>,
    log_module: Option<String>,
}

impl ForkCommandBuilder {
    pub fn new(
        executable: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
        loader_jar: impl Into<PathBuf>,
        module_path: impl Into<String>,
    ) -> Self {
        ForkCommandBuilder {
            executable: executable.into(),
            working_directory: working_directory.into(),
            loader_jar: loader_jar.into(),
            module_path: module_path.into(),
            arg_line: None,
            environment: Vec::new(),
            debug_line: None,
            log_configuration: None,
            boot_log_file: None,
            log_module: None,
        }
    }

    /// Extra JVM arguments, split on whitespace.
    pub fn arg_line(mut self, line: impl Into<String>) -> Self {
        self.arg_line = Some(line.into());
        self
    }

    pub fn environment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.push((key.into(), value.into()));
        self
    }

    /// Debug tokens, split on whitespace, inserted after the environment.
    pub fn debug_line(mut self, line: impl Into<String>) -> Self {
        self.debug_line = Some(line.into());
        self
    }

    /// Logging configuration file, passed as `-Dlogging.configuration=<url>`.
    /// Fatal at build time when the file does not exist.
    pub fn log_configuration(mut self, file: impl Into<PathBuf>) -> Self {
        self.log_configuration = Some(file.into());
        self
    }

    /// Passed through as `-Dorg.jboss.boot.log.file=<path>` so the module
    /// loader can set up logging before the booter reads its properties.
    pub fn boot_log_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.boot_log_file = Some(file.into());
        self
    }

    /// Module name for the loader's `-logmodule` flag.
    pub fn log_module(mut self, name: impl Into<String>) -> Self {
        self.log_module = Some(name.into());
        self
    }

    /// Build the command. Argument order: arg-line tokens, debug tokens,
    /// logging system properties, `-jar <loader> -mp <module-path>`,
    /// `-logmodule`, then the bootstrap module name as the final positional
    /// argument.
    pub fn build(self) -> Result<Command> {
        let mut cmd = Command::new(&self.executable);

        if let Some(line) = &self.arg_line {
            cmd.args(line.split_whitespace());
        }

        for (key, value) in &self.environment {
            cmd.env(key, value);
        }

        if let Some(line) = &self.debug_line {
            if !line.is_empty() {
                cmd.args(line.split_whitespace());
            }
        }

        if let Some(file) = &self.log_configuration {
            if !file.exists() {
                bail!(
                    "invalid value for -Dlogging.configuration, file not found: {}",
                    file.display()
                );
            }
            cmd.arg(format!(
                "-Dlogging.configuration={}",
                file_url(file)?
            ));
        }

        if let Some(file) = &self.boot_log_file {
            cmd.arg(format!("-Dorg.jboss.boot.log.file={}", file.display()));
        }

        cmd.arg("-jar");
        cmd.arg(&self.loader_jar);
        cmd.arg("-mp");
        cmd.arg(&self.module_path);
        if let Some(name) = &self.log_module {
            cmd.arg("-logmodule");
            cmd.arg(name);
        }
        cmd.arg(BOOTSTRAP_MODULE_NAME);

        cmd.current_dir(&self.working_directory);
        Ok(cmd)
    }
}

/// `file:` URL for an on-disk path, absolutized against the current
/// directory when relative.
fn file_url(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("resolving current directory")?
            .join(path)
    };
    Ok(format!("file://{}", absolute.display()))
}
