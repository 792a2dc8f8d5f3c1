use std::path::Path;

use anyhow::{bail, Context, Result};
use modpath_builder::{preflight, RunConfig};

fn usage() -> &'static str {
    "Usage:\n  modpath-builder materialize <config.toml>\n  modpath-builder fork <config.toml>\n  modpath-builder run <config.toml>"
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [cmd, config] if cmd == "materialize" => materialize(Path::new(config)),
        [cmd, config] if cmd == "fork" => fork(Path::new(config)),
        [cmd, config] if cmd == "run" => run(Path::new(config)),
        _ => bail!(usage()),
    }
}

fn materialize(config_path: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let repository = config.local_repository()?;
    let graph = config.dependency_nodes();

    let layout = config
        .materializer()
        .create_modules_directory(&graph, &repository)
        .with_context(|| format!("materializing modules for '{}'", config_path.display()))?;

    println!(
        "[materialize] {} at {}",
        match layout {
            modpath_builder::MaterializedLayout::Reused => "reused existing layout".to_string(),
            modpath_builder::MaterializedLayout::Generated { modules } =>
                format!("wrote {modules} module(s)"),
        },
        config.materialize.modules_directory.display()
    );
    Ok(())
}

/// Print the fork command line without executing it.
fn fork(config_path: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let cmd = config.fork_builder()?.build()?;

    let mut line = cmd.get_program().to_string_lossy().into_owned();
    for arg in cmd.get_args() {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    println!("{line}");
    Ok(())
}

fn run(config_path: &Path) -> Result<()> {
    let config = RunConfig::load(config_path)?;
    let repository = config.local_repository()?;
    let graph = config.dependency_nodes();

    config
        .materializer()
        .create_modules_directory(&graph, &repository)
        .with_context(|| format!("materializing modules for '{}'", config_path.display()))?;

    if let Some(fork) = &config.fork {
        preflight::locate_executable(&fork.executable)?;
    }

    let mut cmd = config.fork_builder()?.build()?;
    let status = cmd
        .status()
        .with_context(|| format!("spawning {}", cmd.get_program().to_string_lossy()))?;
    if !status.success() {
        bail!("forked process failed with status {status}");
    }
    Ok(())
}
