use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::Command;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Build the dlsym-hook shared library
    BuildHook {
        #[arg(long)]
        release: bool,
    },
    /// Build the hook and run a command with it preloaded
    Preload {
        #[arg(long)]
        release: bool,
        /// Command and arguments to run
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildHook { release } => {
            build_hook(release)?;
        }
        Cmd::Preload { release, command } => preload(release, &command)?,
    }

    Ok(())
}

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..")
}

fn hook_path(release: bool) -> PathBuf {
    let target_dir = std::env::var_os("CARGO_TARGET_DIR").map_or_else(|| workspace_root().join("target"), PathBuf::from);
    let profile = if release { "release" } else { "debug" };
    target_dir.join(profile).join("libdlsym_hook.so")
}

fn build_hook(release: bool) -> Result<PathBuf> {
    let mut cmd = Command::new("cargo");
    cmd.current_dir(workspace_root()).arg("build").arg("--package").arg("dlsym-hook");
    if release {
        cmd.arg("--release");
    }

    let status = cmd.status().context("Failed to run cargo build for dlsym-hook")?;
    if !status.success() {
        anyhow::bail!("Failed to build dlsym-hook");
    }

    let path = hook_path(release);
    if !path.exists() {
        anyhow::bail!("Build succeeded but {} is missing", path.display());
    }

    println!("✓ dlsym-hook built successfully");
    println!("  Library: {}", path.display());
    println!("  Profile: {}", if release { "release" } else { "debug" });

    Ok(path)
}

fn preload(release: bool, command: &[String]) -> Result<()> {
    let library = build_hook(release)?;
    let library = library.canonicalize().with_context(|| format!("Failed to resolve {}", library.display()))?;

    let (program, rest) = command.split_first().context("Missing command to run")?;
    let preload = match std::env::var("LD_PRELOAD") {
        Ok(existing) if !existing.is_empty() => format!("{}:{existing}", library.display()),
        _ => library.display().to_string(),
    };

    let status = Command::new(program)
        .args(rest)
        .env("LD_PRELOAD", preload)
        .status()
        .with_context(|| format!("Failed to run {program}"))?;

    if !status.success() {
        anyhow::bail!("{program} exited with {status}");
    }
    Ok(())
}
