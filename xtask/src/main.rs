use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};

#[derive(Parser)]
#[command(author, version, about = "Project automation commands", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test suite with cargo nextest, or cargo test when nextest is missing
    Test {
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        release: bool,
    },
    /// Write shell completion scripts for promptpack
    Completions {
        #[arg(long, default_value = "target/completions")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Test { profile, release } => run_tests(profile, release)?,
        Commands::Completions { out_dir } => write_completions(&out_dir)?,
    }
    Ok(())
}

fn nextest_available() -> bool {
    Command::new("cargo")
        .args(["nextest", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn run_tests(profile: Option<String>, release: bool) -> Result<()> {
    let mut cmd = Command::new("cargo");
    if nextest_available() {
        cmd.arg("nextest").arg("run").arg("--workspace");
        if let Some(profile) = profile {
            cmd.arg("--profile").arg(profile);
        }
    } else {
        eprintln!("cargo-nextest not found, falling back to cargo test");
        cmd.arg("test").arg("--workspace");
    }
    if release {
        cmd.arg("--release");
    }
    let status = cmd.status()?;
    if !status.success() {
        anyhow::bail!("test run failed");
    }
    Ok(())
}

fn write_completions(out_dir: &PathBuf) -> Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    for (shell, file) in [
        ("bash", "promptpack.bash"),
        ("zsh", "_promptpack"),
        ("fish", "promptpack.fish"),
    ] {
        let output = Command::new("cargo")
            .args(["run", "--quiet", "-p", "promptpack", "--", "completions", shell])
            .output()
            .with_context(|| format!("failed to generate {shell} completions"))?;
        if !output.status.success() {
            anyhow::bail!(
                "promptpack completions {shell} failed: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        let path = out_dir.join(file);
        fs::write(&path, output.stdout)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
