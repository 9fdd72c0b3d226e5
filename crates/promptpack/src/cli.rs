//! Command-line interface.

use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::app::bundle::{BundleReport, BundleWriter};
use crate::app::filter::PathFilter;
use crate::app::ledger::{PatchInput, PatchLedger};
use crate::app::manifest::ManifestStore;
use crate::app::staging::Staging;
use crate::app::tokens::{CapacityReport, estimate_tokens};
use crate::app::tree::TreeModel;
use crate::infra::clipboard::SystemClipboard;
use crate::infra::config::Config;
use crate::infra::logging;
use crate::infra::tree_tool::{ExternalTree, TreeRenderer};
use crate::ui::app::{UiApp, UiOutcome};
use crate::ui::components::ledger_view::record_line;

/// Curate project files into a prompt bundle and apply exact-text patches
#[derive(Parser)]
#[command(name = "promptpack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Regenerate the bundle from the manifest without opening the interactive view
    #[arg(short, long)]
    quick: bool,

    /// Run as if started in DIR
    #[arg(short = 'C', long = "root", value_name = "DIR", global = true)]
    root: Option<PathBuf>,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Regenerate the bundle from the manifest
    Quick,

    /// Add files to the manifest and regenerate the bundle
    Add {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Drop files from the manifest
    Remove {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Apply a patch read from stdin: old text, a line with =====, new text
    Patch {
        file: PathBuf,
        /// Short description (at most 10 words)
        #[arg(required = true, trailing_var_arg = true)]
        description: Vec<String>,
    },

    /// Revert a recorded patch
    Unapply { id: u64 },

    /// Re-apply a reverted patch
    Reapply { id: u64 },

    /// List recorded patches
    History,

    /// Append a file, or a line range of it, to the staging file
    Stage {
        file: PathBuf,
        /// Inclusive 1-based line range, e.g. 10-40
        #[arg(long, value_name = "START-END", value_parser = parse_range)]
        lines: Option<(usize, usize)>,
    },

    /// Copy staged content to the clipboard and clear the staging file
    Flush,

    /// Print shell completions
    Completions { shell: Shell },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Some(Commands::Completions { shell }) = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "promptpack", &mut io::stdout());
        return Ok(());
    }

    if let Some(root) = &cli.root {
        env::set_current_dir(root)
            .with_context(|| format!("cannot change into {}", root.display()))?;
    }
    let project = Project::open()?;

    match cli.command {
        None if cli.quick => quick(&project),
        None => interactive(&project),
        Some(Commands::Quick) => quick(&project),
        Some(Commands::Add { files }) => add(&project, &files),
        Some(Commands::Remove { files }) => {
            let entries = project.manifest().remove(&files)?;
            println!("✅ {} files remain selected", entries.len());
            Ok(())
        }
        Some(Commands::Patch { file, description }) => patch(&project, &file, &description),
        Some(Commands::Unapply { id }) => {
            let record = project.ledger()?.unapply(id)?;
            println!("✅ Patch #{} unapplied: {}", record.id, project.display(&record.filepath));
            Ok(())
        }
        Some(Commands::Reapply { id }) => {
            let record = project.ledger()?.reapply(id)?;
            println!("✅ Patch #{} reapplied: {}", record.id, project.display(&record.filepath));
            Ok(())
        }
        Some(Commands::History) => history(&project),
        Some(Commands::Stage { file, lines }) => stage(&project, &file, lines),
        Some(Commands::Flush) => {
            let bytes = project.staging().flush(&mut SystemClipboard::new())?;
            println!("✅ Copied {bytes} bytes to clipboard");
            Ok(())
        }
        Some(Commands::Completions { .. }) => Ok(()),
    }
}

/// Resolved project root and its configuration.
struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    fn open() -> Result<Self> {
        let cwd = env::current_dir().context("unable to determine working directory")?;
        let root = fs::canonicalize(&cwd)
            .with_context(|| format!("cannot resolve project root {}", cwd.display()))?;
        let config = Config::load(&root)?;
        Ok(Self { root, config })
    }

    fn manifest(&self) -> ManifestStore {
        ManifestStore::new(self.config.paths.manifest_path(&self.root), &self.root)
    }

    fn ledger(&self) -> Result<PatchLedger> {
        Ok(PatchLedger::open(self.config.paths.ledger_path(&self.root))?)
    }

    fn staging(&self) -> Staging {
        Staging::new(self.config.paths.staging_path(&self.root))
    }

    fn tree(&self) -> Result<TreeModel> {
        let filter = PathFilter::from_config(&self.root, &self.config.scan)?;
        Ok(TreeModel::build(&self.root, &filter)?)
    }

    fn writer(&self) -> Result<BundleWriter> {
        let renderer: Option<Box<dyn TreeRenderer>> = if self.config.bundle.use_external_tree() {
            Some(Box::new(ExternalTree::new()))
        } else {
            None
        };
        Ok(BundleWriter::new(self.config.paths.output_path(&self.root))?.with_renderer(renderer))
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .display()
            .to_string()
    }

    fn print_report(&self, report: &BundleReport) {
        let tokens = estimate_tokens(&report.rendered);
        println!("✅ {} created!", self.display(&report.path));
        println!();
        println!("Included {} files", report.files);
        println!(
            "{}",
            CapacityReport::new(report.bytes, tokens, &self.config.capacity.models)
        );
    }
}

fn interactive(project: &Project) -> Result<()> {
    let manifest = project.manifest();
    let mut tree = project.tree()?;
    tree.mark_from_manifest(&manifest.load());

    let app = UiApp::new(
        tree,
        manifest,
        project.writer()?,
        project.config.paths.ledger_path(&project.root),
    );
    match app.run()? {
        UiOutcome::Quit => {}
        UiOutcome::NothingMarked => println!("❌ No files marked!"),
        UiOutcome::Bundle(report) => project.print_report(&report),
    }
    Ok(())
}

fn quick(project: &Project) -> Result<()> {
    let manifest = project.manifest();
    let paths = manifest.load();
    if paths.is_empty() {
        bail!("No files in {}!", manifest.path().display());
    }

    let mut tree = project.tree()?;
    tree.mark_from_manifest(&paths);
    let files = tree.marked_files();
    if files.is_empty() {
        bail!("No valid files found from {}!", manifest.path().display());
    }

    let report = project.writer()?.write(&tree, &files)?;
    project.print_report(&report);
    Ok(())
}

fn add(project: &Project, files: &[PathBuf]) -> Result<()> {
    let entries = project.manifest().add(files)?;
    println!("✅ Added {} files ({} selected)", files.len(), entries.len());
    quick(project)
}

fn patch(project: &Project, file: &Path, description: &[String]) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read patch from stdin")?;
    let input = PatchInput::parse(&input)?;

    let target = project.absolute(file);
    let id = project.ledger()?.apply(
        &target,
        &description.join(" "),
        &input.old_text,
        &input.new_text,
    )?;
    println!("✅ Patch #{id} applied: {}", project.display(&target));
    Ok(())
}

fn history(project: &Project) -> Result<()> {
    let ledger = project.ledger()?;
    if ledger.records().is_empty() {
        println!("No patches recorded");
        return Ok(());
    }
    for record in ledger.records() {
        println!("{}", record_line(record, &project.root));
    }
    Ok(())
}

fn stage(project: &Project, file: &Path, lines: Option<(usize, usize)>) -> Result<()> {
    let target = project.absolute(file);
    let staging = project.staging();
    let bytes = match lines {
        Some((start, end)) => staging.stage_lines(&target, &project.root, start, end)?,
        None => staging.stage_file(&target, &project.root)?,
    };
    println!("✅ Staged ./{} ({bytes} bytes)", project.display(&target));
    Ok(())
}

fn parse_range(input: &str) -> Result<(usize, usize), String> {
    let (start, end) = input
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{input}'"))?;
    let start = start
        .trim()
        .parse()
        .map_err(|_| format!("invalid start line '{start}'"))?;
    let end = end
        .trim()
        .parse()
        .map_err(|_| format!("invalid end line '{end}'"))?;
    Ok((start, end))
}
