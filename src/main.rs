use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use amitrace_core::{AmitraceConfig, OccurrenceLog, OutputFormat};
use amitrace_difflens::{Diff, DiffEngine, DiffOptions};
use amitrace_git::Repository;
use amitrace_history::report::{self, summary_line};
use amitrace_history::{classify_all, read_image_list, FsProbe, NoProbe, Scanner, StatusCounts, WorkingTreeProbe};

const CONFIG_FILE: &str = ".amitrace.toml";

#[derive(Parser)]
#[command(
    name = "amitrace",
    version,
    about = "Trace machine image names through git history",
    long_about = "amitrace walks the history of an infrastructure repository, records every\n\
                   added or removed line that mentions a tracked image name, and classifies\n\
                   each image as in use, no longer used, or never used.\n\n\
                   Examples:\n  \
                     amitrace scan --repo ./infra --images images.txt --classify\n  \
                     amitrace classify --input ami-occurrences.json --worktree ./infra\n  \
                     amitrace diff --repo ./infra HEAD --format json"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: .amitrace.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable summaries (default)\n  \
                         json      Machine-readable JSON\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Record image name occurrences across a repository's history
    #[command(long_about = "Record image name occurrences across a repository's history.\n\n\
        Every commit since the oldest image's creation date (minus a margin) is\n\
        diffed against its first parent. The occurrence log is written as JSON.\n\n\
        Examples:\n  amitrace scan --repo . --images images.txt\n  \
        amitrace scan --repo . --images images.txt --classify --format markdown")]
    Scan {
        /// Repository to scan
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Image list, one `amiId, creationDate, name` per line
        #[arg(long)]
        images: PathBuf,
        /// Where to write the occurrence log (default: from config)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Classify the images after scanning and print the report
        #[arg(long)]
        classify: bool,
        /// Working tree consulted when counts disagree (default: the repository)
        #[arg(long)]
        worktree: Option<PathBuf>,
    },
    /// Classify the images of a saved occurrence log
    Classify {
        /// Occurrence log written by `amitrace scan`
        #[arg(long)]
        input: PathBuf,
        /// Working tree consulted when counts disagree
        #[arg(long)]
        worktree: Option<PathBuf>,
        /// Write the classified log back to the input file
        #[arg(long)]
        write: bool,
    },
    /// Show the parsed diff of one commit
    Diff {
        /// Repository path
        #[arg(long, default_value = ".")]
        repo: PathBuf,
        /// Commit to show
        commit: String,
        /// Compare against this revision instead of the first parent
        #[arg(long)]
        before: Option<String>,
        /// Resume output at this file
        #[arg(long)]
        skip_to: Option<String>,
        /// Restrict the diff to these paths
        #[arg(last = true)]
        files: Vec<String>,
    },
    /// Create a default .amitrace.toml configuration file
    #[command(long_about = "Create a default .amitrace.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .amitrace.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorChoice {
    fn resolve(self, is_terminal: bool) -> bool {
        match self {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => is_terminal && std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# amitrace configuration

[git]
# executable = "git"
# timeout_secs = 360
# diff_timeout_secs = 60
# home_dir = "/tmp"
# pass_through_env = ["GNUPGHOME"]

[diff]
# max_lines = 4000
# max_line_characters = 5000
# max_files = 1000
# whitespace = "none"   # none | ignore-all | ignore-change | ignore-eol
# vendored_patterns = ["third_party/**"]
# generated_patterns = ["*.gen.tf"]

[encoding]
# charset_priority = ["UTF-8", "windows-1252"]
# ansi_charset = ""

[scan]
# repo_name = ""
# since_margin_days = 30
# creation_margin_days = 1
# output = "ami-occurrences.json"
"#;

fn init_tracing(verbose: bool, ansi: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(ansi)
                .with_target(false),
        )
        .init();
}

fn load_config(path: Option<&Path>) -> Result<AmitraceConfig> {
    match path {
        Some(path) => Ok(AmitraceConfig::from_file(path)?),
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                Ok(AmitraceConfig::from_file(default_path)?)
            } else {
                Ok(AmitraceConfig::default())
            }
        }
    }
}

fn progress_bar() -> Result<Option<indicatif::ProgressBar>> {
    if !std::io::stderr().is_terminal() {
        return Ok(None);
    }
    let pb = indicatif::ProgressBar::new(0);
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} [{bar:30}] {pos}/{len} commits {msg} ({elapsed})")
            .into_diagnostic()?
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(120));
    Ok(Some(pb))
}

fn print_report(log: &OccurrenceLog, format: OutputFormat) -> Result<()> {
    let out = report::render(log, format, Utc::now().fixed_offset())?;
    print!("{out}");
    if !out.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn run_scan(
    config: &AmitraceConfig,
    format: OutputFormat,
    repo_path: &Path,
    images_path: &Path,
    output: Option<PathBuf>,
    classify: bool,
    worktree: Option<PathBuf>,
) -> Result<()> {
    let repo = Repository::open(repo_path, config.git.clone())?;
    let images = read_image_list(images_path, config.scan.creation_margin_days)?;
    if images.is_empty() {
        miette::bail!(help = "add lines of the form `ami-0abc, 2024-01-10T08:00:00Z, name`", "{} lists no images", images_path.display());
    }

    let mut scanner = Scanner::new(&repo, config, images);
    let pb = progress_bar()?;
    let summary = scanner.scan(|pos, total, commit| {
        if let Some(pb) = &pb {
            pb.set_length(total as u64);
            pb.set_position(pos as u64);
            pb.set_message(commit.id.to_hex().chars().take(10).collect::<String>());
        }
    })?;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    let mut log = scanner.into_log();
    if classify {
        let root = worktree.unwrap_or_else(|| repo_path.to_path_buf());
        classify_all(&mut log.images, &FsProbe::new(root))?;
    }

    let output = output.unwrap_or_else(|| config.scan.output.clone());
    log.write_to(&output)?;
    tracing::info!(path = %output.display(), "wrote occurrence log");

    if classify {
        return print_report(&log, format);
    }
    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "commits": summary.commits,
                "scanned": summary.scanned,
                "skipped": summary.skipped,
                "occurrences": summary.occurrences,
                "output": output,
            });
            println!("{}", serde_json::to_string_pretty(&value).into_diagnostic()?);
        }
        OutputFormat::Markdown => {
            println!("| Commits | Scanned | Skipped | Occurrences |");
            println!("|---|---|---|---|");
            println!(
                "| {} | {} | {} | {} |",
                summary.commits, summary.scanned, summary.skipped, summary.occurrences
            );
            println!("\nOccurrence log: `{}`", output.display());
        }
        OutputFormat::Text => {
            println!(
                "Scanned {} of {} commits ({} skipped), {} occurrences",
                summary.scanned, summary.commits, summary.skipped, summary.occurrences
            );
            println!("Occurrence log written to {}", output.display());
        }
    }
    Ok(())
}

fn run_classify(format: OutputFormat, input: &Path, worktree: Option<PathBuf>, write: bool) -> Result<()> {
    let mut log = OccurrenceLog::read_from(input)?;
    let probe: Box<dyn WorkingTreeProbe> = match worktree {
        Some(root) => Box::new(FsProbe::new(root)),
        None => Box::new(NoProbe),
    };
    let counts: StatusCounts = classify_all(&mut log.images, probe.as_ref())?;
    tracing::debug!(summary = %summary_line(&counts), "classified");
    if write {
        log.write_to(input)?;
    }
    print_report(&log, format)
}

fn format_diff_text(diff: &Diff, use_color: bool) -> String {
    let mut out = String::new();
    for file in &diff.files {
        let mut flags = Vec::new();
        if file.is_bin {
            flags.push("binary");
        }
        if file.is_lfs_file {
            flags.push("lfs");
        }
        if file.is_vendored {
            flags.push("vendored");
        }
        if file.is_generated {
            flags.push("generated");
        }
        if file.is_incomplete {
            flags.push("incomplete");
        }
        let name = if file.is_renamed && file.old_name != file.name {
            format!("{} -> {}", file.old_name, file.name)
        } else {
            file.name.clone()
        };
        let counts = if use_color {
            format!("\x1b[32m+{}\x1b[0m \x1b[31m-{}\x1b[0m", file.addition, file.deletion)
        } else {
            format!("+{} -{}", file.addition, file.deletion)
        };
        let _ = write!(out, "{:>4}  {name} ({}, {counts})", file.index, file.kind);
        if let Some(lang) = &file.language {
            let _ = write!(out, " [{lang}]");
        }
        if !flags.is_empty() {
            let _ = write!(out, " {{{}}}", flags.join(", "));
        }
        out.push('\n');
    }
    let _ = writeln!(
        out,
        "\n{} files changed, {} insertions(+), {} deletions(-)",
        diff.num_files, diff.total_addition, diff.total_deletion
    );
    if diff.is_incomplete {
        match &diff.end {
            Some(end) => {
                let _ = writeln!(out, "Diff truncated; resume with --skip-to {end:?}");
            }
            None => out.push_str("Diff truncated\n"),
        }
    }
    out
}

fn format_diff_markdown(diff: &Diff) -> String {
    let mut out = String::from("| # | File | Change | + | - | Language |\n|---|---|---|---|---|---|\n");
    for file in &diff.files {
        let _ = writeln!(
            out,
            "| {} | `{}` | {} | {} | {} | {} |",
            file.index,
            file.name,
            file.kind,
            file.addition,
            file.deletion,
            file.language.as_deref().unwrap_or("")
        );
    }
    let _ = writeln!(
        out,
        "\n**{}** files, **+{}** / **-{}**",
        diff.num_files, diff.total_addition, diff.total_deletion
    );
    out
}

#[allow(clippy::too_many_arguments)]
fn run_diff(
    config: &AmitraceConfig,
    format: OutputFormat,
    use_color: bool,
    repo_path: &Path,
    commit: String,
    before: Option<String>,
    skip_to: Option<String>,
    files: Vec<String>,
) -> Result<()> {
    let repo = Repository::open(repo_path, config.git.clone())?;
    let engine = DiffEngine::from_config(&repo, config);

    let mut opts = DiffOptions::from_config(&config.diff, commit)
        .with_files(files)
        .with_shortstat(true);
    if let Some(before) = before {
        opts = opts.with_before(before);
    }
    if let Some(name) = skip_to {
        opts = opts.with_skip_to(name);
    }
    let diff = engine.get_diff(&opts)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&diff).into_diagnostic()?),
        OutputFormat::Markdown => print!("{}", format_diff_markdown(&diff)),
        OutputFormat::Text => print!("{}", format_diff_text(&diff, use_color)),
    }
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.color.resolve(std::io::stderr().is_terminal()));
    let use_color = cli.color.resolve(std::io::stdout().is_terminal());

    match cli.command {
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
            return Ok(());
        }
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "amitrace", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(cli.config.as_deref())?;
    tracing::debug!(format = %cli.format, "configuration loaded");

    match cli.command {
        Command::Scan {
            repo,
            images,
            output,
            classify,
            worktree,
        } => run_scan(&config, cli.format, &repo, &images, output, classify, worktree),
        Command::Classify { input, worktree, write } => run_classify(cli.format, &input, worktree, write),
        Command::Diff {
            repo,
            commit,
            before,
            skip_to,
            files,
        } => run_diff(&config, cli.format, use_color, &repo, commit, before, skip_to, files),
        Command::Init | Command::Completions { .. } => Ok(()),
    }
}
