use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use token_refactor::{
    compile_all, load_from_path, prompt_yes_no, AtomicWriter, CLexer, CacheStore, ConsoleReporter,
    JsonDirStore, Rewriter, RunSummary, Session, SkipCache, WorkspaceGuard,
};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "token-refactor")]
#[command(about = "Token-stream search and replace for source trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Log scan steps at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report matches without changing any file
    Check {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Rewrite matches, asking before each edit
    Apply {
        #[command(flatten)]
        run: RunArgs,

        /// Apply every edit without asking
        #[arg(short, long)]
        yes: bool,

        /// Show unified diff of each edit
        #[arg(short, long)]
        diff: bool,
    },

    /// List the patterns in a pattern file
    List {
        /// Pattern file (TOML)
        #[arg(short, long)]
        patterns: PathBuf,
    },

    /// Manage the skip cache
    Cache {
        #[command(subcommand)]
        action: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Delete every cache table
    Clear {
        /// Cache directory (default: ~/.cache/token-refactor)
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pattern file (TOML)
    #[arg(short, long)]
    patterns: PathBuf,

    /// Directory to scan
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Only files whose path ends with this suffix
    #[arg(long)]
    file: Option<String>,

    /// Only files whose path starts with this prefix
    #[arg(long)]
    folder: Option<String>,

    /// File extensions to scan
    #[arg(long = "ext", default_values_t = vec!["php".to_string()])]
    extensions: Vec<String>,

    /// Cache directory (default: ~/.cache/token-refactor)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the skip cache
    #[arg(long)]
    no_cache: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides; --verbose => debug; else warn
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "token_refactor=debug"
        } else {
            "token_refactor=warn"
        })
    });
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    match cli.command {
        Commands::Check { run } => cmd_run(run, true, false, false),
        Commands::Apply { run, yes, diff } => cmd_run(run, false, yes, diff),
        Commands::List { patterns } => cmd_list(&patterns),
        Commands::Cache {
            action: CacheCommand::Clear { cache_dir },
        } => cmd_cache_clear(cache_dir),
    }
}

fn default_cache_dir() -> Result<PathBuf> {
    let home = home::home_dir().context("could not determine home directory; pass --cache-dir")?;
    Ok(home.join(".cache").join("token-refactor"))
}

fn resolve_cache_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => default_cache_dir(),
    }
}

/// Files under `root` with one of `extensions`, narrowed by the run-level
/// suffix / prefix filters. `.git` and `skip_dir` are never entered.
fn discover_files(root: &Path, args: &RunArgs, skip_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.file_name() != ".git" && skip_dir.map_or(true, |dir| entry.path() != dir)
    });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let has_ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| args.extensions.iter().any(|want| want == ext));
        if !has_ext {
            continue;
        }
        let display = path.to_string_lossy().replace('\\', "/");
        if args.file.as_deref().is_some_and(|suffix| !display.ends_with(suffix)) {
            continue;
        }
        if args.folder.as_deref().is_some_and(|prefix| !display.starts_with(prefix)) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn cmd_run(args: RunArgs, check: bool, yes: bool, show_diff: bool) -> Result<()> {
    let lexer = CLexer::new();
    let config = load_from_path(&args.patterns)?;
    let compiled = compile_all(&config, &lexer);
    for err in &compiled.rejected {
        eprintln!("{} {}", "✗".red(), err);
    }
    if compiled.patterns.is_empty() {
        anyhow::bail!("no usable patterns in {}", args.patterns.display());
    }

    let cache_dir = if args.no_cache {
        None
    } else {
        Some(resolve_cache_dir(args.cache_dir.clone())?)
    };
    let mut cache = match &cache_dir {
        Some(dir) => SkipCache::new(JsonDirStore::new(dir)),
        None => SkipCache::disabled(),
    };

    // Absolute paths, so pattern `directory` filters see full paths
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("invalid root {}", args.root.display()))?;
    let skip_dir = cache_dir.as_ref().and_then(|dir| dir.canonicalize().ok());
    let files = discover_files(&root, &args, skip_dir.as_deref())?;
    println!(
        "Scanning {} file(s) with {} pattern(s){}",
        files.len(),
        compiled.patterns.len(),
        if check { " (check only)" } else { "" }
    );

    if !check && !yes {
        println!(
            "{} files under {} are edited in place",
            "⚠".yellow(),
            root.display()
        );
        if !prompt_yes_no("Is everything committed in git? [y/N] ") {
            println!("Aborted, nothing changed");
            return Ok(());
        }
    }

    let mut guard = WorkspaceGuard::new(&root)?;
    if let Some(dir) = &cache_dir {
        guard = guard.forbid(dir);
    }
    let mut writer = AtomicWriter::guarded(guard);
    let mut reporter = ConsoleReporter::new(yes, show_diff);

    let rewriter =
        Rewriter::new(&lexer, &mut reporter, &mut writer, &mut cache).detect_only(check);
    let summary = Session::new(rewriter).run(&compiled.patterns, &files);

    print_summary(&summary, check);

    if !summary.is_success(check) || !compiled.rejected.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, check: bool) {
    println!();
    for (path, count) in &summary.fixes {
        println!("  {} {} ({} fix(es))", "✓".green(), path.display(), count);
    }
    for (path, err) in &summary.errors {
        eprintln!("  {} {}: {}", "✗".red(), path.display(), err);
    }

    println!("{}", "Summary:".bold());
    println!("  {} file(s) scanned", summary.files);
    println!("  {} detected", format!("{}", summary.detected).yellow());
    if !check {
        println!("  {} applied", format!("{}", summary.applied).green());
        println!("  {} declined", format!("{}", summary.declined).yellow());
        println!("  {} refused", format!("{}", summary.refused).cyan());
    }
    println!(
        "  {} skipped (cached), {} skipped (filtered)",
        summary.skipped_cached, summary.skipped_filtered
    );
    println!("  {} error(s)", format!("{}", summary.errors.len()).red());
}

fn cmd_list(patterns: &Path) -> Result<()> {
    let lexer = CLexer::new();
    let config = load_from_path(patterns)?;
    let compiled = compile_all(&config, &lexer);

    if !config.meta.name.is_empty() {
        println!("{}", config.meta.name.bold());
    }
    if let Some(description) = &config.meta.description {
        println!("{}", description.dimmed());
    }
    for pattern in &compiled.patterns {
        let mode = if pattern.is_detect_only() {
            "detect".yellow()
        } else {
            "replace".green()
        };
        let cache = pattern.cache_key.as_deref().unwrap_or("-");
        println!("  {} [{}] cache: {}", pattern.id, mode, cache);
    }
    for err in &compiled.rejected {
        println!("  {} {}", "✗".red(), err);
    }

    if !compiled.rejected.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_cache_clear(cache_dir: Option<PathBuf>) -> Result<()> {
    let dir = resolve_cache_dir(cache_dir)?;
    let removed = JsonDirStore::new(&dir).clear()?;
    println!("Removed {} cache table(s) from {}", removed, dir.display());
    Ok(())
}
