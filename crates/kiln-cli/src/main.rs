use anyhow::Result;
use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod console;

/// Incremental, parallel build pipeline for bootable kernel images.
///
/// kiln compiles a kernel tree with a fingerprint cache, links it in a
/// fixed object order and packages the result into a bootable ISO.
///
/// EXAMPLES:
///     kiln init                    Write kiln.toml and a linker script
///     kiln build                   Incremental dev build
///     kiln build --release         Clean optimized build
///     kiln build -j 8 -v           Eight workers, show every command
///     kiln clean --deep            Remove artifacts, cache and history
///     kiln history -n 5            Last five runs
///
/// ENVIRONMENT VARIABLES:
///     CC, LD            Compiler and linker programs
///     KILN_JOBS         Number of parallel compile jobs (0 = all cores)
///     KILN_INCREMENTAL  Set to '0' to force full rebuilds
///     KILN_PROFILE      Default build profile (dev or release)
///     NO_COLOR          Set to disable colored output
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Run as if started in this directory
    #[arg(long, short = 'C', global = true)]
    directory: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR", value_parser = FalseyValueParser::new())]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the kernel image
    ///
    /// Compiles changed sources, links, extracts the raw binary and
    /// packages the bootable image according to kiln.toml.
    ///
    /// EXAMPLES:
    ///     kiln build                    Build with the configured profile
    ///     kiln build --release          Release build (no debug info, no cache)
    ///     kiln build -O s --no-debug    Size-optimized without debug info
    ///     kiln build --no-parallel      Compile one unit at a time
    ///     kiln build --json             Machine-readable summary
    #[command(visible_alias = "b")]
    Build {
        /// Build profile (dev or release)
        #[arg(long, short = 'p')]
        profile: Option<String>,
        /// Build in release mode (shorthand for --profile=release)
        #[arg(long)]
        release: bool,
        /// Emit debug info regardless of profile
        #[arg(long, conflicts_with = "no_debug")]
        debug: bool,
        /// Omit debug info regardless of profile
        #[arg(long)]
        no_debug: bool,
        /// Optimization level (0, 1, 2, 3 or s)
        #[arg(short = 'O', long = "opt-level")]
        opt_level: Option<String>,
        /// Compile sequentially
        #[arg(long)]
        no_parallel: bool,
        /// Number of parallel compile jobs
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Ignore the fingerprint cache and rebuild everything
        #[arg(long)]
        no_incremental: bool,
        /// Gzip the packaged image
        #[arg(long)]
        compress: bool,
        /// Keep a timestamped copy of the packaged image
        #[arg(long)]
        backup: bool,
        /// Show every tool command line
        #[arg(long, short = 'v')]
        verbose: bool,
        /// Quiet output (errors only)
        #[arg(long, short = 'q')]
        quiet: bool,
        /// JSON output
        #[arg(long, env = "KILN_JSON", value_parser = FalseyValueParser::new())]
        json: bool,
    },

    /// Remove derived build artifacts
    ///
    /// Sources are never touched. The fingerprint cache and build history
    /// survive unless --deep is given.
    Clean {
        /// Also remove the fingerprint cache and build history
        #[arg(long)]
        deep: bool,
        /// List every removed path
        #[arg(long, short = 'v')]
        verbose: bool,
    },

    /// Show recent builds
    ///
    /// EXAMPLES:
    ///     kiln history                  Last ten runs
    ///     kiln history -n 3 --json      Last three runs as JSON
    History {
        /// Number of runs to show
        #[arg(long, short = 'n', default_value = "10")]
        count: usize,
        /// JSON output
        #[arg(long, env = "KILN_JSON", value_parser = FalseyValueParser::new())]
        json: bool,
    },

    /// Initialize a kiln project
    ///
    /// Writes a default kiln.toml and, if missing, the default x86_64
    /// linker script.
    #[command(visible_alias = "i")]
    Init {
        /// Overwrite an existing kiln.toml
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.no_color {
        console::disable_colors();
    }
    let project_dir = match cli.directory {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    match cli.command {
        Commands::Build {
            profile,
            release,
            debug,
            no_debug,
            opt_level,
            no_parallel,
            jobs,
            no_incremental,
            compress,
            backup,
            verbose,
            quiet,
            json,
        } => {
            let debug_info = if debug {
                Some(true)
            } else if no_debug {
                Some(false)
            } else {
                None
            };
            let args = commands::build::BuildArgs {
                profile,
                release,
                debug_info,
                opt_level,
                no_parallel,
                jobs,
                no_incremental,
                compress,
                backup,
                verbose,
                quiet,
                json,
                project_dir: Some(project_dir),
            };
            commands::build::run(args)?;
        }
        Commands::Clean { deep, verbose } => {
            commands::clean::run(&project_dir, deep, verbose)?;
        }
        Commands::History { count, json } => {
            commands::history::run(&project_dir, count, json)?;
        }
        Commands::Init { force } => {
            commands::init::run(&project_dir, force)?;
        }
    }

    Ok(())
}
