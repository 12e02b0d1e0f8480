//! dirscope: terminal disk usage analyser with a live system-resource strip.
//!
//! Thin binary entry point. All logic lives in the `dirscope-core`
//! and `dirscope-tui` crates.

use anyhow::Context;
use clap::Parser;
use dirscope_core::config::Config;
use dirscope_tui::RunContext;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dirscope", version, about)]
struct Args {
    /// Directory to analyse. Defaults to your home directory.
    root: Option<PathBuf>,

    /// Show what a delete would free without removing anything.
    #[arg(long, env = "DIRSCOPE_DRY_RUN")]
    dry_run: bool,

    /// Verbose diagnostics (every per-entry scan error) in the log file.
    #[arg(long, env = "DIRSCOPE_DEBUG")]
    debug: bool,

    /// Number of scan workers (1-16). Defaults to the number of CPUs.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Descend into symlinks that point at directories.
    #[arg(long)]
    follow_symlinks: bool,

    /// Keep the subtree cache in this file between runs.
    #[arg(long, env = "DIRSCOPE_CACHE_FILE")]
    cache_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let root = match args.root {
        Some(root) => root,
        None => dirs::home_dir().context("no home directory; pass a path to scan")?,
    };

    let mut config = Config {
        dry_run: args.dry_run,
        debug: args.debug,
        follow_symlinks: args.follow_symlinks,
        cache_file: args.cache_file,
        ..Config::default()
    };
    if let Some(jobs) = args.jobs {
        config = config.with_concurrency(jobs);
    }

    let ctx = RunContext::init(config, root)?;
    let result = dirscope_tui::run(&ctx);
    ctx.teardown();
    result
}
