// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! scriptview CLI - serve JavaScript request views or run a single script
//!
//! ## Commands
//!
//! - `serve`: mount the entry script under a base path and answer HTTP requests
//! - `run`: execute one script file and print its exports as JSON

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use scriptview_host::{
    Builtin, DbModule, HostConfig, RequestScriptView, RequirePolicy, ScriptEnvironment, ScriptLoader, Server,
    VERSION,
};
use scriptview_orm::Database;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "scriptview=info,scriptview_host=info,script=info";

#[derive(Parser)]
#[command(
    name = "scriptview",
    about = "Per-request JavaScript views with CommonJS modules",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the entry script over HTTP
    Serve(ServeArgs),

    /// Run a script file and print its exports
    Run(RunArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<String>,

    /// Path segment the view is mounted under
    #[arg(long)]
    base_path: Option<String>,

    /// Entry script, relative to the first search path
    #[arg(long)]
    entry: Option<PathBuf>,

    /// Module search path (repeatable)
    #[arg(short = 'I', long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// Reload changed scripts on every request
    #[arg(short, long)]
    development: bool,

    /// SQLite database exposed as the `db` module
    #[arg(long)]
    database: Option<PathBuf>,

    /// Template directory for `renderHTML`
    #[arg(long)]
    templates: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    /// Script to execute
    script: PathBuf,

    /// Module search path (repeatable); defaults to the current directory
    #[arg(short = 'I', long = "search-path")]
    search_paths: Vec<PathBuf>,

    /// SQLite database exposed as the `db` module
    #[arg(long)]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Run(args) => run_script(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("scriptview=debug,scriptview_host=debug,scriptview_orm=debug,script=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn serve_config(args: ServeArgs) -> anyhow::Result<HostConfig> {
    let mut config = HostConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(base) = args.base_path {
        config.set("base_path", &base)?;
    }
    if let Some(entry) = args.entry {
        config.entry = entry;
    }
    if !args.search_paths.is_empty() {
        config.search_paths = args.search_paths;
    }
    if args.development {
        config.development = true;
    }
    if args.database.is_some() {
        config.database = args.database;
    }
    if args.templates.is_some() {
        config.templates = args.templates;
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let config = serve_config(args)?;
    let view = RequestScriptView::from_config(&config).context("failed to set up the request view")?;

    println!(
        "{} v{} serving {} at http://{}/{}",
        "scriptview".bright_cyan().bold(),
        VERSION,
        config.entry.display().bright_white(),
        config.listen,
        config.base_path
    );
    if config.development {
        println!("{}", "development mode: scripts reload when they change".yellow());
    }

    Server::new(Arc::new(view)).run(&config.listen).await?;
    Ok(())
}

fn run_script(args: RunArgs) -> anyhow::Result<()> {
    let search_paths = if args.search_paths.is_empty() {
        vec![PathBuf::from(".")]
    } else {
        args.search_paths
    };
    let loader = Arc::new(ScriptLoader::new(&search_paths, false)?);
    let env = ScriptEnvironment::new(loader, RequirePolicy::Cached)?;
    for (id, builtin) in scriptview_host::modules::standard_modules() {
        env.install_builtin(id, builtin)?;
    }
    if let Some(path) = &args.database {
        let database = Database::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        env.install_builtin("db", Builtin::factory(DbModule::new(database)))?;
    }

    let exports = env
        .run_file(&args.script)
        .with_context(|| format!("{} failed", args.script.display()))?;
    println!("{}", serde_json::to_string_pretty(&exports)?);
    Ok(())
}
