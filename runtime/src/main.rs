// Copyright 2026 SmartSpider Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use smartspider_runtime::cli;
use smartspider_runtime::cli::run_cmd::RunArgs;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "smartspider",
    about = "SmartSpider: LLM-guided web extraction",
    version,
    after_help = "Run 'smartspider <command> --help' for details on each command."
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error). RUST_LOG wins when set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract records from one or more pages
    Run(Box<RunArgs>),
    /// Fetch a page and print its DOM summary
    Summarize {
        url: String,
        /// Indent the JSON
        #[arg(long)]
        pretty: bool,
        #[command(flatten)]
        render: cli::RenderArgs,
    },
    /// Check render backends and model credentials
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_format);

    let result = match cli.command {
        Commands::Run(args) => cli::run_cmd::run(*args).await,
        Commands::Summarize {
            url,
            pretty,
            render,
        } => cli::summarize_cmd::run(&url, &render, pretty).await,
        Commands::Doctor => cli::doctor::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "smartspider", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
}
