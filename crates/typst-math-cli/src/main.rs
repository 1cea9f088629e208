//! typst-math CLI - render Typst math blocks in Markdown documentation
//!
//! This binary hosts the `typst-math` directive for Markdown sources and
//! provides commands for rendering single expressions and inspecting the
//! artifact cache.

use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use typst_math_cli::commands;
use typst_math_cli::logging;
use typst_math_cli::settings::ConfigArgs;

/// typst-math - Typst math for documentation builds
#[derive(Parser)]
#[command(name = "typst-math")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one expression into the artifact cache
    Render {
        /// Expression line (repeat for multi-line math; reads stdin if omitted)
        #[arg(short, long = "expr")]
        exprs: Vec<String>,

        /// Build output directory
        #[arg(short, long, default_value = "_build")]
        out_dir: PathBuf,

        /// Builder format (html -> svg, pdf -> pdf, anything else -> png)
        #[arg(short, long, default_value = "html")]
        builder: String,

        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace typst-math blocks in Markdown documents with images
    Build {
        /// Markdown file or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Build output directory
        #[arg(short, long, default_value = "_build")]
        out_dir: PathBuf,

        /// Builder format (html -> svg, pdf -> pdf, anything else -> png)
        #[arg(short, long, default_value = "html")]
        builder: String,

        /// Exit non-zero if any block produced a warning
        #[arg(long)]
        fail_on_warning: bool,
    },

    /// Check the typst installation and output directory
    Doctor {
        /// Build output directory
        #[arg(short, long, default_value = "_build")]
        out_dir: PathBuf,
    },

    /// Artifact cache inspection
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cache information (artifact count, total size)
    Info {
        /// Build output directory
        #[arg(short, long, default_value = "_build")]
        out_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = cli.config.load().and_then(|config| match cli.command {
        Commands::Render {
            exprs,
            out_dir,
            builder,
            json,
        } => commands::render::run(&exprs, &out_dir, &builder, &config, json),
        Commands::Build {
            input,
            out_dir,
            builder,
            fail_on_warning,
        } => commands::build::run(&input, &out_dir, &builder, &config, fail_on_warning),
        Commands::Doctor { out_dir } => commands::doctor::run(&out_dir, &config),
        Commands::Cache { command } => match command {
            CacheCommands::Info { out_dir } => commands::cache::info(&out_dir),
        },
    });

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
