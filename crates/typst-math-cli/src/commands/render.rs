//! Render command implementation
//!
//! Resolves a single expression and prints where its artifact lives.

use anyhow::{Context, Result};
use colored::Colorize;
use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use typst_math::{
    cache_dir_for, ArtifactResolver, OutputFormat, ResolveStatus, TypstCompiler, TypstMathConfig,
};

/// Run the render command
///
/// # Arguments
/// * `exprs` - Expression lines; read from stdin when empty
/// * `out_dir` - Build output directory
/// * `builder` - Builder format name (html, pdf, ...)
/// * `config` - Effective configuration
/// * `json` - Print the resolution as JSON
///
/// # Returns
/// Exit code: 0 on success, 1 if the expression failed to compile
pub fn run(
    exprs: &[String],
    out_dir: &Path,
    builder: &str,
    config: &TypstMathConfig,
    json: bool,
) -> Result<ExitCode> {
    let lines = if exprs.is_empty() {
        read_stdin_lines()?
    } else {
        exprs.to_vec()
    };

    let format = OutputFormat::from_builder_format(builder);
    let resolver = ArtifactResolver::new(
        config.resolver_config(&cache_dir_for(out_dir)),
        TypstCompiler::with_config(config.compiler_config()),
    );
    let resolution = resolver
        .resolve(&lines, format)
        .context("Failed to render typst math")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
    } else {
        let status = match resolution.status {
            ResolveStatus::Compiled => "COMPILED".green().bold(),
            ResolveStatus::Reused => "REUSED".cyan().bold(),
            ResolveStatus::Failed => "FAILED".red().bold(),
        };
        println!("  {} {}", status, resolution.artifact_path.display());
        println!("  {}: {}", "Key".dimmed(), resolution.key);
        if let Some(warning) = &resolution.warning {
            println!("  {} {}", "WARNING".yellow().bold(), warning);
        }
    }

    Ok(if resolution.status == ResolveStatus::Failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn read_stdin_lines() -> Result<Vec<String>> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read expression from stdin")?;
    Ok(input.lines().map(str::to_string).collect())
}
