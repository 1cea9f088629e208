//! Build command implementation
//!
//! Rewrites Markdown documents, replacing `typst-math` blocks with images.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use typst_math::config::{CONFIG_ON_ERROR, CONFIG_RECOMPILE, CONFIG_TIMEOUT, CONFIG_TYPST};
use typst_math::{setup, Application, BuilderInfo, TypstMathConfig};
use walkdir::WalkDir;

use crate::markdown::process_document;

/// Summary of a build run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub documents: usize,
    pub blocks: usize,
    pub warnings: usize,
}

/// Run the build command
///
/// # Returns
/// Exit code: 0 on success, 1 if any block produced a warning and
/// `fail_on_warning` is set
pub fn run(
    input: &Path,
    out_dir: &Path,
    builder: &str,
    config: &TypstMathConfig,
    fail_on_warning: bool,
) -> Result<ExitCode> {
    println!("{}", "Building typst math...".cyan().bold());

    let summary = build(input, out_dir, builder, config)?;

    println!(
        "  {} {} {}, {} math {}",
        "SUCCESS".green().bold(),
        summary.documents,
        if summary.documents == 1 { "document" } else { "documents" },
        summary.blocks,
        if summary.blocks == 1 { "block" } else { "blocks" }
    );
    if summary.warnings > 0 {
        println!(
            "  {} {} {}",
            "!!".yellow(),
            summary.warnings,
            if summary.warnings == 1 { "warning" } else { "warnings" }
        );
    }

    Ok(if fail_on_warning && summary.warnings > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Processes every Markdown document under `input` into `out_dir`.
pub fn build(
    input: &Path,
    out_dir: &Path,
    builder: &str,
    config: &TypstMathConfig,
) -> Result<BuildSummary> {
    let mut app = Application::new(BuilderInfo::new(out_dir, builder));
    setup(&mut app);
    apply_config(&mut app, config)?;

    let documents = collect_documents(input, out_dir)?;
    let mut summary = BuildSummary::default();

    for (source, rel) in documents {
        let text = fs::read_to_string(&source)
            .with_context(|| format!("Failed to read document: {}", source.display()))?;

        let processed = process_document(&app, &text, &source, &rel)
            .with_context(|| format!("Failed to process document: {}", source.display()))?;

        for diagnostic in &processed.diagnostics {
            eprintln!("{}", diagnostic.to_string().yellow());
        }

        let target = out_dir.join(&rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create output directory: {}", parent.display())
            })?;
        }
        fs::write(&target, processed.text)
            .with_context(|| format!("Failed to write document: {}", target.display()))?;

        tracing::info!(
            source = %source.display(),
            blocks = processed.blocks,
            "processed document"
        );

        summary.documents += 1;
        summary.blocks += processed.blocks;
        summary.warnings += processed.diagnostics.len();
    }

    Ok(summary)
}

/// Pushes the CLI configuration into the host config registry.
fn apply_config(app: &mut Application, config: &TypstMathConfig) -> Result<()> {
    app.set_config(CONFIG_TYPST, serde_json::Value::from(config.typst.clone()))?;
    app.set_config(CONFIG_RECOMPILE, serde_json::to_value(config.recompile)?)?;
    app.set_config(CONFIG_ON_ERROR, serde_json::to_value(config.on_compile_error)?)?;
    app.set_config(CONFIG_TIMEOUT, serde_json::Value::from(config.timeout_secs))?;
    Ok(())
}

/// Lists `(source, relative output path)` pairs for the Markdown input.
///
/// A single file maps to its file name; a directory is walked recursively,
/// skipping `out_dir` if it lives inside the input.
fn collect_documents(input: &Path, out_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
    if input.is_file() {
        let name = input
            .file_name()
            .with_context(|| format!("Invalid input path: {}", input.display()))?;
        return Ok(vec![(input.to_path_buf(), PathBuf::from(name))]);
    }
    if !input.is_dir() {
        bail!("Input not found: {}", input.display());
    }

    let mut documents = Vec::new();
    let walker = WalkDir::new(input)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != out_dir);
    for entry in walker {
        let entry = entry.context("Failed to walk input directory")?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }
        let rel = path
            .strip_prefix(input)
            .context("Walked outside input directory")?
            .to_path_buf();
        documents.push((path.to_path_buf(), rel));
    }
    Ok(documents)
}
