//! Cache inspection commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use typst_math::{cache_dir_for, ContentKey, OutputFormat};
use walkdir::WalkDir;

/// Cache information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// Cache directory path
    pub cache_dir: PathBuf,
    /// Number of artifacts per format
    pub artifacts: BTreeMap<&'static str, u64>,
    /// Total size of artifacts in bytes
    pub total_size_bytes: u64,
}

impl CacheInfo {
    /// Total number of artifacts.
    pub fn entry_count(&self) -> u64 {
        self.artifacts.values().sum()
    }
}

/// Collects artifact statistics for the cache under `out_dir`.
///
/// Only files named `<content key>.<svg|png|pdf>` count as artifacts.
pub fn collect(out_dir: &Path) -> Result<CacheInfo> {
    let cache_dir = cache_dir_for(out_dir);
    let mut info = CacheInfo {
        cache_dir: cache_dir.clone(),
        artifacts: BTreeMap::new(),
        total_size_bytes: 0,
    };

    if !cache_dir.exists() {
        return Ok(info);
    }

    for entry in WalkDir::new(&cache_dir).max_depth(1) {
        let entry = entry.context("Failed to walk cache directory")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let stem = path.file_stem().and_then(|s| s.to_str());
        let ext = path.extension().and_then(|s| s.to_str());
        let (Some(stem), Some(ext)) = (stem, ext) else {
            continue;
        };
        let Some(format) = OutputFormat::from_extension(ext) else {
            continue;
        };
        if ContentKey::parse(stem).is_none() {
            continue;
        }

        *info.artifacts.entry(format.extension()).or_insert(0) += 1;
        info.total_size_bytes += entry.metadata().context("Failed to stat artifact")?.len();
    }

    Ok(info)
}

/// Show cache information
pub fn info(out_dir: &Path) -> Result<ExitCode> {
    println!("{}", "Cache Information".cyan().bold());

    let info = collect(out_dir)?;

    println!(
        "  {}: {}",
        "Cache directory".dimmed(),
        info.cache_dir.display()
    );
    println!("  {}: {}", "Entry count".dimmed(), info.entry_count());
    for (ext, count) in &info.artifacts {
        println!("    {}: {}", ext, count);
    }

    let size_mb = info.total_size_bytes as f64 / (1024.0 * 1024.0);
    if size_mb >= 1.0 {
        println!("  {}: {:.2} MB", "Total size".dimmed(), size_mb);
    } else {
        let size_kb = info.total_size_bytes as f64 / 1024.0;
        println!("  {}: {:.2} KB", "Total size".dimmed(), size_kb);
    }

    Ok(ExitCode::SUCCESS)
}
