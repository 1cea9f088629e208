//! Doctor command implementation
//!
//! Checks the typst installation and output directory.

use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;
use typst_math::{CompileError, TypstCompiler, TypstMathConfig};

/// Run the doctor command
///
/// Checks:
/// - Typst installation
/// - Output directory permissions
/// - Effective configuration
///
/// # Returns
/// Exit code: 0 if all checks pass, 1 if any fail
pub fn run(out_dir: &Path, config: &TypstMathConfig) -> Result<ExitCode> {
    println!("{}", "typst-math Doctor".cyan().bold());
    println!("{}", "=================".cyan());
    println!();

    let mut all_ok = true;

    println!("{}", "Versions:".bold());
    println!(
        "  {} typst-math v{}",
        "->".green(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("{}", "Dependencies:".bold());
    if !check_typst(config) {
        all_ok = false;
    }
    println!();

    println!("{}", "Permissions:".bold());
    match check_writable(out_dir) {
        Ok(()) => {
            println!(
                "  {} Output directory is writable ({})",
                "ok".green(),
                out_dir.display()
            );
        }
        Err(e) => {
            println!("  {} Cannot write to output directory: {}", "!!".red(), e);
            all_ok = false;
        }
    }
    println!();

    println!("{}", "Configuration:".bold());
    println!("  {}: {}", "typst".dimmed(), config.typst);
    println!("  {}: {:?}", "recompile".dimmed(), config.recompile);
    println!("  {}: {:?}", "on_compile_error".dimmed(), config.on_compile_error);
    match config.timeout() {
        Some(t) => println!("  {}: {}s", "timeout".dimmed(), t.as_secs()),
        None => println!("  {}: none", "timeout".dimmed()),
    }
    println!();

    if all_ok {
        println!("{}", "All checks passed.".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", "Some checks failed.".red().bold());
        Ok(ExitCode::FAILURE)
    }
}

/// Reports whether the configured typst resolves and runs.
fn check_typst(config: &TypstMathConfig) -> bool {
    let compiler = TypstCompiler::with_config(config.compiler_config());
    match compiler.locate() {
        Ok(path) => match compiler.version() {
            Ok(version) => {
                println!("  {} {} ({})", "ok".green(), version, path.display());
                true
            }
            Err(e) => {
                println!(
                    "  {} typst found at {} but failed: {}",
                    "!!".red(),
                    path.display(),
                    e
                );
                false
            }
        },
        Err(CompileError::CompilerNotFound { program }) => {
            println!("  {} '{}' not found in PATH", "!!".red(), program);
            println!(
                "     {}",
                "Install from https://github.com/typst/typst/releases".dimmed()
            );
            false
        }
        Err(e) => {
            println!("  {} typst check failed: {}", "!!".red(), e);
            false
        }
    }
}

fn check_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let test_file = dir.join(".typst_math_write_test");
    std::fs::write(&test_file, "test")?;
    let _ = std::fs::remove_file(&test_file);
    Ok(())
}
