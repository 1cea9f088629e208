//! typst-math CLI library.
//!
//! A small Markdown documentation host for the `typst-math` directive, plus
//! render, diagnostics and cache inspection commands.

pub mod commands;
pub mod logging;
pub mod markdown;
pub mod settings;
