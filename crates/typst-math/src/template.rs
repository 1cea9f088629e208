//! The fixed Typst document wrapped around every math expression.
//!
//! The rendered document is the exact byte sequence that is hashed and fed to
//! the compiler, so any change here invalidates every existing cache entry.

/// Page setup emitted before the expression.
///
/// Automatic page size with a small fixed margin, so the compiled artifact is
/// cropped tightly around the math.
pub const TEMPLATE_PREAMBLE: &str = "#set page(width: auto, height: auto, margin: 3.14pt)";

/// Renders the Typst document for a math expression.
///
/// Lines are joined with `\n` and placed between display-math delimiters.
/// Nothing is escaped, trimmed or validated; invalid Typst is passed through
/// and left for the compiler to reject.
///
/// # Example
/// ```
/// use typst_math::template::render_document;
///
/// let doc = render_document(&["x^2 + y^2 = z^2"]);
/// assert_eq!(
///     doc,
///     "#set page(width: auto, height: auto, margin: 3.14pt)\n\n$ x^2 + y^2 = z^2 $"
/// );
/// ```
pub fn render_document<S: AsRef<str>>(lines: &[S]) -> String {
    let body = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\n$ {} $", TEMPLATE_PREAMBLE, body)
}
