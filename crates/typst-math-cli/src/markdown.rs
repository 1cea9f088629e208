//! Markdown host for the `typst-math` directive.
//!
//! Fenced code blocks whose info string is `typst-math` are directive
//! occurrences:
//!
//! ````markdown
//! ```typst-math
//! x^2 + y^2 = z^2
//! ```
//! ````
//!
//! Each block is replaced by an HTML `<img>` pointing at the compiled
//! artifact. Fences of other languages are left alone, including any
//! `typst-math` fence nested inside them.

use std::path::Path;
use typst_math::directive::{Diagnostic, Node, DIRECTIVE_NAME};
use typst_math::{Application, ArtifactReference, OutputFormat, SourceLocation, TypstMathResult};

/// A `typst-math` block found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathBlock {
    /// 0-based index of the opening fence line.
    pub start: usize,
    /// 0-based index one past the closing fence (or end of document).
    pub end: usize,
    /// Body lines, verbatim.
    pub content: Vec<String>,
}

impl MathBlock {
    /// 1-based line number of the opening fence.
    pub fn line(&self) -> usize {
        self.start + 1
    }
}

#[derive(Debug, Clone, Copy)]
struct Fence {
    marker: char,
    len: usize,
}

/// Parses an opening fence, returning it and its info string.
fn opening_fence(line: &str) -> Option<(Fence, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((Fence { marker, len }, info))
}

fn closes(fence: Fence, line: &str) -> bool {
    let trimmed = line.trim_start_matches(' ');
    if line.len() - trimmed.len() > 3 {
        return false;
    }
    let len = trimmed.chars().take_while(|c| *c == fence.marker).count();
    len >= fence.len && trimmed[len..].trim().is_empty()
}

/// Finds every `typst-math` block in `text`.
///
/// An unclosed block extends to the end of the document.
pub fn find_blocks(text: &str) -> Vec<MathBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some((fence, info)) = opening_fence(lines[i]) else {
            i += 1;
            continue;
        };
        let start = i;
        let mut j = i + 1;
        while j < lines.len() && !closes(fence, lines[j]) {
            j += 1;
        }
        let end = (j + 1).min(lines.len());

        if info.split_whitespace().next() == Some(DIRECTIVE_NAME) {
            blocks.push(MathBlock {
                start,
                end,
                content: lines[start + 1..j].iter().map(|s| s.to_string()).collect(),
            });
        }
        i = end;
    }

    blocks
}

/// Renders an image node as HTML.
///
/// `asset_prefix` is prepended to the artifact file name so the link is
/// relative to the output document.
pub fn render_image(
    reference: &ArtifactReference,
    format: OutputFormat,
    asset_prefix: &str,
) -> String {
    let file_name = reference
        .concrete_uri(format)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let style = match reference.align.as_str() {
        "left" => "display: block; margin-right: auto;",
        "right" => "display: block; margin-left: auto;",
        _ => "display: block; margin: 0 auto;",
    };
    format!(
        "<img src=\"{}{}\" class=\"{}\" style=\"{}\" alt=\"math\" />",
        asset_prefix,
        file_name,
        reference.classes.join(" "),
        style
    )
}

/// Relative link prefix from a document at `rel_doc` (relative to the
/// output root) to the artifact cache directory.
pub fn asset_prefix(rel_doc: &Path) -> String {
    let depth = rel_doc
        .parent()
        .map(|p| p.components().count())
        .unwrap_or(0);
    let mut prefix = "../".repeat(depth);
    prefix.push_str("assets/typst_math/");
    prefix
}

/// Result of processing one document.
#[derive(Debug, Clone, Default)]
pub struct ProcessedDocument {
    /// Rewritten Markdown.
    pub text: String,
    /// Number of blocks replaced.
    pub blocks: usize,
    /// Warnings raised by directive runs.
    pub diagnostics: Vec<Diagnostic>,
}

/// Replaces every `typst-math` block in `text` with an image.
///
/// `source` names the document in diagnostics; `rel_doc` is its path
/// relative to the output root.
pub fn process_document(
    app: &Application,
    text: &str,
    source: &Path,
    rel_doc: &Path,
) -> TypstMathResult<ProcessedDocument> {
    let lines: Vec<&str> = text.lines().collect();
    let blocks = find_blocks(text);
    let format = app.builder().output_format();
    let prefix = asset_prefix(rel_doc);

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut diagnostics = Vec::new();
    let mut cursor = 0;

    for block in &blocks {
        out.extend(lines[cursor..block.start].iter().map(|s| s.to_string()));

        let location = SourceLocation::new(source, block.line());
        let output = app.run_directive(DIRECTIVE_NAME, &block.content, &location)?;
        for node in &output.nodes {
            match node {
                Node::Image(reference) => out.push(render_image(reference, format, &prefix)),
            }
        }
        diagnostics.extend(output.diagnostics);
        cursor = block.end;
    }
    out.extend(lines[cursor..].iter().map(|s| s.to_string()));

    let mut rewritten = out.join("\n");
    if text.ends_with('\n') {
        rewritten.push('\n');
    }

    Ok(ProcessedDocument {
        text: rewritten,
        blocks: blocks.len(),
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_find_single_block() {
        let text = "# Title\n\n```typst-math\nx^2 + y^2 = z^2\n```\n\nAfter.\n";
        let blocks = find_blocks(text);
        assert_eq!(
            blocks,
            vec![MathBlock {
                start: 2,
                end: 5,
                content: vec!["x^2 + y^2 = z^2".to_string()],
            }]
        );
        assert_eq!(blocks[0].line(), 3);
    }

    #[test]
    fn test_body_kept_verbatim() {
        let text = "~~~~ typst-math\n  a &= b \\\n\n  &= c\n~~~~\n";
        let blocks = find_blocks(text);
        assert_eq!(blocks[0].content, vec!["  a &= b \\", "", "  &= c"]);
    }

    #[test]
    fn test_other_languages_ignored() {
        let text = "```rust\nfn main() {}\n```\n```typst-math\nx\n```\n";
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, vec!["x"]);
    }

    #[test]
    fn test_nested_fence_not_a_directive() {
        let text = "````markdown\n```typst-math\nx\n```\n````\n";
        assert!(find_blocks(text).is_empty());
    }

    #[test]
    fn test_short_closing_fence_does_not_close() {
        let text = "````typst-math\nx\n```\ny\n````\n";
        let blocks = find_blocks(text);
        assert_eq!(blocks[0].content, vec!["x", "```", "y"]);
    }

    #[test]
    fn test_unclosed_block_runs_to_end() {
        let text = "```typst-math\nx\ny";
        let blocks = find_blocks(text);
        assert_eq!(blocks[0].content, vec!["x", "y"]);
        assert_eq!(blocks[0].end, 3);
    }

    #[test]
    fn test_indented_code_is_not_a_fence() {
        assert!(find_blocks("    ```typst-math\n    x\n    ```\n").is_empty());
    }

    #[test]
    fn test_asset_prefix() {
        assert_eq!(asset_prefix(Path::new("index.md")), "assets/typst_math/");
        assert_eq!(
            asset_prefix(Path::new("guide/math/intro.md")),
            "../../assets/typst_math/"
        );
    }

    #[test]
    fn test_render_image() {
        let reference =
            ArtifactReference::for_artifact(Path::new("/out/assets/typst_math/abc.svg"));
        let html = render_image(&reference, OutputFormat::Vector, "../assets/typst_math/");
        assert_eq!(
            html,
            "<img src=\"../assets/typst_math/abc.svg\" class=\"typst-math\" \
             style=\"display: block; margin: 0 auto;\" alt=\"math\" />"
        );
    }

    #[test]
    fn test_render_image_host_alignment() {
        let mut reference = ArtifactReference::for_artifact(Path::new("/c/abc.svg"));
        reference.align = "left".to_string();
        let html = render_image(&reference, OutputFormat::Raster, "");
        assert!(html.contains("src=\"abc.png\""));
        assert!(html.contains("margin-right: auto;"));
    }
}
