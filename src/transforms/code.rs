//! Code-signature preservation: keep declarations, elide bodies.

use super::{Protected, Transform};
use crate::analyzer::{ContentCategory, fence_marker};
use crate::errors::TransformError;
use crate::strategy::TransformKind;
use regex::Regex;
use std::sync::LazyLock;

/// Lines that declare something a reader needs to navigate the code.
static SIGNATURE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:(?:pub(?:\([^)]*\))?|export|async|unsafe|extern|default|abstract|static|public|private|protected)\s+)*(?:fn|struct|enum|trait|impl|mod|type|const|static|class|def|function|interface|export|pub)\b",
    )
    .unwrap()
});

/// Lines made only of closing delimiters keep the block shape readable.
static CLOSER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*[}\])]+[;,]?\s*$").unwrap());

const ELISION: &str = "// ...";

pub struct CodeSignaturePreservation;

fn is_kept_line(line: &str) -> bool {
    line.trim().is_empty() || SIGNATURE_REGEX.is_match(line) || CLOSER_REGEX.is_match(line)
}

fn indentation(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Replace `run` with one elision line when that is shorter.
fn flush_run(out: &mut String, run: &[&str]) {
    if run.is_empty() {
        return;
    }
    let original: String = run.concat();
    let newline = if original.ends_with('\n') { "\n" } else { "" };
    let marker = format!("{}{}{}", indentation(run[0]), ELISION, newline);
    if marker.chars().count() < original.chars().count() {
        out.push_str(&marker);
    } else {
        out.push_str(&original);
    }
}

impl Transform for CodeSignaturePreservation {
    fn kind(&self) -> TransformKind {
        TransformKind::CodeSignaturePreservation
    }

    fn category(&self) -> ContentCategory {
        ContentCategory::Code
    }

    fn compress_span(
        &self,
        span: &str,
        first_line: usize,
        protected: &Protected,
    ) -> Result<String, TransformError> {
        let mut out = String::with_capacity(span.len());
        let mut run: Vec<&str> = Vec::new();
        let mut open: Option<(&'static str, usize)> = None;
        let mut offset = 0;

        for (idx, line) in span.split_inclusive('\n').enumerate() {
            let start = offset;
            offset += line.len();

            if let Some((marker, _)) = open {
                if fence_marker(line) == Some(marker) {
                    flush_run(&mut out, &run);
                    run.clear();
                    out.push_str(line);
                    open = None;
                } else if is_kept_line(line) || protected.overlaps(start, offset) {
                    flush_run(&mut out, &run);
                    run.clear();
                    out.push_str(line);
                } else {
                    run.push(line);
                }
            } else {
                if let Some(marker) = fence_marker(line) {
                    open = Some((marker, first_line + idx + 1));
                }
                out.push_str(line);
            }
        }

        if let Some((_, line)) = open {
            return Err(TransformError::UnterminatedFence { line });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnchorKind, MustKeepFragment};

    const BLOCK: &str = "Intro\n```rust\npub fn load(path: &Path) -> Result<Config> {\n    let raw = fs::read_to_string(path)?;\n    let parsed = toml::from_str(&raw)?;\n    validate(&parsed)?;\n    Ok(parsed)\n}\n\nstruct Config {\n    name: String,\n}\n```\nOutro\n";

    #[test]
    fn test_bodies_elided_signatures_kept() {
        let output = CodeSignaturePreservation.apply(BLOCK, &[]);
        assert!(output.contains("pub fn load(path: &Path) -> Result<Config> {\n    // ...\n}\n"));
        assert!(output.contains("struct Config {\n"));
        assert!(!output.contains("toml::from_str"));
        assert!(output.starts_with("Intro\n```rust\n"));
        assert!(output.ends_with("```\nOutro\n"));
    }

    #[test]
    fn test_short_run_not_replaced() {
        // "  x\n" is shorter than its elision marker.
        let text = "```\nfn a() {\n  x\n}\n```\n";
        assert_eq!(CodeSignaturePreservation.apply(text, &[]), text);
    }

    #[test]
    fn test_protected_line_survives() {
        let anchors = vec![MustKeepFragment {
            kind: AnchorKind::NextActions,
            text: "validate(&parsed)?;".to_string(),
            located: true,
        }];
        let output = CodeSignaturePreservation.apply(BLOCK, &anchors);
        assert!(output.contains("    validate(&parsed)?;\n"));
        assert!(!output.contains("toml::from_str"));
    }

    #[test]
    fn test_unterminated_fence_is_an_error() {
        let text = "Intro\n```python\ndef f():\n    return compute_everything(1, 2, 3)\n";
        let err = CodeSignaturePreservation.try_apply(text, &[]).unwrap_err();
        assert_eq!(err, TransformError::UnterminatedFence { line: 2 });
        assert_eq!(CodeSignaturePreservation.apply(text, &[]), text);
    }

    #[test]
    fn test_idempotent() {
        let once = CodeSignaturePreservation.apply(BLOCK, &[]);
        assert_eq!(CodeSignaturePreservation.apply(&once, &[]), once);
    }

    #[test]
    fn test_signature_patterns() {
        for line in [
            "fn main() {",
            "pub(crate) async fn run() {",
            "impl Display for Foo {",
            "class Parser:",
            "def parse(self):",
            "export function load() {",
            "interface Shape {",
        ] {
            assert!(SIGNATURE_REGEX.is_match(line), "{}", line);
        }
        assert!(!SIGNATURE_REGEX.is_match("    let x = 1;"));
        assert!(!SIGNATURE_REGEX.is_match("return definitely;"));
    }
}
