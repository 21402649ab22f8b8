//! Line-based structural segmentation.
//!
//! Text is split into non-overlapping spans, each tagged with a
//! [`ContentCategory`]:
//! - fenced blocks (```` ``` ```` or `~~~`) → code
//! - lines starting with `|` → table
//! - bullet or numbered items (and their indented continuations) → list
//! - everything else, including headings and blank lines → prose

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static LIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+\S").unwrap());

static HEADING_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());

/// Structural category of a span of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentCategory {
    Code,
    Table,
    Prose,
    List,
}

impl ContentCategory {
    /// All categories, in decision-table order.
    pub const ALL: [ContentCategory; 4] = [
        ContentCategory::Code,
        ContentCategory::Table,
        ContentCategory::Prose,
        ContentCategory::List,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentCategory::Code => "code",
            ContentCategory::Table => "table",
            ContentCategory::Prose => "prose",
            ContentCategory::List => "list",
        }
    }
}

impl std::fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contiguous run of lines sharing one category.
///
/// `start`/`end` are byte offsets into the segmented text; `end` is exclusive
/// and includes the trailing newline of the last line, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub category: ContentCategory,
    pub start: usize,
    pub end: usize,
    /// Zero-based index of the first line.
    pub first_line: usize,
    pub line_count: usize,
}

impl Span {
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start..self.end]
    }
}

/// Return the fence marker if `line` opens or closes a fenced block.
pub fn fence_marker(line: &str) -> Option<&'static str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some("```")
    } else if trimmed.starts_with("~~~") {
        Some("~~~")
    } else {
        None
    }
}

pub fn is_table_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

pub fn is_list_item(line: &str) -> bool {
    LIST_ITEM_REGEX.is_match(line)
}

/// Parse a markdown ATX heading into `(level, title)`.
pub fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let line = line.trim_end_matches(['\n', '\r']);
    let caps = HEADING_REGEX.captures(line)?;
    let level = caps.get(1)?.as_str().len();
    let title = caps.get(2)?.as_str();
    Some((level, title))
}

/// Byte ranges of the sentences in `text`, with surrounding whitespace excluded.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace or end of text.
/// Trailing text without a terminator forms a final sentence.
pub fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if start.is_none() {
            if c.is_whitespace() {
                continue;
            }
            start = Some(i);
        }
        if matches!(c, '.' | '!' | '?')
            && chars.peek().is_none_or(|(_, next)| next.is_whitespace())
            && let Some(s) = start.take()
        {
            out.push((s, i + c.len_utf8()));
        }
    }
    if let Some(s) = start {
        out.push((s, s + text[s..].trim_end().len()));
    }
    out
}

pub(crate) fn leading_spaces(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Split text into categorized spans. Every byte belongs to exactly one span.
pub fn segment(text: &str) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    let mut offset = 0;
    let mut fence: Option<&'static str> = None;
    let mut previous: Option<ContentCategory> = None;

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let category = if let Some(open) = fence {
            if fence_marker(line) == Some(open) {
                fence = None;
            }
            ContentCategory::Code
        } else if let Some(marker) = fence_marker(line) {
            fence = Some(marker);
            ContentCategory::Code
        } else if is_table_row(line) {
            ContentCategory::Table
        } else if is_list_item(line) {
            ContentCategory::List
        } else if previous == Some(ContentCategory::List)
            && !line.trim().is_empty()
            && leading_spaces(line) >= 2
        {
            // Indented continuation of the preceding item.
            ContentCategory::List
        } else {
            ContentCategory::Prose
        };

        let end = offset + line.len();
        match spans.last_mut() {
            Some(last) if last.category == category => {
                last.end = end;
                last.line_count += 1;
            }
            _ => spans.push(Span {
                category,
                start: offset,
                end,
                first_line: index,
                line_count: 1,
            }),
        }

        previous = Some(category);
        offset = end;
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories(text: &str) -> Vec<ContentCategory> {
        segment(text).iter().map(|s| s.category).collect()
    }

    #[test]
    fn test_empty_text_has_no_spans() {
        assert!(segment("").is_empty());
    }

    #[test]
    fn test_prose_only() {
        let spans = segment("Hello world.\nSecond line.\n");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].category, ContentCategory::Prose);
        assert_eq!(spans[0].line_count, 2);
    }

    #[test]
    fn test_code_fence_is_one_span() {
        let text = "Intro\n```rust\nfn main() {\n    | not a table\n}\n```\nOutro\n";
        assert_eq!(
            categories(text),
            vec![
                ContentCategory::Prose,
                ContentCategory::Code,
                ContentCategory::Prose
            ]
        );
        let code = &segment(text)[1];
        assert_eq!(code.line_count, 5);
        assert!(code.text(text).starts_with("```rust"));
        assert!(code.text(text).ends_with("```\n"));
    }

    #[test]
    fn test_tilde_fence_not_closed_by_backticks() {
        let text = "~~~\n```\nstill code\n~~~\nprose\n";
        let spans = segment(text);
        assert_eq!(spans[0].category, ContentCategory::Code);
        assert_eq!(spans[0].line_count, 4);
        assert_eq!(spans[1].category, ContentCategory::Prose);
    }

    #[test]
    fn test_unterminated_fence_runs_to_end() {
        let text = "```\nlet x = 1;\n- not a list\n";
        let spans = segment(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].category, ContentCategory::Code);
    }

    #[test]
    fn test_table_rows() {
        let text = "| a | b |\n|---|---|\n| 1 | 2 |\nafter\n";
        assert_eq!(
            categories(text),
            vec![ContentCategory::Table, ContentCategory::Prose]
        );
    }

    #[test]
    fn test_list_items_and_continuations() {
        let text = "- first\n  continued\n2. second\n1) third\n* [ ] todo\n\nprose\n";
        let spans = segment(text);
        assert_eq!(spans[0].category, ContentCategory::List);
        assert_eq!(spans[0].line_count, 5);
        assert_eq!(spans[1].category, ContentCategory::Prose);
    }

    #[test]
    fn test_horizontal_rule_is_not_list() {
        assert_eq!(categories("---\n"), vec![ContentCategory::Prose]);
    }

    #[test]
    fn test_spans_cover_all_bytes() {
        let text = "# Title\n\n- a\n- b\n\n| x |\n|---|\n\n```\ncode\n```\nend";
        let spans = segment(text);
        assert_eq!(spans.first().unwrap().start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
        for pair in spans.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_sentence_ranges() {
        let text = "  First one. Second one?\nThird... still third! tail";
        let sentences: Vec<&str> = sentence_ranges(text)
            .into_iter()
            .map(|(s, e)| &text[s..e])
            .collect();
        assert_eq!(
            sentences,
            vec!["First one.", "Second one?", "Third...", "still third!", "tail"]
        );
        assert!(sentence_ranges("   ").is_empty());
    }

    #[test]
    fn test_parse_heading() {
        assert_eq!(parse_heading("## Next Steps\n"), Some((2, "Next Steps")));
        assert_eq!(parse_heading("# Goal ##"), Some((1, "Goal")));
        assert_eq!(parse_heading("#hashtag"), None);
        assert_eq!(parse_heading("plain"), None);
    }
}
