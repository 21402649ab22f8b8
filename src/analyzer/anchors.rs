//! Must-keep anchor location.
//!
//! Anchors are found by structural position (a recognized heading outside
//! any code fence) rather than by content classification. The fragment for
//! an anchor is the heading line plus its section body, taken verbatim.

use super::segment::{ContentCategory, Span, is_list_item, parse_heading, sentence_ranges};
use serde::{Deserialize, Serialize};

/// Maximum number of actionable items kept under the next-actions anchor.
pub const MAX_NEXT_ACTIONS: usize = 5;

/// Identity of a protected fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorKind {
    CurrentObjective,
    NextActions,
    OpenBlockers,
}

impl AnchorKind {
    /// Anchors that every plan protects, whether or not a heading was found.
    pub const REQUIRED: [AnchorKind; 2] = [AnchorKind::CurrentObjective, AnchorKind::NextActions];

    pub fn id(&self) -> &'static str {
        match self {
            AnchorKind::CurrentObjective => "current-objective",
            AnchorKind::NextActions => "next-actions",
            AnchorKind::OpenBlockers => "open-blockers",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            AnchorKind::CurrentObjective => "Current Objective",
            AnchorKind::NextActions => "Next Actions",
            AnchorKind::OpenBlockers => "Open Blockers",
        }
    }

    /// Match a heading title against the recognized anchor names.
    pub fn from_heading(title: &str) -> Option<Self> {
        let normalized: String = title
            .trim()
            .trim_end_matches(':')
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "objective" | "current objective" | "goal" | "current goal" => {
                Some(AnchorKind::CurrentObjective)
            }
            "next actions" | "next action" | "next steps" | "next tasks" | "todo" => {
                Some(AnchorKind::NextActions)
            }
            "blockers" | "open blockers" | "blocked by" | "open issues" => {
                Some(AnchorKind::OpenBlockers)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for AnchorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A fragment that must survive compression verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MustKeepFragment {
    pub kind: AnchorKind,
    /// Verbatim substring of the analyzed text. Empty only for empty input.
    pub text: String,
    /// False when the fragment came from a positional fallback rather than a heading.
    pub located: bool,
}

impl MustKeepFragment {
    /// The list items inside the fragment, with their markers stripped.
    pub fn items(&self) -> Vec<String> {
        self.text
            .lines()
            .filter(|line| is_list_item(line))
            .map(strip_list_marker)
            .filter(|item| !item.is_empty())
            .collect()
    }
}

/// Strip a bullet/number marker and any checkbox from a list line.
pub fn strip_list_marker(line: &str) -> String {
    let trimmed = line.trim_start();
    let rest = trimmed
        .find(char::is_whitespace)
        .map(|i| &trimmed[i..])
        .unwrap_or("")
        .trim_start();
    let rest = rest
        .strip_prefix("[ ]")
        .or_else(|| rest.strip_prefix("[x]"))
        .or_else(|| rest.strip_prefix("[X]"))
        .unwrap_or(rest);
    rest.trim().to_string()
}

struct Line<'a> {
    start: usize,
    text: &'a str,
    in_prose: bool,
}

fn lines_with_offsets<'a>(text: &'a str, spans: &[Span]) -> Vec<Line<'a>> {
    let mut out = Vec::new();
    let mut offset = 0;
    let mut span_idx = 0;
    for line in text.split_inclusive('\n') {
        while span_idx < spans.len() && spans[span_idx].end <= offset {
            span_idx += 1;
        }
        let in_prose = spans
            .get(span_idx)
            .is_some_and(|s| s.category == ContentCategory::Prose);
        out.push(Line {
            start: offset,
            text: line,
            in_prose,
        });
        offset += line.len();
    }
    out
}

/// Locate must-keep fragments in `text`, given its segmentation.
///
/// Always returns the required anchors; `OpenBlockers` only when a heading
/// for it exists. Results are ordered by [`AnchorKind`].
pub fn locate(text: &str, spans: &[Span]) -> Vec<MustKeepFragment> {
    let lines = lines_with_offsets(text, spans);
    let headings: Vec<(usize, usize, &str)> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.in_prose)
        .filter_map(|(idx, line)| parse_heading(line.text).map(|(lvl, title)| (idx, lvl, title)))
        .collect();

    let mut found: Vec<MustKeepFragment> = Vec::new();
    for (pos, &(line_idx, level, title)) in headings.iter().enumerate() {
        let Some(kind) = AnchorKind::from_heading(title) else {
            continue;
        };
        if found.iter().any(|f| f.kind == kind) {
            continue;
        }

        let mut end_line = headings[pos + 1..]
            .iter()
            .find(|(_, lvl, _)| *lvl <= level)
            .map(|(idx, _, _)| *idx)
            .unwrap_or(lines.len());

        if kind == AnchorKind::NextActions {
            let mut items = 0;
            for (idx, line) in lines.iter().enumerate().take(end_line).skip(line_idx + 1) {
                let top_level = is_list_item(line.text)
                    && line.text.len() - line.text.trim_start().len() < 2;
                if top_level {
                    items += 1;
                    if items > MAX_NEXT_ACTIONS {
                        end_line = idx;
                        break;
                    }
                }
            }
        }

        let start = lines[line_idx].start;
        let end = lines
            .get(end_line)
            .map(|l| l.start)
            .unwrap_or(text.len());
        let fragment = text[start..end].trim_end();
        found.push(MustKeepFragment {
            kind,
            text: fragment.to_string(),
            located: true,
        });
    }

    if !found.iter().any(|f| f.kind == AnchorKind::CurrentObjective) {
        let first = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        let sentence = sentence_ranges(first)
            .first()
            .map(|&(s, e)| &first[s..e])
            .unwrap_or("");
        found.push(MustKeepFragment {
            kind: AnchorKind::CurrentObjective,
            text: sentence.to_string(),
            located: false,
        });
    }
    if !found.iter().any(|f| f.kind == AnchorKind::NextActions) {
        let last = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .unwrap_or("");
        let sentence = sentence_ranges(last)
            .last()
            .map(|&(s, e)| &last[s..e])
            .unwrap_or("");
        found.push(MustKeepFragment {
            kind: AnchorKind::NextActions,
            text: sentence.to_string(),
            located: false,
        });
    }

    found.sort_by_key(|f| f.kind);
    found
}
