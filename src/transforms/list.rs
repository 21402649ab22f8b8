//! List deduplication.
//!
//! Items are compared by normalized tokens: lowercased words with markers
//! and punctuation removed. Checkbox state stays part of the identity, so a
//! done item never absorbs an open one. Only single-line items without
//! children are merged, and nested items only against siblings under the
//! same parent.

use super::{Protected, Transform};
use crate::analyzer::{ContentCategory, is_list_item, strip_list_marker};
use crate::errors::TransformError;
use crate::strategy::TransformKind;
use std::collections::{BTreeMap, BTreeSet};

pub struct ListDeduplication;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemKey {
    indent: usize,
    checkbox: Option<bool>,
    tokens: Vec<String>,
}

impl ItemKey {
    fn of(line: &str) -> Self {
        let trimmed = line.trim_start();
        let after_marker = trimmed
            .find(char::is_whitespace)
            .map(|i| trimmed[i..].trim_start())
            .unwrap_or("");
        let checkbox = if after_marker.starts_with("[ ]") {
            Some(false)
        } else if after_marker.starts_with("[x]") || after_marker.starts_with("[X]") {
            Some(true)
        } else {
            None
        };
        let tokens = strip_list_marker(line)
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            indent: line.len() - trimmed.len(),
            checkbox,
            tokens,
        }
    }

    /// Whether every token of `self` also appears in `other`.
    fn is_subset_of(&self, other: &ItemKey) -> bool {
        if self.indent != other.indent || self.checkbox != other.checkbox {
            return false;
        }
        let theirs: BTreeSet<&str> = other.tokens.iter().map(String::as_str).collect();
        self.tokens.iter().all(|t| theirs.contains(t.as_str()))
    }
}

struct Item {
    start: usize,
    end: usize,
    lines: usize,
}

fn items(span: &str) -> Vec<Item> {
    let mut out: Vec<Item> = Vec::new();
    let mut offset = 0;
    for line in span.split_inclusive('\n') {
        let start = offset;
        offset += line.len();
        match out.last_mut() {
            Some(item) if !is_list_item(line) => {
                item.end = offset;
                item.lines += 1;
            }
            _ => out.push(Item {
                start,
                end: offset,
                lines: 1,
            }),
        }
    }
    out
}

impl Transform for ListDeduplication {
    fn kind(&self) -> TransformKind {
        TransformKind::ListDeduplication
    }

    fn category(&self) -> ContentCategory {
        ContentCategory::List
    }

    fn compress_span(
        &self,
        span: &str,
        _first_line: usize,
        protected: &Protected,
    ) -> Result<String, TransformError> {
        let items = items(span);
        let keys: Vec<ItemKey> = items
            .iter()
            .map(|item| ItemKey::of(&span[item.start..item.end]))
            .collect();

        let mut out = String::with_capacity(span.len());
        // Siblings seen so far, per indent. Deeper levels are cleared when a
        // shallower item starts, so children are only compared under one parent.
        let mut scopes: BTreeMap<usize, Scope> = BTreeMap::new();

        for (i, item) in items.iter().enumerate() {
            let text = &span[item.start..item.end];
            let key = &keys[i];
            scopes.retain(|&indent, _| indent <= key.indent);
            let scope = scopes.entry(key.indent).or_default();

            if item.lines > 1 {
                out.push_str(text);
                scope.previous = None;
                continue;
            }

            let has_children = keys.get(i + 1).is_some_and(|next| next.indent > key.indent);
            let mergeable =
                !key.tokens.is_empty() && !has_children && !protected.overlaps(item.start, item.end);
            let duplicate = scope.seen.contains(key);
            let absorbed = scope.previous.as_ref().is_some_and(|p| key.is_subset_of(p));
            if mergeable && (duplicate || absorbed) {
                continue;
            }

            out.push_str(text);
            scope.seen.push(key.clone());
            scope.previous = Some(key.clone());
        }

        Ok(out)
    }
}

#[derive(Default)]
struct Scope {
    seen: Vec<ItemKey>,
    previous: Option<ItemKey>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{AnchorKind, MustKeepFragment};

    #[test]
    fn test_exact_duplicates_merged() {
        let text = "- Write tests.\n- update docs\n- write   TESTS\n";
        assert_eq!(
            ListDeduplication.apply(text, &[]),
            "- Write tests.\n- update docs\n"
        );
    }

    #[test]
    fn test_adjacent_subset_merged() {
        let text = "- migrate billing tables to new schema\n- migrate billing tables\n- notify finance\n";
        assert_eq!(
            ListDeduplication.apply(text, &[]),
            "- migrate billing tables to new schema\n- notify finance\n"
        );
    }

    #[test]
    fn test_non_adjacent_subset_kept() {
        let text = "- migrate billing tables to new schema\n- notify finance\n- migrate billing tables\n";
        assert_eq!(ListDeduplication.apply(text, &[]), text);
    }

    #[test]
    fn test_checkbox_state_distinguishes_items() {
        let text = "- [x] write tests\n- [ ] write tests\n";
        assert_eq!(ListDeduplication.apply(text, &[]), text);

        let text = "- [ ] write tests\n- [ ] write tests\n";
        assert_eq!(ListDeduplication.apply(text, &[]), "- [ ] write tests\n");
    }

    #[test]
    fn test_multiline_items_never_merged() {
        let text = "- write tests\n  for the parser\n- write tests\n  for the parser\n";
        assert_eq!(ListDeduplication.apply(text, &[]), text);
    }

    #[test]
    fn test_protected_duplicate_kept() {
        let text = "## Notes\n- ship it\n\n## Next Steps\n- ship it\n";
        let anchors = vec![MustKeepFragment {
            kind: AnchorKind::NextActions,
            text: "## Next Steps\n- ship it".to_string(),
            located: true,
        }];
        // Separate lists: each is deduplicated on its own.
        assert_eq!(ListDeduplication.apply(text, &anchors), text);

        let text = "- ship it\n- ship it\n";
        let anchors = vec![MustKeepFragment {
            kind: AnchorKind::NextActions,
            text: "- ship it\n- ship it".to_string(),
            located: true,
        }];
        assert_eq!(ListDeduplication.apply(text, &anchors), text);
    }

    #[test]
    fn test_nested_items_compared_under_their_parent() {
        let text = "- parser\n  - tests\n- lexer\n  - tests\n";
        assert_eq!(ListDeduplication.apply(text, &[]), text);

        let text = "- parser\n  - tests\n  - fuzzing\n  - tests\n- lexer\n";
        assert_eq!(
            ListDeduplication.apply(text, &[]),
            "- parser\n  - tests\n  - fuzzing\n- lexer\n"
        );
    }

    #[test]
    fn test_parent_with_children_kept() {
        let text = "- parser\n- parser\n  - fuzzing\n";
        assert_eq!(ListDeduplication.apply(text, &[]), text);
    }

    #[test]
    fn test_idempotent() {
        let text = "- a b c\n- a b\n- a\n- d\n- a b c\n- d e\n";
        let once = ListDeduplication.apply(text, &[]);
        assert_eq!(once, "- a b c\n- d\n- d e\n");
        assert_eq!(ListDeduplication.apply(&once, &[]), once);
    }
}
