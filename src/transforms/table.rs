//! Table consolidation: collapse data rows into one summary row.

use super::{Protected, Transform};
use crate::analyzer::ContentCategory;
use crate::errors::TransformError;
use crate::strategy::TransformKind;
use regex::Regex;
use std::sync::LazyLock;

static SEPARATOR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\|?(?:\s*:?-{3,}:?\s*\|)+\s*:?-*:?\s*$").unwrap());

/// Above this many distinct values the last column is summarized by count only.
const MAX_DISTINCT_VALUES: usize = 6;

pub struct TableConsolidation;

fn cells(row: &str) -> Vec<String> {
    let trimmed = row.trim();
    let inner = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|c| c.trim().to_string()).collect()
}

/// The single row that replaces all data rows.
fn summary_row(columns: usize, rows: &[Vec<String>]) -> String {
    let mut summary = vec!["...".to_string(); columns];
    summary[0] = format!("{} rows", rows.len());

    if columns > 1 {
        let mut values: Vec<(String, usize)> = Vec::new();
        for row in rows {
            let value = row.last().map(String::as_str).unwrap_or("");
            match values.iter_mut().find(|(v, _)| v == value) {
                Some((_, count)) => *count += 1,
                None => values.push((value.to_string(), 1)),
            }
        }
        summary[columns - 1] = if values.len() <= MAX_DISTINCT_VALUES {
            values
                .iter()
                .map(|(v, n)| format!("{}: {}", if v.is_empty() { "(empty)" } else { v }, n))
                .collect::<Vec<_>>()
                .join(", ")
        } else {
            format!("{} distinct", values.len())
        };
    }

    format!("| {} |", summary.join(" | "))
}

impl Transform for TableConsolidation {
    fn kind(&self) -> TransformKind {
        TransformKind::TableConsolidation
    }

    fn category(&self) -> ContentCategory {
        ContentCategory::Table
    }

    fn compress_span(
        &self,
        span: &str,
        first_line: usize,
        protected: &Protected,
    ) -> Result<String, TransformError> {
        let lines: Vec<&str> = span.lines().collect();
        if lines.len() < 2 || !SEPARATOR_REGEX.is_match(lines[1]) {
            return Ok(span.to_string());
        }

        let columns = cells(lines[0]).len();
        let mut rows = Vec::with_capacity(lines.len() - 2);
        for (idx, line) in lines.iter().enumerate().skip(2) {
            let row = cells(line);
            if row.len() != columns {
                return Err(TransformError::MalformedTable {
                    line: first_line + idx + 1,
                    expected: columns,
                    found: row.len(),
                });
            }
            rows.push(row);
        }

        if rows.len() < 2 || !protected.is_empty() {
            return Ok(span.to_string());
        }

        let newline = if span.ends_with('\n') { "\n" } else { "" };
        let consolidated = format!(
            "{}\n{}\n{}{}",
            lines[0],
            lines[1],
            summary_row(columns, &rows),
            newline
        );
        if consolidated.chars().count() < span.chars().count() {
            Ok(consolidated)
        } else {
            Ok(span.to_string())
        }
    }
}
