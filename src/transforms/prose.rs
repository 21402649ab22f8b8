//! Extractive summarization of prose paragraphs.
//!
//! A paragraph with more than three sentences is reduced to its first
//! sentence, its topic sentence and its last sentence. The topic sentence is
//! the middle sentence sharing the most content words with the rest of the
//! paragraph; ties go to the earliest.

use super::{Protected, Transform};
use crate::analyzer::{ContentCategory, parse_heading, sentence_ranges};
use crate::errors::TransformError;
use crate::strategy::TransformKind;
use std::collections::{BTreeSet, HashSet};

const MAX_SENTENCES: usize = 3;
const MIN_CONTENT_WORD_LEN: usize = 4;
const STOP_WORDS: &[&str] = &[
    "about", "also", "been", "from", "have", "into", "some", "than", "that", "their", "them",
    "then", "there", "they", "this", "were", "what", "when", "which", "will", "with",
];

pub struct ExtractiveSummarization;

fn content_words(sentence: &str) -> HashSet<String> {
    sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_CONTENT_WORD_LEN)
        .map(str::to_lowercase)
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

fn topic_sentence(sentences: &[&str]) -> usize {
    let words: Vec<HashSet<String>> = sentences.iter().map(|s| content_words(s)).collect();
    let mut best = (1, 0);
    for idx in 1..sentences.len() - 1 {
        let score = words[idx]
            .iter()
            .filter(|w| {
                words
                    .iter()
                    .enumerate()
                    .any(|(other, set)| other != idx && set.contains(*w))
            })
            .count();
        if score > best.1 {
            best = (idx, score);
        }
    }
    best.0
}

/// Summarize one paragraph, or `None` to keep it as is.
fn summarize(paragraph: &str, protected: &Protected) -> Option<String> {
    let ranges = sentence_ranges(paragraph);
    let n = ranges.len();
    if n <= MAX_SENTENCES {
        return None;
    }

    let mut keep: BTreeSet<usize> = [0, n - 1].into_iter().collect();
    let mut forced_middle = false;
    for &(ps, pe) in protected.ranges() {
        let idx = ranges.iter().position(|&(s, e)| s <= ps && pe <= e)?;
        forced_middle |= idx != 0 && idx != n - 1;
        keep.insert(idx);
    }
    let sentences: Vec<&str> = ranges.iter().map(|&(s, e)| &paragraph[s..e]).collect();
    if !forced_middle {
        keep.insert(topic_sentence(&sentences));
    }
    if keep.len() == n {
        return None;
    }

    Some(
        keep.into_iter()
            .map(|idx| sentences[idx])
            .collect::<Vec<_>>()
            .join(" "),
    )
}

impl ExtractiveSummarization {
    fn flush(out: &mut String, span: &str, range: Option<(usize, usize)>, protected: &Protected) {
        let Some((start, end)) = range else {
            return;
        };
        let block = &span[start..end];
        let body = block.trim_end_matches(['\n', '\r']);
        match summarize(body, &protected.within(start, start + body.len())) {
            Some(summary) => {
                out.push_str(&summary);
                out.push_str(&block[body.len()..]);
            }
            None => out.push_str(block),
        }
    }
}

impl Transform for ExtractiveSummarization {
    fn kind(&self) -> TransformKind {
        TransformKind::ExtractiveSummarization
    }

    fn category(&self) -> ContentCategory {
        ContentCategory::Prose
    }

    fn compress_span(
        &self,
        span: &str,
        _first_line: usize,
        protected: &Protected,
    ) -> Result<String, TransformError> {
        let mut out = String::with_capacity(span.len());
        let mut paragraph: Option<(usize, usize)> = None;
        let mut offset = 0;

        for line in span.split_inclusive('\n') {
            let start = offset;
            offset += line.len();
            if line.trim().is_empty() || parse_heading(line).is_some() {
                Self::flush(&mut out, span, paragraph.take(), protected);
                out.push_str(line);
            } else {
                paragraph = Some((paragraph.map_or(start, |(s, _)| s), offset));
            }
        }
        Self::flush(&mut out, span, paragraph, protected);

        Ok(out)
    }
}
