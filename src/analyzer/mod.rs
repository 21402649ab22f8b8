//! Content analysis: classification and size estimation.
//!
//! [`analyze`] is a pure function of a [`RawContext`]: the same input always
//! produces the same [`ContentProfile`] and [`SizeEstimate`]. It never fails;
//! fragments it cannot read are skipped, counted and reported as warnings.

mod anchors;
mod estimate;
mod segment;

pub use anchors::{AnchorKind, MAX_NEXT_ACTIONS, MustKeepFragment, locate, strip_list_marker};
pub use estimate::{SizeEstimate, estimate_text};
pub use segment::{
    ContentCategory, Span, fence_marker, is_list_item, is_table_row, parse_heading, segment,
    sentence_ranges,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File extensions picked up when a source path is a directory.
const NARRATIVE_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// One narrative source: a file path and its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFragment {
    pub path: PathBuf,
    pub text: String,
}

impl SourceFragment {
    /// Binary content (NUL bytes) cannot be analyzed as narrative.
    pub fn is_readable(&self) -> bool {
        !self.text.contains('\0')
    }
}

/// A source that could not be loaded at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSource {
    pub path: PathBuf,
    pub reason: String,
}

/// The full body of narrative text subject to compaction.
#[derive(Debug, Clone)]
pub struct RawContext {
    fragments: Vec<SourceFragment>,
    skipped: Vec<SkippedSource>,
    captured_at: DateTime<Utc>,
}

impl RawContext {
    /// Build a context from in-memory fragments, in the given order.
    pub fn from_fragments<I, P, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = (P, S)>,
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self {
            fragments: fragments
                .into_iter()
                .map(|(path, text)| SourceFragment {
                    path: path.into(),
                    text: text.into(),
                })
                .collect(),
            skipped: Vec::new(),
            captured_at: Utc::now(),
        }
    }

    /// Read fragments from files and directories.
    ///
    /// Directories are walked in sorted order and only narrative files are
    /// read. Anything unreadable is recorded in [`RawContext::skipped`]
    /// instead of failing the whole load.
    pub fn from_paths(paths: &[PathBuf]) -> Self {
        let mut fragments = Vec::new();
        let mut skipped = Vec::new();

        for path in paths {
            if path.is_dir() {
                let entries = WalkDir::new(path)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| match entry {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!("Skipping unreadable directory entry: {}", e);
                            skipped.push(SkippedSource {
                                path: e.path().map(Path::to_path_buf).unwrap_or_default(),
                                reason: e.to_string(),
                            });
                            None
                        }
                    })
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| is_narrative_file(entry.path()))
                    .map(|entry| entry.into_path())
                    .collect::<Vec<_>>();
                for file in entries {
                    read_fragment(&file, &mut fragments, &mut skipped);
                }
            } else {
                read_fragment(path, &mut fragments, &mut skipped);
            }
        }

        Self {
            fragments,
            skipped,
            captured_at: Utc::now(),
        }
    }

    pub fn fragments(&self) -> &[SourceFragment] {
        &self.fragments
    }

    pub fn skipped(&self) -> &[SkippedSource] {
        &self.skipped
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(|f| !f.is_readable() || f.text.is_empty())
    }

    /// The readable fragments joined into one document, separated by a blank line.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for fragment in self.fragments.iter().filter(|f| f.is_readable()) {
            if !out.is_empty() {
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            out.push_str(&fragment.text);
        }
        out
    }

    /// SHA-256 fingerprint over fragment paths and contents.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for fragment in &self.fragments {
            hasher.update(fragment.path.to_string_lossy().as_bytes());
            hasher.update([0u8]);
            hasher.update(fragment.text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

fn is_narrative_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| NARRATIVE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

fn read_fragment(path: &Path, fragments: &mut Vec<SourceFragment>, skipped: &mut Vec<SkippedSource>) {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!("Loaded {} ({} bytes)", path.display(), text.len());
            fragments.push(SourceFragment {
                path: path.to_path_buf(),
                text,
            });
        }
        Err(e) => {
            warn!("Skipping unreadable source {}: {}", path.display(), e);
            skipped.push(SkippedSource {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });
        }
    }
}

/// Structural classification of a [`RawContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentProfile {
    pub total_chars: usize,
    pub total_words: usize,
    pub total_lines: usize,
    /// Lines per category.
    pub category_counts: BTreeMap<ContentCategory, usize>,
    /// Characters per category; the basis for dominance shares.
    pub category_chars: BTreeMap<ContentCategory, usize>,
    /// Must-keep fragments located by structural position.
    pub anchors: Vec<MustKeepFragment>,
    /// Fragments that could not be analyzed.
    pub skipped_fragments: usize,
    pub warnings: Vec<String>,
}

impl ContentProfile {
    pub fn count(&self, category: ContentCategory) -> usize {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn chars(&self, category: ContentCategory) -> usize {
        self.category_chars.get(&category).copied().unwrap_or(0)
    }

    /// Fraction of all characters that belong to `category`.
    pub fn share(&self, category: ContentCategory) -> f64 {
        if self.total_chars == 0 {
            return 0.0;
        }
        self.chars(category) as f64 / self.total_chars as f64
    }

    /// Characters covered by must-keep fragments.
    pub fn protected_chars(&self) -> usize {
        self.anchors.iter().map(|a| a.text.chars().count()).sum()
    }

    /// Characters a lossy transform may touch.
    pub fn compressible_chars(&self) -> usize {
        self.total_chars.saturating_sub(self.protected_chars())
    }
}

/// Result of analyzing a [`RawContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub profile: ContentProfile,
    pub estimate: SizeEstimate,
}

/// Classify a raw context and estimate its token size.
pub fn analyze(raw: &RawContext) -> Analysis {
    let mut warnings = Vec::new();
    let mut skipped_fragments = raw.skipped().len();
    for skipped in raw.skipped() {
        warnings.push(format!(
            "skipped {}: {}",
            skipped.path.display(),
            skipped.reason
        ));
    }
    for fragment in raw.fragments().iter().filter(|f| !f.is_readable()) {
        skipped_fragments += 1;
        warnings.push(format!(
            "skipped {}: binary content",
            fragment.path.display()
        ));
    }
    for warning in &warnings {
        warn!("Partial analysis: {}", warning);
    }

    let text = raw.text();
    let spans = segment(&text);

    let mut category_counts: BTreeMap<ContentCategory, usize> =
        ContentCategory::ALL.iter().map(|c| (*c, 0)).collect();
    let mut category_chars = category_counts.clone();
    for span in &spans {
        *category_counts.entry(span.category).or_default() += span.line_count;
        *category_chars.entry(span.category).or_default() += span.text(&text).chars().count();
    }

    let total_words = text.split_whitespace().count();
    let total_lines = text.lines().count();
    let estimate = SizeEstimate::from_counts(
        total_words,
        category_chars[&ContentCategory::Code],
        category_chars[&ContentCategory::Table],
        total_lines,
    );

    let profile = ContentProfile {
        total_chars: text.chars().count(),
        total_words,
        total_lines,
        category_counts,
        category_chars,
        anchors: locate(&text, &spans),
        skipped_fragments,
        warnings,
    };

    debug!(
        "Analyzed {} chars / {} words: {}",
        profile.total_chars, profile.total_words, estimate
    );

    Analysis { profile, estimate }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const SAMPLE: &str = "# Session Notes\n\n## Objective\nFinish the importer.\n\n\
        Some prose describing the work so far. It spans a couple of sentences.\n\n\
        - item one\n- item two\n\n\
        | task | status |\n|---|---|\n| a | done |\n\n\
        ```rust\nfn main() {}\n```\n";

    fn sample_context() -> RawContext {
        RawContext::from_fragments([("notes.md", SAMPLE)])
    }

    #[test]
    fn test_analyze_is_deterministic() {
        let raw = sample_context();
        let first = analyze(&raw);
        let second = analyze(&raw);
        assert_eq!(first, second);

        let again = analyze(&RawContext::from_fragments([("notes.md", SAMPLE)]));
        assert_eq!(first, again);
    }

    #[test]
    fn test_profile_counts_categories() {
        let analysis = analyze(&sample_context());
        let profile = &analysis.profile;
        assert_eq!(profile.count(ContentCategory::Code), 3);
        assert_eq!(profile.count(ContentCategory::Table), 3);
        assert_eq!(profile.count(ContentCategory::List), 2);
        assert!(profile.count(ContentCategory::Prose) > 0);
        assert_eq!(profile.total_chars, SAMPLE.chars().count());
        assert_eq!(profile.total_lines, SAMPLE.lines().count());

        let share_sum: f64 = ContentCategory::ALL.iter().map(|c| profile.share(*c)).sum();
        assert!((share_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_profile_includes_anchors() {
        let analysis = analyze(&sample_context());
        let kinds: Vec<AnchorKind> = analysis.profile.anchors.iter().map(|a| a.kind).collect();
        assert!(kinds.contains(&AnchorKind::CurrentObjective));
        assert!(kinds.contains(&AnchorKind::NextActions));
    }

    #[test]
    fn test_binary_fragment_is_skipped_and_counted() {
        let raw = RawContext::from_fragments([
            ("notes.md", "Readable text here."),
            ("blob.bin", "abc\0def"),
        ]);
        let analysis = analyze(&raw);
        assert_eq!(analysis.profile.skipped_fragments, 1);
        assert_eq!(analysis.profile.warnings.len(), 1);
        assert_eq!(analysis.profile.total_words, 3);
    }

    #[test]
    fn test_empty_context() {
        let raw = RawContext::from_fragments(Vec::<(PathBuf, String)>::new());
        assert!(raw.is_empty());
        let analysis = analyze(&raw);
        assert_eq!(analysis.profile.total_chars, 0);
        assert_eq!(analysis.estimate.estimated_tokens, 0);
        assert_eq!(analysis.profile.share(ContentCategory::Prose), 0.0);
    }

    #[test]
    fn test_text_joins_fragments_with_blank_line() {
        let raw = RawContext::from_fragments([("a.md", "alpha"), ("b.md", "beta\n")]);
        assert_eq!(raw.text(), "alpha\n\nbeta\n");
    }

    #[test]
    fn test_digest_changes_with_content() {
        let a = RawContext::from_fragments([("a.md", "alpha")]);
        let b = RawContext::from_fragments([("a.md", "alpha!")]);
        assert_eq!(a.digest(), a.clone().digest());
        assert_ne!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_from_paths_walks_directories_and_skips_missing() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.md"), "second").unwrap();
        fs::write(dir.path().join("a.md"), "first").unwrap();
        fs::write(dir.path().join("image.png"), "not narrative").unwrap();
        let missing = dir.path().join("missing.md");

        let raw = RawContext::from_paths(&[dir.path().to_path_buf(), missing.clone()]);
        let names: Vec<String> = raw
            .fragments()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md"]);
        assert_eq!(raw.skipped().len(), 1);
        assert_eq!(raw.skipped()[0].path, missing);

        let analysis = analyze(&raw);
        assert_eq!(analysis.profile.skipped_fragments, 1);
    }
}
