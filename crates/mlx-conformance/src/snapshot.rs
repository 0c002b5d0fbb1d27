//! Expectation snapshots keyed by case name.
//!
//! Records are stored in the snapshot file format the test suite asserts
//! with `insta`: a `---` delimited metadata header followed by the text
//! itself. The store here serves callers that need a `Result` instead of a
//! panicking assertion, such as the command line runner.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use similar::TextDiff;
use tracing::info;

use crate::error::{HarnessError, Result};

const HEADER_FENCE: &str = "---";

/// Identity of one expectation record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub case: String,
    pub subname: Option<String>,
}

impl SnapshotKey {
    pub fn new(case: impl Into<String>) -> Self {
        Self {
            case: case.into(),
            subname: None,
        }
    }

    pub fn with_subname(mut self, subname: impl Into<String>) -> Self {
        self.subname = Some(subname.into());
        self
    }

    /// Snapshot name: `<case>` or `<case>-<subname>`.
    pub fn snapshot_name(&self) -> String {
        self.to_string()
    }

    /// `<case>.snap` or `<case>-<subname>.snap`.
    pub fn file_name(&self) -> String {
        format!("{self}.snap")
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subname {
            Some(sub) => write!(f, "{}-{sub}", self.case),
            None => write!(f, "{}", self.case),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The stored expectation equals the actual text.
    Matched,
    /// Accept mode wrote the actual text as the expectation.
    Recorded,
}

/// Text of a snapshot file with its metadata header removed.
pub fn snapshot_body(file: &str) -> &str {
    let Some(rest) = file.strip_prefix(HEADER_FENCE).and_then(|r| r.strip_prefix('\n')) else {
        return file;
    };
    match rest.split_once("\n---\n") {
        Some((_, body)) => body,
        None => rest.strip_suffix("\n---").map_or(file, |_| ""),
    }
}

fn same_text(expected: &str, actual: &str) -> bool {
    expected.trim_end() == actual.trim_end()
}

/// Directory of expectation files.
#[derive(Clone, Debug)]
pub struct ExpectStore {
    dir: PathBuf,
    accept: bool,
}

impl ExpectStore {
    pub fn new(dir: impl Into<PathBuf>, accept: bool) -> Self {
        Self {
            dir: dir.into(),
            accept,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn accept(&self) -> bool {
        self.accept
    }

    pub fn path(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Compare `actual` with the expectation stored under `key`.
    ///
    /// Outside accept mode a missing or different expectation is an error
    /// and nothing is written. In accept mode either one is replaced by
    /// `actual`.
    pub fn assert_expected(&self, key: &SnapshotKey, actual: &str) -> Result<SnapshotOutcome> {
        let path = self.path(key);
        let stored = match fs::read_to_string(&path) {
            Ok(stored) => Some(stored),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(HarnessError::io(path)(e)),
        };

        match stored.as_deref().map(snapshot_body) {
            Some(expected) if same_text(expected, actual) => Ok(SnapshotOutcome::Matched),
            _ if self.accept => {
                self.record(key, &path, actual)?;
                info!(%key, path = %path.display(), "expectation recorded");
                Ok(SnapshotOutcome::Recorded)
            }
            Some(expected) => Err(HarnessError::Mismatch {
                key: key.to_string(),
                diff: line_diff(expected, actual),
            }),
            None => Err(HarnessError::MissingExpectation {
                key: key.to_string(),
                path,
            }),
        }
    }

    fn record(&self, key: &SnapshotKey, path: &Path, text: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(HarnessError::io(&self.dir))?;
        let file = format!(
            "{HEADER_FENCE}\nsource: {}\nexpression: \"{key}\"\n{HEADER_FENCE}\n{}\n",
            env!("CARGO_PKG_NAME"),
            text.trim_end()
        );
        fs::write(path, file).map_err(HarnessError::io(path))
    }
}

/// Unified diff of `expected` against `actual`.
pub fn line_diff(expected: &str, actual: &str) -> String {
    TextDiff::from_lines(expected, actual)
        .unified_diff()
        .context_radius(3)
        .header("expected", "actual")
        .to_string()
}
