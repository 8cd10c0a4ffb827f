// Sample identity derived from the forward-read file name.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::config::defs::{FORWARD_READ_TAG, PipelineError, REVERSE_READ_TAG};

const PREFIX_GROUP: &str = "prefix";


/// Per-sample identifier; scopes artifact lookups and tags sequence ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplePrefix(String);

impl SamplePrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        SamplePrefix(prefix.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<prefix>_<id>`
    pub fn tag(&self, id: &str) -> String {
        format!("{}_{}", self.0, id)
    }
}

impl fmt::Display for SamplePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}


/// Applies `pattern` to the base name of `path` and returns its `prefix` group.
///
/// # Arguments
///
/// * `path` - Forward-read file; only the file name is matched.
/// * `pattern` - Regular expression with a named group `prefix`.
///
/// # Returns
/// SamplePrefix, or PrefixExtraction when the pattern does not match, and
/// InvalidConfig when the pattern does not compile or lacks the group.
pub fn extract_prefix(path: &Path, pattern: &str) -> Result<SamplePrefix, PipelineError> {
    let regex = Regex::new(pattern)
        .map_err(|e| PipelineError::InvalidConfig(format!("invalid prefix regex \"{}\": {}", pattern, e)))?;
    if !regex.capture_names().flatten().any(|name| name == PREFIX_GROUP) {
        return Err(PipelineError::InvalidConfig(format!(
            "prefix regex \"{}\" has no named group <{}>",
            pattern, PREFIX_GROUP
        )));
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    regex
        .captures(&file_name)
        .and_then(|caps| caps.name(PREFIX_GROUP))
        .map(|m| SamplePrefix::new(m.as_str()))
        .filter(|prefix| !prefix.as_str().is_empty())
        .ok_or_else(|| PipelineError::PrefixExtraction {
            file_name,
            pattern: pattern.to_string(),
        })
}

/// Derives the reverse-read path by replacing every `R1` in the file name
/// with `R2`. The directory is kept as is and existence is not checked.
///
/// Applying the swap in the other direction only restores the original name
/// when `R2` did not already occur in it.
pub fn reverse_path(forward: &Path) -> PathBuf {
    swap_read_tag(forward, FORWARD_READ_TAG, REVERSE_READ_TAG)
}

/// Inverse of `reverse_path`, subject to the same caveat.
pub fn forward_path(reverse: &Path) -> PathBuf {
    swap_read_tag(reverse, REVERSE_READ_TAG, FORWARD_READ_TAG)
}

fn swap_read_tag(path: &Path, from: &str, to: &str) -> PathBuf {
    match path.file_name() {
        Some(name) => {
            let swapped = name.to_string_lossy().replace(from, to);
            path.with_file_name(swapped)
        }
        None => path.to_path_buf(),
    }
}
