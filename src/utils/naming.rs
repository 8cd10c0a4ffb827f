// Artifact naming and lookup: derived file names come from one trailing
// suffix rewrite, lookups state how many matches they expect.

use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::config::defs::PipelineError;
use crate::utils::sample::SamplePrefix;

lazy_static! {
    /// `.fastq` with an optional `.gz`.
    pub static ref FASTQ_SUFFIX: Regex = Regex::new(r"\.fastq(\.gz)?$").unwrap();
    /// `.fasta` with an optional `.gz`.
    pub static ref FASTA_SUFFIX: Regex = Regex::new(r"\.fasta(\.gz)?$").unwrap();
    /// Any stage sequence output, compressed or not.
    pub static ref SEQUENCE_FILE: Regex = Regex::new(r"\.fast[aq](\.gz)?$").unwrap();
}


/// A single trailing substitution.
#[derive(Debug, Clone)]
pub struct SuffixRule {
    pattern: Regex,
    replacement: String,
}

impl SuffixRule {
    /// `match_suffix` is a regular expression; it is anchored to the end of the name.
    pub fn new(match_suffix: &str, replacement: impl Into<String>) -> Result<Self, PipelineError> {
        let anchored = if match_suffix.ends_with('$') {
            match_suffix.to_string()
        } else {
            format!("(?:{})$", match_suffix)
        };
        let pattern = Regex::new(&anchored)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid suffix pattern \"{}\": {}", match_suffix, e)))?;
        Ok(SuffixRule { pattern, replacement: replacement.into() })
    }

    pub fn from_regex(pattern: &Regex, replacement: impl Into<String>) -> Self {
        SuffixRule { pattern: pattern.clone(), replacement: replacement.into() }
    }

    /// Rewrites the trailing match of `base_name`; `None` when nothing matches.
    pub fn rename(&self, base_name: &str) -> Option<String> {
        let m = self.pattern.find(base_name)?;
        let mut renamed = String::with_capacity(m.start() + self.replacement.len());
        renamed.push_str(&base_name[..m.start()]);
        renamed.push_str(&self.replacement);
        Some(renamed)
    }

    /// Applies the rule to the file name of `input` and places the result in `dir`.
    pub fn derive(&self, input: &Path, dir: &Path) -> Result<PathBuf, PipelineError> {
        let base_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.rename(&base_name)
            .map(|name| dir.join(name))
            .ok_or_else(|| PipelineError::MissingArtifact {
                dir: input.parent().map(Path::to_path_buf).unwrap_or_default(),
                pattern: format!("{} in {}", self.pattern.as_str(), base_name),
            })
    }
}

/// One-shot form of `SuffixRule::rename`.
pub fn rename(base_name: &str, match_suffix: &str, replacement_suffix: &str) -> Result<String, PipelineError> {
    let rule = SuffixRule::new(match_suffix, replacement_suffix)?;
    rule.rename(base_name).ok_or_else(|| PipelineError::MissingArtifact {
        dir: PathBuf::new(),
        pattern: format!("{} in {}", match_suffix, base_name),
    })
}

/// `.gz` when compressing, empty otherwise.
pub fn gz_suffix(compress: bool) -> &'static str {
    if compress { ".gz" } else { "" }
}


/// Anchored pattern over file names in a stage directory.
#[derive(Debug, Clone)]
pub struct ArtifactPattern {
    regex: Regex,
}

impl ArtifactPattern {
    pub fn new(pattern: &str) -> Result<Self, PipelineError> {
        let regex = Regex::new(pattern)
            .map_err(|e| PipelineError::InvalidConfig(format!("invalid artifact pattern \"{}\": {}", pattern, e)))?;
        Ok(ArtifactPattern { regex })
    }

    /// `<prefix>*<suffix>[.gz]`; `suffix` is a regex fragment such as `\.trim[12]p\.fastq`.
    pub fn for_sample(prefix: &SamplePrefix, suffix: &str) -> Result<Self, PipelineError> {
        Self::new(&format!(r"^{}.*{}(\.gz)?$", regex::escape(prefix.as_str()), suffix))
    }

    /// `<prefix>*<suffix>` without a compressed form; for fresh tool outputs.
    pub fn uncompressed(prefix: &SamplePrefix, suffix: &str) -> Result<Self, PipelineError> {
        Self::new(&format!(r"^{}.*{}$", regex::escape(prefix.as_str()), suffix))
    }

    pub fn is_match(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}


/// All regular files in `dir` whose name matches, sorted.
pub fn list_matching(dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<PathBuf>, PipelineError> {
    let mut matches = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if pattern.is_match(&entry.file_name().to_string_lossy()) {
            matches.push(entry.path());
        }
    }
    matches.sort();
    debug!("{} file(s) match /{}/ in {:?}", matches.len(), pattern.as_str(), dir);
    Ok(matches)
}

/// Exactly `count` matches, sorted; otherwise a postcondition error.
pub fn locate_exactly(dir: &Path, pattern: &ArtifactPattern, count: usize) -> Result<Vec<PathBuf>, PipelineError> {
    let matches = list_matching(dir, pattern)?;
    if matches.is_empty() && count > 0 {
        return Err(PipelineError::MissingArtifact {
            dir: dir.to_path_buf(),
            pattern: pattern.as_str().to_string(),
        });
    }
    if matches.len() != count {
        return Err(PipelineError::AmbiguousArtifact {
            dir: dir.to_path_buf(),
            pattern: pattern.as_str().to_string(),
            expected: count,
            found: file_names(&matches),
        });
    }
    Ok(matches)
}

pub fn locate_one(dir: &Path, pattern: &ArtifactPattern) -> Result<PathBuf, PipelineError> {
    let mut matches = locate_exactly(dir, pattern, 1)?;
    Ok(matches.remove(0))
}

/// One or more matches, sorted.
pub fn locate_many(dir: &Path, pattern: &ArtifactPattern) -> Result<Vec<PathBuf>, PipelineError> {
    let matches = list_matching(dir, pattern)?;
    if matches.is_empty() {
        return Err(PipelineError::MissingArtifact {
            dir: dir.to_path_buf(),
            pattern: pattern.as_str().to_string(),
        });
    }
    Ok(matches)
}

/// Every path must be a regular file; the first one missing is a postcondition error.
pub fn require_files(paths: &[PathBuf]) -> Result<(), PipelineError> {
    for path in paths {
        if !path.is_file() {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            return Err(PipelineError::MissingArtifact {
                dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
                pattern: regex::escape(&name),
            });
        }
    }
    Ok(())
}

pub fn file_names(paths: &[PathBuf]) -> Vec<String> {
    paths
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect()
}
