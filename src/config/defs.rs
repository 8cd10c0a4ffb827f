use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::cli::Arguments;
use crate::utils::naming::FASTQ_SUFFIX;

// External software
pub const TRIMMOMATIC_TAG: &str = "TrimmomaticPE";
pub const FASTQ_JOIN_TAG: &str = "fastq-join";
pub const FASTQ_QUALITY_FILTER_TAG: &str = "fastq_quality_filter";
pub const FASTQ_TO_FASTA_TAG: &str = "fastq_to_fasta";
pub const FASTX_CLIPPER_TAG: &str = "fastx_clipper";
pub const VSEARCH_TAG: &str = "vsearch";
pub const FASTQC_TAG: &str = "fastqc";

// Static Filenames
pub const STAGE_LOG: &str = "log";
pub const PRIMER_FASTA: &str = "trimPE.fasta";
pub const REPORT_DIR: &str = "report";
pub const GZIP_EXT: &str = "gz";

// Static Parameters
pub const DEFAULT_FORWARD_PRIMER: &str = "CCAGCASCYGCGGTAATTCC";
pub const DEFAULT_REVERSE_PRIMER: &str = "TYRATCAAGAACGAAAGT";
pub const DEFAULT_PREFIX_PATTERN: &str = r"^(?P<prefix>[a-zA-Z0-9_]+)_L001_R[12]";
pub const DEFAULT_MIN_OVERLAP: u32 = 20;
pub const DEFAULT_TRIM_MIN_LEN: usize = 50;
pub const DEFAULT_QUALITY_CUTOFF: u8 = 30;
pub const DEFAULT_QUALITY_MIN_PERCENT: u8 = 90;
pub const DEFAULT_MIN_LENGTH: usize = 50;

pub const TRIM_LEADING: u8 = 10;
pub const TRIM_TRAILING: u8 = 10;
pub const TRIM_WINDOW: (u8, u8) = (10, 30);
pub const ILLUMINACLIP_SETTINGS: &str = "2:30:10";

pub const FORWARD_READ_TAG: &str = "R1";
pub const REVERSE_READ_TAG: &str = "R2";

pub const FASTA_TAG: &str = "fasta";
pub const FASTQ_TAG: &str = "fastq";
pub const FASTA_EXTS: &[&str] = &["fasta", "fa", "fna", "faa", "ffn", "frn"];
pub const FASTQ_EXTS: &[&str] = &["fastq", "fq"];


/// Quality-score encoding offset of the input reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhredOffset {
    #[default]
    Phred33,
    Phred64,
}

impl PhredOffset {
    pub fn value(&self) -> u8 {
        match self {
            PhredOffset::Phred33 => 33,
            PhredOffset::Phred64 => 64,
        }
    }
}

impl TryFrom<u8> for PhredOffset {
    type Error = PipelineError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            33 => Ok(PhredOffset::Phred33),
            64 => Ok(PhredOffset::Phred64),
            other => Err(PipelineError::InvalidConfig(format!(
                "quality encoding must be 33 or 64, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for PhredOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}


/// What `prepare` does when a stage directory is already on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkspacePolicy {
    /// Reuse the directory and leave its contents alone.
    #[default]
    Idempotent,
    /// Treat an existing directory as a collision with an earlier run.
    Strict,
}


/// Pipeline generation selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineVariant {
    pub compress: bool,
    pub workspace: WorkspacePolicy,
    pub rewrite_ids: bool,
    pub fastq_report: bool,
}

impl Default for PipelineVariant {
    fn default() -> Self {
        PipelineVariant {
            compress: true,
            workspace: WorkspacePolicy::Idempotent,
            rewrite_ids: true,
            fastq_report: true,
        }
    }
}


#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub forward_reads: PathBuf,
    pub forward_primer: String,
    pub reverse_primer: String,
    pub min_overlap: u32,
    pub phred: PhredOffset,
    pub trim_min_len: usize,
    pub quality_cutoff: u8,
    pub quality_min_percent: u8,
    pub min_length: usize,
    pub max_length: Option<usize>,
    pub core_count: usize,
    pub prefix_pattern: String,
    pub work_dir: PathBuf,
    pub chimera_db: Option<PathBuf>,
    pub variant: PipelineVariant,
}

impl PipelineConfig {
    /// Config with the default thresholds for one forward-read file.
    pub fn new(forward_reads: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        PipelineConfig {
            forward_reads: forward_reads.into(),
            forward_primer: DEFAULT_FORWARD_PRIMER.to_string(),
            reverse_primer: DEFAULT_REVERSE_PRIMER.to_string(),
            min_overlap: DEFAULT_MIN_OVERLAP,
            phred: PhredOffset::default(),
            trim_min_len: DEFAULT_TRIM_MIN_LEN,
            quality_cutoff: DEFAULT_QUALITY_CUTOFF,
            quality_min_percent: DEFAULT_QUALITY_MIN_PERCENT,
            min_length: DEFAULT_MIN_LENGTH,
            max_length: None,
            core_count: 1,
            prefix_pattern: DEFAULT_PREFIX_PATTERN.to_string(),
            work_dir: work_dir.into(),
            chimera_db: None,
            variant: PipelineVariant::default(),
        }
    }

    /// Builds the run configuration from parsed command-line arguments.
    ///
    /// # Arguments
    ///
    /// * `args` - Parsed CLI arguments.
    /// * `core_count` - Cores resolved by the caller (detected or requested).
    ///
    /// # Returns
    /// PipelineConfig, or InvalidConfig for a bad quality encoding.
    pub fn from_args(args: &Arguments, core_count: usize) -> Result<Self, PipelineError> {
        let workspace = if args.strict_workspace {
            WorkspacePolicy::Strict
        } else {
            WorkspacePolicy::Idempotent
        };

        Ok(PipelineConfig {
            forward_reads: PathBuf::from(&args.forward_reads),
            forward_primer: args.forward_primer.clone(),
            reverse_primer: args.reverse_primer.clone(),
            min_overlap: args.min_overlap,
            phred: PhredOffset::try_from(args.phred)?,
            trim_min_len: args.trim_min_len,
            quality_cutoff: args.quality_cutoff,
            quality_min_percent: args.quality_min_percent,
            min_length: args.min_length,
            max_length: args.max_length,
            core_count,
            prefix_pattern: args.prefix_regex.clone(),
            work_dir: PathBuf::from(&args.work_dir),
            chimera_db: args.chimera_db.as_ref().map(PathBuf::from),
            variant: PipelineVariant {
                compress: !args.no_compress,
                workspace,
                rewrite_ids: !args.skip_rewrite_ids,
                fastq_report: !args.skip_fastqc,
            },
        })
    }

    /// Checks the read file name and the numeric settings. The prefix
    /// pattern is checked separately when the prefix is derived.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let file_name = self
            .forward_reads
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !FASTQ_SUFFIX.is_match(&file_name) {
            return Err(PipelineError::InvalidConfig(format!(
                "forward reads must end in .fastq or .fastq.gz, got {:?}",
                self.forward_reads
            )));
        }
        if self.core_count == 0 {
            return Err(PipelineError::InvalidConfig("core count must be at least 1".to_string()));
        }
        if self.min_length == 0 {
            return Err(PipelineError::InvalidConfig(
                "minimum sequence length must be greater than 0".to_string(),
            ));
        }
        if let Some(max_length) = self.max_length {
            if self.min_length > max_length {
                return Err(PipelineError::InvalidConfig(format!(
                    "invalid length bounds: min_length={}, max_length={}",
                    self.min_length, max_length
                )));
            }
        }
        if self.quality_min_percent > 100 {
            return Err(PipelineError::InvalidConfig(format!(
                "quality percentage must be at most 100, got {}",
                self.quality_min_percent
            )));
        }
        if self.forward_primer.is_empty() || self.reverse_primer.is_empty() {
            return Err(PipelineError::InvalidConfig("primer sequences must not be empty".to_string()));
        }
        Ok(())
    }
}


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse file name \"{file_name}\" with regular expression \"{pattern}\"")]
    PrefixExtraction { file_name: String, pattern: String },

    #[error("Failed to start {tool}: {source}")]
    ToolNotFound {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("\"{}\" exited with {}:\n{output}", argv.join(" "), describe_exit(*code))]
    ExternalTool {
        argv: Vec<String>,
        code: Option<i32>,
        output: String,
    },

    #[error("No FASTA or FASTQ files in directory \"{}\"", dir.display())]
    NoOutput { dir: PathBuf },

    #[error("No file matching /{pattern}/ in \"{}\"", dir.display())]
    MissingArtifact { dir: PathBuf, pattern: String },

    #[error("Expected {expected} file(s) matching /{pattern}/ in \"{}\", found {}: {:?}", dir.display(), found.len(), found)]
    AmbiguousArtifact {
        dir: PathBuf,
        pattern: String,
        expected: usize,
        found: Vec<String>,
    },

    #[error("Stage directory \"{}\" already exists", dir.display())]
    StageCollision { dir: PathBuf },

    #[error("Invalid sequence file \"{}\": {reason}", path.display())]
    InvalidSequence { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IOError(#[from] io::Error),

    #[error("Background task failed: {0}")]
    TaskJoin(String),

    #[error("Stage {stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wraps a failure with the name of the stage it happened in.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            PipelineError::Stage { .. } => self,
            other => PipelineError::Stage {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Strips the stage wrapper, if any.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::InvalidConfig(_) | PipelineError::PrefixExtraction { .. }
        )
    }

    pub fn is_postcondition(&self) -> bool {
        matches!(
            self.root(),
            PipelineError::NoOutput { .. }
                | PipelineError::MissingArtifact { .. }
                | PipelineError::AmbiguousArtifact { .. }
                | PipelineError::StageCollision { .. }
        )
    }
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::TaskJoin(e.to_string())
    }
}
