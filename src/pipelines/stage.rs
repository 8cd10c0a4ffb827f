// Stage identity, per-stage workspaces and the postcondition check that
// closes every stage.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::task;

use crate::config::defs::{PipelineError, WorkspacePolicy, PRIMER_FASTA, REPORT_DIR, STAGE_LOG};
use crate::utils::command::fastqc::{self, FastqcConfig};
use crate::utils::naming::{file_names, FASTQ_SUFFIX, SEQUENCE_FILE};
use crate::utils::process::ToolRunner;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    TrimPrimers,
    JoinPairedEnds,
    QualityFilter,
    FastaFormat,
    LengthFilter,
    RemoveChimeras,
    RewriteSequenceIds,
}

impl Stage {
    pub fn slug(&self) -> &'static str {
        match self {
            Stage::TrimPrimers => "trim_primers",
            Stage::JoinPairedEnds => "join_paired_end_reads",
            Stage::QualityFilter => "quality_filter",
            Stage::FastaFormat => "fasta_format",
            Stage::LengthFilter => "length_filter",
            Stage::RemoveChimeras => "remove_chimeras",
            Stage::RewriteSequenceIds => "rewrite_sequence_ids",
        }
    }

    /// Working-directory name for the stage at 1-based `position` in the plan.
    pub fn dir_name(&self, position: usize) -> String {
        format!("step_{:02}_{}", position, self.slug())
    }

    /// Regex fragment naming the files this stage hands to its successor.
    pub fn product_suffix(&self) -> &'static str {
        match self {
            Stage::TrimPrimers => r"\.trim[12]p\.fastq",
            Stage::JoinPairedEnds => r"\.join\.fastq",
            Stage::QualityFilter => r"\.quality\.fastq",
            Stage::FastaFormat => r"\.fasta",
            Stage::LengthFilter => r"\.length\.fasta",
            Stage::RemoveChimeras => r"\.nonchimera\.fasta",
            Stage::RewriteSequenceIds => r"\.id\.fasta",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}


/// Everything a stage function needs to know about where it runs.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    pub stage: Stage,
    pub name: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
    /// Stage whose products are read from `input_dir`.
    pub upstream: Option<Stage>,
}

impl StageDescriptor {
    pub fn new(stage: Stage, name: String, input_dir: PathBuf, output_dir: PathBuf, upstream: Option<Stage>) -> Self {
        let log_path = output_dir.join(STAGE_LOG);
        StageDescriptor {
            stage,
            name,
            input_dir,
            output_dir,
            log_path,
            upstream,
        }
    }

    /// Suffix of the files to consume. Without an upstream stage the
    /// FASTQ stages follow their natural predecessor and the FASTA-only
    /// stages accept any FASTA.
    pub fn input_suffix(&self) -> &'static str {
        match self.upstream {
            Some(stage) => stage.product_suffix(),
            None => match self.stage {
                Stage::TrimPrimers => r"\.fastq",
                Stage::JoinPairedEnds => Stage::TrimPrimers.product_suffix(),
                Stage::QualityFilter => Stage::JoinPairedEnds.product_suffix(),
                Stage::FastaFormat => Stage::QualityFilter.product_suffix(),
                Stage::LengthFilter => Stage::FastaFormat.product_suffix(),
                Stage::RemoveChimeras | Stage::RewriteSequenceIds => r"\.fasta",
            },
        }
    }
}


/// Creates stage directories under the working root.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    policy: WorkspacePolicy,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>, policy: WorkspacePolicy) -> Self {
        Workspace { root: root.into(), policy }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the root if absent; never fails because it already exists.
    pub fn ensure_root(&self) -> Result<(), PipelineError> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn prepare_stage(&self, stage_name: &str) -> Result<PathBuf, PipelineError> {
        prepare(&self.root, stage_name, self.policy)
    }
}

/// Creates `parent_dir/stage_name`.
///
/// # Arguments
///
/// * `parent_dir` - Working root; must already exist or be creatable.
/// * `stage_name` - Directory name of the stage.
/// * `policy` - Idempotent reuses an existing directory untouched;
///   Strict refuses it with StageCollision.
///
/// # Returns
/// Path of the stage directory.
pub fn prepare(parent_dir: &Path, stage_name: &str, policy: WorkspacePolicy) -> Result<PathBuf, PipelineError> {
    let output_dir = parent_dir.join(stage_name);
    if output_dir.exists() {
        match policy {
            WorkspacePolicy::Idempotent => {
                debug!("reusing stage directory {:?}", output_dir);
                return Ok(output_dir);
            }
            WorkspacePolicy::Strict => {
                return Err(PipelineError::StageCollision { dir: output_dir });
            }
        }
    }
    fs::create_dir_all(&output_dir)?;
    Ok(output_dir)
}


/// Outcome of the advisory FASTQ report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportStatus {
    NotRequested,
    NoFastq,
    Written(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub outputs: Vec<PathBuf>,
    pub report: ReportStatus,
}

/// Confirms a stage left sequence files behind and, when asked, runs the
/// FASTQ report over them. A report failure is logged and returned, never raised.
///
/// # Arguments
///
/// * `output_dir` - Stage directory to check.
/// * `require_fastq_report` - Run fastqc over FASTQ outputs into `report/`.
/// * `runner` - Tool runner used for fastqc.
/// * `threads` - Passed to fastqc.
///
/// # Returns
/// Validation with the sorted sequence outputs and the report status.
pub async fn validate<R: ToolRunner>(
    output_dir: &Path,
    require_fastq_report: bool,
    runner: &R,
    threads: usize,
) -> Result<Validation, PipelineError> {
    let dir = output_dir.to_path_buf();
    let outputs = task::spawn_blocking(move || sequence_outputs(&dir)).await??;
    if outputs.is_empty() {
        return Err(PipelineError::NoOutput { dir: output_dir.to_path_buf() });
    }
    info!("output files:\n\t{}", file_names(&outputs).join("\n\t"));

    if !require_fastq_report {
        return Ok(Validation { outputs, report: ReportStatus::NotRequested });
    }

    let fastq_outputs: Vec<PathBuf> = outputs
        .iter()
        .filter(|p| FASTQ_SUFFIX.is_match(&p.to_string_lossy()))
        .cloned()
        .collect();
    if fastq_outputs.is_empty() {
        info!("no FASTQ files");
        return Ok(Validation { outputs, report: ReportStatus::NoFastq });
    }

    let report = run_report(output_dir, &fastq_outputs, runner, threads).await;
    Ok(Validation { outputs, report })
}

/// Sequence files in `dir`, sorted. The primer FASTA is a tool input, not a product.
fn sequence_outputs(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut outputs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_file() && name != PRIMER_FASTA && SEQUENCE_FILE.is_match(&name) {
            outputs.push(entry.path());
        }
    }
    outputs.sort();
    Ok(outputs)
}

async fn run_report<R: ToolRunner>(output_dir: &Path, fastq_outputs: &[PathBuf], runner: &R, threads: usize) -> ReportStatus {
    let report_dir = output_dir.join(REPORT_DIR);
    if let Err(e) = fs::create_dir_all(&report_dir) {
        warn!("FASTQ report skipped, cannot create {:?}: {}", report_dir, e);
        return ReportStatus::Failed(e.to_string());
    }

    let args = fastqc::arg_generator(&FastqcConfig {
        inputs: fastq_outputs,
        out_dir: &report_dir,
        threads,
    });
    match runner.run(&args, &report_dir.join(STAGE_LOG)).await {
        Ok(_) => ReportStatus::Written(report_dir),
        Err(e) => {
            warn!("FASTQ report failed (advisory, stage continues): {}", e);
            ReportStatus::Failed(e.to_string())
        }
    }
}
