// Amplicon QC pipeline: paired-end reads in, per-sample FASTA out, one
// working directory per stage.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tokio::task;

use crate::config::defs::{PipelineConfig, PipelineError, PRIMER_FASTA};
use crate::pipelines::stage::{validate, Stage, StageDescriptor, Workspace};
use crate::utils::command::fastq_join::{self, FastqJoinConfig};
use crate::utils::command::fastq_quality_filter::{self, QualityFilterConfig};
use crate::utils::command::fastq_to_fasta::{self, FastqToFastaConfig};
use crate::utils::command::fastx_clipper::{self, ClipperConfig};
use crate::utils::command::trimmomatic::{self, TrimmomaticConfig};
use crate::utils::command::vsearch::{self, UchimeRefConfig};
use crate::utils::fastx::{length_cutoff, rewrite_sequence_ids, write_primer_fasta};
use crate::utils::file::{delete_files, gzip_files, stage_uncompressed, StagedInput};
use crate::utils::naming::{
    gz_suffix, locate_exactly, locate_many, locate_one, require_files, ArtifactPattern, SuffixRule, FASTA_SUFFIX,
    FASTQ_SUFFIX,
};
use crate::utils::process::{append_log_line, ProcessRunner, ToolRunner};
use crate::utils::sample::{extract_prefix, reverse_path, SamplePrefix};


/// Progress of a single `run`.
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    NotStarted,
    Running(Stage),
    Complete,
    Failed { stage: Stage, cause: String },
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Running(stage) => write!(f, "running {}", stage),
            RunState::Complete => write!(f, "complete"),
            RunState::Failed { stage, cause } => write!(f, "failed in {}: {}", stage, cause),
        }
    }
}


pub struct Pipeline<R: ToolRunner = ProcessRunner> {
    config: PipelineConfig,
    prefix: SamplePrefix,
    reverse_reads: PathBuf,
    workspace: Workspace,
    runner: R,
    state: RunState,
}

impl Pipeline<ProcessRunner> {
    /// Pipeline that runs the real tools as child processes.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::with_runner(config, ProcessRunner)
    }
}

impl<R: ToolRunner> Pipeline<R> {
    /// Validates the configuration and derives the sample prefix and the
    /// reverse-read path. Nothing is written to disk.
    ///
    /// # Arguments
    ///
    /// * `config` - Run configuration.
    /// * `runner` - Executes external tools for every stage.
    ///
    /// # Returns
    /// Pipeline, or a configuration error.
    pub fn with_runner(config: PipelineConfig, runner: R) -> Result<Self, PipelineError> {
        config.validate()?;
        let prefix = extract_prefix(&config.forward_reads, &config.prefix_pattern)?;
        let reverse_reads = reverse_path(&config.forward_reads);
        debug!("sample prefix {}, reverse reads {:?}", prefix, reverse_reads);
        let workspace = Workspace::new(&config.work_dir, config.variant.workspace);

        Ok(Pipeline {
            config,
            prefix,
            reverse_reads,
            workspace,
            runner,
            state: RunState::NotStarted,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn prefix(&self) -> &SamplePrefix {
        &self.prefix
    }

    pub fn reverse_reads(&self) -> &Path {
        &self.reverse_reads
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Stages of this run, in execution order.
    pub fn plan(&self) -> Vec<Stage> {
        let mut stages = vec![
            Stage::TrimPrimers,
            Stage::JoinPairedEnds,
            Stage::QualityFilter,
            Stage::FastaFormat,
            Stage::LengthFilter,
        ];
        if self.config.chimera_db.is_some() {
            stages.push(Stage::RemoveChimeras);
        }
        if self.config.variant.rewrite_ids {
            stages.push(Stage::RewriteSequenceIds);
        }
        stages
    }

    /// Runs every planned stage in order, each reading the previous stage's
    /// directory. Stops at the first failure; finished stage directories stay.
    ///
    /// # Returns
    /// Output directories in stage order.
    pub async fn run(&mut self) -> Result<Vec<PathBuf>, PipelineError> {
        self.workspace.ensure_root()?;
        info!("running {} stages for sample {} in {:?}", self.plan().len(), self.prefix, self.workspace.root());

        let mut input_dir = self
            .config
            .forward_reads
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut upstream = None;
        let mut output_dirs = Vec::new();

        for stage in self.plan() {
            self.state = RunState::Running(stage);
            debug!("{}: {}", self.prefix, self.state);
            match self.run_stage(stage, &input_dir, upstream).await {
                Ok(output_dir) => {
                    input_dir = output_dir.clone();
                    output_dirs.push(output_dir);
                    upstream = Some(stage);
                }
                Err(e) => {
                    self.state = RunState::Failed { stage, cause: e.to_string() };
                    warn!("{}: {}", self.prefix, self.state);
                    return Err(e);
                }
            }
        }

        self.state = RunState::Complete;
        info!("{}: {}", self.prefix, self.state);
        Ok(output_dirs)
    }

    /// Prepares the stage directory, runs the stage and validates its outputs.
    ///
    /// # Arguments
    ///
    /// * `stage` - Must be part of `plan()`; its position names the directory.
    /// * `input_dir` - Directory holding the upstream products.
    /// * `upstream` - Stage that produced them; `None` uses the natural predecessor.
    ///
    /// # Returns
    /// The stage's output directory. Failures carry the stage's directory name.
    pub async fn run_stage(
        &self,
        stage: Stage,
        input_dir: &Path,
        upstream: Option<Stage>,
    ) -> Result<PathBuf, PipelineError> {
        let position = self
            .plan()
            .iter()
            .position(|s| *s == stage)
            .ok_or_else(|| PipelineError::InvalidConfig(format!("stage {} is not part of this run", stage)))?;
        let name = stage.dir_name(position + 1);

        self.execute_stage(stage, &name, input_dir, upstream)
            .await
            .map_err(|e| e.in_stage(&name))
    }

    async fn execute_stage(
        &self,
        stage: Stage,
        name: &str,
        input_dir: &Path,
        upstream: Option<Stage>,
    ) -> Result<PathBuf, PipelineError> {
        let (workspace, stage_name) = (self.workspace.clone(), name.to_string());
        let output_dir = blocking(move || workspace.prepare_stage(&stage_name)).await?;
        let descriptor = StageDescriptor::new(stage, name.to_string(), input_dir.to_path_buf(), output_dir, upstream);
        info!("starting {}", descriptor.name);

        match stage {
            Stage::TrimPrimers => self.trim_primers(&descriptor).await?,
            Stage::JoinPairedEnds => self.join_paired_ends(&descriptor).await?,
            Stage::QualityFilter => self.quality_filter(&descriptor).await?,
            Stage::FastaFormat => self.fasta_format(&descriptor).await?,
            Stage::LengthFilter => self.length_filter(&descriptor).await?,
            Stage::RemoveChimeras => self.remove_chimeras(&descriptor).await?,
            Stage::RewriteSequenceIds => self.rewrite_sequence_ids(&descriptor).await?,
        }

        let validation = validate(
            &descriptor.output_dir,
            self.config.variant.fastq_report,
            &self.runner,
            self.config.core_count,
        )
        .await?;
        debug!("{} report: {:?}", descriptor.name, validation.report);
        info!("finished {}", descriptor.name);
        Ok(descriptor.output_dir)
    }

    /// Removes primer and low-quality ends from both mates with TrimmomaticPE.
    /// Writes the primer FASTA it clips against next to the outputs.
    pub async fn trim_primers(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let gz = gz_suffix(self.config.variant.compress);

        let primer_fasta = out.join(PRIMER_FASTA);
        let (path, forward_primer, reverse_primer) = (
            primer_fasta.clone(),
            self.config.forward_primer.clone(),
            self.config.reverse_primer.clone(),
        );
        blocking(move || Ok(write_primer_fasta(&path, &forward_primer, &reverse_primer)?)).await?;

        let forward = self.config.forward_reads.as_path();
        let reverse = self.reverse_reads.as_path();
        let derive = |input: &Path, suffix: &str| {
            SuffixRule::from_regex(&FASTQ_SUFFIX, format!("{}{}", suffix, gz)).derive(input, out)
        };
        let forward_paired = derive(forward, ".trim1p.fastq")?;
        let forward_unpaired = derive(forward, ".trim1u.fastq")?;
        let reverse_paired = derive(reverse, ".trim2p.fastq")?;
        let reverse_unpaired = derive(reverse, ".trim2u.fastq")?;

        let args = trimmomatic::arg_generator(&TrimmomaticConfig {
            forward,
            reverse,
            forward_paired: &forward_paired,
            forward_unpaired: &forward_unpaired,
            reverse_paired: &reverse_paired,
            reverse_unpaired: &reverse_unpaired,
            primer_fasta: &primer_fasta,
            min_len: self.config.trim_min_len,
            phred: self.config.phred,
            threads: self.config.core_count,
        });
        self.runner.run(&args, &descriptor.log_path).await?;
        require_files(&[forward_paired, forward_unpaired, reverse_paired, reverse_unpaired])?;
        Ok(())
    }

    /// Merges overlapping mates with fastq-join.
    pub async fn join_paired_ends(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let inputs = locate_exactly(&descriptor.input_dir, &pattern, 2)?;

        let forward = stage_input(&inputs[0], out).await?;
        let reverse = stage_input(&inputs[1], out).await?;
        let output_template = SuffixRule::new(r"\.trim1p\.fastq(\.gz)?", ".trim.%.fastq")?.derive(&inputs[0], out)?;

        let args = fastq_join::arg_generator(&FastqJoinConfig {
            forward: &forward.path,
            reverse: &reverse.path,
            min_overlap: self.config.min_overlap,
            output_template: &output_template,
        });
        self.runner.run(&args, &descriptor.log_path).await?;

        forward.cleanup()?;
        reverse.cleanup()?;

        let joined = ArtifactPattern::uncompressed(&self.prefix, r"\.trim\.(join|un1|un2)\.fastq")?;
        let products = locate_exactly(out, &joined, 3)?;
        self.compress(products).await?;
        Ok(())
    }

    /// Drops reads below the quality threshold with fastq_quality_filter.
    pub async fn quality_filter(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let input = locate_one(&descriptor.input_dir, &pattern)?;

        let staged = stage_input(&input, out).await?;
        let output = SuffixRule::from_regex(&FASTQ_SUFFIX, ".quality.fastq").derive(&input, out)?;

        let args = fastq_quality_filter::arg_generator(&QualityFilterConfig {
            input: &staged.path,
            output: &output,
            quality_cutoff: self.config.quality_cutoff,
            min_percent: self.config.quality_min_percent,
            phred: self.config.phred,
        });
        self.runner.run(&args, &descriptor.log_path).await?;

        staged.cleanup()?;
        require_files(std::slice::from_ref(&output))?;
        self.compress(vec![output]).await?;
        Ok(())
    }

    /// Converts every upstream FASTQ to FASTA with fastq_to_fasta.
    pub async fn fasta_format(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let inputs = locate_many(&descriptor.input_dir, &pattern)?;

        let mut outputs = Vec::with_capacity(inputs.len());
        for input in &inputs {
            let staged = stage_input(input, out).await?;
            let output = SuffixRule::from_regex(&FASTQ_SUFFIX, ".fasta").derive(input, out)?;

            let args = fastq_to_fasta::arg_generator(&FastqToFastaConfig {
                input: &staged.path,
                output: &output,
                phred: self.config.phred,
            });
            self.runner.run(&args, &descriptor.log_path).await?;

            staged.cleanup()?;
            require_files(std::slice::from_ref(&output))?;
            outputs.push(output);
        }
        self.compress(outputs).await?;
        Ok(())
    }

    /// Clips with fastx_clipper, then keeps records within
    /// `[min_length, max_length]`.
    pub async fn length_filter(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let compress = self.config.variant.compress;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let inputs = locate_many(&descriptor.input_dir, &pattern)?;

        for input in &inputs {
            let staged = stage_input(input, out).await?;
            let clipped = SuffixRule::from_regex(&FASTA_SUFFIX, ".clipped.fasta").derive(input, out)?;
            let output = SuffixRule::from_regex(&FASTA_SUFFIX, format!(".length.fasta{}", gz_suffix(compress)))
                .derive(input, out)?;

            let args = fastx_clipper::arg_generator(&ClipperConfig {
                input: &staged.path,
                output: &clipped,
                min_length: self.config.min_length,
            });
            self.runner.run(&args, &descriptor.log_path).await?;
            staged.cleanup()?;
            require_files(std::slice::from_ref(&clipped))?;

            let (min_length, max_length) = (self.config.min_length, self.config.max_length);
            let (clipped_src, output_dst) = (clipped.clone(), output.clone());
            let counts = blocking(move || length_cutoff(&clipped_src, &output_dst, min_length, max_length, compress)).await?;

            let summary = format!(
                "length cutoff [{}, {}]: kept {}, dropped {}",
                min_length,
                max_length.map_or_else(|| "-".to_string(), |m| m.to_string()),
                counts.kept,
                counts.dropped
            );
            info!("{}", summary);
            append_log_line(&descriptor.log_path, &summary)?;
            delete_files(&[clipped])?;
        }
        Ok(())
    }

    /// Removes reference chimeras with `vsearch --uchime_ref`.
    pub async fn remove_chimeras(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let database = self
            .config
            .chimera_db
            .as_deref()
            .ok_or_else(|| PipelineError::InvalidConfig("chimera removal needs a reference database".to_string()))?;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let inputs = locate_many(&descriptor.input_dir, &pattern)?;

        let mut outputs = Vec::new();
        for input in &inputs {
            let staged = stage_input(input, out).await?;
            let derive = |suffix: &str| SuffixRule::from_regex(&FASTA_SUFFIX, suffix).derive(input, out);
            let nonchimeras = derive(".nonchimera.fasta")?;
            let chimeras = derive(".chimeras_ref.fasta")?;
            let uchimeout = derive(".uchimeinfo_ref")?;

            let args = vsearch::arg_generator(&UchimeRefConfig {
                input: &staged.path,
                database,
                uchimeout: &uchimeout,
                chimeras: &chimeras,
                nonchimeras: &nonchimeras,
                threads: self.config.core_count,
            });
            self.runner.run(&args, &descriptor.log_path).await?;

            staged.cleanup()?;
            require_files(&[nonchimeras.clone(), chimeras.clone()])?;
            outputs.push(nonchimeras);
            outputs.push(chimeras);
        }
        self.compress(outputs).await?;
        Ok(())
    }

    /// Prefixes every sequence id with the sample prefix. In-process; writes no log.
    pub async fn rewrite_sequence_ids(&self, descriptor: &StageDescriptor) -> Result<(), PipelineError> {
        let out = &descriptor.output_dir;
        let compress = self.config.variant.compress;
        let pattern = ArtifactPattern::for_sample(&self.prefix, descriptor.input_suffix())?;
        let inputs = locate_many(&descriptor.input_dir, &pattern)?;

        for input in inputs {
            let output = SuffixRule::from_regex(&FASTA_SUFFIX, format!(".id.fasta{}", gz_suffix(compress)))
                .derive(&input, out)?;
            let prefix = self.prefix.clone();
            let written = blocking(move || rewrite_sequence_ids(&input, &output, &prefix, compress)).await?;
            info!("rewrote {} sequence ids with prefix {}", written, self.prefix);
        }
        Ok(())
    }

    async fn compress(&self, paths: Vec<PathBuf>) -> Result<Vec<PathBuf>, PipelineError> {
        if !self.config.variant.compress {
            return Ok(paths);
        }
        blocking(move || Ok(gzip_files(&paths)?)).await
    }
}


/// Decompressed copy of `input` in `dir` for tools that only read plain text.
async fn stage_input(input: &Path, dir: &Path) -> Result<StagedInput, PipelineError> {
    let (input, dir) = (input.to_path_buf(), dir.to_path_buf());
    blocking(move || Ok(stage_uncompressed(&input, &dir)?)).await
}

async fn blocking<T, F>(f: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f).await?
}
