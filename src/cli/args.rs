use clap::Parser;

use crate::config::defs::{
    DEFAULT_FORWARD_PRIMER, DEFAULT_MIN_LENGTH, DEFAULT_PREFIX_PATTERN, DEFAULT_MIN_OVERLAP, DEFAULT_QUALITY_CUTOFF,
    DEFAULT_QUALITY_MIN_PERCENT, DEFAULT_REVERSE_PRIMER, DEFAULT_TRIM_MIN_LEN,
};

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "amplicon-qc", version, about = "Trim, join, filter and relabel one pair of paired-end amplicon reads")]
pub struct Arguments {

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(short = 'f', long = "forward-reads", help = "Path to a forward-read FASTQ file; the reverse file is found by replacing R1 with R2")]
    pub forward_reads: String,

    #[arg(short = 'w', long = "work-dir", help = "Working directory; one sub-directory is created per stage")]
    pub work_dir: String,

    #[arg(short = 'c', long = "core-count", help = "Number of cores handed to the external tools. Defaults to the physical core count, capped by --threads")]
    pub core_count: Option<usize>,

    #[arg(long, default_value_t = 64)]
    pub threads: usize,

    #[arg(short = 'p', long = "prefix-regex", default_value = DEFAULT_PREFIX_PATTERN, help = "Regular expression matching the input file name with named group <prefix>")]
    pub prefix_regex: String,

    #[arg(long, default_value = DEFAULT_FORWARD_PRIMER)]
    pub forward_primer: String,

    #[arg(long, default_value = DEFAULT_REVERSE_PRIMER)]
    pub reverse_primer: String,

    #[arg(long, default_value_t = DEFAULT_MIN_OVERLAP, help = "Minimum overlap for joining paired ends")]
    pub min_overlap: u32,

    #[arg(long, default_value_t = 33, help = "Quality encoding offset: 33 or 64")]
    pub phred: u8,

    #[arg(long, default_value_t = DEFAULT_TRIM_MIN_LEN, help = "Trimmomatic MINLEN")]
    pub trim_min_len: usize,

    #[arg(short = 'q', long = "quality", default_value_t = DEFAULT_QUALITY_CUTOFF)]
    pub quality_cutoff: u8,

    #[arg(long, default_value_t = DEFAULT_QUALITY_MIN_PERCENT, help = "Minimum percent of bases at or above --quality")]
    pub quality_min_percent: u8,

    #[arg(long, default_value_t = DEFAULT_MIN_LENGTH)]
    pub min_length: usize,

    #[arg(long)]
    pub max_length: Option<usize>,

    #[arg(long = "chimera-db", help = "Optional reference database; enables vsearch reference chimera removal")]
    pub chimera_db: Option<String>,

    #[arg(long, default_value_t = false, help = "Leave intermediate and final files uncompressed")]
    pub no_compress: bool,

    #[arg(long, default_value_t = false, help = "Fail when a stage directory already exists instead of reusing it")]
    pub strict_workspace: bool,

    #[arg(long, default_value_t = false, help = "Stop after the length filter (five-stage pipeline)")]
    pub skip_rewrite_ids: bool,

    #[arg(long, default_value_t = false, help = "Do not run FastQC over FASTQ stage outputs")]
    pub skip_fastqc: bool,
}
