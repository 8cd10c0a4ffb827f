/// Functions and structs for building external tool command lines.
/// Each tool gets one adapter; argument order lives only here.

use std::path::Path;

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}


pub mod trimmomatic {
    use std::path::Path;
    use crate::config::defs::{ILLUMINACLIP_SETTINGS, PhredOffset, TRIMMOMATIC_TAG, TRIM_LEADING, TRIM_TRAILING, TRIM_WINDOW};
    use super::path_arg;

    pub struct TrimmomaticConfig<'a> {
        pub forward: &'a Path,
        pub reverse: &'a Path,
        pub forward_paired: &'a Path,
        pub forward_unpaired: &'a Path,
        pub reverse_paired: &'a Path,
        pub reverse_unpaired: &'a Path,
        pub primer_fasta: &'a Path,
        pub min_len: usize,
        pub phred: PhredOffset,
        pub threads: usize,
    }

    pub fn arg_generator(config: &TrimmomaticConfig) -> Vec<String> {
        vec![
            TRIMMOMATIC_TAG.to_string(),
            "-threads".to_string(),
            config.threads.to_string(),
            format!("-phred{}", config.phred),
            path_arg(config.forward),
            path_arg(config.reverse),
            path_arg(config.forward_paired),
            path_arg(config.forward_unpaired),
            path_arg(config.reverse_paired),
            path_arg(config.reverse_unpaired),
            format!("LEADING:{}", TRIM_LEADING),
            format!("TRAILING:{}", TRIM_TRAILING),
            format!("SLIDINGWINDOW:{}:{}", TRIM_WINDOW.0, TRIM_WINDOW.1),
            format!("MINLEN:{}", config.min_len),
            format!("ILLUMINACLIP:{}:{}", path_arg(config.primer_fasta), ILLUMINACLIP_SETTINGS),
        ]
    }
}

pub mod fastq_join {
    use std::path::Path;
    use crate::config::defs::FASTQ_JOIN_TAG;
    use super::path_arg;

    pub struct FastqJoinConfig<'a> {
        pub forward: &'a Path,
        pub reverse: &'a Path,
        pub min_overlap: u32,
        /// Output template; fastq-join replaces `%` with join, un1 and un2.
        pub output_template: &'a Path,
    }

    pub fn arg_generator(config: &FastqJoinConfig) -> Vec<String> {
        vec![
            FASTQ_JOIN_TAG.to_string(),
            path_arg(config.forward),
            path_arg(config.reverse),
            "-m".to_string(),
            config.min_overlap.to_string(),
            "-o".to_string(),
            path_arg(config.output_template),
        ]
    }
}

pub mod fastq_quality_filter {
    use std::path::Path;
    use crate::config::defs::{FASTQ_QUALITY_FILTER_TAG, PhredOffset};
    use super::path_arg;

    pub struct QualityFilterConfig<'a> {
        pub input: &'a Path,
        pub output: &'a Path,
        pub quality_cutoff: u8,
        pub min_percent: u8,
        pub phred: PhredOffset,
    }

    pub fn arg_generator(config: &QualityFilterConfig) -> Vec<String> {
        vec![
            FASTQ_QUALITY_FILTER_TAG.to_string(),
            "-i".to_string(),
            path_arg(config.input),
            "-o".to_string(),
            path_arg(config.output),
            "-v".to_string(),
            "-q".to_string(),
            config.quality_cutoff.to_string(),
            "-p".to_string(),
            config.min_percent.to_string(),
            format!("-Q{}", config.phred),
        ]
    }
}

pub mod fastq_to_fasta {
    use std::path::Path;
    use crate::config::defs::{FASTQ_TO_FASTA_TAG, PhredOffset};
    use super::path_arg;

    pub struct FastqToFastaConfig<'a> {
        pub input: &'a Path,
        pub output: &'a Path,
        pub phred: PhredOffset,
    }

    /// `-n` keeps reads with unknown bases, `-r` renumbers identifiers.
    pub fn arg_generator(config: &FastqToFastaConfig) -> Vec<String> {
        vec![
            FASTQ_TO_FASTA_TAG.to_string(),
            "-i".to_string(),
            path_arg(config.input),
            "-o".to_string(),
            path_arg(config.output),
            "-n".to_string(),
            "-v".to_string(),
            "-r".to_string(),
            format!("-Q{}", config.phred),
        ]
    }
}

pub mod fastx_clipper {
    use std::path::Path;
    use crate::config::defs::FASTX_CLIPPER_TAG;
    use super::path_arg;

    pub struct ClipperConfig<'a> {
        pub input: &'a Path,
        pub output: &'a Path,
        pub min_length: usize,
    }

    pub fn arg_generator(config: &ClipperConfig) -> Vec<String> {
        vec![
            FASTX_CLIPPER_TAG.to_string(),
            "-i".to_string(),
            path_arg(config.input),
            "-o".to_string(),
            path_arg(config.output),
            "-l".to_string(),
            config.min_length.to_string(),
            "-n".to_string(),
            "-v".to_string(),
        ]
    }
}

pub mod vsearch {
    use std::path::Path;
    use crate::config::defs::VSEARCH_TAG;
    use super::path_arg;

    pub struct UchimeRefConfig<'a> {
        pub input: &'a Path,
        pub database: &'a Path,
        pub uchimeout: &'a Path,
        pub chimeras: &'a Path,
        pub nonchimeras: &'a Path,
        pub threads: usize,
    }

    pub fn arg_generator(config: &UchimeRefConfig) -> Vec<String> {
        vec![
            VSEARCH_TAG.to_string(),
            "--uchime_ref".to_string(),
            path_arg(config.input),
            "--db".to_string(),
            path_arg(config.database),
            "--uchimeout".to_string(),
            path_arg(config.uchimeout),
            "--chimeras".to_string(),
            path_arg(config.chimeras),
            "--strand".to_string(),
            "plus".to_string(),
            "--nonchimeras".to_string(),
            path_arg(config.nonchimeras),
            "--threads".to_string(),
            config.threads.to_string(),
        ]
    }
}

pub mod fastqc {
    use std::path::{Path, PathBuf};
    use crate::config::defs::FASTQC_TAG;
    use super::path_arg;

    pub struct FastqcConfig<'a> {
        pub inputs: &'a [PathBuf],
        pub out_dir: &'a Path,
        pub threads: usize,
    }

    pub fn arg_generator(config: &FastqcConfig) -> Vec<String> {
        let mut args_vec = vec![
            FASTQC_TAG.to_string(),
            "--threads".to_string(),
            config.threads.to_string(),
            "--outdir".to_string(),
            path_arg(config.out_dir),
        ];
        args_vec.extend(config.inputs.iter().map(|p| path_arg(p)));
        args_vec
    }
}
