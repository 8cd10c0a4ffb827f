// Shared fixtures: sample reads on disk and a runner that stands in for the
// external tools by honouring their file contracts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use amplicon_qc_pipelines::config::defs::{
    FASTQC_TAG, FASTQ_JOIN_TAG, FASTQ_QUALITY_FILTER_TAG, FASTQ_TO_FASTA_TAG, FASTX_CLIPPER_TAG, TRIMMOMATIC_TAG,
    VSEARCH_TAG,
};
use amplicon_qc_pipelines::utils::fastx::{read_records, SequenceRecord};
use amplicon_qc_pipelines::utils::file::{has_gz_extension, sorted_file_list, FileWriter};
use amplicon_qc_pipelines::utils::process::{append_log_line, ToolOutput, ToolRunner};
use amplicon_qc_pipelines::{PipelineConfig, PipelineError};

pub const LONG_READ_LEN: usize = 100;
pub const SHORT_READ_LEN: usize = 20;


/// Writes `unittest_L001_R1.fastq` and `unittest_L001_R2.fastq` into `dir`.
/// The forward file holds one 100-base read and one 20-base read.
pub fn write_sample_reads(dir: &Path) -> PathBuf {
    let forward = dir.join("unittest_L001_R1.fastq");
    let reverse = dir.join("unittest_L001_R2.fastq");
    fs::write(
        &forward,
        format!(
            "@read1\n{}\n+\n{}\n@read2\n{}\n+\n{}\n",
            "G".repeat(LONG_READ_LEN),
            "a".repeat(LONG_READ_LEN),
            "G".repeat(SHORT_READ_LEN),
            "a".repeat(SHORT_READ_LEN)
        ),
    )
    .unwrap();
    fs::write(
        &reverse,
        format!(
            "@read1\n{}\n+\n{}\n@read2\n{}\n+\n{}\n",
            "C".repeat(LONG_READ_LEN),
            "a".repeat(LONG_READ_LEN),
            "C".repeat(SHORT_READ_LEN),
            "a".repeat(SHORT_READ_LEN)
        ),
    )
    .unwrap();
    forward
}

pub fn test_config(forward: &Path, work_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::new(forward, work_dir);
    config.forward_primer = "A".repeat(30);
    config.reverse_primer = "T".repeat(30);
    config.trim_min_len = 4;
    config.core_count = 1;
    config
}

pub fn file_names(dir: &Path) -> Vec<String> {
    sorted_file_list(dir)
        .unwrap()
        .iter()
        .filter_map(|path| path.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}


/// Records every command line and simulates the tool's outputs.
#[derive(Debug, Clone, Default)]
pub struct FakeRunner {
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    fail_on: Option<String>,
    silent: bool,
}

impl FakeRunner {
    pub fn new() -> Self {
        FakeRunner::default()
    }

    /// Every invocation of `tool` exits with status 1.
    pub fn failing_on(tool: &str) -> Self {
        FakeRunner {
            fail_on: Some(tool.to_string()),
            ..FakeRunner::default()
        }
    }

    /// Every invocation exits with status 0 and writes no output files.
    pub fn silent() -> Self {
        FakeRunner {
            silent: true,
            ..FakeRunner::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn tools(&self) -> Vec<String> {
        self.calls().into_iter().map(|argv| argv[0].clone()).collect()
    }
}

impl ToolRunner for FakeRunner {
    async fn run(&self, argv: &[String], log_path: &Path) -> Result<ToolOutput, PipelineError> {
        self.calls.lock().unwrap().push(argv.to_vec());
        append_log_line(log_path, &format!("executing \"{}\"", argv.join(" ")))?;

        if self.fail_on.as_deref() == Some(argv[0].as_str()) {
            append_log_line(log_path, "simulated failure")?;
            return Err(PipelineError::ExternalTool {
                argv: argv.to_vec(),
                code: Some(1),
                output: "simulated failure\n".to_string(),
            });
        }

        if !self.silent {
            simulate(argv)?;
        }
        Ok(ToolOutput {
            argv: argv.to_vec(),
            code: Some(0),
            output: String::new(),
        })
    }
}

fn simulate(argv: &[String]) -> Result<(), PipelineError> {
    match argv[0].as_str() {
        TRIMMOMATIC_TAG => {
            // -threads N -phredNN fwd rev 1p 1u 2p 2u steps...
            let paths: Vec<PathBuf> = argv[4..10].iter().map(PathBuf::from).collect();
            copy_records(&paths[0], &paths[2])?;
            write_records(&paths[3], &[])?;
            copy_records(&paths[1], &paths[4])?;
            write_records(&paths[5], &[])?;
        }
        FASTQ_JOIN_TAG => {
            let template = value_after(argv, "-o");
            let template = template.to_string_lossy();
            copy_records(Path::new(&argv[1]), Path::new(&template.replace('%', "join")))?;
            write_records(Path::new(&template.replace('%', "un1")), &[])?;
            write_records(Path::new(&template.replace('%', "un2")), &[])?;
        }
        FASTQ_QUALITY_FILTER_TAG | FASTX_CLIPPER_TAG => {
            copy_records(&value_after(argv, "-i"), &value_after(argv, "-o"))?;
        }
        FASTQ_TO_FASTA_TAG => {
            // -r renumbers identifiers from 1
            let records: Vec<SequenceRecord> = read_records(&value_after(argv, "-i"))?
                .into_iter()
                .enumerate()
                .map(|(i, record)| SequenceRecord::Fasta {
                    id: (i + 1).to_string(),
                    desc: None,
                    seq: record.seq().to_vec(),
                })
                .collect();
            write_records(&value_after(argv, "-o"), &records)?;
        }
        VSEARCH_TAG => {
            copy_records(&value_after(argv, "--uchime_ref"), &value_after(argv, "--nonchimeras"))?;
            write_records(&value_after(argv, "--chimeras"), &[])?;
            fs::write(value_after(argv, "--uchimeout"), "")?;
        }
        FASTQC_TAG => {
            fs::write(value_after(argv, "--outdir").join("fastqc_report.html"), "<html></html>")?;
        }
        other => {
            return Err(PipelineError::ToolNotFound {
                tool: other.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not simulated"),
            });
        }
    }
    Ok(())
}

fn value_after(argv: &[String], flag: &str) -> PathBuf {
    let pos = argv.iter().position(|a| a == flag).unwrap();
    PathBuf::from(&argv[pos + 1])
}

fn copy_records(input: &Path, output: &Path) -> Result<(), PipelineError> {
    write_records(output, &read_records(input)?)
}

fn write_records(output: &Path, records: &[SequenceRecord]) -> Result<(), PipelineError> {
    let mut writer = FileWriter::create(output, has_gz_extension(output))?;
    for record in records {
        record.write_to(&mut writer)?;
    }
    writer.finish()?;
    Ok(())
}
