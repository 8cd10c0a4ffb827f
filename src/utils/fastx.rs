use std::io::{self, Write};
use std::path::Path;

use seq_io::fasta::{OwnedRecord as FastaOwnedRecord, Reader as FastaReader};
use seq_io::fastq::{OwnedRecord as FastqOwnedRecord, Reader as FastqReader};

use crate::config::defs::{FASTA_EXTS, FASTA_TAG, FASTQ_EXTS, FASTQ_TAG, PipelineError};
use crate::utils::file::{extension_remover, open_reader, FileReader, FileWriter};
use crate::utils::sample::SamplePrefix;

const FASTA_LINE_WIDTH: usize = 80;

/// Defines FASTA and FASTQ as part of a unified FASTX structure.
#[derive(Clone, Debug, PartialEq)]
pub enum SequenceRecord {
    Fasta {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
    },
    Fastq {
        id: String,
        desc: Option<String>,
        seq: Vec<u8>,
        qual: Vec<u8>,
    },
}

/// Maps id and seq to the correct file type.
impl SequenceRecord {
    pub fn id(&self) -> &str {
        match self {
            SequenceRecord::Fasta { id, .. } => id,
            SequenceRecord::Fastq { id, .. } => id,
        }
    }

    pub fn desc(&self) -> Option<&str> {
        match self {
            SequenceRecord::Fasta { desc, .. } => desc.as_deref(),
            SequenceRecord::Fastq { desc, .. } => desc.as_deref(),
        }
    }

    pub fn seq(&self) -> &[u8] {
        match self {
            SequenceRecord::Fasta { seq, .. } => seq,
            SequenceRecord::Fastq { seq, .. } => seq,
        }
    }

    /// Tags the identifier with the sample prefix, `<prefix>_<id>`.
    /// The description is dropped so the header carries only the new id.
    pub fn relabel(self, prefix: &SamplePrefix) -> Self {
        match self {
            SequenceRecord::Fasta { id, seq, .. } => SequenceRecord::Fasta {
                id: prefix.tag(&id),
                desc: None,
                seq,
            },
            SequenceRecord::Fastq { id, seq, qual, .. } => SequenceRecord::Fastq {
                id: prefix.tag(&id),
                desc: None,
                seq,
                qual,
            },
        }
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            SequenceRecord::Fastq { id, desc, seq, qual } => {
                write_fastq_record(writer, id, desc.as_deref(), seq, qual)
            }
            SequenceRecord::Fasta { id, desc, seq } => {
                write_fasta_record(writer, id, desc.as_deref(), seq)
            }
        }
    }
}

impl From<FastaOwnedRecord> for SequenceRecord {
    fn from(record: FastaOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '>');
        SequenceRecord::Fasta {
            id,
            desc,
            seq: record.seq,
        }
    }
}

impl From<FastqOwnedRecord> for SequenceRecord {
    fn from(record: FastqOwnedRecord) -> Self {
        let (id, desc) = parse_header(&record.head, '@');
        SequenceRecord::Fastq {
            id,
            desc,
            seq: record.seq,
            qual: record.qual,
        }
    }
}


/// Enum to hold either FASTA or FASTQ reader
pub enum SequenceReader {
    Fasta(FastaReader<FileReader>),
    Fastq(FastqReader<FileReader>),
}

/// Creates a SequenceReader for either FASTA or FASTQ files, plain or gzipped.
///
/// # Arguments
///
/// * `path` - Valid path to a fastx file.
///
/// # Returns
/// Result<SequenceReader, PipelineError>
pub fn sequence_reader(path: &Path) -> Result<SequenceReader, PipelineError> {
    let filetype = fastx_filetype(path)?;
    let reader = open_reader(path)?;
    match filetype {
        FASTA_TAG => Ok(SequenceReader::Fasta(FastaReader::new(reader))),
        _ => Ok(SequenceReader::Fastq(FastqReader::new(reader))),
    }
}

/// Determines if a file path is a FASTA, FASTQ, or neither.
/// Checks extensions, not the body.
fn fastx_filetype(path: &Path) -> Result<&'static str, PipelineError> {
    let (_, extensions) = extension_remover(path);

    for ext in &extensions {
        if FASTA_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FASTA_TAG);
        }
        if FASTQ_EXTS.iter().any(|&e| e.eq_ignore_ascii_case(ext)) {
            return Ok(FASTQ_TAG);
        }
    }

    Err(PipelineError::InvalidSequence {
        path: path.to_path_buf(),
        reason: format!(
            "extension(s) {:?} are neither FASTA ({:?}) nor FASTQ ({:?})",
            extensions, FASTA_EXTS, FASTQ_EXTS
        ),
    })
}

/// Calls `visit` for every record of a FASTA or FASTQ file.
pub fn visit_records<F>(path: &Path, mut visit: F) -> Result<(), PipelineError>
where
    F: FnMut(SequenceRecord) -> Result<(), PipelineError>,
{
    let invalid = |reason: String| PipelineError::InvalidSequence {
        path: path.to_path_buf(),
        reason,
    };
    match sequence_reader(path)? {
        SequenceReader::Fasta(reader) => {
            for result in reader.into_records() {
                let record = result.map_err(|e| invalid(e.to_string()))?;
                visit(record.into())?;
            }
        }
        SequenceReader::Fastq(reader) => {
            for result in reader.into_records() {
                let record = result.map_err(|e| invalid(e.to_string()))?;
                visit(record.into())?;
            }
        }
    }
    Ok(())
}

pub fn read_records(path: &Path) -> Result<Vec<SequenceRecord>, PipelineError> {
    let mut records = Vec::new();
    visit_records(path, |record| {
        records.push(record);
        Ok(())
    })?;
    Ok(records)
}

/// Counts the records in a FASTA or FASTQ file.
pub fn record_counter(path: &Path) -> Result<u64, PipelineError> {
    let mut counter = 0;
    visit_records(path, |_| {
        counter += 1;
        Ok(())
    })?;
    Ok(counter)
}


/// Tally of a filtering pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    pub kept: u64,
    pub dropped: u64,
}

/// Copies the records with `min_length <= len <= max_length` from `input` to `output`.
///
/// # Arguments
///
/// * `input` - FASTA/FASTQ file, plain or gzipped.
/// * `output` - Destination; written gzipped when `compress` is set.
/// * `min_length` - Shortest sequence kept, must be > 0.
/// * `max_length` - Longest sequence kept; `None` for no upper bound.
///
/// # Returns
/// FilterCounts of kept and dropped records.
pub fn length_cutoff(
    input: &Path,
    output: &Path,
    min_length: usize,
    max_length: Option<usize>,
    compress: bool,
) -> Result<FilterCounts, PipelineError> {
    let max_length = max_length.unwrap_or(usize::MAX);
    if min_length == 0 || min_length > max_length {
        return Err(PipelineError::InvalidConfig(format!(
            "invalid length bounds: min_length={}, max_length={}",
            min_length, max_length
        )));
    }

    let mut writer = FileWriter::create(output, compress)?;
    let mut counts = FilterCounts::default();
    visit_records(input, |record| {
        let len = record.seq().len();
        if (min_length..=max_length).contains(&len) {
            record.write_to(&mut writer)?;
            counts.kept += 1;
        } else {
            counts.dropped += 1;
        }
        Ok(())
    })?;
    writer.finish()?;
    Ok(counts)
}

/// Rewrites every record id of `input` to `<prefix>_<id>` into `output`.
///
/// # Returns
/// Number of records written.
pub fn rewrite_sequence_ids(
    input: &Path,
    output: &Path,
    prefix: &SamplePrefix,
    compress: bool,
) -> Result<u64, PipelineError> {
    let mut writer = FileWriter::create(output, compress)?;
    let mut written = 0;
    visit_records(input, |record| {
        record.relabel(prefix).write_to(&mut writer)?;
        written += 1;
        Ok(())
    })?;
    writer.finish()?;
    Ok(written)
}

/// Writes the two-record primer FASTA consumed by the adapter clipper.
pub fn write_primer_fasta(path: &Path, forward_primer: &str, reverse_primer: &str) -> io::Result<()> {
    let mut writer = FileWriter::create(path, false)?;
    write_fasta_record(&mut writer, "Prefix/1", None, forward_primer.as_bytes())?;
    write_fasta_record(&mut writer, "Prefix/2", None, reverse_primer.as_bytes())?;
    writer.finish()
}


pub fn write_fasta_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b">")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    // Write sequence (with line wrapping, e.g., 80 chars per line)
    for chunk in seq.chunks(FASTA_LINE_WIDTH) {
        writer.write_all(chunk)?;
        writer.write_all(b"\n")?;
    }
    Ok(())
}

pub fn write_fastq_record<W: Write>(
    writer: &mut W,
    id: &str,
    desc: Option<&str>,
    seq: &[u8],
    qual: &[u8],
) -> io::Result<()> {
    // Write header
    writer.write_all(b"@")?;
    writer.write_all(id.as_bytes())?;
    if let Some(desc) = desc {
        writer.write_all(b" ")?;
        writer.write_all(desc.as_bytes())?;
    }
    writer.write_all(b"\n")?;

    writer.write_all(seq)?;
    writer.write_all(b"\n+\n")?;
    writer.write_all(qual)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Parses a FASTX header.
///
/// # Arguments
///
/// * `head` - Header line of a FASTX record.
/// * 'prefix' - Leading, defining character of the header. > for FASTA, @ for FASTQ.
///
/// # Returns
/// Tuple: (id, desc) split of header on whitespace.
fn parse_header(head: &[u8], prefix: char) -> (String, Option<String>) {
    let head_str = String::from_utf8_lossy(head).into_owned();
    let parts: Vec<&str> = head_str.splitn(2, |c: char| c.is_whitespace()).collect();
    let id = parts[0].trim_start_matches(prefix).to_string();
    let desc = parts.get(1).map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (id, desc)
}
