use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use log::{debug, warn};

use crate::config::defs::GZIP_EXT;


/// Checks the first two bytes for the gzip magic number. Files shorter than
/// two bytes are not gzipped.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// True when the file name carries a `.gz` extension.
pub fn has_gz_extension(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case(GZIP_EXT))
        .unwrap_or(false)
}

/// Splits a path into its stem and all of its extensions,
/// e.g. `a/b.trim.fastq.gz` -> (`a/b`, [trim, fastq, gz]).
pub fn extension_remover(path: &Path) -> (PathBuf, Vec<String>) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut parts = file_name.split('.');
    let stem = parts.next().unwrap_or_default().to_string();
    let extensions: Vec<String> = parts.map(String::from).collect();
    (path.with_file_name(stem), extensions)
}


/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn open_reader(path: &Path) -> io::Result<FileReader> {
    let gzipped = is_gzipped(path)?;
    let file = File::open(path)?;
    if gzipped {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}


/// Enum to hold either an uncompressed or gzipped file writer
pub enum FileWriter {
    Uncompressed(BufWriter<File>),
    Gzipped(GzEncoder<BufWriter<File>>),
}

impl FileWriter {
    pub fn create(path: &Path, compress: bool) -> io::Result<Self> {
        let writer = BufWriter::new(File::create(path)?);
        if compress {
            Ok(FileWriter::Gzipped(GzEncoder::new(writer, Compression::default())))
        } else {
            Ok(FileWriter::Uncompressed(writer))
        }
    }

    /// Flushes buffers and writes the gzip trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            FileWriter::Uncompressed(mut w) => w.flush(),
            FileWriter::Gzipped(w) => w.finish()?.flush(),
        }
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileWriter::Uncompressed(w) => w.write(buf),
            FileWriter::Gzipped(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileWriter::Uncompressed(w) => w.flush(),
            FileWriter::Gzipped(w) => w.flush(),
        }
    }
}


/// Compresses `path` to `path.gz` and removes the uncompressed file.
///
/// # Arguments
///
/// * `path` - File to compress. Already-compressed names are returned untouched.
///
/// # Returns
/// io::Result<PathBuf> path of the compressed file.
pub fn gzip_file(path: &Path) -> io::Result<PathBuf> {
    if has_gz_extension(path) {
        warn!("file {:?} is already gzipped", path);
        return Ok(path.to_path_buf());
    }
    let mut gz_name = path.as_os_str().to_os_string();
    gz_name.push(".");
    gz_name.push(GZIP_EXT);
    let gz_path = PathBuf::from(gz_name);

    debug!("compressing {:?} with gzip", path);
    let mut src = BufReader::new(File::open(path)?);
    let mut dst = FileWriter::create(&gz_path, true)?;
    io::copy(&mut src, &mut dst)?;
    dst.finish()?;
    fs::remove_file(path)?;
    Ok(gz_path)
}

pub fn gzip_files(paths: &[PathBuf]) -> io::Result<Vec<PathBuf>> {
    paths.iter().map(|p| gzip_file(p)).collect()
}


/// An input file made readable for a tool that cannot read gzip.
/// `scratch` is set when a decompressed copy was written and must be removed.
#[derive(Debug, Clone)]
pub struct StagedInput {
    pub path: PathBuf,
    pub scratch: bool,
}

impl StagedInput {
    pub fn cleanup(&self) -> io::Result<()> {
        if self.scratch {
            debug!("deleting scratch file {:?}", self.path);
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

/// Decompresses `src` into `dest_dir` (dropping the `.gz`) when it is gzipped;
/// plain files are used in place.
pub fn stage_uncompressed(src: &Path, dest_dir: &Path) -> io::Result<StagedInput> {
    if !has_gz_extension(src) {
        return Ok(StagedInput { path: src.to_path_buf(), scratch: false });
    }
    let file_name = src
        .file_stem()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("No file name in {:?}", src)))?;
    let dest = dest_dir.join(file_name);

    debug!("uncompressing {:?} to {:?}", src, dest);
    let mut reader = open_reader(src)?;
    let mut writer = FileWriter::create(&dest, false)?;
    io::copy(&mut reader, &mut writer)?;
    writer.finish()?;
    Ok(StagedInput { path: dest, scratch: true })
}

pub fn delete_files(paths: &[PathBuf]) -> io::Result<()> {
    for path in paths {
        debug!("deleting file {:?}", path);
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Lists the entries of a directory sorted by file name.
pub fn sorted_file_list(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<io::Result<Vec<PathBuf>>>()?;
    entries.sort();
    Ok(entries)
}
