// src/utils/process.rs: running external tools against a stage log

use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::Stdio;

use log::{debug, info};
use tokio::process::Command;

use crate::config::defs::PipelineError;


/// Result of a tool that exited with status zero.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub argv: Vec<String>,
    pub code: Option<i32>,
    /// Combined stdout and stderr, as appended to the log.
    pub output: String,
}


/// Seam between the stages and the processes they start.
pub trait ToolRunner {
    /// Runs `argv[0]` with the remaining arguments, appending the command line
    /// and its combined output to `log_path`.
    fn run(&self, argv: &[String], log_path: &Path) -> impl Future<Output = Result<ToolOutput, PipelineError>> + Send;
}


/// Runs tools as child processes with stdout and stderr both appended to the
/// stage log, so the log reads like `cmd >> log 2>&1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    async fn run(&self, argv: &[String], log_path: &Path) -> Result<ToolOutput, PipelineError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| PipelineError::InvalidConfig("empty command line".to_string()))?;

        let command_line = argv.join(" ");
        info!("executing \"{}\"", command_line);

        let mut log = open_log(log_path)?;
        writeln!(log, "executing \"{}\"", command_line)?;
        log.flush()?;
        let start = log.seek(SeekFrom::End(0))?;

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log.try_clone()?))
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                writeln!(log, "failed to start {}: {}", program, e)?;
                return Err(PipelineError::ToolNotFound {
                    tool: program.clone(),
                    source: e,
                });
            }
        };

        let status = child.wait().await?;
        let output = read_from(log_path, start)?;
        writeln!(log, "{}: {}", program, status)?;
        debug!("{} finished with {}", program, status);

        if !status.success() {
            return Err(PipelineError::ExternalTool {
                argv: argv.to_vec(),
                code: status.code(),
                output,
            });
        }

        Ok(ToolOutput {
            argv: argv.to_vec(),
            code: status.code(),
            output,
        })
    }
}

/// Opens (creating if needed) a log for appending. Never truncates.
pub fn open_log(log_path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(log_path)
}

/// Appends one line to a stage log.
pub fn append_log_line(log_path: &Path, line: &str) -> io::Result<()> {
    let mut log = open_log(log_path)?;
    writeln!(log, "{}", line)
}

fn read_from(path: &Path, offset: u64) -> io::Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
