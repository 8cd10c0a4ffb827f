use std::env;
use std::io::Write;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{self, LevelFilter, debug, error, info};

use amplicon_qc_pipelines::cli::parse;
use amplicon_qc_pipelines::utils::system::detect_cores_and_load;
use amplicon_qc_pipelines::{Pipeline, PipelineConfig, PipelineError};


#[tokio::main]
async fn main() -> Result<ExitCode> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n Amplicon QC\n-------------\n");

    let dir = env::current_dir()?;
    info!("The current directory is {:?}\n", dir);

    let core_count = match args.core_count {
        Some(cores) => cores,
        None => {
            let (max_cores, cpu_load) = detect_cores_and_load(args.threads).await;
            debug!("Detected {} usable physical cores; CPU load {}%", max_cores, cpu_load);
            max_cores
        }
    };

    let outcome = match PipelineConfig::from_args(&args, core_count) {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => {
            println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
            Ok(exit_code(&e))
        }
    }
}

async fn run(config: PipelineConfig) -> Result<(), PipelineError> {
    let mut pipeline = Pipeline::new(config)?;
    let output_dirs = pipeline.run().await?;
    for output_dir in output_dirs {
        println!("{}", output_dir.display());
    }
    Ok(())
}

/// 2 for configuration errors, 1 for everything else.
fn exit_code(e: &PipelineError) -> ExitCode {
    if e.is_configuration() {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}
