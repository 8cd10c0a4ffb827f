mod common;

use std::fs;
use std::path::Path;

use anyhow::Result;
use tempfile::tempdir;

use amplicon_qc_pipelines::pipelines::amplicon::RunState;
use amplicon_qc_pipelines::pipelines::stage::Stage;
use amplicon_qc_pipelines::utils::fastx::{read_records, record_counter};
use amplicon_qc_pipelines::utils::file::open_reader;
use amplicon_qc_pipelines::{Pipeline, PipelineError, WorkspacePolicy};

use common::{file_names, test_config, write_sample_reads, FakeRunner, LONG_READ_LEN};

const SIX_STAGES: [&str; 6] = [
    "step_01_trim_primers",
    "step_02_join_paired_end_reads",
    "step_03_quality_filter",
    "step_04_fasta_format",
    "step_05_length_filter",
    "step_06_rewrite_sequence_ids",
];

fn read_text(path: &Path) -> String {
    let mut text = String::new();
    std::io::Read::read_to_string(&mut open_reader(path).unwrap(), &mut text).unwrap();
    text
}


#[tokio::test]
async fn test_trim_primers_fresh_directory() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let runner = FakeRunner::new();
    let pipeline = Pipeline::with_runner(test_config(&forward, work.path()), runner.clone())?;

    let out = pipeline.run_stage(Stage::TrimPrimers, data.path(), None).await?;
    assert_eq!(out, work.path().join("step_01_trim_primers"));
    assert_eq!(
        file_names(&out),
        vec![
            "log",
            "report",
            "trimPE.fasta",
            "unittest_L001_R1.trim1p.fastq.gz",
            "unittest_L001_R1.trim1u.fastq.gz",
            "unittest_L001_R2.trim2p.fastq.gz",
            "unittest_L001_R2.trim2u.fastq.gz",
        ]
    );

    let primers = fs::read_to_string(out.join("trimPE.fasta"))?;
    assert_eq!(primers, format!(">Prefix/1\n{}\n>Prefix/2\n{}\n", "A".repeat(30), "T".repeat(30)));

    let calls = runner.calls();
    assert_eq!(calls[0][0], "TrimmomaticPE");
    assert!(calls[0].contains(&"MINLEN:4".to_string()));
    assert!(calls[0].contains(&data.path().join("unittest_L001_R2.fastq").to_string_lossy().into_owned()));
    assert_eq!(calls[1][0], "fastqc");

    assert!(fs::read_to_string(out.join("log"))?.starts_with("executing \"TrimmomaticPE"));
    assert!(fs::read_to_string(out.join("report").join("log"))?.contains("executing \"fastqc"));
    Ok(())
}

#[tokio::test]
async fn test_full_run_default_layout() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let runner = FakeRunner::new();
    let mut pipeline = Pipeline::with_runner(test_config(&forward, work.path()), runner.clone())?;

    let dirs = pipeline.run().await?;
    let expected: Vec<_> = SIX_STAGES.iter().map(|name| work.path().join(name)).collect();
    assert_eq!(dirs, expected);
    assert_eq!(*pipeline.state(), RunState::Complete);

    assert_eq!(
        runner.tools().into_iter().filter(|t| t != "fastqc").collect::<Vec<_>>(),
        vec!["TrimmomaticPE", "fastq-join", "fastq_quality_filter", "fastq_to_fasta", "fastx_clipper"]
    );
    // FASTQ report only for the three FASTQ-producing stages
    assert_eq!(runner.tools().iter().filter(|t| *t == "fastqc").count(), 3);

    assert_eq!(
        file_names(&dirs[1]),
        vec![
            "log",
            "report",
            "unittest_L001_R1.trim.join.fastq.gz",
            "unittest_L001_R1.trim.un1.fastq.gz",
            "unittest_L001_R1.trim.un2.fastq.gz",
        ]
    );
    assert_eq!(file_names(&dirs[2]), vec!["log", "report", "unittest_L001_R1.trim.join.quality.fastq.gz"]);
    assert_eq!(file_names(&dirs[3]), vec!["log", "unittest_L001_R1.trim.join.quality.fasta.gz"]);
    assert_eq!(file_names(&dirs[4]), vec!["log", "unittest_L001_R1.trim.join.quality.length.fasta.gz"]);
    assert_eq!(file_names(&dirs[5]), vec!["unittest_L001_R1.trim.join.quality.length.id.fasta.gz"]);
    Ok(())
}

#[tokio::test]
async fn test_length_filter_drops_short_records() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut pipeline = Pipeline::with_runner(test_config(&forward, work.path()), FakeRunner::new())?;
    let dirs = pipeline.run().await?;

    assert_eq!(record_counter(&dirs[3].join("unittest_L001_R1.trim.join.quality.fasta.gz"))?, 2);

    let after = read_records(&dirs[4].join("unittest_L001_R1.trim.join.quality.length.fasta.gz"))?;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].seq().len(), LONG_READ_LEN);
    assert!(fs::read_to_string(dirs[4].join("log"))?.contains("kept 1, dropped 1"));
    Ok(())
}

#[tokio::test]
async fn test_rewritten_header_is_exactly_tagged_id() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut config = test_config(&forward, work.path());
    config.variant.compress = false;
    let mut pipeline = Pipeline::with_runner(config, FakeRunner::new())?;
    let dirs = pipeline.run().await?;

    let output = dirs[5].join("unittest_L001_R1.trim.join.quality.length.id.fasta");
    let text = read_text(&output);
    assert_eq!(text.lines().next(), Some(">unittest_1"));
    assert_eq!(text.lines().filter(|l| l.starts_with('>')).count(), 1);
    assert!(!output.with_extension("fasta.gz").exists());
    Ok(())
}

#[tokio::test]
async fn test_failure_names_stage_and_keeps_earlier_dirs() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut pipeline =
        Pipeline::with_runner(test_config(&forward, work.path()), FakeRunner::failing_on("fastq_quality_filter"))?;

    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.stage_name(), Some("step_03_quality_filter"));
    assert!(matches!(err.root(), PipelineError::ExternalTool { code: Some(1), .. }));
    assert!(matches!(pipeline.state(), RunState::Failed { stage: Stage::QualityFilter, .. }));

    assert!(work.path().join("step_01_trim_primers").is_dir());
    assert!(work.path().join("step_02_join_paired_end_reads").is_dir());
    assert!(fs::read_to_string(work.path().join("step_03_quality_filter/log"))?.contains("simulated failure"));
    assert!(!work.path().join("step_04_fasta_format").exists());
    Ok(())
}

#[tokio::test]
async fn test_idempotent_rerun_reuses_directories() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let config = test_config(&forward, work.path());
    assert_eq!(config.variant.workspace, WorkspacePolicy::Idempotent);

    let first = Pipeline::with_runner(config.clone(), FakeRunner::new())?.run().await?;
    let second = Pipeline::with_runner(config, FakeRunner::new())?.run().await?;
    assert_eq!(first, second);
    assert_eq!(file_names(&second[5]), vec!["unittest_L001_R1.trim.join.quality.length.id.fasta.gz"]);
    Ok(())
}

#[tokio::test]
async fn test_strict_rerun_collides() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut config = test_config(&forward, work.path());
    config.variant.workspace = WorkspacePolicy::Strict;

    Pipeline::with_runner(config.clone(), FakeRunner::new())?.run().await?;

    let runner = FakeRunner::new();
    let err = Pipeline::with_runner(config, runner.clone())?.run().await.unwrap_err();
    assert_eq!(err.stage_name(), Some("step_01_trim_primers"));
    assert!(matches!(err.root(), PipelineError::StageCollision { .. }));
    assert!(runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_prefix_mismatch_fails_before_any_stage() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = data.path().join("this_will_not_match_prefix_re.fastq");
    fs::write(&forward, "@r\nACGT\n+\naaaa\n")?;
    let work_dir = work.path().join("run");

    let err = Pipeline::with_runner(test_config(&forward, &work_dir), FakeRunner::new()).err().unwrap();
    assert!(err.is_configuration());
    assert!(matches!(err, PipelineError::PrefixExtraction { .. }));
    assert!(!work_dir.exists());
    Ok(())
}

#[tokio::test]
async fn test_chimera_variant_plans_seven_stages() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let database = data.path().join("gold.fasta");
    fs::write(&database, ">ref\nACGT\n")?;

    let mut config = test_config(&forward, work.path());
    config.chimera_db = Some(database.clone());
    let runner = FakeRunner::new();
    let mut pipeline = Pipeline::with_runner(config, runner.clone())?;

    let dirs = pipeline.run().await?;
    assert_eq!(dirs.len(), 7);
    assert_eq!(dirs[5], work.path().join("step_06_remove_chimeras"));
    assert_eq!(dirs[6], work.path().join("step_07_rewrite_sequence_ids"));
    assert_eq!(
        file_names(&dirs[5]),
        vec![
            "log",
            "unittest_L001_R1.trim.join.quality.length.chimeras_ref.fasta.gz",
            "unittest_L001_R1.trim.join.quality.length.nonchimera.fasta.gz",
            "unittest_L001_R1.trim.join.quality.length.uchimeinfo_ref",
        ]
    );
    assert_eq!(
        file_names(&dirs[6]),
        vec!["unittest_L001_R1.trim.join.quality.length.nonchimera.id.fasta.gz"]
    );

    let vsearch = runner.calls().into_iter().find(|argv| argv[0] == "vsearch").unwrap();
    assert!(vsearch.contains(&database.to_string_lossy().into_owned()));
    Ok(())
}

#[tokio::test]
async fn test_five_stage_variant() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut config = test_config(&forward, work.path());
    config.variant.rewrite_ids = false;
    config.variant.fastq_report = false;
    let runner = FakeRunner::new();

    let dirs = Pipeline::with_runner(config, runner.clone())?.run().await?;
    assert_eq!(dirs.len(), 5);
    assert_eq!(dirs[4], work.path().join("step_05_length_filter"));
    assert!(!work.path().join("step_06_rewrite_sequence_ids").exists());
    assert!(!dirs[0].join("report").exists());
    assert!(!runner.tools().contains(&"fastqc".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_report_failure_is_advisory() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let mut pipeline = Pipeline::with_runner(test_config(&forward, work.path()), FakeRunner::failing_on("fastqc"))?;

    let dirs = pipeline.run().await?;
    assert_eq!(dirs.len(), 6);
    assert!(fs::read_to_string(dirs[0].join("report/log"))?.contains("simulated failure"));
    Ok(())
}

#[tokio::test]
async fn test_missing_upstream_products() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let pipeline = Pipeline::with_runner(test_config(&forward, work.path()), FakeRunner::new())?;

    let empty = tempdir()?;
    let err = pipeline
        .run_stage(Stage::JoinPairedEnds, empty.path(), Some(Stage::TrimPrimers))
        .await
        .unwrap_err();
    assert_eq!(err.stage_name(), Some("step_02_join_paired_end_reads"));
    assert!(err.is_postcondition());
    Ok(())
}

#[tokio::test]
async fn test_silent_tool_fails_its_own_stage() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let database = data.path().join("gold.fasta");
    fs::write(&database, ">ref\nACGT\n")?;
    let mut config = test_config(&forward, work.path());
    config.chimera_db = Some(database);

    let mut pipeline = Pipeline::with_runner(config.clone(), FakeRunner::new())?;
    let plan = pipeline.plan();
    let dirs = pipeline.run().await?;

    // Every stage that runs an external tool, fed the products of a clean run.
    for (i, stage) in plan.iter().copied().enumerate() {
        if stage == Stage::RewriteSequenceIds {
            continue;
        }
        let silent_work = tempdir()?;
        let mut silent_config = config.clone();
        silent_config.work_dir = silent_work.path().to_path_buf();
        let pipeline = Pipeline::with_runner(silent_config, FakeRunner::silent())?;

        let (input_dir, upstream) = match i {
            0 => (data.path().to_path_buf(), None),
            _ => (dirs[i - 1].clone(), Some(plan[i - 1])),
        };
        let err = pipeline.run_stage(stage, &input_dir, upstream).await.unwrap_err();
        let name = stage.dir_name(i + 1);
        assert!(err.is_postcondition(), "{}: {}", name, err);
        assert_eq!(err.stage_name(), Some(name.as_str()));
        assert!(fs::read_to_string(silent_work.path().join(&name).join("log"))?.contains("executing"));
    }
    Ok(())
}

#[tokio::test]
async fn test_fq_forward_reads_rejected_before_any_stage() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = data.path().join("unittest_L001_R1.fq");
    fs::write(&forward, "@r\nACGT\n+\naaaa\n")?;
    let work_dir = work.path().join("run");

    let err = Pipeline::with_runner(test_config(&forward, &work_dir), FakeRunner::new()).err().unwrap();
    assert!(err.is_configuration());
    assert!(!work_dir.exists());
    Ok(())
}

#[tokio::test]
async fn test_rewrite_stage_accepts_any_fasta() -> Result<()> {
    let data = tempdir()?;
    let work = tempdir()?;
    let forward = write_sample_reads(data.path());
    let pipeline = Pipeline::with_runner(test_config(&forward, work.path()), FakeRunner::new())?;

    let input = tempdir()?;
    fs::write(input.path().join("unittest.quality.fasta"), ">1\nACGT\n>2\nGGCC\n")?;
    let out = pipeline.run_stage(Stage::RewriteSequenceIds, input.path(), None).await?;

    assert_eq!(file_names(&out), vec!["unittest.quality.id.fasta.gz"]);
    let text = read_text(&out.join("unittest.quality.id.fasta.gz"));
    assert_eq!(text.lines().filter(|l| l.starts_with(">unittest_")).count(), 2);
    Ok(())
}
