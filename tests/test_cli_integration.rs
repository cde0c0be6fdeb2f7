//! Integration test for the strainer binary: strain, FASTA output, snapshots
//! and segment listing over a small two-haplotype read table

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use strainer::StrainerResult;
use tempfile::TempDir;

const READS: &str = "\
# name\tseq\tstart\tend\tdiffs\tgroup
a1\tchr1\t1\t150\t50:A>C,150:A>C\thapA
a2\tchr1\t51\t200\t150:A>C\thapA
a3\tchr1\t101\t250\t150:A>C,250:A>C\thapA
a4\tchr1\t151\t300\t250:A>C\thapA
a5\tchr1\t201\t350\t250:A>C,350:A>C\thapA
a6\tchr1\t251\t400\t350:A>C\thapA
b1\tchr1\t1\t150\t100:A>T\thapB
b2\tchr1\t51\t200\t100:A>T,200:A>T\thapB
b3\tchr1\t101\t250\t200:A>T\thapB
b4\tchr1\t151\t300\t200:A>T,300:A>T\thapB
b5\tchr1\t201\t350\t300:A>T\thapB
b6\tchr1\t251\t400\t300:A>T\thapB
";

fn run_strainer(work_dir: &Path, args: &[&str]) -> std::io::Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_strainer"))
        .current_dir(work_dir)
        .args(args)
        .output()
}

fn setup() -> std::io::Result<(TempDir, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path().to_path_buf();
    fs::write(work_dir.join("reads.tsv"), READS)?;
    fs::write(
        work_dir.join("ref.fa"),
        format!(">chr1 test\n{}\n{}\n", "A".repeat(200), "A".repeat(200)),
    )?;
    Ok((temp_dir, work_dir))
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_strain_prints_one_line_per_strain() -> std::io::Result<()> {
    let (_temp_dir, work_dir) = setup()?;
    let output = run_strainer(
        &work_dir,
        &["strain", "-r", "reads.tsv", "-o", "20", "--completion-tolerance", "0"],
    )?;
    assert!(
        output.status.success(),
        "strain failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = stdout_lines(&output);
    assert_eq!(lines.len(), 2, "unexpected output: {:?}", lines);
    assert_eq!(
        lines[0],
        "chr1:1-400\tstrain_1\t1\t400\t6\t4\ta1,a2,a3,a4,a5,a6"
    );
    assert_eq!(
        lines[1],
        "chr1:1-400\tstrain_2\t1\t400\t6\t3\tb1,b2,b3,b4,b5,b6"
    );
    Ok(())
}

#[test]
fn test_strain_writes_fasta_and_snapshot() -> std::io::Result<()> {
    let (_temp_dir, work_dir) = setup()?;
    let output = run_strainer(
        &work_dir,
        &[
            "strain",
            "-r",
            "reads.tsv",
            "-R",
            "chr1:1-400",
            "-o",
            "20",
            "--strategy",
            "segment-linker",
            "--segment-size",
            "200",
            "--completion-tolerance",
            "0",
            "--reference",
            "ref.fa",
            "--fasta",
            "strains.fa",
            "--snapshot",
            "result.bin",
        ],
    )?;
    assert!(
        output.status.success(),
        "strain failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let fasta = fs::read_to_string(work_dir.join("strains.fa"))?;
    let records: Vec<&str> = fasta.lines().collect();
    assert_eq!(records.len(), 4);
    assert_eq!(records[0], ">strain_1 chr1:1-400");
    assert_eq!(records[1].len(), 400);
    assert_eq!(records[1].matches('C').count(), 4);
    assert_eq!(records[3].matches('T').count(), 3);

    let result = StrainerResult::read_snapshot(&work_dir.join("result.bin"))
        .map_err(std::io::Error::from)?;
    assert_eq!(result.size(), 2);
    assert_eq!(result.segment().to_string(), "chr1:1-400");
    Ok(())
}

#[test]
fn test_substrainer_names_strains_by_group() -> std::io::Result<()> {
    let (_temp_dir, work_dir) = setup()?;
    let output = run_strainer(
        &work_dir,
        &["strain", "-r", "reads.tsv", "-o", "20", "-s", "substrainer"],
    )?;
    assert!(output.status.success());
    let names: Vec<String> = stdout_lines(&output)
        .iter()
        .filter_map(|line| line.split('\t').nth(1).map(str::to_string))
        .collect();
    assert_eq!(names, vec!["hapA/strain_1", "hapB/strain_1"]);
    Ok(())
}

#[test]
fn test_segments_by_read_count() -> std::io::Result<()> {
    let (_temp_dir, work_dir) = setup()?;
    let output = run_strainer(
        &work_dir,
        &[
            "segments",
            "-r",
            "reads.tsv",
            "--segment-method",
            "reads",
            "--segment-size",
            "4",
        ],
    )?;
    assert!(output.status.success());
    let lines = stdout_lines(&output);
    assert_eq!(
        lines,
        vec!["chr1\t1\t100\t4", "chr1\t101\t200\t8", "chr1\t201\t400\t8"]
    );
    Ok(())
}

#[test]
fn test_bad_inputs_fail_cleanly() -> std::io::Result<()> {
    let (_temp_dir, work_dir) = setup()?;

    let output = run_strainer(&work_dir, &["strain", "-r", "reads.tsv", "-s", "bogus"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown strategy"));

    let output = run_strainer(
        &work_dir,
        &["strain", "-r", "reads.tsv", "--fasta", "out.fa"],
    )?;
    assert!(!output.status.success());

    let output = run_strainer(
        &work_dir,
        &["strain", "-r", "reads.tsv", "--reference", "ref.fa"],
    )?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--reference"));

    fs::write(work_dir.join("headerless.fa"), "ACGT\n")?;
    let output = run_strainer(
        &work_dir,
        &[
            "strain",
            "-r",
            "reads.tsv",
            "--reference",
            "headerless.fa",
            "--fasta",
            "out.fa",
        ],
    )?;
    assert!(!output.status.success());

    fs::write(work_dir.join("broken.tsv"), "r1\tchr1\t10\n")?;
    let output = run_strainer(&work_dir, &["strain", "-r", "broken.tsv"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Line 1"));
    Ok(())
}
