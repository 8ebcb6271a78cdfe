use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mica_core::{compile, run};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file; reads stdin when omitted.
    #[arg(short, long)]
    input: Option<String>,

    /// Write the instruction dump here instead of running.
    #[arg(short, long)]
    output: Option<String>,

    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "run",
        help = "Output format: run, ir"
    )]
    emit: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    execute(cli)
}

fn execute(cli: Cli) -> Result<()> {
    let (source, filename) = match &cli.input {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {path}"))?;
            (source, path.clone())
        }
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            (buffer, "<stdin>".to_string())
        }
    };

    match cli.emit.as_str() {
        "ir" => {
            let program = compile(&source, &filename)?;
            let dump = program.dump();
            match &cli.output {
                Some(path) => write_output(path, dump.as_bytes())?,
                None => print!("{dump}"),
            }
        }
        "run" => {
            match run(&source, &filename)? {
                Some(result) => println!("Program exited with {result}"),
                None => println!("Program exited"),
            }
            if let Some(path) = &cli.output {
                let program = compile(&source, &filename)?;
                write_output(path, program.dump().as_bytes())?;
            }
        }
        other => return Err(anyhow::anyhow!("unsupported emit format: {other}")),
    }

    Ok(())
}

fn write_output(path: &str, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = PathBuf::from(path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {parent:?}"))?;
        }
    }
    fs::write(path, bytes).with_context(|| format!("failed to write output file {path}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::tempdir;

    #[test]
    fn compiles_and_runs_a_program() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.mica");
        fs::write(
            &input_path,
            "fn Main() u32 { x u32 = 2; y u32 = 3; z u32 = x + y; ret z; }",
        )
        .expect("write input");

        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .success()
            .stdout(predicate::str::contains("Program exited with 5"));
    }

    #[test]
    fn emits_the_instruction_dump() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("input.mica");
        fs::write(&input_path, "fn Main() u32 { ret 1; }").expect("write input");
        let output_path = dir.path().join("out.ir");

        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .arg("--output")
            .arg(&output_path)
            .arg("--emit")
            .arg("ir")
            .assert()
            .success();

        let dump = fs::read_to_string(&output_path).expect("read dump");
        assert!(dump.contains("prologue Main"));
        assert!(dump.contains("call Main"));
    }

    #[test]
    fn reads_source_from_stdin() {
        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .write_stdin("fn Main() u32 { ret 9; }")
            .assert()
            .success()
            .stdout(predicate::str::contains("Program exited with 9"));
    }

    #[test]
    fn reports_diagnostics_with_position_and_caret() {
        let dir = tempdir().expect("tempdir");
        let input_path = dir.path().join("bad.mica");
        fs::write(
            &input_path,
            "fn Main() { x u32 = 1; y s8 = -1; z = x + y; }",
        )
        .expect("write input");

        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .arg("--input")
            .arg(&input_path)
            .assert()
            .failure()
            .stderr(predicate::str::contains("error[E0305]"))
            .stderr(predicate::str::contains("^"));
    }

    #[test]
    fn reports_a_missing_entry_function() {
        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .write_stdin("fn Helper() { ret; }")
            .assert()
            .failure()
            .stderr(predicate::str::contains("'Main' was not defined"));
    }

    #[test]
    fn rejects_unknown_emit_formats() {
        Command::cargo_bin("mica-cli")
            .expect("binary exists")
            .write_stdin("fn Main() { ret; }")
            .arg("--emit")
            .arg("asm")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unsupported emit format"));
    }
}
