use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use mlx_conformance::{
    HarnessConfig, OperatorCase, OperatorHarness, case_text, catalog, clean_generated,
    default_expect_dir, find, run_case,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mlx-cli")]
#[command(about = "Operator export suite CLI")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the operator suite and dump every exported case as a test directory.
    OnnxTest {
        /// Directory receiving `test_operator_<case>` directories.
        #[arg(long, default_value = mlx_conformance::config::DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
        /// Only run these cases (repeatable).
        #[arg(long = "case")]
        cases: Vec<String>,
        /// Expectation directory; defaults to the suite's own.
        #[arg(long)]
        expect_dir: Option<PathBuf>,
        /// Record expectations instead of comparing against them.
        #[arg(long)]
        accept: bool,
    },
    /// Print the text a case is compared against: its canonical graph, or
    /// the failure message for cases that must not export.
    Show { case: String },
    /// List catalog cases.
    List,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.cmd {
        Cmd::OnnxTest {
            output_dir,
            cases,
            expect_dir,
            accept,
        } => onnx_test(output_dir, &cases, expect_dir, accept),
        Cmd::Show { case } => show(&case),
        Cmd::List => {
            for case in catalog() {
                println!("{}", case.name);
            }
            Ok(())
        }
    }
}

fn selected(names: &[String]) -> Result<Vec<&'static OperatorCase>> {
    if names.is_empty() {
        return Ok(catalog().iter().collect());
    }
    names
        .iter()
        .map(|n| find(n).with_context(|| format!("no operator case named {n:?}")))
        .collect()
}

fn onnx_test(
    output_dir: PathBuf,
    names: &[String],
    expect_dir: Option<PathBuf>,
    accept: bool,
) -> Result<()> {
    let cases = selected(names)?;
    let removed = clean_generated(&output_dir)
        .with_context(|| format!("cleaning {}", output_dir.display()))?;
    info!(removed, dir = %output_dir.display(), "starting operator suite");

    let config = HarnessConfig::from_env(expect_dir.unwrap_or_else(default_expect_dir))
        .with_dump(&output_dir);
    let config = if accept { config.with_accept(true) } else { config };
    let harness = OperatorHarness::new(config);

    let mut failed = 0;
    for case in &cases {
        match run_case(&harness, case) {
            Ok(outcome) => println!("ok     {} ({outcome:?})", case.name),
            Err(e) => {
                failed += 1;
                error!(case = case.name, "{e}");
                println!("FAILED {}", case.name);
            }
        }
    }
    println!("\n{} passed, {failed} failed", cases.len() - failed);
    if failed > 0 {
        bail!("{failed} operator case(s) failed");
    }
    Ok(())
}

fn show(name: &str) -> Result<()> {
    let case = find(name).with_context(|| format!("no operator case named {name:?}"))?;
    let harness = OperatorHarness::new(HarnessConfig::new(default_expect_dir()));
    let text = case_text(&harness, case).with_context(|| format!("running case {name}"))?;
    print!("{text}");
    Ok(())
}
