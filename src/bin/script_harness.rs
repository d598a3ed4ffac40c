use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use kestrel_lua::script_harness::{load_fixture, run_fixture, HarnessOutput};

const USAGE: &str = "\
Usage: script_harness --fixture <path> [--steps <n>] [--golden <path>] [--write-output <path>]
  -f, --fixture        Fixture JSON to run
  -n, --steps          Run this many steps instead of the fixture's count
  -g, --golden         Compare the report with a golden file
  -o, --write-output   Write the report as JSON to this path";

#[derive(Debug, Default)]
struct HarnessArgs {
    fixture: Option<PathBuf>,
    steps: Option<usize>,
    golden: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl HarnessArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>> {
        let mut parsed = Self::default();
        while let Some(flag) = args.next() {
            if matches!(flag.as_str(), "--help" | "-h") {
                return Ok(None);
            }
            let value = args.next().ok_or_else(|| anyhow!("'{flag}' needs a value"))?;
            match flag.as_str() {
                "--fixture" | "-f" => parsed.fixture = Some(PathBuf::from(value)),
                "--steps" | "-n" => {
                    parsed.steps = Some(value.parse().with_context(|| format!("'{value}' is not a step count"))?);
                }
                "--golden" | "-g" => parsed.golden = Some(PathBuf::from(value)),
                "--write-output" | "-o" => parsed.output = Some(PathBuf::from(value)),
                _ => bail!("unrecognised flag '{flag}'\n{USAGE}"),
            }
        }
        Ok(Some(parsed))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = match HarnessArgs::parse(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{USAGE}");
            return;
        }
        Err(err) => {
            eprintln!("[script-harness] {err}");
            std::process::exit(2);
        }
    };
    if let Err(err) = run(&args) {
        eprintln!("[script-harness] error: {err:?}");
        std::process::exit(1);
    }
}

fn run(args: &HarnessArgs) -> Result<()> {
    let fixture_path = args.fixture.as_deref().ok_or_else(|| anyhow!("a fixture is required\n{USAGE}"))?;
    let mut fixture = load_fixture(fixture_path)?;
    if let Some(steps) = args.steps {
        fixture.steps = steps;
    }
    let report = run_fixture(&fixture)?;
    for script in report.scripts.iter().filter(|script| !script.initialized) {
        log::warn!(
            "script on '{}' did not initialize: {}",
            script.owner,
            script.last_error.as_deref().unwrap_or("no error recorded")
        );
    }

    if let Some(path) = &args.output {
        write_report(path, &report)?;
    }
    match &args.golden {
        Some(path) => check_golden(path, &report),
        None if args.output.is_none() => {
            serde_json::to_writer_pretty(io::stdout().lock(), &report)?;
            println!();
            Ok(())
        }
        None => Ok(()),
    }
}

fn write_report(path: &Path, report: &HarnessOutput) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating '{}'", dir.display()))?;
    }
    let file = File::create(path).with_context(|| format!("creating '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, report).context("serializing harness report")?;
    println!("[script-harness] wrote {}", path.display());
    Ok(())
}

/// Fails with the names of the report sections that differ from the golden file.
fn check_golden(path: &Path, report: &HarnessOutput) -> Result<()> {
    let file = File::open(path).with_context(|| format!("opening golden '{}'", path.display()))?;
    let expected: HarnessOutput =
        serde_json::from_reader(file).with_context(|| format!("parsing golden '{}'", path.display()))?;
    if &expected == report {
        println!("[script-harness] matches {}", path.display());
        return Ok(());
    }
    let mut differing = Vec::new();
    if (expected.steps, expected.dt) != (report.steps, report.dt) {
        differing.push("steps/dt");
    }
    if expected.setup != report.setup {
        differing.push("setup");
    }
    if expected.results != report.results {
        differing.push("results");
    }
    if expected.scripts != report.scripts {
        differing.push("scripts");
    }
    if expected.final_actors != report.final_actors {
        differing.push("final_actors");
    }
    if expected.pool != report.pool {
        differing.push("pool");
    }
    bail!(
        "report differs from {} in: {} (rerun with --write-output to refresh)",
        path.display(),
        differing.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<HarnessArgs>> {
        HarnessArgs::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_fixture_steps_and_outputs() {
        let args = parse(&["-f", "counter.json", "--steps", "4", "-o", "out/report.json"])
            .expect("parse")
            .expect("not help");
        assert_eq!(args.fixture, Some(PathBuf::from("counter.json")));
        assert_eq!(args.steps, Some(4));
        assert_eq!(args.output, Some(PathBuf::from("out/report.json")));
        assert!(args.golden.is_none());
    }

    #[test]
    fn help_and_bad_flags() {
        assert!(parse(&["--help"]).expect("parse help").is_none());
        let err = parse(&["--fixture"]).unwrap_err();
        assert!(err.to_string().contains("needs a value"), "{err}");
        let err = parse(&["--bogus", "1"]).unwrap_err();
        assert!(err.to_string().contains("unrecognised flag"), "{err}");
        let err = parse(&["--steps", "many"]).unwrap_err();
        assert!(err.to_string().contains("not a step count"), "{err}");
    }
}
