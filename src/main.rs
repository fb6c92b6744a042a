//! Command-line entry point for the simbatch batch runner.

use std::path::PathBuf;
use std::process::ExitCode;

use simbatch::logging;
use simbatch::run::{self, RunOptions};

const USAGE: &str = "usage: simbatch [-w N] COLLECTION [OUTPUT]";

fn main() -> ExitCode {
    let options = match parse_args(std::env::args().skip(1).collect()) {
        Ok(options) => options,
        Err(message) => {
            eprintln!("{message}");
            eprintln!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = logging::init(&options.collection) {
        eprintln!("Logging disabled: {err}");
    }

    match run::run(&options) {
        Ok(report) => {
            println!(
                "Merged {} jobs into {} ({} rows, {} failed jobs)",
                report.jobs,
                report.store.display(),
                report.merge.rows_copied,
                report.failed
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> Result<RunOptions, String> {
    let mut collection = None;
    let mut output = None;
    let mut workers = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-w" | "--workers" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value"))?;
                let parsed = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid worker count: {value}"))?;
                if parsed == 0 {
                    return Err("worker count must be at least 1".to_string());
                }
                workers = Some(parsed);
            }
            _ if collection.is_none() => collection = Some(PathBuf::from(arg)),
            _ if output.is_none() => output = Some(PathBuf::from(arg)),
            _ => return Err(format!("unexpected argument: {arg}")),
        }
    }
    let collection = collection.ok_or_else(|| "missing collection path".to_string())?;
    Ok(RunOptions {
        collection,
        output,
        workers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_and_output_are_positional() {
        let options =
            parse_args(vec!["./jobs".to_string(), "out.db".to_string()]).unwrap();
        assert_eq!(options.collection, PathBuf::from("./jobs"));
        assert_eq!(options.output, Some(PathBuf::from("out.db")));
        assert_eq!(options.workers, None);
    }

    #[test]
    fn worker_flag_is_parsed() {
        let options = parse_args(vec![
            "-w".to_string(),
            "4".to_string(),
            "./jobs".to_string(),
        ])
        .unwrap();
        assert_eq!(options.workers, Some(4));
    }

    #[test]
    fn missing_collection_is_a_usage_error() {
        assert!(parse_args(Vec::new()).is_err());
    }

    #[test]
    fn zero_workers_is_rejected() {
        let err = parse_args(vec!["-w".to_string(), "0".to_string(), "jobs".to_string()])
            .unwrap_err();
        assert!(err.contains("at least 1"));
    }
}
