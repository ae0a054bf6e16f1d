/// Command-line runner for the disaggregation pipeline.
/// Reads a JSON scenario (mapping, fine land tensor, split passes, optional
/// side layers) and writes all named outputs as JSON.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use landsplit_core::{
    DisaggConfig, DisaggregationPipeline, LandScheme, PipelineInputs, ViolationAction,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "landsplit", about = "Disaggregate cluster-level land allocation to grid cells")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every pass of a scenario.
    Run {
        /// Scenario JSON file.
        #[arg(short, long)]
        scenario: PathBuf,

        /// Configuration JSON file (all fields optional).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output JSON file; stdout when omitted.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pasture classification variant (grass-split or no-grass).
        #[arg(long)]
        scheme: Option<LandScheme>,

        /// Conservation residual tolerance.
        #[arg(long)]
        tolerance: Option<f64>,

        /// Fail a pass on conservation violation instead of warning.
        #[arg(long)]
        abort_on_violation: bool,

        /// Run split passes in parallel.
        #[arg(long)]
        parallel: bool,
    },
    /// Validate a scenario's cluster → cell mapping and print its size.
    CheckMapping {
        #[arg(short, long)]
        scenario: PathBuf,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// File configuration with command-line overrides applied on top.
fn resolve_config(
    file: Option<DisaggConfig>,
    scheme: Option<LandScheme>,
    tolerance: Option<f64>,
    abort_on_violation: bool,
    parallel: bool,
) -> DisaggConfig {
    let mut config = file.unwrap_or_default();
    if let Some(s) = scheme {
        config.scheme = s;
    }
    if let Some(t) = tolerance {
        config.conservation.tolerance = t;
    }
    if abort_on_violation {
        config.conservation.on_violation = ViolationAction::Abort;
    }
    config.parallel |= parallel;
    config
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Args::parse().command {
        Command::Run { scenario, config, output, scheme, tolerance, abort_on_violation, parallel } => {
            let file_config = config.as_deref().map(read_json::<DisaggConfig>).transpose()?;
            let config = resolve_config(file_config, scheme, tolerance, abort_on_violation, parallel);
            let inputs: PipelineInputs = read_json(&scenario)?;
            tracing::info!(
                scenario = %scenario.display(),
                scheme = ?config.scheme,
                passes = inputs.splits.len(),
                "running pipeline"
            );

            let result = DisaggregationPipeline::new(config)
                .run(&inputs)
                .with_context(|| format!("running {}", scenario.display()))?;
            let json = serde_json::to_string_pretty(&result)?;
            match output {
                Some(path) => {
                    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
                    tracing::info!(path = %path.display(), "wrote outputs");
                }
                None => println!("{json}"),
            }
            for f in &result.failures {
                tracing::warn!(pass = %f.pass, error = %f.error, "pass did not complete");
            }
        }
        Command::CheckMapping { scenario } => {
            let inputs: PipelineInputs = read_json(&scenario)?;
            println!(
                "{} clusters, {} cells",
                inputs.mapping.n_clusters(),
                inputs.mapping.n_cells()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_file_config() {
        let file = DisaggConfig { parallel: false, ..Default::default() };
        let c = resolve_config(Some(file), Some(LandScheme::NoGrass), Some(0.5), true, true);
        assert_eq!(c.scheme, LandScheme::NoGrass);
        assert_eq!(c.conservation.tolerance, 0.5);
        assert_eq!(c.conservation.on_violation, ViolationAction::Abort);
        assert!(c.parallel);
    }

    #[test]
    fn defaults_without_file_or_flags() {
        assert_eq!(resolve_config(None, None, None, false, false), DisaggConfig::default());
    }

    #[test]
    fn args_parse_run_subcommand() {
        let args = Args::try_parse_from([
            "landsplit", "run", "--scenario", "s.json", "--scheme", "no-grass", "--tolerance", "0.2",
        ])
        .unwrap();
        match args.command {
            Command::Run { scheme, tolerance, abort_on_violation, .. } => {
                assert_eq!(scheme, Some(LandScheme::NoGrass));
                assert_eq!(tolerance, Some(0.2));
                assert!(!abort_on_violation);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn read_json_reports_missing_file() {
        let err = read_json::<DisaggConfig>(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("reading"));
    }
}
