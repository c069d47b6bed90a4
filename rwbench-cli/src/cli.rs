//! Command-line entry point of the `rwbench` tool.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use rwbench_client::SharedClient;
use rwbench_core::report::Report;
use rwbench_core::{BenchmarkConfig, RunOutcome, WorkerPool};
use yansi::Paint;

use crate::config::{Config, Overrides, StorageOverrides};
use crate::{observability, storage};

/// Read-after-write consistency and latency benchmark for object stores.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    pub config: Option<PathBuf>,

    /// region of the S3 bucket
    #[argh(option)]
    pub region: Option<String>,

    /// bucket to run the benchmark against
    #[argh(option)]
    pub bucket: Option<String>,

    /// delete all objects in the bucket before starting
    #[argh(switch)]
    pub clear: bool,

    /// number of concurrent workers
    #[argh(option)]
    pub concurrency: Option<usize>,

    /// number of operations per worker
    #[argh(option)]
    pub iterations: Option<usize>,

    /// target ratio of reads to writes, 0 for writes only
    #[argh(option)]
    pub rwratio: Option<f64>,

    /// seed for generated keys and values
    #[argh(option)]
    pub seed: Option<u64>,

    #[argh(subcommand)]
    pub command: Command,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bucket: self.bucket.clone(),
            clear: self.clear.then_some(true),
            concurrency: self.concurrency,
            iterations: self.iterations,
            rwratio: self.rwratio,
            seed: self.seed,
            storage: self
                .region
                .clone()
                .map(|region| StorageOverrides { region }),
        }
    }
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Run(RunCommand),
    Clear(ClearCommand),
    Version(VersionCommand),
}

/// run the benchmark and print a report
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "run")]
struct RunCommand {}

/// delete all objects in the bucket
#[derive(Debug, FromArgs)]
#[argh(subcommand, name = "clear")]
struct ClearCommand {}

/// print the rwbench version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

/// Bootstrap the runtime and execute the CLI command.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Command::Version(_) = args.command {
        println!("rwbench {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load(args.config.as_deref(), args.overrides())?;
    yansi::whenever(yansi::Condition::TTY_AND_COLOR);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("rwbench-rt")
        .enable_all()
        .worker_threads(config.runtime.worker_threads)
        .build()?;
    let _runtime_guard = runtime.enter();

    observability::init_tracing(&config.logging);
    tracing::debug!(?config);

    let client = storage::client(&config.storage)?;
    let benchmark = config.benchmark;

    runtime.block_on(async move {
        let mut stdout = io::stdout().lock();
        match args.command {
            Command::Run(RunCommand {}) => run(benchmark, client, &mut stdout).await,
            Command::Clear(ClearCommand {}) => clear(&benchmark, client, &mut stdout).await,
            Command::Version(VersionCommand {}) => unreachable!(),
        }
    })
}

/// Runs the benchmark and writes the report to `out`.
async fn run(config: BenchmarkConfig, client: SharedClient, out: &mut impl Write) -> Result<()> {
    tracing::info!(
        bucket = %config.bucket,
        concurrency = config.concurrency,
        iterations = config.iterations,
        rwratio = config.rwratio,
        "Starting benchmark"
    );

    let pool = WorkerPool::new(config, client)?;
    let outcome = pool.run().await.context("benchmark failed")?;
    write_results(out, &outcome)?;
    Ok(())
}

/// Deletes every object in the configured bucket and writes the count to `out`.
async fn clear(config: &BenchmarkConfig, client: SharedClient, out: &mut impl Write) -> Result<()> {
    let deleted = rwbench_core::clear::clear_bucket(&client, &config.bucket)
        .await
        .with_context(|| format!("failed to clear bucket {}", config.bucket))?;
    writeln!(out, "Deleted {deleted} objects from {}", config.bucket)?;
    Ok(())
}

fn write_results(out: &mut impl Write, outcome: &RunOutcome) -> io::Result<()> {
    if let Some(cleared) = outcome.cleared {
        writeln!(out, "Cleared {cleared} objects before the run")?;
    }
    writeln!(out, "{}", "## RESULTS".bold())?;
    write!(
        out,
        "{}",
        Report::new(&outcome.stats).with_elapsed(outcome.elapsed)
    )?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use rwbench_client::{InMemoryClient, ObjectClient};

    use super::*;

    #[test]
    fn flags_become_overrides() {
        let args = Args::from_args(
            &["rwbench"],
            &[
                "--bucket", "bench", "--clear", "--rwratio", "0", "--region", "eu-west-1", "run",
            ],
        )
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.bucket.as_deref(), Some("bench"));
        assert_eq!(overrides.clear, Some(true));
        assert_eq!(overrides.rwratio, Some(0.0));
        assert_eq!(overrides.concurrency, None);
        assert_eq!(overrides.storage.unwrap().region, "eu-west-1");
    }

    #[test]
    fn missing_clear_flag_does_not_override() {
        let args = Args::from_args(&["rwbench"], &["clear"]).unwrap();
        assert_eq!(args.overrides().clear, None);
    }

    #[tokio::test]
    async fn run_prints_report() {
        rwbench_test::tracing::init();

        let mut config = BenchmarkConfig::new("bench");
        config.concurrency = 2;
        config.iterations = 10;
        config.rwratio = 0.0;

        let mut out = Vec::new();
        run(config, Arc::new(InMemoryClient::new()), &mut out)
            .await
            .unwrap();

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("RESULTS"), "{out}");
        assert!(out.contains("Writes:       20"), "{out}");
        assert!(out.contains("Latest reads: 0/0"), "{out}");
        assert!(out.contains("Read timings:"), "{out}");
    }

    #[tokio::test]
    async fn clear_prints_count() {
        let client = InMemoryClient::new();
        for key in ["a", "b", "c"] {
            client
                .put("bench", key, Bytes::from_static(b"value"))
                .await
                .unwrap();
        }

        let mut out = Vec::new();
        clear(
            &BenchmarkConfig::new("bench"),
            Arc::new(client.clone()),
            &mut out,
        )
        .await
        .unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Deleted 3 objects from bench\n");
        assert!(client.is_empty("bench"));
    }
}
