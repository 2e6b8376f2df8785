// Bulkbench CLI
//
// Design Decision: Use clap derive; positional ROW_COUNT LOOP_COUNT override the
//   benchmark section of the config file, flags override the rest.
// Design Decision: Benchmarks run sequentially and finish before the stress test
//   starts; neither phase aborts the process on database errors.
// Design Decision: Ctrl-C cancels the stress test's shared token, so workers stop
//   the same way they do at the deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bulkbench_harness::{
    init_telemetry, BenchmarkOperation, BenchmarkRunner, Database, HarnessConfig, StressTest,
    TelemetryConfig, Workload,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "bulkbench")]
#[command(about = "Benchmark PostgreSQL bulk insert and select strategies, then stress connection churn")]
#[command(version)]
pub struct Cli {
    /// Rows generated per insert iteration
    #[arg(requires = "loop_count")]
    pub row_count: Option<u64>,

    /// Iterations per operation
    pub loop_count: Option<usize>,

    /// Config file (defaults to ./bulkbench.json when present)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Stress test worker count
    #[arg(long)]
    pub workers: Option<usize>,

    /// Stress test duration in seconds
    #[arg(long)]
    pub run_duration_secs: Option<u64>,

    /// Run only these operations (repeatable)
    #[arg(long = "only", value_name = "OPERATION")]
    pub only: Vec<BenchmarkOperation>,

    /// Skip the stress test
    #[arg(long)]
    pub skip_stress: bool,

    /// Log filter (overrides RUST_LOG / LOG_LEVEL)
    #[arg(long, env = "BULKBENCH_LOG")]
    pub log_filter: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(rows) = self.row_count {
            config.benchmark.row_count = rows;
        }
        if let Some(loops) = self.loop_count {
            config.benchmark.loop_count = loops;
        }
        if let Some(workers) = self.workers {
            config.stress.workers = workers;
        }
        if let Some(secs) = self.run_duration_secs {
            config.stress.run_duration = Duration::from_secs(secs);
        }
        if !self.only.is_empty() {
            config.benchmark.operations = self.only.clone();
        }
        if self.skip_stress {
            config.stress.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(TelemetryConfig::from_env().with_log_filter(cli.log_filter.clone()));

    let mut config =
        HarnessConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let run_id = Uuid::now_v7();
    config.database.application_name = format!("{}-{}", config.database.application_name, run_id);

    let span = tracing::info_span!("bulkbench", %run_id);
    run(config).instrument(span).await
}

async fn run(config: HarnessConfig) -> anyhow::Result<()> {
    let db = Database::connect(&config.database, &config.pooling)
        .context("failed to configure database client")?;

    let bench = &config.benchmark;
    println!("Postgres({} Rows x {})", bench.row_count, bench.loop_count);

    let workload = Workload::prepare(db.clone(), bench).await;
    let runner = BenchmarkRunner::new(bench.loop_count).with_failure_policy(bench.failed_iterations);

    for &operation in &bench.operations {
        let result = runner
            .run(
                operation.name(),
                || workload.execute(operation),
                || workload.table_size(),
            )
            .await;
        print!("{result}");
    }

    if config.stress.enabled {
        let token = CancellationToken::new();
        let interrupt = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received shutdown signal");
                    token.cancel();
                }
            })
        };

        let stress = StressTest::new(Arc::new(db.clone()), config.stress.clone());
        let report = stress.run_with_token(token).await;
        interrupt.abort();

        if report.failure_count() > 0 {
            warn!(
                failures = report.failure_count(),
                "stress test finished with worker failures"
            );
        }
    } else {
        info!("stress test disabled");
    }

    db.close().await;
    info!("bulkbench finished");
    Ok(())
}
