use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context as _;
use clap::Parser;
use cwcheck::{
    client,
    config::Config,
    environment::MetaData,
    fetch::MetricValueFetcher,
    runner::{self, Context, TestRunner},
};
use cwcheck_status::TestGroupResult;
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

fn default_config_path() -> String {
    "/etc/cwcheck/cwcheck.yaml".to_string()
}

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    /// path on disk to the configuration file, defaults are used if absent
    #[clap(long, default_value_t = default_config_path())]
    config_path: String,
    /// runner to execute, may be repeated; overrides the configured runners
    #[clap(long = "runner")]
    runners: Vec<String>,
    /// path to write the JSON report to instead of stdout
    #[clap(long)]
    output: Option<PathBuf>,
    /// print the known runners and exit without querying
    #[clap(long)]
    list: bool,
}

fn print_registry(runners: &[Box<dyn TestRunner>]) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    for runner in runners {
        writeln!(
            stdout,
            "{}\t{}\t{}s",
            runner.test_name(),
            runner.agent_config_file_name(),
            runner.agent_run_duration().as_secs()
        )?;
    }
    Ok(())
}

fn write_report(results: &[TestGroupResult], output: Option<&Path>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("could not create report {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, results)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, results)?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

/// Log each failed group and return how many there were
fn report_failures(results: &[TestGroupResult]) -> usize {
    let mut failed_groups = 0;
    for group in results.iter().filter(|group| !group.passed()) {
        failed_groups += 1;
        error!(
            test = %group.name,
            failures = group.failures(),
            checks = group.results.len(),
            "test group failed"
        );
    }
    failed_groups
}

async fn run(
    config: Config,
    runners: Vec<Box<dyn TestRunner>>,
) -> anyhow::Result<Vec<TestGroupResult>> {
    let client = client::get_client(&config.aws)
        .await
        .context("metrics client could not be created")?;
    info!(region = client.region(), "metrics client ready");

    let metadata = MetaData::discover(&config.environment).await;
    let context = Context {
        fetcher: MetricValueFetcher::new(client.backend(), &config.query, config.retry),
        metadata: &metadata,
    };

    let mut results = Vec::with_capacity(runners.len());
    for runner in runners {
        info!(
            test = runner.test_name(),
            agent_config = runner.agent_config_file_name(),
            "validating"
        );
        results.push(runner.validate(&context).await);
    }
    Ok(results)
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(false)
        .finish()
        .init();

    let cli = Cli::parse();
    let config = Config::load_or_default(Path::new(&cli.config_path))
        .with_context(|| format!("could not load configuration {}", cli.config_path))?;

    let names = if cli.runners.is_empty() {
        &config.runners
    } else {
        &cli.runners
    };
    let runners = runner::select(runner::registry(), names)?;

    if cli.list {
        print_registry(&runners)?;
        return Ok(ExitCode::SUCCESS);
    }

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting cwcheck {version} run.");

    let runtime = Builder::new_current_thread().enable_all().build()?;
    let results = runtime.block_on(run(config, runners))?;

    write_report(&results, cli.output.as_deref())?;

    let failed_groups = report_failures(&results);
    if failed_groups == 0 {
        info!("all checks passed");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failed_groups, "checks failed");
        Ok(ExitCode::FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use cwcheck_status::TestResult;

    use super::*;

    #[test]
    fn runner_flag_repeats() {
        let cli = Cli::parse_from([
            "cwcheck",
            "--runner",
            "AppendDimension",
            "--runner",
            "MetricsCollectionInterval",
            "--list",
        ]);
        assert_eq!(cli.runners, vec!["AppendDimension", "MetricsCollectionInterval"]);
        assert!(cli.list);
        assert_eq!(cli.config_path, default_config_path());
        assert_eq!(cli.output, None);
    }

    #[test]
    fn failed_and_empty_groups_are_counted() {
        let results = vec![
            TestGroupResult {
                name: "AppendDimension".to_string(),
                results: vec![TestResult::passed("cpu_time_active")],
            },
            TestGroupResult {
                name: "MetricsNumberDimension".to_string(),
                results: vec![TestResult::failed("cpu_time_active")],
            },
            TestGroupResult {
                name: "MetricsCollectionInterval".to_string(),
                results: Vec::new(),
            },
        ];
        assert_eq!(report_failures(&results), 2);
        assert_eq!(report_failures(&results[..1]), 0);
    }

    #[test]
    fn report_is_written_to_output_path() {
        let dir = tempfile::tempdir().expect("directory could not be created");
        let path = dir.path().join("report.json");
        let results = vec![TestGroupResult {
            name: "AppendDimension".to_string(),
            results: vec![TestResult::passed("cpu_time_active")],
        }];

        write_report(&results, Some(&path)).expect("report written");

        let contents = std::fs::read_to_string(&path).expect("report readable");
        let parsed: Vec<TestGroupResult> = serde_json::from_str(&contents).expect("valid json");
        assert_eq!(parsed, results);
        assert!(contents.contains("\"test_results\""));
        assert!(contents.contains("\"PASSED\""));
    }
}
