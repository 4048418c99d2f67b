use clap::{Parser, Subcommand, ValueEnum};
use kubeweb_loadtest_core::config::LoadTestConfig;
use kubeweb_loadtest_core::duration::format_duration;
use kubeweb_loadtest_core::{run_load_test, LoadTestResult, ReportFormat};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Exit status when the run completed but a threshold failed
const THRESHOLDS_FAILED_EXIT: i32 = 99;

#[derive(Parser, Debug)]
#[command(name = "kubeweb-loadtest")]
#[command(about = "Staged virtual-user load test for the kubeweb index page", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scenario and evaluate its thresholds
    Run {
        /// Config file (YAML, TOML or JSON); takes the place of $KUBEWEB_LOADTEST_CONFIG
        #[arg(long)]
        config: Option<PathBuf>,

        /// Override the target URL
        #[arg(long)]
        url: Option<String>,

        /// Write a report to this path
        #[arg(long)]
        report: Option<PathBuf>,

        /// Report format
        #[arg(long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Skip the end-of-run summary
        #[arg(long, default_value = "false")]
        quiet: bool,
    },

    /// Load and validate the configuration without sending traffic
    Validate {
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the VU target over time
    Plan {
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds between plan rows
        #[arg(long, default_value = "10")]
        step: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Markdown => ReportFormat::Markdown,
            OutputFormat::Json => ReportFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            url,
            report,
            format,
            quiet,
        } => {
            let mut config = load_config(config.as_deref());
            if let Some(url) = url {
                config.target.url = url;
                if let Err(e) = config.validate() {
                    fail(&e.to_string());
                }
            }
            init_logging(&config.logging.level);

            info!("Target: {}", config.target.url);
            info!("Profile: {}", config.scenario.profile().description());

            let writer = match run_load_test(&config).await {
                Ok(writer) => writer,
                Err(e) => {
                    error!("load test failed: {}", e);
                    std::process::exit(1);
                }
            };

            if !quiet {
                println!("\n{}", writer.render_summary());
            }

            if let Some(path) = report {
                writer.write_report(&path, format.into())?;
                info!("Report written to {}", path.display());
            }

            if !writer.passes() {
                eprintln!("❌ Thresholds crossed:\n{}", writer.failure_summary());
                std::process::exit(THRESHOLDS_FAILED_EXIT);
            }

            println!("✅ All thresholds passed");
            Ok(())
        }

        Commands::Validate { config } => {
            let config = load_config(config.as_deref());

            println!("✅ Configuration is valid");
            println!("  Target: {}", config.target.url);
            println!("  Profile: {}", config.scenario.profile().description());
            for (idx, stage) in config.scenario.stages.iter().enumerate() {
                println!(
                    "    stage {}: {} -> {} VUs",
                    idx + 1,
                    format_duration(stage.duration),
                    stage.target
                );
            }
            println!("  Pause: {}", format_duration(config.scenario.pause));
            println!("  Thresholds:");
            for (metric, expr) in config.scenario.thresholds.iter() {
                println!("    {}: {}", metric, expr);
            }

            Ok(())
        }

        Commands::Plan { config, step } => {
            let config = load_config(config.as_deref());
            if step == 0 {
                fail("--step must be > 0");
            }

            for line in plan_lines(&config, Duration::from_secs(step)) {
                println!("{}", line);
            }

            Ok(())
        }
    }
}

/// Resolve the layered configuration; `--config` stands in for the env-named file
fn load_config(path: Option<&Path>) -> LoadTestConfig {
    let loaded: LoadTestResult<LoadTestConfig> = match path {
        Some(path) => LoadTestConfig::load_with(Some(path)),
        None => LoadTestConfig::load(),
    };

    match loaded {
        Ok(config) => config,
        Err(e) => fail(&e.to_string()),
    }
}

fn plan_lines(config: &LoadTestConfig, step: Duration) -> Vec<String> {
    let profile = config.scenario.profile();
    let total = profile.total_duration();
    let mut lines = Vec::new();
    let mut t = Duration::ZERO;

    loop {
        let stage = profile
            .stage_at(t)
            .map(|idx| (idx + 1).to_string())
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{:>8}  stage {:>2}  {:>5} VUs",
            format_duration(t),
            stage,
            profile.target_at(t)
        ));

        if t >= total {
            break;
        }
        t = (t + step).min(total);
    }

    lines
}

fn fail(message: &str) -> ! {
    eprintln!("❌ Invalid configuration: {}", message);
    std::process::exit(1);
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(env_filter).with_target(false).init();
}
