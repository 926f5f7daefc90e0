//! Command line front end for the drop queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use dropq_api::{AdmissionConfig, Collaborators, JobState, QueueEvent, Services, format_event_line};
use dropq_core::{ProfileId, TargetId, TranscodeRequirement};

mod host;

use host::{EmptyLookup, PresetChooser, SimulatedEngine, load_targets, run_simulation};

#[derive(Parser)]
#[command(author, version, about = "Drop files on a queue and watch them get processed", long_about = None)]
struct Cli {
    /// JSON file with an array of target definitions.
    #[arg(long, env = "DROPQ_TARGETS")]
    targets: Option<PathBuf>,

    /// Where simulated artifacts are written.
    #[arg(long, env = "DROPQ_OUTPUT_DIR", default_value = "./dropq-out")]
    output_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the configured targets and their profiles
    Targets,
    /// Drop paths, URLs or a tagged block and process the resulting jobs
    Drop {
        /// Paths or URLs, one reference per argument. Use `-` to read stdin.
        #[arg(required = true)]
        inputs: Vec<String>,
        /// Aim the drop at this target instead of choosing one.
        #[arg(short, long)]
        target: Option<String>,
        /// Profile answered when a profile prompt comes up.
        #[arg(short, long)]
        profile: Option<String>,
        #[arg(long, value_enum, default_value_t = Requirement::WhenRequired)]
        requirement: Requirement,
        /// Simulated processing time per job, in milliseconds.
        #[arg(long, default_value_t = 200)]
        work_ms: u64,
        /// Return after queueing instead of waiting for the jobs.
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Requirement {
    Never,
    WhenRequired,
    Always,
}

impl From<Requirement> for TranscodeRequirement {
    fn from(value: Requirement) -> Self {
        match value {
            Requirement::Never => TranscodeRequirement::Never,
            Requirement::WhenRequired => TranscodeRequirement::WhenRequired,
            Requirement::Always => TranscodeRequirement::Always,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let targets = load_targets(cli.targets.as_deref())?;

    match cli.command {
        Commands::Targets => {
            for target in targets.list() {
                println!("{}", serde_json::to_string(&target.spec())?);
            }
            Ok(())
        }
        Commands::Drop {
            inputs,
            target,
            profile,
            requirement,
            work_ms,
            no_wait,
        } => {
            let text = read_inputs(&inputs)?;
            let config = AdmissionConfig::from_env().context("reading DROPQ_* settings")?;
            tokio::fs::create_dir_all(&cli.output_dir)
                .await
                .with_context(|| format!("creating {}", cli.output_dir.display()))?;

            let (engine, started) = SimulatedEngine::new(cli.output_dir.clone());
            let chooser = PresetChooser {
                target: target.as_deref().map(TargetId::new),
                profile: profile.map(ProfileId::new),
                requirement: requirement.into(),
            };
            let services = Arc::new(
                Services::init(
                    config,
                    Collaborators {
                        engine: Arc::new(engine),
                        lookup: Arc::new(EmptyLookup),
                        chooser: Arc::new(chooser),
                        targets,
                    },
                )
                .await?,
            );
            services
                .register_listener(|event: &QueueEvent| println!("{}", format_event_line(event)));
            tokio::spawn(run_simulation(
                services.clone(),
                started,
                Duration::from_millis(work_ms),
            ));

            let outcome = services.handle_text_drop(target.as_deref(), &text).await?;
            tracing::info!(
                jobs = outcome.jobs.len(),
                filtered = outcome.filtered,
                capped = outcome.capped,
                target = %outcome.target,
                "Drop queued"
            );

            if !no_wait {
                wait_for_jobs(&services, &outcome.jobs).await;
                let ids: Vec<String> = outcome.jobs.iter().map(|id| id.to_string()).collect();
                if let Some(block) = services.drag_out(&ids)? {
                    print!("{}", block);
                }
            }
            services.shutdown().await?;
            Ok(())
        }
    }
}

fn read_inputs(inputs: &[String]) -> anyhow::Result<String> {
    if inputs.len() == 1 && inputs[0] == "-" {
        let text = std::io::read_to_string(std::io::stdin()).context("reading stdin")?;
        if text.trim().is_empty() {
            bail!("nothing on stdin");
        }
        return Ok(text);
    }

    // Relative paths are resolved against the working directory.
    let cwd = std::env::current_dir().context("resolving working directory")?;
    let lines: Vec<String> = inputs
        .iter()
        .map(|input| {
            if input.contains("://") || PathBuf::from(input).is_absolute() {
                input.clone()
            } else {
                cwd.join(input).display().to_string()
            }
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Wait until every job has completed or failed.
async fn wait_for_jobs(services: &Services, jobs: &[dropq_api::JobId]) {
    loop {
        let pending = jobs.iter().any(|id| match services.queue().get(*id) {
            Some(job) => !matches!(job.state, JobState::Failed | JobState::Stopped),
            None => false,
        });
        if !pending {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
