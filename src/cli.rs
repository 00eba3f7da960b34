use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::auth::Token;
use crate::config::{Config, OutputFormat};
use crate::model::{Project, RunReport, RunStatus};
use crate::output::{self, RunProgress};
use crate::pipeline::Orchestrator;
use crate::service::{ApiClient, MetricsService};

#[derive(Parser)]
#[command(name = "maintlens")]
#[command(
    author,
    version,
    about = "Repository ingestion and maintainability metrics",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./maintlens.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write the JSON report to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

/// Connection settings shared by the subcommands that talk to the service.
#[derive(Args)]
struct ApiArgs {
    #[arg(long, env = "MAINTLENS_API_URL")]
    api_url: Option<String>,

    #[arg(short = 'k', long, env = "MAINTLENS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a repository and extract metrics for every eligible file
    Run {
        /// Repository as 'owner/repo'
        #[arg(short = 'P', long)]
        project: String,

        /// Email of the user the run is recorded for
        #[arg(short, long, env = "MAINTLENS_USER")]
        user: String,

        #[command(flatten)]
        api: ApiArgs,

        #[arg(long)]
        max_attempts: Option<u32>,

        #[arg(long)]
        retry_delay_ms: Option<u64>,

        /// End the run at the first file that fails
        #[arg(long, default_value_t = false)]
        stop_on_error: bool,

        /// Request a file's metrics concurrently
        #[arg(long, default_value_t = false)]
        concurrent_metrics: bool,

        /// Metric to extract; repeat for several. Defaults to the service's list
        #[arg(short, long = "metric")]
        metrics: Vec<String>,

        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// List the metrics the service is configured to extract
    Metrics {
        #[command(flatten)]
        api: ApiArgs,
    },
    /// Write a default configuration file
    InitConfig {
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

impl Cli {
    /// Loads the configuration file and applies connection flags on top.
    fn load_config(&self, api: &ApiArgs) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(url) = &api.api_url {
            config.api.base_url.clone_from(url);
        }
        if let Some(key) = &api.api_key {
            config.api.api_key = Some(key.clone());
        }
        if self.pretty {
            config.output.pretty = true;
        }
        Ok(config)
    }

    fn client(config: &Config) -> Result<ApiClient> {
        let token = config.api.api_key.as_deref().map(Token::from);
        if token.is_none() {
            warn!("No API key configured; requests will be sent unauthenticated");
        }
        let client = ApiClient::new(
            &config.api.base_url,
            token,
            config.api.auth_scheme,
            config.api.timeout(),
        )?;
        Ok(client)
    }

    fn write_output(&self, contents: &str) -> Result<()> {
        if let Some(output_path) = &self.output {
            std::fs::write(output_path, contents)
                .with_context(|| format!("Failed to write {}", output_path.display()))?;
            info!("Report written to: {}", output_path.display());
        } else {
            println!("{contents}");
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_run(
        &self,
        project: &str,
        user: &str,
        api: &ApiArgs,
        max_attempts: Option<u32>,
        retry_delay_ms: Option<u64>,
        stop_on_error: bool,
        concurrent_metrics: bool,
        metrics: &[String],
        format: Option<OutputFormat>,
    ) -> Result<()> {
        let mut config = self.load_config(api)?;
        if let Some(attempts) = max_attempts {
            config.run.max_attempts = attempts;
        }
        if let Some(delay) = retry_delay_ms {
            config.run.retry_delay_ms = delay;
        }
        if stop_on_error {
            config.run.continue_on_file_error = false;
        }
        if concurrent_metrics {
            config.run.concurrent_metrics = true;
        }
        if !metrics.is_empty() {
            config.run.metrics = Some(metrics.to_vec());
        }
        if let Some(format) = format {
            config.output.format = format;
        }
        config.validate()?;

        let project = Project::from_path(project, user)?;
        let client = Self::client(&config)?;
        info!(
            "Ingesting {} from {}",
            project.full_name(),
            client.base_url()
        );

        let service: Arc<dyn MetricsService> = Arc::new(client);
        let orchestrator = Orchestrator::new(service, config.run.run_options());
        let report = follow_run(&orchestrator, project).await?;

        match config.output.format {
            OutputFormat::Summary if self.output.is_none() => output::print_summary(&report),
            _ => self.write_output(&output::render_json(&report, config.output.pretty)?)?,
        }

        if report.status == RunStatus::Failed {
            bail!(
                "Run {} failed: {}",
                report.run_id,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
        Ok(())
    }

    async fn execute_metrics(&self, api: &ApiArgs) -> Result<()> {
        let config = self.load_config(api)?;
        config.validate()?;

        let metrics = Self::client(&config)?.get_metrics_config().await?;
        info!("Service lists {} metrics", metrics.len());

        match config.output.format {
            OutputFormat::Summary if self.output.is_none() => output::print_metric_names(&metrics),
            _ => {
                let json = if config.output.pretty {
                    serde_json::to_string_pretty(&metrics)?
                } else {
                    serde_json::to_string(&metrics)?
                };
                self.write_output(&json)?;
            }
        }
        Ok(())
    }

    fn execute_init_config(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!(
                "{} already exists; pass --force to overwrite it",
                path.display()
            );
        }
        Config::default().save(path)?;
        eprintln!(
            "{} {}",
            output::dim("Wrote default configuration to"),
            output::cyan(path.display())
        );
        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Run {
                project,
                user,
                api,
                max_attempts,
                retry_delay_ms,
                stop_on_error,
                concurrent_metrics,
                metrics,
                format,
            } => {
                self.execute_run(
                    project,
                    user,
                    api,
                    *max_attempts,
                    *retry_delay_ms,
                    *stop_on_error,
                    *concurrent_metrics,
                    metrics,
                    *format,
                )
                .await
            }
            Commands::Metrics { api } => self.execute_metrics(api).await,
            Commands::InitConfig { path, force } => Self::execute_init_config(path, *force),
        }
    }
}

/// Starts a run and renders its events until it finishes. Ctrl-C cancels it.
async fn follow_run(orchestrator: &Orchestrator, project: Project) -> Result<RunReport> {
    let mut handle = orchestrator.start_run(project);
    info!("Run {} started", handle.run_id());
    let progress = RunProgress::new();

    if let Some(mut events) = handle.take_events() {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => progress.handle(&event),
                    None => break,
                },
                _ = &mut ctrl_c, if !interrupted => {
                    eprintln!("{}", output::bright_yellow("Interrupted, cancelling run..."));
                    interrupted = true;
                    handle.cancel();
                }
            }
        }
    }

    Ok(handle.wait().await?)
}
