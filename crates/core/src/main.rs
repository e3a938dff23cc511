use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sa_domain::config::{Config, ConfigSeverity};

mod calendar;
mod collaborators;
mod job_store;
mod runtime;
mod scheduler;
mod state;

use collaborators::UnconfiguredCollaborator;
use runtime::cancel::CancelMap;
use runtime::executor::Executor;
use runtime::schedules::RuleStore;
use scheduler::{MediaPaths, Scheduler};
use state::AppState;

/// No HTTP, CLI, or environment-variable surface is part of the core —
/// the only configuration input is `./config.toml`, read relative to
/// the process's working directory if present.
const CONFIG_PATH: &str = "./config.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Arc::new(load_config()?);
    let state = bootstrap(config).await?;

    state.scheduler.start().await;
    tracing::info!("scheduler-core running");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    state.scheduler.stop().await;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sa_scheduler_core=debug")),
        )
        .json()
        .init();
}

fn load_config() -> anyhow::Result<Config> {
    let config = match std::fs::read_to_string(CONFIG_PATH) {
        Ok(raw) => toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {CONFIG_PATH}: {e}"))?,
        Err(_) => {
            tracing::info!(path = CONFIG_PATH, "no config file found, using defaults");
            Config::default()
        }
    };
    Ok(config)
}

async fn bootstrap(config: Arc<Config>) -> anyhow::Result<AppState> {
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    let root = std::path::PathBuf::from(&config.storage.root);
    let jobs_root = root.join("jobs");
    let rules_root = root.join("rules");
    let slots_root = root.join("slots");
    let media_root = root.join("media");
    for dir in [&jobs_root, &rules_root, &slots_root, &media_root] {
        std::fs::create_dir_all(dir)?;
    }

    let jobs = Arc::new(job_store::JobStore::new(&jobs_root));
    tracing::info!("job store ready");

    let rules = Arc::new(RuleStore::new(&rules_root));
    tracing::info!("rule store ready");

    let calendar_store = Arc::new(calendar::Calendar::new(&slots_root, config.calendar.clone()));
    tracing::info!("calendar ready");

    let cancel_map = Arc::new(CancelMap::new());
    let executor = Arc::new(Executor::new(config.executor.clone(), cancel_map.clone()));
    tracing::info!(
        max_concurrent_jobs = config.executor.clamped().max_concurrent_jobs,
        "executor ready"
    );

    let scheduler = Scheduler::new(
        jobs.clone(),
        rules.clone(),
        calendar_store.clone(),
        executor.clone(),
        cancel_map.clone(),
        Arc::new(UnconfiguredCollaborator::new("script_generation")),
        Arc::new(UnconfiguredCollaborator::new("media_assembly")),
        Arc::new(UnconfiguredCollaborator::new("upload")),
        MediaPaths {
            assets_dir: media_root.join("assets"),
            output_dir: media_root.join("output"),
        },
        "default".into(),
        config.scheduler.clone(),
    );
    tracing::info!("scheduler ready");

    Ok(AppState {
        config,
        jobs,
        rules,
        calendar: calendar_store,
        executor,
        cancel_map,
        scheduler,
    })
}
