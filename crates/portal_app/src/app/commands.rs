use std::collections::BTreeMap;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use engine_logging::{engine_debug, engine_error, engine_info};
use portal_core::{JobSpec, ProcessEvent};
use portal_engine::{
    job_from_env, run_worker, AssignmentsStore, Dispatcher, FetchSettings, HttpPageSession, Liveness,
    LockManager, MemoryAssignmentsStore, ProcessProbe, Runner, RunnerConfig, SignalProbe,
    WorkerCommand, WorkerPrograms,
};

use super::cli::{Commands, FillFormArgs, ScrapeArgs};
use super::config::{AppConfig, CONFIG_ENV_VAR};
use super::persistence::{load_last_outcome, save_last_outcome};

pub(crate) async fn execute(command: Commands, config: &AppConfig) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Extract { url } => {
            let url = url.unwrap_or_else(|| config.default_url.clone());
            run_job(JobSpec::extract(url)?, config).await
        }
        Commands::Scrape(args) => run_job(scrape_job(args, config)?, config).await,
        Commands::FillForm(args) => run_job(fill_form_job(args)?, config).await,
        Commands::Worker => Ok(worker(config).await),
        Commands::Unlock { force } => Ok(unlock(config, force)),
        Commands::LastResult => last_result(config),
    }
}

fn scrape_job(args: ScrapeArgs, config: &AppConfig) -> anyhow::Result<JobSpec> {
    let urls = if args.urls.is_empty() {
        vec![config.default_url.clone()]
    } else {
        args.urls
    };
    Ok(JobSpec::scrape(urls, args.traverse)?)
}

fn fill_form_job(args: FillFormArgs) -> anyhow::Result<JobSpec> {
    let values: BTreeMap<_, _> = args.values.into_iter().collect();
    Ok(JobSpec::fill_form(args.url, values)?)
}

fn worker_programs(config: &AppConfig) -> anyhow::Result<WorkerPrograms> {
    let mut command =
        WorkerCommand::current_exe_worker().context("cannot locate the portal executable")?;
    if let Some(source) = &config.source {
        command = command.env(CONFIG_ENV_VAR, source);
    }
    Ok(WorkerPrograms::uniform(command))
}

async fn run_job(job: JobSpec, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let mut runner_config = RunnerConfig::new(&config.profile_dir, worker_programs(config)?);
    runner_config.log_tail = config.log_tail;
    let store = Arc::new(MemoryAssignmentsStore::new());
    let dispatcher = Dispatcher::new(
        Runner::new(runner_config, LockManager::system()),
        store.clone(),
    );

    let kind = job.kind();
    let outcome = match dispatcher.dispatch(job, print_event).await {
        Ok(outcome) => outcome,
        Err(err) => {
            engine_error!("{} job failed: {}", kind, err);
            eprintln!("Error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("{}", serde_json::to_string_pretty(outcome.payload())?);
    save_last_outcome(&config.state_dir, &outcome, Utc::now().to_rfc3339());

    let courses = store.list_courses().await?;
    let assignments = store.list_assignments(None).await?;
    if !courses.is_empty() || !assignments.is_empty() {
        println!("Found {} courses and {} assignments", courses.len(), assignments.len());
        for course in &courses {
            let due: Vec<String> = store
                .list_assignments(Some(&course.id))
                .await?
                .into_iter()
                .map(|a| match a.due_date {
                    Some(date) => format!("{} (due {date})", a.title),
                    None => a.title,
                })
                .collect();
            println!("  {} [{}]: {}", course.name, course.id, due.join("; "));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_event(event: &ProcessEvent) {
    match event {
        ProcessEvent::Log { text } => println!("{text}"),
        ProcessEvent::Result { .. } => engine_debug!("Worker reported its result"),
        ProcessEvent::End { exit_code } => engine_info!("Worker finished with {:?}", exit_code),
    }
}

async fn worker(config: &AppConfig) -> ExitCode {
    let job = match job_from_env() {
        Ok(job) => job,
        Err(err) => {
            engine_error!("Worker cannot start: {}", err);
            println!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    engine_info!("Worker using profile {}", config.profile_dir.display());

    let mut session = HttpPageSession::new(FetchSettings::default());
    let code = run_worker(&job, &mut session, &config.crawl, std::io::stdout()).await;
    let _ = std::io::stdout().flush();
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn unlock(config: &AppConfig, force: bool) -> ExitCode {
    let profile_dir = &config.profile_dir;
    if let Some(record) = LockManager::read_record(profile_dir) {
        if !force && SignalProbe.liveness(record.pid) == Liveness::Alive {
            eprintln!(
                "Session is held by running process {} (since {}); close it or pass --force",
                record.pid, record.started_at
            );
            return ExitCode::FAILURE;
        }
    }
    let locks = LockManager::system();
    println!("session lock: {}", locks.release(profile_dir));
    println!("engine marker: {}", locks.clear_stale_engine_artifacts(profile_dir));
    ExitCode::SUCCESS
}

fn last_result(config: &AppConfig) -> anyhow::Result<ExitCode> {
    match load_last_outcome(&config.state_dir) {
        Some(last) => {
            println!("{} job finished at {}", last.kind, last.finished_utc);
            println!("{}", serde_json::to_string_pretty(&last.payload)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No result recorded in {}", config.state_dir.display());
            Ok(ExitCode::FAILURE)
        }
    }
}
