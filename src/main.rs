mod cli;

use splatforge::{config, AppContext, JobRunner};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use sf_av::{LocalProvisioner, Provisioner, ToolRegistry, TRAINER};
use sf_core::{Job, JobStatus, QualityPreset};
use sf_store::JobStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "splatforge=debug,sf_pipeline=debug,sf_av=debug,sf_store=debug,sf_core=debug".to_string()
        } else {
            "splatforge=info,sf_pipeline=info,sf_av=info,sf_store=warn,sf_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Process {
            videos,
            preset,
            no_validate,
            mesh,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(process_videos(
                &videos,
                preset,
                no_validate,
                mesh,
                cli.config.as_deref(),
            ))
        }
        Commands::Status { id, json } => show_status(&id, json, cli.config.as_deref()),
        Commands::List { json } => list_jobs(json, cli.config.as_deref()),
        Commands::Presets => {
            show_presets();
            Ok(())
        }
        Commands::CheckTools => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(cli.config.as_deref()))
        }
        Commands::ValidateConfig {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("splatforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn process_videos(
    videos: &[PathBuf],
    preset: Option<QualityPreset>,
    no_validate: bool,
    mesh: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;
    if no_validate {
        config.processing.validate_input = false;
    }
    if mesh {
        config.processing.export_mesh = true;
    }
    let preset = preset.unwrap_or(config.processing.default_preset);
    let storage_root = config.storage.root.clone();

    tracing::info!(
        preset = %preset,
        storage = %storage_root.display(),
        "Starting splatforge"
    );
    let ctx = Arc::new(AppContext::build(config).context("Failed to initialise storage")?);
    let runner = JobRunner::new(ctx.clone());

    let mut submitted = Vec::new();
    for video in videos {
        match runner.submit(video, preset).await {
            Ok(job) => {
                println!("{}  {}  submitted", job.id.short(), job.source_filename);
                submitted.push(job.id);
            }
            Err(e) => eprintln!("{}: {e}", video.display()),
        }
    }
    if submitted.is_empty() {
        anyhow::bail!("No videos were submitted");
    }

    let wait_all = async {
        let mut finished = Vec::new();
        for id in &submitted {
            finished.push(runner.wait(*id).await);
        }
        finished
    };

    let results = tokio::select! {
        results = wait_all => results,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted; stopping running jobs...");
            ctx.shutdown().await;
            submitted.iter().map(|id| runner.status(*id)).collect()
        }
    };

    println!();
    let mut failed = 0;
    for result in results {
        match result {
            Ok(job) => {
                print_job_line(&job);
                if job.status != JobStatus::Completed {
                    failed += 1;
                }
            }
            Err(e) => {
                eprintln!("{e}");
                failed += 1;
            }
        }
    }

    ctx.shutdown().await;
    if failed > 0 {
        anyhow::bail!("{failed} of {} job(s) did not complete", submitted.len());
    }
    Ok(())
}

fn open_store(config_path: Option<&Path>) -> Result<JobStore> {
    let config = config::load_config_or_default(config_path)?;
    let path = config.storage.jobs_file();
    JobStore::open(&path).with_context(|| format!("Failed to open job store {}", path.display()))
}

/// Find a job by full id or unique id prefix.
fn find_job(store: &JobStore, id: &str) -> Result<Job> {
    if let Ok(id) = id.parse() {
        return Ok(store.get(id)?);
    }
    let matches: Vec<Job> = store
        .list()
        .into_iter()
        .filter(|job| job.id.to_string().starts_with(id))
        .collect();
    match matches.len() {
        0 => anyhow::bail!("No job matches '{id}'"),
        1 => Ok(matches.into_iter().next().context("job vanished")?),
        n => anyhow::bail!("'{id}' is ambiguous ({n} jobs match)"),
    }
}

fn show_status(id: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let store = open_store(config_path)?;
    let job = find_job(&store, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
        return Ok(());
    }

    println!("Job:      {}", job.id);
    println!("Video:    {}", job.source_filename);
    println!("Preset:   {}", job.preset);
    println!("Status:   {}", job.status);
    println!("Progress: {:.0}%", job.progress * 100.0);
    println!("Created:  {}", job.created_at.to_rfc3339());
    println!("Updated:  {}", job.updated_at.to_rfc3339());
    if let Some(ref message) = job.error_message {
        println!("Error:    {message}");
    }
    if let Some(ref report) = job.validation {
        println!(
            "Input:    {:.1}s {}x{} @ {:.1} fps, ~{} frames",
            report.duration_secs, report.width, report.height, report.fps, report.estimated_frames
        );
        for warning in &report.warnings {
            println!("  warning: {warning}");
        }
    }
    for (label, path) in [
        ("Model", &job.artifact),
        ("Gzip", &job.artifact_compressed),
        ("Mesh", &job.artifact_mesh),
    ] {
        if let Some(path) = path {
            println!("{label:<9} {}", path.display());
        }
    }
    Ok(())
}

fn list_jobs(json: bool, config_path: Option<&Path>) -> Result<()> {
    let store = open_store(config_path)?;
    let jobs = store.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs.");
        return Ok(());
    }
    for job in &jobs {
        print_job_line(job);
    }
    Ok(())
}

fn print_job_line(job: &Job) {
    let detail = match (&job.status, &job.error_message, &job.artifact) {
        (JobStatus::Error, Some(message), _) => message.clone(),
        (JobStatus::Completed, _, Some(path)) => path.display().to_string(),
        _ => format!("{:.0}%", job.progress * 100.0),
    };
    println!(
        "{}  {:<17} {:<9} {}  {}",
        job.id.short(),
        job.status,
        job.preset,
        job.source_filename,
        detail
    );
}

fn show_presets() {
    println!(
        "{:<9} {:>5} {:>10} {:>8} {:>10} {:>9}",
        "preset", "fps", "iterations", "divisor", "init ratio", "est. min"
    );
    for preset in QualityPreset::ALL {
        let c = preset.config();
        println!(
            "{:<9} {:>5.1} {:>10} {:>8} {:>10.2} {:>9}",
            preset.id(),
            c.sampling_fps,
            c.iterations,
            c.resolution_divisor,
            c.init_frame_ratio,
            c.estimated_minutes
        );
    }
}

async fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    println!("Checking external tools...\n");

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    let provisioner = LocalProvisioner::new(tools, config.tools.trainer_repo.clone());
    match provisioner.ensure(TRAINER).await {
        Ok(path) => println!("✓ {TRAINER} - {}", path.display()),
        Err(e) => {
            all_ok = false;
            println!("✗ {TRAINER} ({e})");
        }
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them before processing videos.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using default search");
            config::load_config_or_default(None)?
        }
    };

    let warnings = config.validate();
    println!("✓ Configuration is valid");
    println!("  Storage root:     {}", config.storage.root.display());
    println!("  Default preset:   {}", config.processing.default_preset);
    println!("  Validate input:   {}", config.processing.validate_input);
    println!("  Export mesh:      {}", config.processing.export_mesh);
    println!(
        "  Compression:      {} (level {})",
        config.compression.enabled, config.compression.level
    );
    println!("  Concurrent jobs:  {}", config.processing.max_concurrent_jobs);
    println!("  Stage timeout:    {}s", config.processing.stage_timeout_secs);
    for warning in &warnings {
        println!("  warning: {warning}");
    }

    Ok(())
}
