use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::mpsc;

use gpumon::cli::{Cli, Command, RunArgs};
use gpumon::config::{loader, presets, validator, Settings, SettingsManager};
use gpumon::history::{unit_for, HistoryRange, HistoryWindow, HttpTelemetryStore};
use gpumon::log_collector::resolve_logs_path;
use gpumon::models::{FinalResults, JobKind, JobResult};
use gpumon::session::{MetricChannel, SessionController, SessionPhase};
use gpumon::shutdown::{HttpHostClient, ShutdownCoordinator};
use gpumon::{AppError, BenchmarkEngine, HttpEngineClient, LogCollector, LogLine};

#[tokio::main]
async fn main() -> gpumon::Result<()> {
    let cli = Cli::parse();

    // =========================================================================
    // SETTINGS - FILE FIRST, THEN COMMAND-LINE OVERRIDES
    // =========================================================================
    let (settings, settings_notice) = match load_settings(&cli) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    };

    // =========================================================================
    // LOG COLLECTOR - FILE PLUS CONSOLE MIRROR FOR WARNINGS
    // =========================================================================
    let log_dir = resolve_logs_path(&settings.log_dir)?;
    let max_level = if settings.debug_logging {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    let (log_ui_tx, mut log_ui_rx) = mpsc::channel::<LogLine>(1024);
    let log_collector = LogCollector::new(log_dir, max_level, Some(log_ui_tx))?;
    let flusher = log_collector.clone();
    match log_collector.install() {
        Ok(path) => log::info!("[Main] Logging to {}", path.display()),
        Err(e) => eprintln!("[Main] WARNING: {}", e),
    }

    tokio::spawn(async move {
        while let Some(line) = log_ui_rx.recv().await {
            if line.level <= log::Level::Warn {
                eprintln!("{}", line.format());
            }
        }
    });

    log::info!("[Main] gpumon {} ({})", gpumon::VERSION, settings.summary());
    if let Some(notice) = settings_notice {
        log::warn!("[Config] {}", notice);
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================
    let result = dispatch(cli.command, cli.settings.as_deref(), &settings).await;
    if let Err(e) = &result {
        log::info!("[Main] Command failed: {}", e);
    }

    if let Err(e) = flusher.wait_for_empty().await {
        eprintln!("[Main] WARNING: Failed to flush logs: {}", e);
    }

    if let Err(e) = result {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

/// Settings plus the fallback notice, which is logged once the collector is up.
fn load_settings(cli: &Cli) -> Result<(Settings, Option<String>), AppError> {
    let path = match &cli.settings {
        Some(path) => path.clone(),
        None => loader::get_global_settings_path()?,
    };
    let (mut settings, notice) = SettingsManager::load_from_reporting(&path)?;
    cli.apply_to(&mut settings);
    validator::validate_settings(&settings)?;
    Ok((settings, notice))
}

async fn dispatch(
    command: Command,
    settings_path: Option<&Path>,
    settings: &Settings,
) -> Result<(), AppError> {
    match command {
        Command::Config { save } => show_config(save, settings_path, settings),
        Command::Run(args) => run_session(args, settings).await,
        Command::Stop => {
            engine_client(settings)?.stop_job().await?;
            println!("Stop requested");
            Ok(())
        }
        Command::Status => {
            let status = engine_client(settings)?.status().await?;
            println!(
                "running: {}  progress: {:.1}%  iterations: {}",
                status.running, status.progress, status.iterations
            );
            if let Some(workload) = status.workload_type {
                println!("workload: {}", workload);
            }
            if let Some(phase) = status.phase {
                println!("phase: {}", phase);
            }
            Ok(())
        }
        Command::Baseline { job } => show_baseline(job, settings).await,
        Command::Shutdown { .. } => shutdown_server(settings).await,
        Command::History { metric, hours, zoom } => show_history(&metric, hours, zoom, settings).await,
    }
}

fn engine_client(settings: &Settings) -> Result<HttpEngineClient, AppError> {
    Ok(HttpEngineClient::new(&settings.engine_url, settings.request_timeout())?)
}

async fn run_session(args: RunArgs, settings: &Settings) -> Result<(), AppError> {
    let job = match args.job {
        Some(job) => job,
        None => settings
            .default_job
            .parse::<JobKind>()
            .map_err(AppError::InvalidInput)?,
    };
    let preset = args.preset.clone().unwrap_or_else(|| settings.default_preset.clone());
    let config = presets::build_config(&preset, job, &args.overrides())?;

    let engine: Arc<dyn BenchmarkEngine> = Arc::new(engine_client(settings)?);
    let controller = SessionController::new(engine, settings.session_options());
    controller.start(config.clone()).await?;
    println!(
        "Started {} run ({}, {}s) against {}",
        config.job_kind, preset, config.duration_sec, settings.engine_url
    );
    if args.detach {
        return Ok(());
    }

    follow(&controller, settings.session_options().poll_interval).await;

    let state = controller.status();
    match state.phase {
        SessionPhase::Completed => {
            if let Some(results) = controller.results() {
                print_results(&results);
            }
            Ok(())
        }
        _ => Err(AppError::Engine(
            state
                .last_error
                .unwrap_or_else(|| format!("session ended in phase {}", state.phase.as_str())),
        )),
    }
}

/// Print progress until the session settles; Ctrl-C asks the engine to stop.
async fn follow(controller: &SessionController, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    let mut last_line = String::new();
    let mut stop_sent = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                stop_sent = true;
                println!("Stopping...");
                if let Err(e) = controller.stop().await {
                    log::warn!("[Main] Stop request failed: {}", e);
                }
            }
        }

        let state = controller.status();
        if state.is_settled() {
            break;
        }

        let temp = controller
            .samples(MetricChannel::Temperature)
            .last()
            .map(|p| format!("  {:.0}C", p.value))
            .unwrap_or_default();
        let line = match state.progress() {
            Some(pct) => format!(
                "[{}] {:5.1}%  iteration {}{}",
                state.phase.as_str(),
                pct,
                state.iteration_count,
                temp
            ),
            None => format!("[{}] iteration {}", state.phase.as_str(), state.iteration_count),
        };
        if line != last_line {
            println!("{}", line);
            last_line = line;
        }
    }
}

fn print_results(results: &FinalResults) {
    println!("== {} results ==", results.job_kind);
    match results.summary {
        Some(JobResult::Gemm(gemm)) => {
            println!("avg TFLOPS:  {:.2}", gemm.avg_tflops);
            println!("peak TFLOPS: {:.2}", gemm.peak_tflops);
        }
        Some(JobResult::Particle(particle)) => {
            println!("steps/s:     {:.1}", particle.steps_per_sec);
            println!("particles/s: {:.0}", particle.particles_per_sec);
        }
        None => println!("(no GPU throughput reported)"),
    }
    if let Some(iterations) = results.iterations_completed {
        println!("iterations:  {}", iterations);
    }
    if let Some(secs) = results.duration_actual_sec {
        println!("duration:    {:.1}s", secs);
    }
    if let Some(reason) = &results.stop_reason {
        println!("stop reason: {}", reason);
    }
}

fn show_config(save: bool, settings_path: Option<&Path>, settings: &Settings) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(settings).map_err(|e| AppError::Settings(e.to_string()))?;
    println!("{}", json);
    if save {
        let path = match settings_path {
            Some(path) => {
                SettingsManager::save_to(settings, path)?;
                path.to_path_buf()
            }
            None => SettingsManager::save(settings)?,
        };
        println!("Saved to {}", path.display());
    }
    Ok(())
}

async fn show_baseline(job: JobKind, settings: &Settings) -> Result<(), AppError> {
    match engine_client(settings)?.baseline(job).await? {
        Some(baseline) => {
            println!("{} baseline on {} ({})", job, baseline.gpu_name, baseline.timestamp);
            println!("iterations:        {}", baseline.iterations_completed);
            println!("avg iteration:     {:.2} ms", baseline.avg_iteration_time_ms);
            println!("avg temperature:   {:.1} C", baseline.avg_temperature);
            if let Some(power) = baseline.avg_power {
                println!("avg power:         {:.1} W", power);
            }
        }
        None => println!("No {} baseline saved yet", job),
    }
    Ok(())
}

async fn shutdown_server(settings: &Settings) -> Result<(), AppError> {
    let host = HttpHostClient::new(&settings.host_url, settings.request_timeout())?;
    let coordinator = ShutdownCoordinator::new(Arc::new(host), settings.shutdown_options());

    println!("Shutting down {} ...", settings.host_url);
    let done = coordinator.initiate().await?;
    println!("{}", done.as_str());
    Ok(())
}

async fn show_history(
    metric: &str,
    hours: HistoryRange,
    zoom: Option<f64>,
    settings: &Settings,
) -> Result<(), AppError> {
    let store = HttpTelemetryStore::new(&settings.store_url, settings.request_timeout())?;
    let mut window = HistoryWindow::new();
    window.load(&store, metric, hours).await?;
    if let Some(factor) = zoom {
        window.zoom(factor);
    }

    let series = window.series();
    if series.is_empty() {
        println!("No {} data for {}", metric, hours);
        return Ok(());
    }

    let unit = unit_for(metric);
    println!("{} ({}): {} points over {} day(s)", metric, hours, series.len(), window.day_bands().len());
    for (day, (start, end)) in window.day_bands().into_iter().enumerate() {
        let first = series.timestamps()[start];
        let date = chrono::DateTime::from_timestamp_millis(first)
            .map(|dt| dt.with_timezone(&chrono::Local).format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  day {:>2} {}  samples {:>5}..{:<5}", day, date, start, end);
    }
    if let (Some((start, end)), Some(stats)) = (window.visible_range(), window.visible_stats()) {
        println!(
            "visible {}..{}: min {:.1}{u}  max {:.1}{u}  mean {:.1}{u}",
            start,
            end,
            stats.min,
            stats.max,
            stats.mean,
            u = unit
        );
    }
    Ok(())
}
