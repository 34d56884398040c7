use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info};
use printqc::cli::{Command, CompareArgs, ElementsArgs, parse_cli};
use printqc::output::{ComparisonRecord, OutputError, OutputManager, to_json};
use printqc::settings::{ConfigError, EffectiveSettings, resolve_settings};
use printqc::{CompareRequest, InspectError, Inspector, backend, read_image};
use printqc_ocr::OcrError;
use printqc_types::{DetectedElement, InputError};
use serde::Serialize;
use thiserror::Error;
use tokio::task;

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Inspect(#[from] InspectError),
    #[error(transparent)]
    Output(#[from] OutputError),
    #[error("worker task failed: {0}")]
    Task(#[from] task::JoinError),
}

#[derive(Serialize)]
struct ElementsRecord {
    total_elements: usize,
    elements: Vec<DetectedElement>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Config(err)) => {
            error!("{err}");
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), RunError> {
    let (cli, sources) = parse_cli();
    let settings = resolve_settings(&cli, &sources)?;
    if let Some(path) = settings.config_path.as_ref() {
        debug!("loaded configuration from {}", path.display());
    }
    let inspector = backend::build_inspector(&settings)?;

    match cli.command {
        Command::Compare(args) => compare(inspector, args, &settings).await,
        Command::Elements(args) => elements(inspector, args, &settings).await,
        Command::Capabilities => {
            let capabilities = inspector.capabilities();
            match settings.output_dir.as_ref() {
                Some(dir) => {
                    let path = OutputManager::new(dir, settings.pretty)
                        .write_json("capabilities.json", &capabilities)
                        .await?;
                    info!("capabilities written to {}", path.display());
                }
                None => print_json(&capabilities, settings.pretty)?,
            }
            Ok(())
        }
    }
}

async fn compare(
    inspector: Inspector,
    args: CompareArgs,
    settings: &EffectiveSettings,
) -> Result<(), RunError> {
    let (master, sample) = tokio::try_join!(
        read_image("master", &args.master),
        read_image("sample", &args.sample)
    )?;
    let request = CompareRequest {
        page: args.page,
        zones: args.zones,
        extraction: settings.extraction,
        languages: settings.languages.clone(),
        spelling: args.spelling.then_some(settings.spelling),
    };

    let progress = spinner(format!("comparing {}", args.sample.display()));
    let result = task::spawn_blocking(move || inspector.compare(&master, &sample, &request)).await;
    let report = match result {
        Ok(Ok(report)) => report,
        Ok(Err(err)) => {
            progress.abandon_with_message("comparison failed");
            return Err(err.into());
        }
        Err(err) => {
            progress.abandon_with_message("comparison failed");
            return Err(err.into());
        }
    };
    progress.finish_with_message(format!(
        "{} differences, similarity {:.4}",
        report.differences.len(),
        report.similarity
    ));

    match settings.output_dir.as_ref() {
        Some(dir) => {
            let mut manager = OutputManager::new(dir, settings.pretty);
            if args.no_images {
                manager = manager.without_images();
            }
            let files = manager.write_comparison(&report).await?;
            info!("report written to {}", files.report.display());
            if let (Some(heatmap), Some(annotated)) = (files.heatmap, files.annotated) {
                info!("images written to {} and {}", heatmap.display(), annotated.display());
            }
        }
        None => print_json(&ComparisonRecord::from(&report), settings.pretty)?,
    }
    Ok(())
}

async fn elements(
    inspector: Inspector,
    args: ElementsArgs,
    settings: &EffectiveSettings,
) -> Result<(), RunError> {
    let detector = settings.detector;
    let master = read_image("master", &args.master).await?;
    let sample = match args.sample.as_ref() {
        Some(path) => Some(read_image("sample", path).await?),
        None => None,
    };

    let progress = spinner(format!("detecting elements in {}", args.master.display()));
    let manager = settings
        .output_dir
        .as_ref()
        .map(|dir| OutputManager::new(dir, settings.pretty));

    match sample {
        Some(sample) => {
            let inventory = task::spawn_blocking(move || {
                inspector.element_inventory(&master, &sample, detector)
            })
            .await;
            let inventory = match inventory {
                Ok(inventory) => inventory,
                Err(err) => {
                    progress.abandon_with_message("element detection failed");
                    return Err(err.into());
                }
            };
            progress.finish_with_message(format!("{} type changes", inventory.changes.len()));
            match manager {
                Some(manager) => {
                    let path = manager.write_json("elements.json", &inventory).await?;
                    info!("inventory written to {}", path.display());
                }
                None => print_json(&inventory, settings.pretty)?,
            }
        }
        None => {
            let elements =
                task::spawn_blocking(move || inspector.elements(&master, detector)).await;
            let elements = match elements {
                Ok(elements) => elements,
                Err(err) => {
                    progress.abandon_with_message("element detection failed");
                    return Err(err.into());
                }
            };
            progress.finish_with_message(format!("{} elements", elements.len()));
            let record = ElementsRecord {
                total_elements: elements.len(),
                elements,
            };
            match manager {
                Some(manager) => {
                    let path = manager.write_json("elements.json", &record).await?;
                    info!("elements written to {}", path.display());
                }
                None => print_json(&record, settings.pretty)?,
            }
        }
    }
    Ok(())
}

fn spinner(message: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan.bold} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_json<T: Serialize + ?Sized>(data: &T, pretty: bool) -> Result<(), OutputError> {
    let mut encoded = to_json(data, pretty)?;
    encoded.push(b'\n');
    std::io::stdout().lock().write_all(&encoded)?;
    Ok(())
}
