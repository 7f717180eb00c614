//! `crucible run` — drive a source file through the whole pipeline.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crucible::config::ApiConfig;
use crucible::events::{NoticeLevel, VerificationEvent};
use crucible::poller::PollingEngine;
use crucible::report::report_title;
use crucible::runtime::Runtime;
use crucible::source::encode_source_lenient;
use crucible::step::VerificationSteps;
use crucible::{Project, Stage, VerificationStep};

use super::super::Cli;

/// How long to wait for a single stage before giving up.
const STAGE_TIMEOUT: Duration = Duration::from_secs(600);

pub async fn run_pipeline(
    cli: &Cli,
    file: &Path,
    flags: Option<&str>,
    verify: bool,
) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read source file: {}", file.display()))?;
    let name = cli
        .name
        .clone()
        .or_else(|| {
            file.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "program".to_string());

    let runtime = Arc::new(Runtime::new(ApiConfig::from_env())?);
    let steps = Arc::new(VerificationSteps::new(Arc::clone(&runtime)));
    let engine = PollingEngine::new(Arc::clone(&steps));

    spawn_event_printer(&runtime);

    let encoded = encode_source_lenient(&source)?;
    runtime.set_project_name(&name);
    runtime.set_encoded_source(&encoded);

    if !steps.upload_source().upload(&name, &encoded).await? {
        bail!("The service did not accept the source upload");
    }

    let Some(project) = steps.source_restoration().start(&name, &encoded).await? else {
        bail!("The service did not accept the source restoration request");
    };
    engine.start(Stage::SourceRestoration);
    let project = wait_for_stage(&runtime, Stage::SourceRestoration, "Restoring source").await?;
    println!(
        "{} project {} at revision {}",
        style("Restored").green().bold(),
        project.id,
        project.revision
    );

    if !steps.llvm_bitcode_generation().start(&project).await? {
        bail!("The service did not accept the bitcode generation request");
    }
    engine.start(Stage::LlvmBitcodeGeneration);
    let project =
        wait_for_stage(&runtime, Stage::LlvmBitcodeGeneration, "Generating LLVM bitcode").await?;
    print_report(&steps, &project, VerificationStep::LlvmBitcodeGeneration);

    if let Some(flags) = flags {
        steps.symbolic_execution().set_additional_flags(flags);
    }
    println!(
        "{} {}",
        style("Command:").bold(),
        steps.symbolic_execution().command_preview(&project.id)
    );

    let project = steps.symbolic_execution().reset(&project);
    if !steps.symbolic_execution().start(&project).await? {
        bail!("The service did not accept the symbolic execution request");
    }
    engine.start(Stage::SymbolicExecution);
    let project =
        wait_for_stage(&runtime, Stage::SymbolicExecution, "Running symbolic execution").await?;
    print_report(&steps, &project, VerificationStep::SymbolicExecution);

    if verify {
        if !steps.program_verification().start(&project).await? {
            bail!("The service did not accept the program verification request");
        }
        engine.start(Stage::ProgramVerification);
        let project =
            wait_for_stage(&runtime, Stage::ProgramVerification, "Verifying program").await?;
        print_report(&steps, &project, VerificationStep::ProgramVerification);
    }

    engine.stop_all();
    if let Some(last) = runtime.last_error() {
        println!(
            "{} last recorded error: {}",
            style("note:").yellow(),
            last.message
        );
    }
    Ok(())
}

/// Renders bus events as they arrive so failures and notices surface while
/// a stage is still polling.
fn spawn_event_printer(runtime: &Arc<Runtime>) {
    let mut events = runtime.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                VerificationEvent::Notice { level, title, text } => {
                    let title = match level {
                        NoticeLevel::Success => style(title).green().bold(),
                        NoticeLevel::Warning => style(title).yellow().bold(),
                        NoticeLevel::Error => style(title).red().bold(),
                    };
                    eprintln!("{title}: {text}");
                }
                VerificationEvent::FailedVerificationStep { error } => {
                    eprintln!("{}: {error}", style("Step failed").red().bold());
                }
                other => {
                    tracing::debug!(event = ?other, "bus event");
                }
            }
        }
    });
}

/// Polls the store until the stage's done flag commits, showing the latest
/// remote progress message on a spinner.
async fn wait_for_stage(runtime: &Runtime, stage: Stage, label: &str) -> Result<Project> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} {msg}")
            .expect("progress bar template is a valid static string"),
    );
    spinner.set_message(label.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));

    let deadline = tokio::time::Instant::now() + STAGE_TIMEOUT;
    loop {
        if tokio::time::Instant::now() > deadline {
            spinner.finish_and_clear();
            bail!("Timed out waiting for {label}");
        }

        match runtime.active_project() {
            Ok(Some(project)) => {
                if project.stage(stage).done {
                    spinner.finish_and_clear();
                    return Ok(project);
                }
                if let Some(message) = project
                    .stage(stage)
                    .progress
                    .get("message")
                    .and_then(|message| message.as_str())
                {
                    spinner.set_message(format!("{label}: {message}"));
                }
            }
            Ok(None) => {
                spinner.finish_and_clear();
                bail!("No project is selected while waiting for {label}");
            }
            Err(err) if err.is_project_not_found() => {
                spinner.finish_and_clear();
                bail!("The project vanished while waiting for {label}");
            }
            Err(err) => {
                spinner.finish_and_clear();
                return Err(err.into());
            }
        }

        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn print_report(steps: &VerificationSteps, project: &Project, step: VerificationStep) {
    let report = steps.step_report(project, step);
    if report.is_empty() {
        return;
    }
    let title = report_title(step);
    let heading = if title.is_empty() {
        format!("{step} report")
    } else {
        title.to_string()
    };
    println!("{}", style(format!("── {heading} ──")).dim());
    println!("{}", report.trim_end());
}
