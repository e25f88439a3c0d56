use crate::cli::SetupArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use fahsetup::{
    engine::{config::SetupConfig, layout::RunLayout, progress::ProgressReporter},
    workflows::{self, setup::SetupReport},
};
use std::path::Path;
use tracing::{info, warn};

pub async fn run(args: SetupArgs) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app = build_config(&args.config, &args.overrides)?;
    check_inputs_exist(&app.core_config)?;

    let config = app.core_config;
    let backend = app.backend.to_process_backend();
    let layout = RunLayout::new(
        &args.output,
        config.projects.clone(),
        &config.trajectory_directory,
    );
    info!(
        "Using collaborator {:?}; run directories under {:?}",
        backend.program(),
        layout.root()
    );

    let progress_handler = CliProgressHandler::new();

    println!(
        "Setting up '{}' for ligands {} -> {}...",
        config.trajectory_directory, config.ligands.old_index, config.ligands.new_index
    );
    info!("Invoking the core setup workflow...");

    let report = tokio::task::spawn_blocking(move || {
        let reporter = ProgressReporter::with_callback(progress_handler.get_callback());
        workflows::setup::run(&config, &layout, &backend, &reporter)
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Setup task failed: {}", e)))??;

    if !report.all_relaxed() {
        warn!("Structure relaxation failed in at least one phase; unrelaxed positions were written.");
    }
    for line in summary_lines(&report) {
        println!("{}", line);
    }

    Ok(())
}

/// Input structures must exist before any collaborator is started.
fn check_inputs_exist(config: &SetupConfig) -> Result<()> {
    let inputs = std::iter::once(config.ligands.file.as_path())
        .chain(config.system.protein_pdb.as_deref())
        .chain(config.system.receptor_mol2.as_deref())
        .chain(config.system.spectators.iter().map(|p| p.as_path()));

    for path in inputs {
        ensure_exists(path)?;
    }
    Ok(())
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    Err(CliError::Io(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("Provided path does not exist: {}", path.display()),
    )))
}

fn summary_lines(report: &SetupReport) -> Vec<String> {
    report
        .phases
        .iter()
        .map(|outcome| match &outcome.relaxation_error {
            None if outcome.relaxation_passed => format!(
                "✓ {:<8} written to: {}",
                outcome.phase,
                outcome.run_dir.display()
            ),
            error => format!(
                "⚠ {:<8} written to: {} (relaxation failed: {})",
                outcome.phase,
                outcome.run_dir.display(),
                error.as_deref().unwrap_or("unknown reason")
            ),
        })
        .collect()
}
