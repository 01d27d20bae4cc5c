use std::{path::PathBuf, process::ExitCode};

use avr_deploy::{
    core::constants::VERSION,
    deployment::{
        deployment::{Deployer, TargetOutcome},
        ssh::SshTransport,
        target::DeploymentTarget,
    },
    error::Result,
    logs::{init_logging, LogLevel, LogOptions},
    serialization::config::Config,
    states::deploy_state::{convert_stage_to_str, Stage},
    ui::report::{print_outcome, render_plan, ConsoleObserver},
};
use clap::Parser;
use crossterm::style::Stylize;
use tracing::{error, info};

/// Uploads a firmware build to a remote programmer host and flashes it.
#[derive(Debug, Parser)]
#[command(name = "avr-deploy", version = VERSION)]
struct Cli {
    /// Deploy configuration (JSON)
    config: PathBuf,

    /// Deploy to this target only (name, or host when unnamed)
    #[arg(short, long)]
    target: Option<String>,

    /// Override the project name from the configuration
    #[arg(short, long)]
    project: Option<String>,

    /// Print the artifacts and flash command without connecting
    #[arg(long)]
    dry_run: bool,

    /// Log verbosity when RUST_LOG is unset
    #[arg(long, value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogOptions {
        log_level: cli.log_level,
        json_format: cli.json_logs,
    }) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!(error = %e, "deployment aborted");
            println!("{}", format!("Error! {}", e).red());
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    println!(
        "{}",
        convert_stage_to_str(Stage::Config, &cli.config.display().to_string()).grey()
    );
    let config = Config::read_config(&cli.config)?;
    let artifacts = config.artifact_set(cli.project.as_deref())?;
    let flash = config.flash_command()?;
    let selected = config.select_targets(cli.target.as_deref())?;

    if cli.dry_run {
        let image = artifacts.image()?;
        for target in selected {
            let command = flash.render(&target.board, &target.serial_port, &image.remote_path);
            println!("{}", render_plan(target, &artifacts, &command));
        }
        return Ok(true);
    }

    let targets = selected
        .into_iter()
        .map(DeploymentTarget::resolve)
        .collect::<Result<Vec<_>>>()?;

    info!(
        project = %artifacts.project(),
        targets = targets.len(),
        artifacts = artifacts.len(),
        "starting deployment"
    );
    let deployer = Deployer::new(
        SshTransport::new(config.connect_timeout()),
        config.deploy_options(),
    )
    .with_observer(Box::new(ConsoleObserver));

    let outcomes = deployer.deploy_all(&targets, &artifacts, &flash).await;
    for outcome in &outcomes {
        print_outcome(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        error!(failed, total = outcomes.len(), "deployment finished with failures");
    }
    Ok(outcomes.iter().all(TargetOutcome::succeeded))
}
