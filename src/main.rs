//! snapverify - remote snapshot verification entry point

use anyhow::{Context, Result};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use snapverify::cli::{Cli, Commands};
use snapverify::remote::{DryRunRemote, RemoteShell, SshRemote};
use snapverify::workflow::{EARLY_EXIT_CODE, Verifier, process_exit_code};
use snapverify::{VerifyConfig, VerifyVariant, sanity, session_guard, weekday};

/// Initialize logging to stderr; `RUST_LOG` overrides the default level.
fn init_logger() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_logger();

    if let Err(e) = session_guard::init_signal_handlers() {
        warn!("Failed to initialize signal handlers: {}", e);
    }

    let cli = Cli::parse_args();
    debug!(?cli, "CLI arguments parsed");

    match dispatch(cli) {
        Ok(code) => ExitCode::from(process_exit_code(code)),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(process_exit_code(EARLY_EXIT_CODE))
        }
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Verify {
            config,
            variant,
            weekday,
        } => {
            let config = match config {
                Some(path) => {
                    info!("Loading configuration from: {:?}", path);
                    VerifyConfig::load_from_file(&path)?
                }
                None => VerifyConfig::preset(variant),
            };
            run_verify(&config, weekday, cli.dry_run)
        }
        Commands::Weekday { index, variant } => {
            let table = VerifyConfig::preset(variant).weekdays;
            let index = index.unwrap_or_else(weekday::today_index);
            match table.label(index) {
                Some(label) => {
                    println!("{label}");
                    Ok(0)
                }
                None => anyhow::bail!("weekday index {index} is out of range (0-6)"),
            }
        }
        Commands::GenConfig { variant, output } => {
            write_preset(variant, &output)?;
            println!("✓ Wrote {} configuration to {}", variant, output.display());
            Ok(0)
        }
        Commands::Validate { config } => {
            let loaded = VerifyConfig::load_from_file(&config)?;
            loaded
                .validate()
                .with_context(|| format!("Configuration {} is invalid", config.display()))?;
            info!("Configuration validation successful");
            println!("✓ Configuration file is valid: {}", config.display());
            Ok(0)
        }
    }
}

fn write_preset(variant: VerifyVariant, output: &std::path::Path) -> Result<()> {
    let config = VerifyConfig::preset(variant);
    config.save_to_file(output)
}

fn run_verify(config: &VerifyConfig, weekday: Option<usize>, dry_run: bool) -> Result<i32> {
    config.validate().context("Invalid verification configuration")?;

    let ssh;
    let dry;
    let remote: &dyn RemoteShell = if dry_run {
        dry = DryRunRemote::new(&config.remote);
        &dry
    } else {
        let check = sanity::verify_environment(&[config.remote.ssh_program.as_str()]);
        if !check.is_ok() {
            anyhow::bail!("required programs not found: {}", check.missing_binaries.join(", "));
        }
        ssh = SshRemote::new(config.remote.clone());
        &ssh
    };

    let mut verifier = Verifier::new(remote, config);
    if let Some(index) = weekday {
        verifier = verifier.with_weekday_index(index);
    }

    info!(
        destination = %config.remote.destination(),
        scratch = %config.scratch_dir,
        reference = %config.reference_dir,
        "starting verification"
    );
    let outcome = verifier.run()?;
    let code = outcome.exit_code();
    info!(
        status = ?outcome.status,
        stage = %outcome.final_stage(),
        warnings = outcome.warnings.len(),
        exit_code = code,
        "verification finished"
    );
    Ok(code)
}
