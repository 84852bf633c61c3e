//! The binary entry point for the Umbra viewer.

use clap::Parser;
use umbra_app::platform::PlatformDirs;
use umbra_app::viewer;
use umbra_config::{CliArgs, Config};

fn main() {
    let args = CliArgs::parse();

    let dirs = match &args.config {
        Some(dir) => PlatformDirs::with_config_dir(dir.clone()),
        None => match PlatformDirs::resolve() {
            Ok(dirs) => dirs,
            Err(e) => {
                eprintln!("Failed to resolve platform directories: {e}");
                std::process::exit(1);
            }
        },
    };
    if let Err(e) = dirs.create_dirs() {
        eprintln!("Failed to create platform directories: {e}");
        std::process::exit(1);
    }

    // Logging is not up yet, so a broken file falls back to defaults loudly.
    let mut config = Config::load_or_create(&dirs.config_dir).unwrap_or_else(|e| {
        eprintln!("Using default config: {e}");
        Config::default()
    });
    config.apply_cli_overrides(&args);
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        std::process::exit(2);
    }

    if let Err(e) = umbra_log::init_logging(
        Some(dirs.log_dir.as_path()),
        cfg!(debug_assertions),
        Some(&config),
    ) {
        eprintln!("Logging unavailable: {e}");
    }
    tracing::info!(
        config = %dirs.config_dir.display(),
        logs = %dirs.log_dir.display(),
        "Umbra starting"
    );

    if let Err(e) = viewer::run(config, Some(dirs.config_dir)) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
