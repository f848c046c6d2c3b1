#![deny(clippy::all)]
// use log crate
#![deny(clippy::print_stdout)]

use std::{error::Error, process::ExitCode, time::Instant};

use worldupgrader::{
    init_log,
    server::Server,
    upgrade::{self, UpgradeRegistry},
    version,
};
use worldupgrader_config::ServerConfig;

fn main() -> ExitCode {
    let time = Instant::now();

    let exec_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("Failed to get the working directory: {err}");
            return ExitCode::FAILURE;
        }
    };
    let config = match ServerConfig::load(&exec_dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(err) = init_log(&config.advanced.logging) {
        eprintln!("Failed to initialize the logger: {err}");
    }

    log::info!("Starting WorldUpgrader {}", version());
    log::debug!(
        "Build info: FAMILY: \"{}\", OS: \"{}\", ARCH: \"{}\", BUILD: \"{}\"",
        std::env::consts::FAMILY,
        std::env::consts::OS,
        std::env::consts::ARCH,
        if cfg!(debug_assertions) {
            "Debug"
        } else {
            "Release"
        }
    );

    match run(config, &exec_dir) {
        Ok(()) => {
            log::info!("Finished, took {}ms", time.elapsed().as_millis());
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("{err}");
            let mut source = err.source();
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig, exec_dir: &std::path::Path) -> Result<(), Box<dyn Error>> {
    let mut server = Server::new(config, exec_dir);
    log::info!("Using world at {:?}", server.world_root());
    upgrade::install(&mut server, UpgradeRegistry::with_builtin());

    server.init()?;
    server.prepare_levels()?;
    server.shutdown()?;
    Ok(())
}
