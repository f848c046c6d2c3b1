use log::SetLoggerError;
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode};
use worldupgrader_config::logging::LoggingConfig;

pub mod server;
pub mod upgrade;

const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    CARGO_PKG_VERSION
}

/// Installs the terminal logger described by `config`. Does nothing when
/// logging is disabled.
pub fn init_log(config: &LoggingConfig) -> Result<(), SetLoggerError> {
    if !config.enabled {
        return Ok(());
    }

    let mut builder = ConfigBuilder::new();
    if config.timestamp {
        builder.set_time_level(LevelFilter::Error);
        // Local offset lookup fails in some environments, fall back to UTC then
        let _ = builder.set_time_offset_to_local();
    } else {
        builder.set_time_level(LevelFilter::Off);
    }
    builder.set_thread_level(if config.threads {
        LevelFilter::Info
    } else {
        LevelFilter::Off
    });
    builder.set_target_level(LevelFilter::Off);
    builder.set_location_level(LevelFilter::Off);

    let color = if config.color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    TermLogger::init(
        config.level.into(),
        builder.build(),
        TerminalMode::Mixed,
        color,
    )
}
