use crate::config::Config;
use log::{LevelFilter, SetLoggerError};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Dependencies that log every frame or command below `TRACE`.
const NOISY_MODULES: &[&str] = &[
    "tokio_tungstenite",
    "tungstenite",
    "redis",
    "tower",
    "hyper",
    "axum",
];

pub struct Logger {}

impl Logger {
    /// Install the process-wide terminal logger.
    ///
    /// Below `TRACE`, frame-level chatter from the socket and broker clients is
    /// dropped so that session and routing logs stay readable. Production
    /// output is uncolored for log collectors.
    pub fn init_logger(config: &Config) -> Result<(), SetLoggerError> {
        let level = config.log_level_filter;
        let color = if config.is_production() {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };

        TermLogger::init(
            level,
            Self::build_log_config(Self::ignored_modules(level)),
            TerminalMode::Mixed,
            color,
        )
    }

    fn ignored_modules(level: LevelFilter) -> &'static [&'static str] {
        if level == LevelFilter::Trace {
            &[]
        } else {
            NOISY_MODULES
        }
    }

    fn build_log_config(ignored: &'static [&'static str]) -> simplelog::Config {
        let mut builder = ConfigBuilder::new();
        builder.set_time_format_rfc3339();
        for module in ignored {
            builder.add_filter_ignore_str(module);
        }
        builder.build()
    }
}
