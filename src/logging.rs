use clap::ValueEnum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::command::PROXY_COMMAND_TARGET;

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, ValueEnum, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter directives for this level. Proxy command stderr stays visible at `info`
    /// even when the rest of the output is quieter.
    fn directives(&self) -> String {
        if *self < LogLevel::Info {
            format!("{},{PROXY_COMMAND_TARGET}=info", self.directive())
        } else {
            self.directive().to_string()
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Installs the global subscriber. Output goes to stderr; `RUST_LOG` wins over `level`.
pub fn init(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.directives()));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .with(filter)
        .try_init();
}
