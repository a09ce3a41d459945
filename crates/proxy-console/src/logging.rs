use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{ConsoleError, Result};

/// Environment variable holding an `EnvFilter` directive, e.g.
/// `proxy_console=debug`.
pub const LOG_ENV: &str = "PROXY_CONSOLE_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

impl LogTarget {
    pub fn default_file() -> Self {
        LogTarget::File(std::env::temp_dir().join("proxy-console.log"))
    }
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "proxy_console=debug,info"
    } else {
        "info"
    }
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Installs the global subscriber. Fails if one is already set.
pub fn init(target: &LogTarget, verbose: bool) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(filter(verbose));
    let installed = match target {
        LogTarget::Stderr => builder.with_writer(std::io::stderr).try_init(),
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    installed.map_err(|e| ConsoleError::InvalidConfig {
        details: format!("cannot install log subscriber: {e}"),
    })
}
