use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "omnichat=info,tower_http=warn";

/// Logs to stderr and appends plain lines to `path`. `RUST_LOG` overrides
/// the default filter.
pub fn init(path: &Path) -> anyhow::Result<()> {
  let file = OpenOptions::new().create(true).append(true).open(path)?;
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
    .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
    .try_init()?;
  Ok(())
}
