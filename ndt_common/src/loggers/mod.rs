/// Severity selection from `RUST_LOG` and the platform log-control file.
pub mod log_control;
/// Console and rolling JSON file subscriber setup.
pub mod setup;

pub use setup::{setup_logging, LogSettings, LoggingError};
