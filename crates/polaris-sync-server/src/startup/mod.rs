//! Process startup: logging, signal handling and bridge assembly

mod bridge;
mod logging;
mod shutdown;

pub use bridge::Bridge;
pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::wait_for_shutdown_signal;
