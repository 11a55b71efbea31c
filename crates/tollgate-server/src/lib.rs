pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod server;

pub use config::AppConfig;
pub use logging::{apply_logging_level, init_tracing};
pub use server::{ServerBuilder, TollgateServer, build_app};
