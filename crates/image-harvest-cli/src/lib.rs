//! Image Harvest CLI — run the extraction pipeline over saved pages.

pub mod config;
pub mod error;
pub mod extract;
pub mod input;
pub mod transport;

pub use config::{load_settings, resolve_config_path};
pub use error::{CliError, CliResult};
pub use extract::{run_extract, ExtractOptions};
pub use transport::StdoutSink;
