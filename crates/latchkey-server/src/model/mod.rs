pub mod app_state;
pub mod config;
pub mod response;

pub use app_state::{AppState, SessionItems};
pub use config::{Cli, Configuration};
pub use response::{RestResult, error_response};
