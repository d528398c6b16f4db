// Latchkey server library: configuration, startup and HTTP handlers shared by
// the binary and the integration tests

pub mod api; // HTTP handlers
pub mod model; // Configuration, shared state and response types
pub mod startup; // Logging and metrics bootstrap

pub use model::{AppState, Configuration};
