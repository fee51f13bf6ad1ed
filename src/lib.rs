pub mod actions;
pub mod config;
pub mod debounce;
pub mod display;
pub mod errors;
pub mod peer;
pub mod settings;
pub mod state;

pub use errors::{DaemonError, Result};
pub use state::Controller;
