use std::fmt;

/// Errors surfaced by the daemon. Only startup paths treat these as fatal;
/// everything observed after the event loop is running is logged and skipped.
#[derive(Debug)]
pub enum DaemonError {
    /// X server connection or RandR failures.
    Display(String),
    /// Settings store (gsettings/xfconf) failures.
    Settings(String),
    /// Panel/window-manager coordination failures.
    Peer(String),
    /// calloop source registration or dispatch failures.
    EventLoop(String),
    /// Invalid or unreadable configuration file.
    Config(String),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

impl fmt::Display for DaemonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonError::Display(msg) => write!(f, "display error: {msg}"),
            DaemonError::Settings(msg) => write!(f, "settings error: {msg}"),
            DaemonError::Peer(msg) => write!(f, "peer error: {msg}"),
            DaemonError::EventLoop(msg) => write!(f, "event loop error: {msg}"),
            DaemonError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for DaemonError {}
