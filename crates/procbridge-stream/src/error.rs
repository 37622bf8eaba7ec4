use procbridge_frame::FrameError;
use procbridge_transport::TransportError;

/// Errors that can occur while driving the external process.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// No expected datagram arrived within the active timeout.
    #[error(
        "external process for task {task} stopped responding{}",
        render_diagnostics(.diagnostics)
    )]
    ProcessUnresponsive { task: String, diagnostics: String },

    /// The external process reported an error.
    #[error(
        "external process for task {task} terminated prematurely due to an error{}",
        render_diagnostics(.diagnostics)
    )]
    ProcessTerminated { task: String, diagnostics: String },

    /// A signal arrived that is not valid in the current phase or mode.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Task configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The streamer was used before `open()` or after `close()`.
    #[error("streamer is not open")]
    NotOpen,

    /// Launching or attaching the external process failed.
    #[error("process setup failed: {0}")]
    Setup(#[source] std::io::Error),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON configuration error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StreamError {
    /// True for the two fatal external-process failure kinds.
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            StreamError::ProcessUnresponsive { .. } | StreamError::ProcessTerminated { .. }
        )
    }
}

fn render_diagnostics(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim_end();
    if trimmed.is_empty() {
        ".".to_string()
    } else {
        format!(". Diagnostics:\n{trimmed}")
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
