use std::fmt;
use std::io;

use procbridge_frame::FrameError;
use procbridge_stream::StreamError;
use procbridge_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Timeout => CliError::new(TIMEOUT, format!("{context}: {err}")),
        TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Transport(err) => transport_error(context, err),
        FrameError::RecordTooLarge { .. }
        | FrameError::InvalidRecord(_)
        | FrameError::InvalidSignal(_)
        | FrameError::UnannounceableSize(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Closed => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Transport(err) => transport_error(context, err),
        StreamError::Frame(err) => frame_error(context, err),
        StreamError::Setup(source) => io_error(context, source),
        StreamError::ProcessUnresponsive { .. } => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        StreamError::Protocol(_) | StreamError::Json(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        StreamError::ProcessTerminated { .. } | StreamError::Config(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_timeout_code() {
        let err = stream_error("recv", StreamError::Transport(TransportError::Timeout));
        assert_eq!(err.code, TIMEOUT);
        assert_eq!(err.to_string(), "recv: timed out waiting for a datagram");

        let err = stream_error(
            "stream",
            StreamError::ProcessUnresponsive {
                task: "t".to_string(),
                diagnostics: String::new(),
            },
        );
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn data_errors_map_to_data_invalid() {
        let err = stream_error(
            "send",
            StreamError::Frame(FrameError::RecordTooLarge { size: 10, max: 4 }),
        );
        assert_eq!(err.code, DATA_INVALID);

        let err = stream_error("loop", StreamError::Protocol("bad".to_string()));
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_buffer_is_transport_error() {
        let err = transport_error(
            "open",
            TransportError::Buffer {
                path: "/nonexistent".into(),
                source: io::Error::new(io::ErrorKind::NotFound, "missing"),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn not_open_is_internal() {
        assert_eq!(stream_error("x", StreamError::NotOpen).code, INTERNAL);
    }
}
