use std::fmt;
use std::io;

use framelink_conn::ConnError;
use framelink_frame::FrameError;
use framelink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
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
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidText => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn conn_error(context: &str, err: ConnError) -> CliError {
    match err {
        ConnError::Transport(err) => transport_error(context, err),
        ConnError::Frame(err) => frame_error(context, err),
        ConnError::InvalidConfig(_) | ConnError::UnsupportedMessageType(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        ConnError::QueueFull | ConnError::ConnectionClosed | ConnError::ConnectionLimit { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use framelink_transport::MessageType;

    use super::*;

    #[test]
    fn io_kinds_map_to_exit_codes() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(io_error("bind", denied).code, PERMISSION_DENIED);

        let in_use = io::Error::new(io::ErrorKind::AddrInUse, "taken");
        assert_eq!(io_error("bind", in_use).code, TRANSPORT_ERROR);

        let other = io::Error::other("boom");
        assert_eq!(io_error("bind", other).code, INTERNAL);
    }

    #[test]
    fn bind_errors_unwrap_to_io_codes() {
        let err = TransportError::bind(
            "127.0.0.1:80".parse().unwrap(),
            io::Error::new(io::ErrorKind::PermissionDenied, "privileged port"),
        );
        let cli = transport_error("bind failed", err);
        assert_eq!(cli.code, PERMISSION_DENIED);
        assert!(cli.message.starts_with("bind failed: "));
    }

    #[test]
    fn conn_errors_map_by_kind() {
        assert_eq!(
            conn_error("serve", ConnError::InvalidConfig("x".into())).code,
            USAGE
        );
        assert_eq!(
            conn_error("send", ConnError::UnsupportedMessageType(MessageType::Text)).code,
            USAGE
        );
        assert_eq!(conn_error("send", ConnError::QueueFull).code, FAILURE);
        assert_eq!(
            conn_error("read", ConnError::Frame(FrameError::Truncated { len: 3 })).code,
            DATA_INVALID
        );
        assert_eq!(
            conn_error("send", ConnError::Transport(TransportError::Closed)).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            conn_error("props", ConnError::PropertyNotFound("k".into())).code,
            INTERNAL
        );
    }
}
