use std::io;

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tracing_error::SpanTrace;

#[derive(Debug, Error)]
#[error("error: {kind}\n{span}")]
pub struct Error {
    pub(crate) kind: Box<ErrorKind>,
    pub(crate) span: SpanTrace,
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from(ErrorKind::from(err))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind: kind.into(),
            span: SpanTrace::capture(),
        }
    }
}

impl From<mlua::Error> for Error {
    fn from(err: mlua::Error) -> Self {
        Self::from(ErrorKind::from(err))
    }
}

#[derive(Debug, Error)]
pub(crate) enum ErrorKind {
    #[error("unexpected I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("unexpected internal error: {0}")]
    Internal(String),

    #[error("invalid CLI arg: {0}")]
    Cli(String),

    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("script file {0} is not readable: {1}")]
    ScriptUnreadable(String, io::Error),
}

impl<T> From<SendError<T>> for ErrorKind {
    fn from(value: SendError<T>) -> Self {
        Self::Internal(format!("sending message: {value}"))
    }
}
