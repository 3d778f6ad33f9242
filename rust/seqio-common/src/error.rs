use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    /// Returns the OS error code carried by this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self.kind() {
            ErrorKind::Setup { source, .. }
            | ErrorKind::Submit { source, .. }
            | ErrorKind::Completion { source, .. }
            | ErrorKind::Io { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    pub fn setup(
        operation: &'static str,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Error {
        Error(
            ErrorKind::Setup {
                operation,
                path: path.into(),
                source,
            }
            .into(),
        )
    }

    pub fn allocation(size: usize, alignment: usize) -> Error {
        Error(ErrorKind::Allocation { size, alignment }.into())
    }

    pub fn submit(offset: u64, len: usize, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Submit {
                offset,
                len,
                source,
            }
            .into(),
        )
    }

    pub fn completion(offset: u64, len: usize, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Completion {
                offset,
                len,
                source,
            }
            .into(),
        )
    }

    pub fn short_write(offset: u64, expected: usize, actual: usize) -> Error {
        Error(
            ErrorKind::ShortWrite {
                offset,
                expected,
                actual,
            }
            .into(),
        )
    }

    pub fn completion_count(expected: usize, observed: usize) -> Error {
        Error(ErrorKind::CompletionCount { expected, observed }.into())
    }

    pub fn read_past_end(path: impl Into<String>, requested: u64, available: u64) -> Error {
        Error(
            ErrorKind::ReadPastEnd {
                path: path.into(),
                requested,
                available,
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("{operation} failed for '{path}': {source}")]
    Setup {
        operation: &'static str,
        path: String,
        source: std::io::Error,
    },

    #[error("failed to allocate {size} bytes aligned to {alignment}")]
    Allocation { size: usize, alignment: usize },

    #[error("write submission rejected (offset {offset}, len {len}): {source}")]
    Submit {
        offset: u64,
        len: usize,
        source: std::io::Error,
    },

    #[error("write failed (offset {offset}, len {len}): {source}")]
    Completion {
        offset: u64,
        len: usize,
        source: std::io::Error,
    },

    #[error("short write at offset {offset}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("expected {expected} completions, observed {observed}")]
    CompletionCount { expected: usize, observed: usize },

    #[error("reading beyond end of file '{path}': requested {requested}, available {available}")]
    ReadPastEnd {
        path: String,
        requested: u64,
        available: u64,
    },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("IO error for '{context}': {source}")]
    Io {
        context: String,
        source: std::io::Error,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        let kind = match e.kind() {
            ErrorKind::Setup { source, .. }
            | ErrorKind::Submit { source, .. }
            | ErrorKind::Completion { source, .. }
            | ErrorKind::Io { source, .. } => source.kind(),
            ErrorKind::Allocation { .. } => std::io::ErrorKind::OutOfMemory,
            ErrorKind::ShortWrite { .. } => std::io::ErrorKind::WriteZero,
            ErrorKind::ReadPastEnd { .. } => std::io::ErrorKind::UnexpectedEof,
            ErrorKind::InvalidArgument { .. } => std::io::ErrorKind::InvalidInput,
            ErrorKind::CompletionCount { .. } | ErrorKind::InvalidOperation { .. } => {
                std::io::ErrorKind::Other
            }
        };
        std::io::Error::new(kind, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_context() {
        let err = Error::setup(
            "open",
            "/data/index.bin",
            std::io::Error::from_raw_os_error(22),
        );
        let msg = err.to_string();
        assert!(msg.contains("open"));
        assert!(msg.contains("/data/index.bin"));
        assert_eq!(err.raw_os_error(), Some(22));
    }

    #[test]
    fn test_short_write_has_no_os_code() {
        let err = Error::short_write(4096, 1024, 512);
        assert!(matches!(
            err.kind(),
            ErrorKind::ShortWrite {
                offset: 4096,
                expected: 1024,
                actual: 512
            }
        ));
        assert_eq!(err.raw_os_error(), None);
    }

    #[test]
    fn test_into_io_error() {
        let err = Error::read_past_end("a.bin", 10, 3);
        let io: std::io::Error = err.into();
        assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
