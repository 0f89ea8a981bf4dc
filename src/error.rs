//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid path: {0}")]
    Path(String),

    /// A write tried to descend through a value that is not an object.
    #[error("path conflict: '{path}' holds a non-object value")]
    PathConflict { path: String },

    /// A stored value did not have the shape a typed read expected.
    #[error("value error at '{path}': {message}")]
    Value { path: String, message: String },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("auth error: {0}")]
    Auth(String),

    #[error("lesson error: {0}")]
    Lesson(String),

    #[error("page error: {0}")]
    Page(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn config_error_display() {
        let e = AppError::Config("missing field".into());
        assert!(e.to_string().contains("missing field"));
    }

    #[test]
    fn path_conflict_names_the_path() {
        let e = AppError::PathConflict { path: "progress.alice".into() };
        assert!(e.to_string().contains("progress.alice"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let e: AppError = io_err.into();
        assert!(e.to_string().contains("io error"));
        let _: &dyn Error = &e;
    }
}
