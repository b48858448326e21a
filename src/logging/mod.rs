//! Logging system for Portal
//!
//! Provides the console transport, an optional size-rotating file transport,
//! access-log format selection and a request-logging middleware.

mod access;
mod file_writer;
mod format;
mod rotation;
mod stream;

pub use access::{log_requests, AccessRecord};
pub use file_writer::{
    file_log_options, init_logging, setup_file_logger, FileLogOptions, FileTransport,
    LogFileInfo, LoggingGuard, DEFAULT_MAX_FILES, DEFAULT_MAX_SIZE,
};
pub use format::{log_format, LogFormat, VALID_FORMATS};
pub use rotation::{rotated_path, RotatingFile};
pub use stream::{request_log_options, LogStream, RequestLogOptions};
