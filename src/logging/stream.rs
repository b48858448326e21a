//! Writable stream that forwards into the application logger
//!
//! Anything that wants an `io::Write` sink (the access-log middleware in particular)
//! can write lines here and have them logged at info level through every transport.

use std::io::{self, Write};

use crate::config::{Environment, LogConfig};

use super::format::{log_format, LogFormat};

/// `io::Write` adapter emitting one info event per line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStream;

impl LogStream {
    pub fn new() -> Self {
        Self
    }

    /// Log a single message without going through `io::Write`
    pub fn write_line(&self, line: &str) {
        let line = line.trim_end_matches(['\r', '\n']);
        if !line.is_empty() {
            tracing::info!(target: "portal::access", "{}", line);
        }
    }
}

impl Write for LogStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        for line in text.lines() {
            self.write_line(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Settings handed to the request-logging middleware
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogOptions {
    pub format: LogFormat,
    pub stream: LogStream,
}

/// Build the request-logging options from config
pub fn request_log_options(config: &LogConfig, env: Environment) -> RequestLogOptions {
    RequestLogOptions {
        format: log_format(config, env),
        stream: LogStream::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Collects formatted events in memory
    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl CapturedOutput {
        fn lines(&self) -> Vec<String> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` with a subscriber writing plain-text events into the returned buffer
    fn capture(f: impl FnOnce()) -> Vec<String> {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        output.lines()
    }

    #[test]
    fn test_stream_accepts_whole_buffer() {
        let mut stream = LogStream::new();
        let written = stream.write(b"GET / 200\nGET /x 404\n").unwrap();
        assert_eq!(written, 21);
        stream.flush().unwrap();
    }

    #[test]
    fn test_each_line_is_one_info_event() {
        let lines = capture(|| {
            let mut stream = LogStream::new();
            let written = stream.write(b"GET / 200\n\nGET /x 404\r\n").unwrap();
            assert_eq!(written, 23);
        });

        assert_eq!(lines.len(), 2, "unexpected events: {:?}", lines);
        for line in &lines {
            assert!(line.contains("INFO"), "{}", line);
            assert!(line.contains("portal::access"), "{}", line);
        }
        assert!(lines[0].ends_with("GET / 200"));
        assert!(lines[1].ends_with("GET /x 404"));
    }

    #[test]
    fn test_write_line_skips_blank_lines() {
        let lines = capture(|| {
            let stream = LogStream::new();
            stream.write_line("");
            stream.write_line("\r\n");
            stream.write_line("HEAD / 200\n");
        });

        assert_eq!(lines.len(), 1, "unexpected events: {:?}", lines);
        assert!(lines[0].ends_with("HEAD / 200"));
    }

    #[test]
    fn test_request_log_options_uses_configured_format() {
        let config = LogConfig {
            format: Some(toml::Value::String("short".to_string())),
            file_logger: None,
        };
        let options = request_log_options(&config, Environment::Test);
        assert_eq!(options.format, LogFormat::Short);
    }
}
