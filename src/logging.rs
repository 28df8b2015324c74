use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriter;

pub const DEFAULT_MAX_LOG_LINES: usize = 1000;
const REDACTED_PREFIX_CHARS: usize = 8;

/// Bounded in-memory copy of recent log lines, served by `GET /logs`.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<VecDeque<String>>>,
    max_lines: usize,
}

impl LogBuffer {
    pub fn new(max_lines: usize) -> Self {
        let max_lines = if max_lines == 0 {
            DEFAULT_MAX_LOG_LINES
        } else {
            max_lines
        };
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(max_lines))),
            max_lines,
        }
    }

    fn append_bytes(&self, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        for line in text.split('\n') {
            let cleaned = strip_control_chars(line.trim_end_matches('\r'));
            let cleaned = cleaned.trim();
            if cleaned.is_empty() {
                continue;
            }
            self.push_line(cleaned.to_string());
        }
    }

    fn push_line(&self, line: String) {
        if let Ok(mut guard) = self.inner.lock() {
            while guard.len() >= self.max_lines {
                let _ = guard.pop_front();
            }
            guard.push_back(line);
        }
    }

    pub fn recent_lines(&self, limit: usize) -> Vec<String> {
        if let Ok(guard) = self.inner.lock() {
            let start = guard.len().saturating_sub(limit);
            return guard.iter().skip(start).cloned().collect();
        }
        Vec::new()
    }
}

/// Installs the global subscriber and returns the buffer it mirrors into.
pub fn init_tracing(max_lines: usize) -> LogBuffer {
    let logs = LogBuffer::new(max_lines);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .compact()
        .with_writer(TeeMakeWriter::new(logs.clone()))
        .init();
    logs
}

/// Shortens a secret to its first few characters for logs and views.
pub fn redact_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(REDACTED_PREFIX_CHARS).collect();
    format!("{prefix}...")
}

#[derive(Clone)]
pub struct TeeMakeWriter {
    logs: LogBuffer,
}

impl TeeMakeWriter {
    pub fn new(logs: LogBuffer) -> Self {
        Self { logs }
    }
}

pub struct TeeWriter {
    logs: LogBuffer,
    stderr: io::Stderr,
}

impl<'a> MakeWriter<'a> for TeeMakeWriter {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TeeWriter {
            logs: self.logs.clone(),
            stderr: io::stderr(),
        }
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.stderr.write(buf)?;
        self.logs.append_bytes(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stderr.flush()
    }
}

fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || *c == '\t')
        .collect()
}
