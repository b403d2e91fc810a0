//! Line-oriented capture of child process output.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Which pipe a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of output, without its line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// Source pipe.
    pub stream: StreamKind,
    /// Line text. Invalid UTF-8 is replaced.
    pub text: String,
}

/// Receives output lines as they arrive.
///
/// Every line is delivered, including lines past the capture cap.
pub type OutputCallback<'a> = &'a (dyn Fn(&OutputLine) + Send + Sync);

/// Read `reader` line by line and forward each line to `tx`.
///
/// Stops at end of stream, on a read error or once the receiver is gone.
pub(crate) async fn pump<R>(reader: R, stream: StreamKind, tx: mpsc::UnboundedSender<OutputLine>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = OutputLine {
                    stream,
                    text: String::from_utf8_lossy(&buf).into_owned(),
                };
                if tx.send(line).is_err() {
                    break;
                }
            },
            Err(e) => {
                tracing::warn!(%stream, error = %e, "Output stream read failed");
                break;
            },
        }
    }
}

/// Largest char boundary in `text` not past `max`.
fn floor_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    (0..=max)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0)
}

#[derive(Debug, Default)]
struct StreamBuffer {
    text: String,
    full: bool,
}

impl StreamBuffer {
    /// Append a line. Returns `false` if anything was dropped.
    fn push(&mut self, line: &str, cap: usize) -> bool {
        if self.full {
            return false;
        }
        let remaining = cap.saturating_sub(self.text.len());
        let needed = line.len().saturating_add(1);
        if needed <= remaining {
            self.text.push_str(line);
            self.text.push('\n');
            return true;
        }
        let keep = floor_boundary(line, remaining);
        self.text.push_str(&line[..keep]);
        self.full = true;
        false
    }
}

/// Captured stdout and stderr with a byte cap per stream.
#[derive(Debug)]
pub(crate) struct OutputCapture {
    stdout: StreamBuffer,
    stderr: StreamBuffer,
    cap: usize,
    truncated: bool,
}

impl OutputCapture {
    pub(crate) fn new(cap: usize) -> Self {
        Self {
            stdout: StreamBuffer::default(),
            stderr: StreamBuffer::default(),
            cap,
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, line: &OutputLine) {
        let buffer = match line.stream {
            StreamKind::Stdout => &mut self.stdout,
            StreamKind::Stderr => &mut self.stderr,
        };
        if !buffer.push(&line.text, self.cap) {
            self.truncated = true;
        }
    }

    /// `(stdout, stderr, truncated)`.
    pub(crate) fn finish(self) -> (String, String, bool) {
        (self.stdout.text, self.stderr.text, self.truncated)
    }
}
