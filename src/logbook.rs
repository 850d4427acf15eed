//! Append-only text logs shared by the receiver and the control panel.
//!
//! Every write opens the file in append mode, so two processes (or two
//! concurrent requests) can write the same log without coordination.

use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use time::macros::format_description;
use time::OffsetDateTime;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub const NO_LOG: &str = "(no log file)";

const TAIL_CHUNK: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    /// Inbound webhook bodies, verbatim.
    Raw,
    /// One summary line per webhook.
    Receiver,
    /// Forward outcomes.
    Sender,
    /// Stdout/stderr of the supervised receiver.
    Startup,
}

impl LogKind {
    pub fn file_name(self) -> &'static str {
        match self {
            LogKind::Raw => "impinj.log",
            LogKind::Receiver => "receiver.log",
            LogKind::Sender => "sender.log",
            LogKind::Startup => "startup.log",
        }
    }
}

impl FromStr for LogKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "impinj" | "raw" => Ok(LogKind::Raw),
            "receiver" => Ok(LogKind::Receiver),
            "sender" => Ok(LogKind::Sender),
            "startup" => Ok(LogKind::Startup),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogBook {
    dir: PathBuf,
}

impl LogBook {
    /// Creates the log directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self, kind: LogKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// Appends `content` plus a newline. Failures are logged, never returned:
    /// the audit trail must not break the request that produced it.
    pub async fn append(&self, kind: LogKind, content: &str) {
        if let Err(e) = self.try_append(kind, content).await {
            tracing::warn!(log = kind.file_name(), error = %e, "log_append_failed");
        }
    }

    async fn try_append(&self, kind: LogKind, content: &str) -> io::Result<()> {
        let mut line = String::with_capacity(content.len() + 1);
        line.push_str(content);
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(kind))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Last `lines` lines of the log, or [`NO_LOG`] when the file is absent.
    /// Only the end of the file is read.
    pub async fn tail(&self, kind: LogKind, lines: usize) -> String {
        match read_tail(&self.path(kind), lines).await {
            Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), lines),
            Err(e) if e.kind() == io::ErrorKind::NotFound => NO_LOG.to_string(),
            Err(e) => {
                tracing::warn!(log = kind.file_name(), error = %e, "log_read_failed");
                NO_LOG.to_string()
            }
        }
    }
}

/// Reads backwards in chunks until the buffer holds more than `lines`
/// newlines or the start of the file. Anything before the first of those
/// newlines is dropped by [`tail_lines`], so a chunk boundary splitting a
/// character never reaches the caller.
async fn read_tail(path: &Path, lines: usize) -> io::Result<Vec<u8>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut pos = file.metadata().await?.len();
    let mut buf = Vec::new();
    let mut newlines = 0;

    while pos > 0 && newlines <= lines {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos)).await?;
        let mut chunk = vec![0; step as usize];
        file.read_exact(&mut chunk).await?;
        newlines += chunk.iter().filter(|&&b| b == b'\n').count();
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }
    Ok(buf)
}

fn tail_lines(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.split_inclusive('\n').collect();
    let start = all.len().saturating_sub(lines);
    all[start..].concat()
}

/// Wall-clock stamp used in every log line: local time when the offset is
/// known, UTC otherwise.
pub fn stamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second]"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
