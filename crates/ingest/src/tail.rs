//! Follow a watched file for newly appended lines.
//!
//! [`FileTailer`] keeps an open handle and a byte offset. Each call to
//! [`FileTailer::read_lines`] compares the path's current metadata with the
//! open handle and re-opens transparently when the file was rotated (renamed
//! and recreated), deleted and recreated, or truncated in place. Unread data in
//! a replaced file is drained before switching. A new file is read from its
//! start; only the file present when tailing began is skipped to its end.
//!
//! [`ChangeWatcher`] wakes the reader early on filesystem events so the
//! polling interval only bounds latency when no watcher could be installed.

use std::fs::Metadata;
use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::IngestError;

/// Device + inode of a file; `None` where the platform doesn't expose them.
type FileIdentity = Option<(u64, u64)>;

#[cfg(unix)]
fn identity(meta: &Metadata) -> FileIdentity {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn identity(_meta: &Metadata) -> FileIdentity {
    None
}

struct OpenFile {
    handle: File,
    identity: FileIdentity,
    offset: u64,
}

/// What happened to the watched path since the last read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Unchanged,
    Appeared,
    Removed,
    Replaced,
    Truncated,
}

pub struct FileTailer {
    path: PathBuf,
    file: Option<OpenFile>,
    /// Bytes after the last newline, waiting for the rest of their line.
    partial: Vec<u8>,
}

impl FileTailer {
    /// Start tailing `path` at its current end of file.
    ///
    /// A missing file is not an error; it is picked up from its first byte
    /// once it appears.
    pub async fn open_at_end(path: impl Into<PathBuf>) -> Result<Self, IngestError> {
        let mut tailer = Self {
            path: path.into(),
            file: None,
            partial: Vec::new(),
        };

        match tokio::fs::metadata(&tailer.path).await {
            Ok(_) => tailer.open(SeekFrom::End(0)).await?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %tailer.path.display(), "watched file does not exist yet");
            }
            Err(e) => return Err(tailer.io_err(e)),
        }

        Ok(tailer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current read offset into the open file, if any.
    pub fn offset(&self) -> Option<u64> {
        self.file.as_ref().map(|f| f.offset)
    }

    /// Return every complete, non-blank line appended since the last call.
    ///
    /// Lines are trimmed. A trailing fragment without a newline is held back
    /// until its line is completed, or flushed when the file is replaced.
    pub async fn read_lines(&mut self) -> Result<Vec<String>, IngestError> {
        let mut lines = Vec::new();

        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(self.io_err(e)),
        };

        let change = match (&self.file, &meta) {
            (None, None) => Change::Unchanged,
            (None, Some(_)) => Change::Appeared,
            (Some(_), None) => Change::Removed,
            (Some(open), Some(meta)) => {
                let current = identity(meta);
                if open.identity.is_some() && current.is_some() && open.identity != current {
                    Change::Replaced
                } else if meta.len() < open.offset {
                    Change::Truncated
                } else {
                    Change::Unchanged
                }
            }
        };

        match change {
            Change::Unchanged => {}
            Change::Appeared => {
                info!(path = %self.path.display(), "watched file appeared");
                self.open(SeekFrom::Start(0)).await?;
            }
            Change::Removed => {
                self.drain(&mut lines).await?;
                self.flush_partial(&mut lines);
                self.file = None;
                info!(path = %self.path.display(), "watched file removed, waiting for it to reappear");
            }
            Change::Replaced => {
                self.drain(&mut lines).await?;
                self.flush_partial(&mut lines);
                info!(path = %self.path.display(), "watched file rotated, reopening");
                self.open(SeekFrom::Start(0)).await?;
            }
            Change::Truncated => {
                info!(path = %self.path.display(), "watched file truncated, reading from start");
                self.partial.clear();
                if let Some(open) = self.file.as_mut() {
                    open.handle
                        .seek(SeekFrom::Start(0))
                        .await
                        .map_err(|e| IngestError::Io {
                            path: self.path.clone(),
                            source: e,
                        })?;
                    open.offset = 0;
                }
            }
        }

        self.drain(&mut lines).await?;
        Ok(lines)
    }

    async fn open(&mut self, from: SeekFrom) -> Result<(), IngestError> {
        let mut handle = File::open(&self.path).await.map_err(|e| self.io_err(e))?;
        let meta = handle.metadata().await.map_err(|e| self.io_err(e))?;
        let offset = handle.seek(from).await.map_err(|e| self.io_err(e))?;
        debug!(path = %self.path.display(), offset, "opened watched file");

        self.partial.clear();
        self.file = Some(OpenFile {
            handle,
            identity: identity(&meta),
            offset,
        });
        Ok(())
    }

    /// Read everything the open handle has to offer and split off full lines.
    async fn drain(&mut self, lines: &mut Vec<String>) -> Result<(), IngestError> {
        let Some(open) = self.file.as_mut() else {
            return Ok(());
        };

        let mut buf = Vec::new();
        let n = open
            .handle
            .read_to_end(&mut buf)
            .await
            .map_err(|e| IngestError::Io {
                path: self.path.clone(),
                source: e,
            })?;
        open.offset += n as u64;

        self.partial.extend_from_slice(&buf);
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            push_line(&raw, lines);
        }
        Ok(())
    }

    fn flush_partial(&mut self, lines: &mut Vec<String>) {
        let raw = std::mem::take(&mut self.partial);
        push_line(&raw, lines);
    }

    fn io_err(&self, source: std::io::Error) -> IngestError {
        IngestError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn push_line(raw: &[u8], lines: &mut Vec<String>) {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    if !line.is_empty() {
        lines.push(line.to_string());
    }
}

// ── Change notifications ─────────────────────────────────────────────

/// Filesystem watcher on the watched file's parent directory.
///
/// Watching the directory rather than the file keeps events flowing across
/// rotation and recreation.
pub struct ChangeWatcher {
    /// Held to keep the watcher alive.
    _watcher: RecommendedWatcher,
    rx: mpsc::Receiver<()>,
}

impl ChangeWatcher {
    pub fn new(path: &Path) -> Result<Self, IngestError> {
        let (tx, rx) = mpsc::channel(1);
        let target = path.file_name().map(|n| n.to_os_string());

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let relevant = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == target);
                    if relevant {
                        // A full channel already holds a pending wake-up.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            }
        })?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "watching directory for changes");

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next change to the watched file.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}
