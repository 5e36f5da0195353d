/*!
 * File Channel
 * Appends one rendered line per event to a log file
 */

use super::{Channel, ChannelState};
use crate::core::errors::{MonitoringError, MonitoringResult};
use crate::monitoring::events::{render_timestamp, Event, Severity};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use uuid::Uuid;

struct FileState {
    state: ChannelState,
    writer: Option<BufWriter<File>>,
    session: Option<Uuid>,
}

/// Text log sink with session start/end markers
///
/// Every accepted event is flushed before `send_event` returns.
pub struct FileChannel {
    name: String,
    path: PathBuf,
    min_severity: Severity,
    inner: Mutex<FileState>,
}

impl FileChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_min_severity(path, Severity::Info)
    }

    pub fn with_min_severity(path: impl Into<PathBuf>, min_severity: Severity) -> Self {
        let path = path.into();
        Self {
            name: format!("FileChannel:{}", path.display()),
            path,
            min_severity,
            inner: Mutex::new(FileState {
                state: ChannelState::Uninitialized,
                writer: None,
                session: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session id written into the markers, once initialized
    pub fn session(&self) -> Option<Uuid> {
        self.inner.lock().session
    }

    fn open(&self) -> std::io::Result<BufWriter<File>> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        Ok(BufWriter::new(file))
    }

    fn write_line(writer: &mut BufWriter<File>, line: &str) -> std::io::Result<()> {
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl Channel for FileChannel {
    fn initialize(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ChannelState::Initialized => return Ok(()),
            ChannelState::Closed => return Err(MonitoringError::ChannelClosed(self.name())),
            ChannelState::Uninitialized => {}
        }

        let session = Uuid::new_v4();
        let mut writer = self.open().map_err(|e| MonitoringError::ChannelInit {
            name: self.name(),
            reason: e.to_string(),
        })?;
        let marker = format!(
            "=== Monitoring Session Started at {} (session {}) ===",
            render_timestamp(SystemTime::now()),
            session
        );
        Self::write_line(&mut writer, &marker).map_err(|e| MonitoringError::ChannelInit {
            name: self.name(),
            reason: e.to_string(),
        })?;

        inner.writer = Some(writer);
        inner.session = Some(session);
        inner.state = ChannelState::Initialized;
        debug!(path = %self.path.display(), %session, "File channel opened");
        Ok(())
    }

    fn shutdown(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state = ChannelState::Closed;

        let Some(mut writer) = inner.writer.take() else {
            return Ok(());
        };
        let session = inner.session.map(|s| s.to_string()).unwrap_or_default();
        let marker = format!(
            "=== Monitoring Session Ended at {} (session {}) ===",
            render_timestamp(SystemTime::now()),
            session
        );
        if let Err(e) = Self::write_line(&mut writer, &marker) {
            warn!(path = %self.path.display(), error = %e, "Failed to write session end marker");
            return Err(e.into());
        }
        Ok(())
    }

    fn send_event(&self, event: &Event) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state.ensure_open(&self.name)?;

        if event.severity() < self.min_severity {
            return Ok(());
        }

        match inner.writer.as_mut() {
            Some(writer) => Ok(Self::write_line(writer, &event.to_string())?),
            None => Err(MonitoringError::ChannelNotInitialized(self.name.clone())),
        }
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn min_severity(&self) -> Severity {
        self.min_severity
    }

    fn state(&self) -> ChannelState {
        self.inner.lock().state
    }
}
