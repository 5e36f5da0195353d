/*!
 * Socket Channel
 * Forwards events to a remote collector as JSON lines over TCP
 */

use super::{Channel, ChannelState};
use crate::core::errors::{MonitoringError, MonitoringResult};
use crate::core::limits::SOCKET_CONNECT_TIMEOUT;
use crate::monitoring::events::{Event, Severity};
use parking_lot::Mutex;
use std::io::{BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

struct Connection {
    state: ChannelState,
    stream: Option<BufWriter<TcpStream>>,
}

/// Remote sink; a failed write drops the connection and later sends fail
pub struct SocketChannel {
    name: String,
    host: String,
    port: u16,
    min_severity: Severity,
    connect_timeout: Duration,
    inner: Mutex<Connection>,
}

impl SocketChannel {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_min_severity(host, port, Severity::Info)
    }

    pub fn with_min_severity(host: impl Into<String>, port: u16, min_severity: Severity) -> Self {
        let host = host.into();
        Self {
            name: format!("SocketChannel:{}:{}", host, port),
            host,
            port,
            min_severity,
            connect_timeout: SOCKET_CONNECT_TIMEOUT,
            inner: Mutex::new(Connection {
                state: ChannelState::Uninitialized,
                stream: None,
            }),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().stream.is_some()
    }

    fn connect(&self) -> MonitoringResult<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let connection_error = |reason: String| MonitoringError::Connection {
            addr: addr.clone(),
            reason,
        };

        let candidates = addr
            .to_socket_addrs()
            .map_err(|e| connection_error(e.to_string()))?;

        let mut last_error = String::from("no addresses resolved");
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, self.connect_timeout) {
                Ok(stream) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(connection_error(last_error))
    }
}

impl Channel for SocketChannel {
    fn initialize(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ChannelState::Initialized => return Ok(()),
            ChannelState::Closed => return Err(MonitoringError::ChannelClosed(self.name.clone())),
            ChannelState::Uninitialized => {}
        }

        let stream = self.connect()?;
        inner.stream = Some(BufWriter::new(stream));
        inner.state = ChannelState::Initialized;
        debug!(channel = %self.name, "Socket channel connected");
        Ok(())
    }

    fn shutdown(&self) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state = ChannelState::Closed;
        if let Some(mut stream) = inner.stream.take() {
            let _ = stream.flush();
        }
        Ok(())
    }

    fn send_event(&self, event: &Event) -> MonitoringResult<()> {
        let mut inner = self.inner.lock();
        inner.state.ensure_open(&self.name)?;

        if event.severity() < self.min_severity {
            return Ok(());
        }

        let Some(stream) = inner.stream.as_mut() else {
            return Err(MonitoringError::Connection {
                addr: format!("{}:{}", self.host, self.port),
                reason: "not connected".into(),
            });
        };

        let written = serde_json::to_writer(&mut *stream, event)
            .map_err(std::io::Error::from)
            .and_then(|_| stream.write_all(b"\n"))
            .and_then(|_| stream.flush());

        if let Err(e) = written {
            warn!(channel = %self.name, error = %e, "Socket write failed, dropping connection");
            inner.stream = None;
            return Err(MonitoringError::Connection {
                addr: format!("{}:{}", self.host, self.port),
                reason: e.to_string(),
            });
        }
        Ok(())
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
