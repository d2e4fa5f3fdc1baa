use std::io::{Read, Write};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{DeviceError, Result};
use crate::config::Settings;
use crate::serial::interface::RawLine;
use crate::serial::{CancelToken, FrameDecoder, ParseResult, ProtocolParser, SerialTransport};

/// Callback receiving every sanitized inbound line, in arrival order.
///
/// Listeners run on the connection's decode thread. A slow listener delays
/// the ones after it; a panicking listener is logged and skipped.
pub type Listener = Box<dyn FnMut(&str) + Send + 'static>;

/// Collects listeners and settings before the port is opened.
pub struct ConnectionBuilder {
    port_name: String,
    settings: Settings,
    listeners: Vec<Listener>,
    watch_termination: bool,
}

impl ConnectionBuilder {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            settings: Settings::default(),
            listeners: Vec::new(),
            watch_termination: false,
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn register_listener(mut self, listener: impl FnMut(&str) + Send + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Close the connection on SIGTERM even when it runs over
    /// [`ConnectionBuilder::open_with`]. Serial ports always do.
    pub fn watch_termination(mut self) -> Self {
        self.watch_termination = true;
        self
    }

    /// Register a listener that receives each line already run through this
    /// connection's own [`ProtocolParser`].
    pub fn on_parsed(self, mut handler: impl FnMut(&str, ParseResult) + Send + 'static) -> Self {
        let mut parser = ProtocolParser::new();
        self.register_listener(move |line| {
            let result = parser.parse_line(line);
            handler(line, result);
        })
    }

    /// Open the serial port and start the receive, send and decode loops.
    ///
    /// Fails with [`crate::serial::SerialError::PortUnavailable`] when the
    /// device is absent or busy. Nothing is left running on failure.
    pub fn open(self) -> Result<Connection> {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let cancel = CancelToken::new();

        let opened = SerialTransport::open(
            &self.port_name,
            &self.settings,
            inbound_tx,
            outbound_rx,
            cancel.clone(),
        );
        let transport = match opened {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("Could not open {}: {}", self.port_name, e);
                cancel.cancel();
                return Err(e.into());
            }
        };

        self.finish(transport, inbound_rx, outbound_tx, cancel)
    }

    /// Run the connection over an arbitrary byte stream instead of a serial port.
    pub fn open_with<R, W>(self, reader: R, writer: W) -> Result<Connection>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        let (outbound_tx, outbound_rx) = mpsc::channel();
        let cancel = CancelToken::new();

        let transport = SerialTransport::start(
            reader,
            writer,
            inbound_tx,
            outbound_rx,
            cancel.clone(),
            self.settings.poll_interval(),
        )?;
        if self.watch_termination {
            transport.watch_termination();
        }

        self.finish(transport, inbound_rx, outbound_tx, cancel)
    }

    fn finish(
        self,
        mut transport: SerialTransport,
        inbound: Receiver<RawLine>,
        outbound: Sender<RawLine>,
        cancel: CancelToken,
    ) -> Result<Connection> {
        let poll_interval = self.settings.poll_interval();
        let listeners = self.listeners;
        let decode_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("serial-decode".into())
            .spawn(move || decode_loop(inbound, listeners, decode_cancel, poll_interval));

        let decoder = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                transport.close();
                return Err(DeviceError::SpawnError(e));
            }
        };

        Ok(Connection {
            port_name: self.port_name,
            outbound,
            transport: Some(transport),
            decoder: Some(decoder),
            cancel,
        })
    }
}

/// An open link to one device.
///
/// There is no correlation between a command passed to [`Connection::send`]
/// and any later line: the device does not tag replies, so an `OK`/`ERROR`
/// can only be attributed by timing or content.
pub struct Connection {
    port_name: String,
    outbound: Sender<RawLine>,
    transport: Option<SerialTransport>,
    decoder: Option<JoinHandle<()>>,
    cancel: CancelToken,
}

impl Connection {
    /// Open `port_name` with default settings and no listeners.
    pub fn open(port_name: &str) -> Result<Self> {
        ConnectionBuilder::new(port_name).open()
    }

    pub fn builder(port_name: impl Into<String>) -> ConnectionBuilder {
        ConnectionBuilder::new(port_name)
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Token shared by all loops of this connection.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Queue `text` followed by CR LF for the send loop. Never blocks; a
    /// closed connection silently discards the line.
    pub fn send(&self, text: &str) {
        if self.cancel.is_cancelled() {
            log::debug!("Discarding {:?}, connection to {} is closed", text, self.port_name);
            return;
        }
        if self.outbound.send(FrameDecoder::encode_line(text)).is_err() {
            log::debug!("Discarding {:?}, send loop has stopped", text);
        }
    }

    /// Stop every loop and release the port. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if let Some(mut transport) = self.transport.take() {
            transport.close();
            log::info!("Closed connection to {}", self.port_name);
        }
        if let Some(decoder) = self.decoder.take() {
            if decoder.thread().id() != std::thread::current().id() && decoder.join().is_err() {
                log::error!("Decode loop panicked");
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn decode_loop(
    inbound: Receiver<RawLine>,
    mut listeners: Vec<Listener>,
    cancel: CancelToken,
    poll_interval: Duration,
) {
    while !cancel.is_cancelled() {
        match inbound.recv_timeout(poll_interval) {
            Ok(raw) => {
                let line = FrameDecoder::decode(&raw);
                if line.is_empty() {
                    continue;
                }
                dispatch(&mut listeners, &line);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn dispatch(listeners: &mut [Listener], line: &str) {
    for (index, listener) in listeners.iter_mut().enumerate() {
        if catch_unwind(AssertUnwindSafe(|| listener(line))).is_err() {
            log::warn!("Listener {} panicked on line {:?}", index, line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_dispatch_survives_panicking_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut listeners: Vec<Listener> = vec![
            Box::new(|_: &str| panic!("bad listener")),
            Box::new(move |line: &str| sink.lock().unwrap().push(line.to_string())),
        ];
        dispatch(&mut listeners, "OK");
        dispatch(&mut listeners, "ERROR");
        assert_eq!(*seen.lock().unwrap(), vec!["OK".to_string(), "ERROR".to_string()]);
    }

    #[test]
    fn test_decode_loop_skips_blank_lines() {
        let (tx, rx) = mpsc::channel();
        tx.send(b"\r\n".to_vec()).unwrap();
        tx.send(b"\x00OK\r\n".to_vec()).unwrap();
        drop(tx);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let listeners: Vec<Listener> =
            vec![Box::new(move |line: &str| sink.lock().unwrap().push(line.to_string()))];
        decode_loop(rx, listeners, CancelToken::new(), Duration::from_millis(10));
        assert_eq!(*seen.lock().unwrap(), vec!["OK".to_string()]);
    }
}
