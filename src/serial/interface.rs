use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use serialport::SerialPortType;

use super::{CancelToken, Result, SerialError, SerialPortInfo};
use crate::config::Settings;

/// Raw bytes travelling between the port and the connection.
pub type RawLine = Vec<u8>;

/// List the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|port| match port.port_type {
            SerialPortType::UsbPort(usb_info) => SerialPortInfo {
                port_name: port.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                serial_number: usb_info.serial_number,
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
            },
            _ => SerialPortInfo {
                port_name: port.port_name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect())
}

/// Owns the port for the lifetime of a connection.
///
/// A receive loop pushes every line read from the port onto the inbound
/// queue, and a send loop drains the outbound queue into the port. Both check
/// the cancel token once per poll interval, so they wind down within one
/// interval of [`SerialTransport::close`] or a termination signal. Each loop
/// owns its half of the port; the port is closed once both have exited.
pub struct SerialTransport {
    cancel: CancelToken,
    workers: Vec<JoinHandle<()>>,
}

impl SerialTransport {
    /// Open `port_name` and start the I/O loops.
    pub fn open(
        port_name: &str,
        settings: &Settings,
        inbound: Sender<RawLine>,
        outbound: Receiver<RawLine>,
        cancel: CancelToken,
    ) -> Result<Self> {
        let port = serialport::new(port_name, settings.baud_rate)
            .timeout(settings.poll_interval())
            .open()
            .map_err(|e| SerialError::PortUnavailable(port_name.to_string(), e))?;
        let reader = port.try_clone()?;

        log::info!("Opened {} at {} baud", port_name, settings.baud_rate);
        let poll_interval = settings.poll_interval();
        let transport = Self::start(reader, port, inbound, outbound, cancel, poll_interval)?;
        transport.watch_termination();
        Ok(transport)
    }

    /// Start the I/O loops over an already opened reader/writer pair.
    ///
    /// `reader` should return [`ErrorKind::TimedOut`] when no data arrives
    /// within roughly one poll interval so the receive loop can observe the
    /// cancel token.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        inbound: Sender<RawLine>,
        outbound: Receiver<RawLine>,
        cancel: CancelToken,
        poll_interval: Duration,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let mut transport = Self {
            cancel: cancel.clone(),
            workers: Vec::with_capacity(2),
        };

        let rx_cancel = cancel.clone();
        let spawned = std::thread::Builder::new()
            .name("serial-receive".into())
            .spawn(move || receive_loop(reader, inbound, rx_cancel));
        match spawned {
            Ok(handle) => transport.workers.push(handle),
            Err(e) => {
                transport.close();
                return Err(SerialError::IoError(e));
            }
        }

        let spawned = std::thread::Builder::new()
            .name("serial-send".into())
            .spawn(move || send_loop(writer, outbound, cancel, poll_interval));
        match spawned {
            Ok(handle) => transport.workers.push(handle),
            Err(e) => {
                transport.close();
                return Err(SerialError::IoError(e));
            }
        }

        Ok(transport)
    }

    /// Stop the loops when the process receives SIGTERM. Ports opened with
    /// [`SerialTransport::open`] always do this.
    pub fn watch_termination(&self) {
        self.cancel.cancel_on_termination();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.workers.iter().any(|w| !w.is_finished())
    }

    /// Stop both loops and wait for them to release the port. Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == std::thread::current().id() {
                continue;
            }
            if worker.join().is_err() {
                log::error!("Serial worker panicked");
            }
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.close();
    }
}

fn receive_loop<R: Read>(reader: R, inbound: Sender<RawLine>, cancel: CancelToken) {
    let mut reader = BufReader::new(reader);
    let mut line = RawLine::new();

    while !cancel.is_cancelled() {
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => {
                log::debug!("Serial stream reached end of input");
                break;
            }
            Ok(_) => {
                log::debug!("RECEIVED: {:?}", String::from_utf8_lossy(&line));
                if inbound.send(std::mem::take(&mut line)).is_err() {
                    break;
                }
            }
            // Partial bytes stay in `line` until the rest of the line arrives.
            Err(e) if is_transient(e.kind()) => {}
            Err(e) => {
                log::error!("Serial read failed: {}", e);
                cancel.cancel();
                break;
            }
        }
    }
}

fn is_transient(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted)
}

fn send_loop<W: Write>(
    mut writer: W,
    outbound: Receiver<RawLine>,
    cancel: CancelToken,
    poll_interval: Duration,
) {
    while !cancel.is_cancelled() {
        match outbound.recv_timeout(poll_interval) {
            Ok(bytes) => {
                log::debug!("SENDING: {:?}", String::from_utf8_lossy(&bytes));
                if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
                    log::error!("Serial write failed: {}", e);
                    cancel.cancel();
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::mpsc;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_receive_loop_splits_lines() {
        let (tx, rx) = mpsc::channel();
        let input = Cursor::new(b"OK\r\nStatus : 80 Hex\r\ntail".to_vec());
        receive_loop(input, tx, CancelToken::new());
        let lines: Vec<RawLine> = rx.try_iter().collect();
        assert_eq!(
            lines,
            vec![b"OK\r\n".to_vec(), b"Status : 80 Hex\r\n".to_vec(), b"tail".to_vec()]
        );
    }

    #[test]
    fn test_send_loop_preserves_order() {
        let (tx, rx) = mpsc::channel();
        let sink = SharedSink::default();
        tx.send(b"first\r\n".to_vec()).unwrap();
        tx.send(b"second\r\n".to_vec()).unwrap();
        drop(tx);
        send_loop(sink.clone(), rx, CancelToken::new(), Duration::from_millis(10));
        assert_eq!(sink.0.lock().unwrap().as_slice(), b"first\r\nsecond\r\n");
    }

    #[test]
    fn test_close_is_idempotent() {
        let (in_tx, _in_rx) = mpsc::channel();
        let (_out_tx, out_rx) = mpsc::channel();
        let mut transport = SerialTransport::start(
            Cursor::new(Vec::new()),
            SharedSink::default(),
            in_tx,
            out_rx,
            CancelToken::new(),
            Duration::from_millis(10),
        )
        .unwrap();
        transport.close();
        transport.close();
        assert!(!transport.is_running());
    }
}
