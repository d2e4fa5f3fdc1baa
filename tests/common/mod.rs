use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Device side of an in-memory serial link: push bytes with `feed`, read
/// what the host wrote with `written`.
pub struct FakeDevice {
    feed: Option<Sender<Vec<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl FakeDevice {
    pub fn feed(&self, bytes: &[u8]) {
        if let Some(feed) = &self.feed {
            feed.send(bytes.to_vec()).unwrap();
        }
    }

    /// Simulate the device going away; the host reader sees end of input.
    pub fn hang_up(&mut self) {
        self.feed = None;
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().unwrap().clone()
    }
}

/// Host side reader. Behaves like a serial port with a short read timeout.
pub struct PortReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for PortReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => return Err(io::ErrorKind::TimedOut.into()),
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

#[derive(Clone)]
pub struct PortWriter(Arc<Mutex<Vec<u8>>>);

impl Write for PortWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn fake_link() -> (FakeDevice, PortReader, PortWriter) {
    let (tx, rx) = mpsc::channel();
    let written = Arc::new(Mutex::new(Vec::new()));
    (
        FakeDevice {
            feed: Some(tx),
            written: written.clone(),
        },
        PortReader { rx, pending: Vec::new() },
        PortWriter(written),
    )
}

/// Poll `check` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    check()
}
