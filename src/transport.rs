//! Links to the device. A transport sends one command and checks the
//! reply against the exact text expected for it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TransportError;

pub trait Transport {
    /// Send `command` and wait until `expected` has been received in full
    fn send(&mut self, command: &str, expected: &str) -> Result<(), TransportError>;
}

/// Serial console of the device, talked to through its character device.
/// A reader thread forwards incoming bytes so replies can be awaited with a timeout.
pub struct SerialTransport<W: Write> {
    writer: W,
    incoming: mpsc::Receiver<io::Result<Vec<u8>>>,
    pending: Vec<u8>,
    timeout: Duration,
}

impl SerialTransport<File> {
    /// Open a device node such as `/dev/ttyACM0`
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, TransportError> {
        let port = OpenOptions::new().read(true).write(true).open(path)?;
        let reader = port.try_clone()?;
        log::info!("opened {}", path.display());
        Ok(Self::new(port, reader, timeout))
    }
}

impl<W: Write> SerialTransport<W> {
    pub fn new<R>(writer: W, mut reader: R, timeout: Duration) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = [0u8; 256];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Self {
            writer,
            incoming: rx,
            pending: Vec::new(),
            timeout,
        }
    }
}

impl<W: Write> Transport for SerialTransport<W> {
    fn send(&mut self, command: &str, expected: &str) -> Result<(), TransportError> {
        self.writer.write_all(command.as_bytes())?;
        self.writer.flush()?;

        let deadline = Instant::now() + self.timeout;
        while self.pending.len() < expected.len() {
            let wait = deadline.saturating_duration_since(Instant::now());
            match self.incoming.recv_timeout(wait) {
                Ok(Ok(chunk)) => self.pending.extend_from_slice(&chunk),
                Ok(Err(e)) => return Err(TransportError::Io(e)),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(TransportError::Timeout {
                        expected: expected.to_string(),
                        received: String::from_utf8_lossy(&self.pending).into_owned(),
                    });
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::Disconnected);
                }
            }
        }

        let reply: Vec<u8> = self.pending.drain(..expected.len()).collect();
        if reply != expected.as_bytes() {
            return Err(TransportError::Mismatch {
                expected: expected.to_string(),
                received: String::from_utf8_lossy(&reply).into_owned(),
            });
        }
        Ok(())
    }
}

/// Prints each command instead of sending it and assumes success
pub struct DryRunTransport<W: Write> {
    out: W,
}

impl<W: Write> DryRunTransport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> Transport for DryRunTransport<W> {
    fn send(&mut self, command: &str, _expected: &str) -> Result<(), TransportError> {
        self.out.write_all(command.as_bytes())?;
        Ok(())
    }
}
