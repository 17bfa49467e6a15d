// Addressed bus shared by the motor board, the encoder board and the sensor boards
//
// Every transaction targets one 7-bit board address. The bus is shared between the
// controller and the sensor pollers behind a single mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

/// Error types for bus communication
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Cannot open I2C bus {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("I2C transfer with board 0x{addr:02X} failed: {kind:?}")]
    Transfer {
        addr: u8,
        kind: embedded_hal::i2c::ErrorKind,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from board 0x{addr:02X}: {reason}")]
    InvalidResponse { addr: u8, reason: String },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// One addressed transaction per call
pub trait Bus: Send {
    /// Write `bytes` to the board at `addr`
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()>;

    /// Fill `buf` with bytes read from the board at `addr`
    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()>;
}

pub type SharedBus = Arc<Mutex<Box<dyn Bus>>>;

/// Wrap a bus so it can be shared between the controller and the pollers
pub fn shared<B: Bus + 'static>(bus: B) -> SharedBus {
    Arc::new(Mutex::new(Box::new(bus)))
}

/// In-memory bus for tests and dry runs.
///
/// Records every write and serves queued read responses per address. Reads with
/// nothing queued return zeros. Clones share the same state. A dry-run bus
/// keeps no write log, since the pollers write to it for the whole run.
#[derive(Clone, Default)]
pub struct MockBus {
    inner: Arc<Mutex<MockBusInner>>,
}

#[derive(Default)]
struct MockBusInner {
    writes: Vec<(u8, Vec<u8>)>,
    reads: HashMap<u8, VecDeque<Vec<u8>>>,
    fail_writes: bool,
    unlogged: bool,
}

impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock that accepts writes without recording them
    pub fn dry_run() -> Self {
        let mock = Self::default();
        mock.inner.lock().unlogged = true;
        mock
    }

    /// Queue a response for the next read from `addr`
    pub fn inject_read(&self, addr: u8, data: &[u8]) {
        self.inner
            .lock()
            .reads
            .entry(addr)
            .or_default()
            .push_back(data.to_vec());
    }

    /// Every write so far, in order
    pub fn writes(&self) -> Vec<(u8, Vec<u8>)> {
        self.inner.lock().writes.clone()
    }

    /// Writes addressed to one board
    pub fn writes_to(&self, addr: u8) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .writes
            .iter()
            .filter(|(a, _)| *a == addr)
            .map(|(_, bytes)| bytes.clone())
            .collect()
    }

    pub fn clear_writes(&self) {
        self.inner.lock().writes.clear();
    }

    /// Make every following write fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }
}

impl Bus for MockBus {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(BusError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock bus write failure",
            )));
        }
        if !inner.unlogged {
            inner.writes.push((addr, bytes.to_vec()));
        }
        Ok(())
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.reads.get_mut(&addr).and_then(|queue| queue.pop_front()) {
            Some(data) if data.len() < buf.len() => Err(BusError::InvalidResponse {
                addr,
                reason: format!("Expected {} bytes, got {}", buf.len(), data.len()),
            }),
            Some(data) => {
                buf.copy_from_slice(&data[..buf.len()]);
                Ok(())
            }
            None => {
                buf.fill(0);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_records_writes_per_address() {
        let mock = MockBus::new();
        let bus = shared(mock.clone());
        bus.lock().write(4, &[92, 100]).unwrap();
        bus.lock().write(5, &[6]).unwrap();

        assert_eq!(mock.writes().len(), 2);
        assert_eq!(mock.writes_to(4), vec![vec![92, 100]]);
    }

    #[test]
    fn test_mock_serves_queued_reads() {
        let mut mock = MockBus::new();
        mock.inject_read(5, &[1, 2]);

        let mut buf = [0u8; 2];
        mock.read(5, &mut buf).unwrap();
        assert_eq!(buf, [1, 2]);

        // Nothing queued: zeros
        buf = [9, 9];
        mock.read(5, &mut buf).unwrap();
        assert_eq!(buf, [0, 0]);

        mock.inject_read(5, &[1]);
        assert!(mock.read(5, &mut buf).is_err());
    }

    #[test]
    fn test_mock_write_failure() {
        let mut mock = MockBus::new();
        mock.set_fail_writes(true);
        assert!(matches!(mock.write(4, &[1]), Err(BusError::Io(_))));
        assert!(mock.writes().is_empty());
    }

    #[test]
    fn test_dry_run_keeps_no_log() {
        let mut mock = MockBus::dry_run();
        for _ in 0..1000 {
            mock.write(5, &[6]).unwrap();
        }
        assert!(mock.writes().is_empty());

        mock.inject_read(5, &[3]);
        let mut buf = [0u8; 1];
        mock.read(5, &mut buf).unwrap();
        assert_eq!(buf, [3]);
    }
}
