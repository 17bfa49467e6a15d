// Linux I2C access to the Spencer boards
//
// Every `Bus::write` is a single I2C write transaction and every `Bus::read` a
// single I2C read, matching what the boards expect from the host.

use embedded_hal::i2c::{Error as _, I2c};
use linux_embedded_hal::I2cdev;
use tracing::{debug, info};

use super::bus::{Bus, BusError, Result};

/// Any embedded-hal I2C master as a board bus
pub struct I2cBus<I> {
    i2c: I,
}

impl I2cBus<I2cdev> {
    /// Open a Linux i2c-dev character device such as `/dev/i2c-1`
    pub fn open(path: &str) -> Result<Self> {
        let i2c = I2cdev::new(path).map_err(|e| BusError::Open {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        info!("Opened I2C bus {}", path);
        Ok(Self::new(i2c))
    }
}

impl<I: I2c> I2cBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }
}

impl<I: I2c + Send> Bus for I2cBus<I> {
    fn write(&mut self, addr: u8, bytes: &[u8]) -> Result<()> {
        debug!("i2c write 0x{:02X}: {:02X?}", addr, bytes);
        self.i2c
            .write(addr, bytes)
            .map_err(|e| BusError::Transfer { addr, kind: e.kind() })
    }

    fn read(&mut self, addr: u8, buf: &mut [u8]) -> Result<()> {
        self.i2c
            .read(addr, buf)
            .map_err(|e| BusError::Transfer { addr, kind: e.kind() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, NoAcknowledgeSource, Operation};

    /// Records transactions, answers reads with a fixed byte
    #[derive(Default)]
    struct FakeI2c {
        transactions: Vec<(u8, Vec<Vec<u8>>)>,
        reply: u8,
        absent: Option<u8>,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> std::result::Result<(), ErrorKind> {
            if self.absent == Some(address) {
                return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            let mut writes = Vec::new();
            for op in operations.iter_mut() {
                match op {
                    Operation::Write(bytes) => writes.push(bytes.to_vec()),
                    Operation::Read(buf) => buf.fill(self.reply),
                }
            }
            self.transactions.push((address, writes));
            Ok(())
        }
    }

    #[test]
    fn test_speed_frame_is_one_transaction() {
        let mut bus = I2cBus::new(FakeI2c::default());
        bus.write(0x04, &[92, 100]).unwrap();
        bus.write(0x04, &[98]).unwrap();

        assert_eq!(
            bus.i2c.transactions,
            vec![(0x04, vec![vec![92, 100]]), (0x04, vec![vec![98]])]
        );
    }

    #[test]
    fn test_read_fills_buffer() {
        let mut bus = I2cBus::new(FakeI2c {
            reply: 0xFE,
            ..Default::default()
        });
        let mut byte = [0u8; 1];
        bus.read(0x05, &mut byte).unwrap();
        assert_eq!(byte, [0xFE]);
    }

    #[test]
    fn test_missing_board_is_a_transfer_error() {
        let mut bus = I2cBus::new(FakeI2c {
            absent: Some(0x06),
            ..Default::default()
        });
        match bus.write(0x06, &[1]) {
            Err(BusError::Transfer { addr, kind }) => {
                assert_eq!(addr, 0x06);
                assert_eq!(kind, ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
            }
            other => panic!("expected a transfer error, got {:?}", other),
        }
    }
}
