//! TE Connectivity MS5837-30BA Pressure Sensor Driver
//!
//! Reference: MS5837-30BA datasheet, rev. B1
//!
//! Protocol Overview:
//! - Transport: I²C, fixed 7-bit address 0x76
//! - Single-byte commands, results read back with a write-read of command 0x00
//! - PROM: seven 16-bit words at 0xA0..=0xAC, word 0 carries a CRC-4
//! - Conversions at OSR 8192 take up to 18.08 ms; the caller owns the wait

use async_trait::async_trait;
use embedded_hal::i2c::{Error as _, I2c};
use parking_lot::Mutex;
use pool_core::calibration::{CalibrationSet, PROM_WORDS};
use pool_core::capabilities::SensorPort;
use pool_core::error::TransportError;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Fixed I²C address of the MS5837.
pub const DEFAULT_ADDRESS: u8 = 0x76;

// =============================================================================
// Command set
// =============================================================================

/// Single-byte commands understood by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Reset,
    /// Read PROM word `0..=6`.
    PromRead(u8),
    /// Convert D1 (pressure) at OSR 8192.
    ConvertD1,
    /// Convert D2 (temperature) at OSR 8192.
    ConvertD2,
    AdcRead,
}

impl Command {
    pub fn byte(self) -> u8 {
        match self {
            Command::Reset => 0x1E,
            Command::PromRead(index) => 0xA0 + 2 * index,
            Command::ConvertD1 => 0x4A,
            Command::ConvertD2 => 0x5A,
            Command::AdcRead => 0x00,
        }
    }
}

// =============================================================================
// Ms5837
// =============================================================================

/// MS5837 on any blocking `embedded-hal` 1.0 I²C bus.
///
/// Bus transfers run on tokio's blocking pool, so a caller's
/// `tokio::time::timeout` still fires while a stuck transfer holds the bus.
/// The bus is shared with those tasks through `Arc<Mutex<_>>`.
pub struct Ms5837<I> {
    bus: Arc<Mutex<I>>,
    address: u8,
}

impl<I> Ms5837<I>
where
    I: I2c + Send + 'static,
{
    pub fn new(bus: I) -> Self {
        Self::with_address(bus, DEFAULT_ADDRESS)
    }

    pub fn with_address(bus: I, address: u8) -> Self {
        Self {
            bus: Arc::new(Mutex::new(bus)),
            address,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give back the underlying bus.
    ///
    /// Returns `None` while an abandoned transfer still holds it.
    pub fn release(self) -> Option<I> {
        Arc::try_unwrap(self.bus).ok().map(Mutex::into_inner)
    }

    /// Run one blocking exchange with the bus off the async executor.
    async fn transfer<T, F>(&self, work: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&mut I, u8) -> Result<T, TransportError> + Send + 'static,
    {
        let bus = Arc::clone(&self.bus);
        let address = self.address;
        tokio::task::spawn_blocking(move || work(&mut bus.lock(), address))
            .await
            .map_err(|e| TransportError::bus(format!("I2C task join error: {}", e)))?
    }
}

fn send<I: I2c>(bus: &mut I, address: u8, command: Command) -> Result<(), TransportError> {
    bus.write(address, &[command.byte()])
        .map_err(|e| bus_error(command, e))
}

fn query<I: I2c, const N: usize>(
    bus: &mut I,
    address: u8,
    command: Command,
) -> Result<[u8; N], TransportError> {
    let mut buf = [0u8; N];
    bus.write_read(address, &[command.byte()], &mut buf)
        .map_err(|e| bus_error(command, e))?;
    Ok(buf)
}

fn read_prom<I: I2c>(bus: &mut I, address: u8) -> Result<[u16; PROM_WORDS], TransportError> {
    let mut words = [0u16; PROM_WORDS];
    for (index, word) in (0u8..).zip(words.iter_mut()) {
        let bytes = query::<I, 2>(bus, address, Command::PromRead(index))?;
        *word = u16::from_be_bytes(bytes);
    }
    Ok(words)
}

fn bus_error<E: embedded_hal::i2c::Error>(command: Command, err: E) -> TransportError {
    TransportError::bus(format!("{:?} (0x{:02X}) failed: {}", command, command.byte(), err.kind()))
}

#[async_trait]
impl<I> SensorPort for Ms5837<I>
where
    I: I2c + Send + 'static,
{
    #[instrument(skip(self), fields(address = self.address), err)]
    async fn reset(&self) -> Result<(), TransportError> {
        self.transfer(|bus, address| send(bus, address, Command::Reset))
            .await
    }

    #[instrument(skip(self), fields(address = self.address), err)]
    async fn read_calibration(&self) -> Result<CalibrationSet, TransportError> {
        let words = self.transfer(read_prom).await?;
        match CalibrationSet::from_prom(words) {
            Ok(calibration) => {
                debug!(?words, "PROM calibration valid");
                Ok(calibration)
            }
            Err(err) => {
                warn!(?words, error = %err, "PROM calibration rejected");
                Err(err)
            }
        }
    }

    async fn start_pressure_conversion(&self) -> Result<(), TransportError> {
        self.transfer(|bus, address| send(bus, address, Command::ConvertD1))
            .await
    }

    async fn start_temperature_conversion(&self) -> Result<(), TransportError> {
        self.transfer(|bus, address| send(bus, address, Command::ConvertD2))
            .await
    }

    async fn read_raw24(&self) -> Result<u32, TransportError> {
        let [hi, mid, lo] = self
            .transfer(|bus, address| query::<I, 3>(bus, address, Command::AdcRead))
            .await?;
        Ok(u32::from_be_bytes([0, hi, mid, lo]))
    }

    fn describe(&self) -> String {
        format!("MS5837-30BA @ 0x{:02X}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_bytes_match_datasheet() {
        assert_eq!(Command::Reset.byte(), 0x1E);
        assert_eq!(Command::PromRead(0).byte(), 0xA0);
        assert_eq!(Command::PromRead(6).byte(), 0xAC);
        assert_eq!(Command::ConvertD1.byte(), 0x4A);
        assert_eq!(Command::ConvertD2.byte(), 0x5A);
        assert_eq!(Command::AdcRead.byte(), 0x00);
    }
}
