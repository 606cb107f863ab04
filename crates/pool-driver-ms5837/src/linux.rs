//! Linux `/dev/i2c-*` bus support.

use crate::ms5837::Ms5837;
use linux_embedded_hal::I2cdev;
use pool_core::error::TransportError;
use tracing::info;

/// Open an MS5837 on a Linux I²C character device.
///
/// # Errors
/// `TransportError{kind: Unavailable}` if the device node cannot be opened.
pub fn open(bus_path: &str, address: u8) -> Result<Ms5837<I2cdev>, TransportError> {
    let bus = I2cdev::new(bus_path)
        .map_err(|e| TransportError::unavailable(format!("cannot open {}: {}", bus_path, e)))?;
    info!(bus_path, address = %format!("0x{:02X}", address), "Opened I2C bus");
    Ok(Ms5837::with_address(bus, address))
}
