//! Factory calibration coefficients read from the sensor PROM.
//!
//! The MS5837 stores seven 16-bit words. Word 0 carries a 4-bit CRC in its top
//! nibble (the remaining bits are factory data); words 1..=6 are the
//! coefficients `C1..C6` used by the compensation engine.

use crate::error::TransportError;
use serde::{Deserialize, Serialize};

/// Number of PROM words read at startup.
pub const PROM_WORDS: usize = 7;

/// Immutable set of PROM calibration words.
///
/// Construct with [`CalibrationSet::from_prom`], which validates the block, or
/// [`CalibrationSet::from_coefficients`] when the CRC word is not available
/// (tests, simulation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationSet {
    words: [u16; PROM_WORDS],
}

impl CalibrationSet {
    /// Validate a raw PROM block and wrap it.
    ///
    /// # Errors
    /// Returns a calibration [`TransportError`] when the block is all zeros,
    /// all ones (nothing answered on the bus) or its CRC-4 does not match.
    pub fn from_prom(words: [u16; PROM_WORDS]) -> Result<Self, TransportError> {
        if words.iter().all(|&w| w == 0) {
            return Err(TransportError::calibration("PROM is blank (all zero)"));
        }
        if words.iter().all(|&w| w == 0xFFFF) {
            return Err(TransportError::calibration(
                "PROM reads 0xFFFF everywhere, bus is floating",
            ));
        }

        let expected = ((words[0] & 0xF000) >> 12) as u8;
        let actual = crc4(&words);
        if expected != actual {
            return Err(TransportError::calibration(format!(
                "PROM CRC mismatch: stored {:#x}, computed {:#x}",
                expected, actual
            )));
        }

        Ok(Self { words })
    }

    /// Build a set from coefficients `C1..C6`, stamping a matching CRC into
    /// word 0.
    pub fn from_coefficients(coefficients: [u16; 6]) -> Self {
        let mut words = [0u16; PROM_WORDS];
        words[1..].copy_from_slice(&coefficients);
        words[0] = u16::from(crc4(&words)) << 12;
        Self { words }
    }

    /// Coefficient `C[index]` widened for 64-bit arithmetic.
    ///
    /// Index 0 is the CRC/factory word and is never used by compensation.
    #[inline]
    pub fn coefficient(&self, index: usize) -> i64 {
        i64::from(self.words[index])
    }

    /// Raw PROM words as read from the device.
    pub fn words(&self) -> &[u16; PROM_WORDS] {
        &self.words
    }
}

/// CRC-4 over the PROM block as described in the MS5837 datasheet.
///
/// The CRC nibble of word 0 is masked off and a zero padding word is appended
/// before running the 0x3000 polynomial over the 16 bytes, MSB first.
pub fn crc4(words: &[u16; PROM_WORDS]) -> u8 {
    let mut remainder: u16 = 0;
    let padded = words
        .iter()
        .enumerate()
        .map(|(i, &w)| if i == 0 { w & 0x0FFF } else { w })
        .chain(std::iter::once(0u16));

    for byte in padded.flat_map(u16::to_be_bytes) {
        remainder ^= u16::from(byte);
        for _ in 0..8 {
            remainder = if remainder & 0x8000 != 0 {
                (remainder << 1) ^ 0x3000
            } else {
                remainder << 1
            };
        }
    }

    ((remainder >> 12) & 0x000F) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportErrorKind;

    // Datasheet example coefficients, CRC nibble 0x2.
    const PROM: [u16; PROM_WORDS] = [0x2000, 34982, 36352, 20328, 22354, 26646, 26146];

    #[test]
    fn accepts_prom_with_matching_crc() {
        let cal = CalibrationSet::from_prom(PROM).unwrap();
        assert_eq!(cal.coefficient(1), 34982);
        assert_eq!(cal.coefficient(6), 26146);
    }

    #[test]
    fn crc_ignores_stored_nibble() {
        let mut corrupted = PROM;
        corrupted[0] = 0xF000;
        assert_eq!(crc4(&corrupted), crc4(&PROM));
        assert_eq!(crc4(&PROM), 0x2);
    }

    #[test]
    fn rejects_crc_mismatch() {
        let mut words = PROM;
        words[3] ^= 0x0001;
        let err = CalibrationSet::from_prom(words).unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Calibration);
        assert!(err.message.contains("CRC mismatch"));
    }

    #[test]
    fn rejects_blank_and_floating_prom() {
        let blank = CalibrationSet::from_prom([0; PROM_WORDS]).unwrap_err();
        assert!(blank.message.contains("blank"));

        let floating = CalibrationSet::from_prom([0xFFFF; PROM_WORDS]).unwrap_err();
        assert!(floating.message.contains("floating"));
    }

    #[test]
    fn from_coefficients_round_trips_through_validation() {
        let cal = CalibrationSet::from_coefficients([34982, 36352, 20328, 22354, 26646, 26146]);
        assert_eq!(cal.words(), &PROM);
        assert_eq!(CalibrationSet::from_prom(*cal.words()).unwrap(), cal);
    }
}
