//! 32-bit float decoding for register pairs of unknown word order.
//!
//! Modbus fixes the byte order inside a register but not the order of the two
//! registers that make up a float. Devices in the field ship either way, so the
//! decoder tries the natural order first and falls back to the swapped one when
//! the natural value is not a believable measurement.

use serde::{Deserialize, Serialize};

const PLAUSIBLE_MIN: f64 = 1e-8;
const PLAUSIBLE_MAX: f64 = 1e8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WordOrder {
    /// High register first ("AB CD").
    Natural,
    /// Low register first ("CD AB").
    Swapped,
}

pub fn is_plausible(value: f64) -> bool {
    value.is_finite() && value != 0.0 && value.abs() > PLAUSIBLE_MIN && value.abs() < PLAUSIBLE_MAX
}

pub fn decode_with(buffer: &[u8], offset: usize, order: WordOrder) -> Option<f64> {
    let raw: [u8; 4] = buffer.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
    let bytes = match order {
        WordOrder::Natural => raw,
        WordOrder::Swapped => [raw[2], raw[3], raw[0], raw[1]],
    };
    Some(f32::from_be_bytes(bytes) as f64)
}

/// Decodes the float at `offset`, reporting which word order was picked.
///
/// When neither order looks plausible the natural candidate is returned, so a
/// genuine zero reading still comes through as `0.0`. An offset that runs past
/// the buffer yields `0.0`.
pub fn decode_float32_with_order(buffer: &[u8], offset: usize) -> (f64, WordOrder) {
    let Some(natural) = decode_with(buffer, offset, WordOrder::Natural) else {
        return (0.0, WordOrder::Natural);
    };
    if is_plausible(natural) {
        return (natural, WordOrder::Natural);
    }

    match decode_with(buffer, offset, WordOrder::Swapped) {
        Some(swapped) if is_plausible(swapped) => (swapped, WordOrder::Swapped),
        _ => (natural, WordOrder::Natural),
    }
}

pub fn decode_float32(buffer: &[u8], offset: usize) -> f64 {
    decode_float32_with_order(buffer, offset).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_order() {
        let buf = [0x41, 0x48, 0x00, 0x00];
        assert_eq!(decode_float32_with_order(&buf, 0), (12.5, WordOrder::Natural));
    }

    #[test]
    fn test_swapped_order_is_recovered() {
        let buf = [0x00, 0x00, 0x41, 0x48];
        assert_eq!(decode_float32_with_order(&buf, 0), (12.5, WordOrder::Swapped));

        // 850.25 = 0x44549000, registers swapped
        let buf = [0xFF, 0x90, 0x00, 0x44, 0x54];
        assert_eq!(decode_float32(&buf, 1), 850.25);
    }

    #[test]
    fn test_zero_falls_back_to_natural() {
        let buf = [0u8; 4];
        assert_eq!(decode_float32_with_order(&buf, 0), (0.0, WordOrder::Natural));
    }

    #[test]
    fn test_implausible_both_ways_returns_natural_candidate() {
        // NaN in natural order, 0x0000_7FC0 (denormal) swapped
        let buf = [0x7F, 0xC0, 0x00, 0x00];
        let (value, order) = decode_float32_with_order(&buf, 0);
        assert!(value.is_nan());
        assert_eq!(order, WordOrder::Natural);
    }

    #[test]
    fn test_negative_values_are_plausible() {
        let buf = (-3.5f32).to_be_bytes();
        assert_eq!(decode_float32(&buf, 0), -3.5);
    }

    #[test]
    fn test_out_of_range_offset() {
        let buf = [0x41, 0x48, 0x00];
        assert_eq!(decode_float32(&buf, 0), 0.0);
        assert_eq!(decode_float32(&buf, usize::MAX), 0.0);
    }

    #[test]
    fn test_plausibility_bounds() {
        assert!(is_plausible(1.0));
        assert!(is_plausible(-99_999_999.0));
        assert!(!is_plausible(1e8));
        assert!(!is_plausible(1e-8));
        assert!(!is_plausible(f64::INFINITY));
        assert!(!is_plausible(0.0));
    }
}
