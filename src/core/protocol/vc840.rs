//! Voltcraft VC-840 decoder: continuous segment-display stream.
//!
//! The meter emits 14-byte segments back to back with no delimiter.
//! Each byte carries its one-based segment position in the high nibble
//! and four payload bits in the low nibble. The payload mirrors the
//! LCD drive lines, so decoding reassembles digits from seven-segment
//! patterns and reads sign, decimal point, SI prefix and unit from
//! annunciator bits.
//!
//! Segment payload map (one-based positions):
//! - 2..=9: digit pairs, two nibbles per digit; bit 3 of the first
//!   nibble of digits 2..=4 is the decimal point left of that digit
//! - 1 bit 3: minus sign
//! - 10/11: SI prefix annunciators
//! - 12/13: unit annunciators
//! - 14 bit 0: °C annunciator

use crate::core::device::{DataDevice, DeviceError};
use crate::core::measurement::Measurement;
use crate::core::port::{DataBits, Parity, PortParameters, StopBits};
use crate::core::receiver::DataReceiver;
use crate::core::si::Prefix;
use crate::core::source::{DataSource, SourceState};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SEGMENT_LEN: usize = 14;
const DIGITS: usize = 4;

/// Decoder for the Voltcraft VC-840 multimeter.
pub struct VoltcraftVc840 {
    state: Arc<SourceState>,
}

impl VoltcraftVc840 {
    /// Fresh decoder; one instance drives one connection.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SourceState::new()),
        }
    }
}

impl Default for VoltcraftVc840 {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for VoltcraftVc840 {
    fn supported_devices(&self) -> &[&str] {
        &["Voltcraft VC-840"]
    }

    fn port_parameters(&self) -> PortParameters {
        PortParameters::new(2400, DataBits::Eight, StopBits::One, Parity::None)
            .dtr(true)
            .rts(true)
    }

    fn start(&self, device: Arc<dyn DataDevice>) {
        if !self.state.begin() {
            return;
        }
        info!(device = device.name(), "VC-840 decoder started");

        let mut buffer = [0u8; SEGMENT_LEN];
        // Zero-based position of the previous accepted byte; None while
        // hunting for the start of a segment.
        let mut last_pos: Option<usize> = None;
        while self.state.is_running() {
            let byte = match device.read_byte() {
                Ok(byte) => byte,
                Err(DeviceError::EndOfStream) => {
                    info!(device = device.name(), "end of stream");
                    break;
                }
                Err(e) => {
                    warn!(device = device.name(), error = %e, "read failed");
                    break;
                }
            };

            let pos = usize::from(byte >> 4).checked_sub(1);
            match (last_pos, pos) {
                (None, Some(0)) => {
                    buffer[0] = byte & 0x0F;
                    last_pos = Some(0);
                }
                (None, _) => {}
                (Some(prev), Some(p)) if p == prev + 1 && p < SEGMENT_LEN => {
                    buffer[p] = byte & 0x0F;
                    if p == SEGMENT_LEN - 1 {
                        match decode_segment(&buffer) {
                            Some(measurement) => self.state.publish(&measurement),
                            None => {
                                debug!(device = device.name(), "discarding inconsistent segment");
                            }
                        }
                        last_pos = None;
                    } else {
                        last_pos = Some(p);
                    }
                }
                // Out-of-order position: drop the byte and hunt for the
                // next segment start.
                (Some(_), _) => last_pos = None,
            }
        }

        self.state.finish();
        info!(device = device.name(), "VC-840 decoder stopped");
    }

    fn stop(&self) {
        self.state.request_stop();
    }

    fn add_receiver(&self, receiver: Arc<dyn DataReceiver>) {
        self.state.add_receiver(receiver);
    }

    fn remove_receiver(&self, receiver: &Arc<dyn DataReceiver>) {
        self.state.remove_receiver(receiver);
    }
}

fn bit(nibble: u8, pos: u8) -> bool {
    nibble & (1 << pos) != 0
}

/// Decode one complete segment buffer (low nibbles only). `None` means
/// the segment is internally inconsistent and gets dropped.
fn decode_segment(read: &[u8; SEGMENT_LEN]) -> Option<Measurement> {
    // A clean segment lights at most one SI prefix annunciator.
    let prefix_bits = (read[9] & 0b1110) | ((read[10] & 0b1010) << 3);
    if prefix_bits.count_ones() > 1 {
        return None;
    }
    // Same for the unit annunciators.
    let unit_bits = (read[11] & 0b1100) | ((read[12] & 0b1110) << 3);
    if unit_bits.count_ones() > 1 {
        return None;
    }

    let mut digits = [0u8; DIGITS];
    for (i, digit) in digits.iter_mut().enumerate() {
        *digit = decode_digit(read[i * 2 + 1], read[i * 2 + 2])?;
    }

    // The display has a decimal point slot left of each digit but the
    // first; more than one lit point means a garbled segment.
    let mut point = DIGITS;
    for i in 1..DIGITS {
        if bit(read[i * 2 + 1], 3) {
            if point != DIGITS {
                return None;
            }
            point = i;
        }
    }

    let negative = bit(read[1], 3);

    let prefix = if bit(read[9], 1) {
        Prefix::Kilo
    } else if bit(read[9], 2) {
        Prefix::Nano
    } else if bit(read[9], 3) {
        Prefix::Micro
    } else if bit(read[10], 1) {
        Prefix::Mega
    } else if bit(read[10], 3) {
        Prefix::Milli
    } else {
        Prefix::None
    };

    let unit = if bit(read[11], 2) {
        "\u{03a9}"
    } else if bit(read[11], 3) {
        "F"
    } else if bit(read[12], 1) {
        "Hz"
    } else if bit(read[12], 2) {
        "V"
    } else if bit(read[12], 3) {
        "A"
    } else if bit(read[13], 0) {
        // Observed on the real meter; absent from the protocol sheet.
        "\u{00b0}C"
    } else {
        ""
    };

    let mut text = String::with_capacity(DIGITS + 2);
    if negative {
        text.push('-');
    }
    for (i, digit) in digits.iter().enumerate() {
        if i == point {
            text.push('.');
        }
        text.push(char::from(b'0' + digit));
    }
    let value: Decimal = text.parse().ok()?;

    Some(Measurement::new(value, unit, prefix))
}

/// Seven-segment glyph lookup. The first nibble carries segments a, f,
/// e in bits 0..=2 (bit 3 is the decimal point, not part of the
/// glyph); the second carries b, g, c, d in bits 0..=3. Only the ten
/// patterns the display actually produces are accepted.
fn decode_digit(first: u8, second: u8) -> Option<u8> {
    match (first & 0b0111, second) {
        (0b111, 0b1101) => Some(0),
        (0b000, 0b0101) => Some(1),
        (0b101, 0b1011) => Some(2),
        (0b001, 0b1111) => Some(3),
        (0b010, 0b0111) => Some(4),
        (0b011, 0b1110) => Some(5),
        (0b111, 0b1110) => Some(6),
        (0b001, 0b0101) => Some(7),
        (0b111, 0b1111) => Some(8),
        (0b011, 0b1111) => Some(9),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::receiver::measurement_channel;
    use crate::core::simulator::ReplayDevice;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    /// Payload nibbles for `123.4 kV`, before position tagging.
    fn sample_nibbles() -> [u8; SEGMENT_LEN] {
        let mut nibbles = [0u8; SEGMENT_LEN];
        // Digits 1 2 3 4, point left of the last digit.
        nibbles[1] = 0x0;
        nibbles[2] = 0x5;
        nibbles[3] = 0x5;
        nibbles[4] = 0xB;
        nibbles[5] = 0x1;
        nibbles[6] = 0xF;
        nibbles[7] = 0x2 | 0b1000;
        nibbles[8] = 0x7;
        nibbles[9] = 0b0010; // kilo
        nibbles[12] = 0b0100; // volt
        nibbles
    }

    /// Tag each nibble with its one-based position.
    fn tagged(nibbles: &[u8; SEGMENT_LEN]) -> Vec<u8> {
        nibbles
            .iter()
            .enumerate()
            .map(|(i, n)| ((i as u8 + 1) << 4) | n)
            .collect()
    }

    #[test]
    fn test_decode_sample_segment() {
        let m = decode_segment(&sample_nibbles()).unwrap();
        assert_eq!(m.value(), dec("123.4"));
        assert_eq!(m.prefix(), Prefix::Kilo);
        assert_eq!(m.unit(), "V");
    }

    #[test]
    fn test_decode_negative_value() {
        let mut nibbles = sample_nibbles();
        nibbles[1] |= 0b1000;
        let m = decode_segment(&nibbles).unwrap();
        assert_eq!(m.value(), dec("-123.4"));
    }

    #[test]
    fn test_decode_integer_when_no_point_is_lit() {
        let mut nibbles = sample_nibbles();
        nibbles[7] &= 0b0111;
        let m = decode_segment(&nibbles).unwrap();
        assert_eq!(m.value(), dec("1234"));
    }

    #[test]
    fn test_two_lit_points_discard_segment() {
        let mut nibbles = sample_nibbles();
        nibbles[3] |= 0b1000;
        assert!(decode_segment(&nibbles).is_none());
    }

    #[test]
    fn test_two_prefix_annunciators_discard_segment() {
        let mut nibbles = sample_nibbles();
        nibbles[9] = 0b0110; // kilo and nano at once
        assert!(decode_segment(&nibbles).is_none());
    }

    #[test]
    fn test_two_unit_annunciators_discard_segment() {
        let mut nibbles = sample_nibbles();
        nibbles[11] = 0b0100; // ohm on top of volt
        assert!(decode_segment(&nibbles).is_none());
    }

    #[test]
    fn test_unknown_glyph_discards_segment() {
        let mut nibbles = sample_nibbles();
        nibbles[2] = 0x0; // digit 1 loses its c segment
        assert!(decode_segment(&nibbles).is_none());
    }

    #[test]
    fn test_celsius_annunciator() {
        let mut nibbles = sample_nibbles();
        nibbles[9] = 0;
        nibbles[12] = 0;
        nibbles[13] = 0b0001;
        let m = decode_segment(&nibbles).unwrap();
        assert_eq!(m.unit(), "\u{00b0}C");
        assert_eq!(m.prefix(), Prefix::None);
    }

    #[test]
    fn test_all_digit_glyphs() {
        let pairs = [
            (0x7, 0xD),
            (0x0, 0x5),
            (0x5, 0xB),
            (0x1, 0xF),
            (0x2, 0x7),
            (0x3, 0xE),
            (0x7, 0xE),
            (0x1, 0x5),
            (0x7, 0xF),
            (0x3, 0xF),
        ];
        for (digit, (first, second)) in pairs.iter().enumerate() {
            assert_eq!(decode_digit(*first, *second), Some(digit as u8));
        }
        assert_eq!(decode_digit(0x4, 0x4), None);
    }

    #[test]
    fn test_point_bit_does_not_change_the_glyph() {
        assert_eq!(decode_digit(0x2 | 0b1000, 0x7), Some(4));
    }

    #[test]
    fn test_stream_decodes_tagged_segments() {
        let mut script = tagged(&sample_nibbles());
        script.extend(tagged(&sample_nibbles()));
        let device = Arc::new(ReplayDevice::new("replay", script));

        let source = VoltcraftVc840::new();
        let (receiver, rx) = measurement_channel();
        source.add_receiver(receiver);
        source.start(device);

        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_stream_resynchronizes_after_gap() {
        let full = tagged(&sample_nibbles());
        let mut script = Vec::new();
        // Truncated segment, an out-of-order byte, then a clean segment.
        script.extend_from_slice(&full[..3]);
        script.push(0x70);
        script.extend_from_slice(&full);
        let device = Arc::new(ReplayDevice::new("replay", script));

        let source = VoltcraftVc840::new();
        let (receiver, rx) = measurement_channel();
        source.add_receiver(receiver);
        source.start(device);

        let values: Vec<Decimal> = rx.try_iter().map(|m| m.value()).collect();
        assert_eq!(values, vec![dec("123.4")]);
    }

    #[test]
    fn test_out_of_order_start_byte_is_consumed() {
        let full = tagged(&sample_nibbles());
        let mut script = Vec::new();
        // The segment following a truncated one loses its start byte to
        // resynchronization; only the one after that decodes.
        script.extend_from_slice(&full[..3]);
        script.extend_from_slice(&full);
        script.extend_from_slice(&full);
        let device = Arc::new(ReplayDevice::new("replay", script));

        let source = VoltcraftVc840::new();
        let (receiver, rx) = measurement_channel();
        source.add_receiver(receiver);
        source.start(device);

        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn test_untagged_noise_is_skipped_until_segment_start() {
        let mut script = vec![0x00, 0x0F];
        script.extend(tagged(&sample_nibbles()));
        let device = Arc::new(ReplayDevice::new("replay", script));

        let source = VoltcraftVc840::new();
        let (receiver, rx) = measurement_channel();
        source.add_receiver(receiver);
        source.start(device);

        assert_eq!(rx.try_iter().count(), 1);
    }
}
