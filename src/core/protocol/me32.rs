//! Voltcraft ME-32 decoder: polled ASCII frames.
//!
//! The meter answers each poll command with one 13-character text frame
//! terminated by a carriage return. Layout: three head characters
//! (mode annunciators), a six character numeric field, one SI prefix
//! character and a three character unit field. The numeric field mixes
//! in `L` during range overflow and renders zeros as the letter `O` in
//! some modes, so it is cleaned before parsing.

use crate::core::device::{DataDevice, DeviceError};
use crate::core::measurement::Measurement;
use crate::core::port::{DataBits, Parity, PortParameters, StopBits};
use crate::core::receiver::DataReceiver;
use crate::core::si::Prefix;
use crate::core::source::{DataSource, SourceState};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const FRAME_LEN: usize = 13;
const FRAME_DELIMITER: u8 = 0x0D;
/// ASCII `D`; the meter emits one frame per poll command received.
const POLL_COMMAND: u8 = 0x44;
const POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Decoder for the Voltcraft ME-32 multimeter.
pub struct VoltcraftMe32 {
    state: Arc<SourceState>,
}

impl VoltcraftMe32 {
    /// Fresh decoder; one instance drives one connection.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SourceState::new()),
        }
    }
}

impl Default for VoltcraftMe32 {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSource for VoltcraftMe32 {
    fn supported_devices(&self) -> &[&str] {
        &["Voltcraft ME-32"]
    }

    fn port_parameters(&self) -> PortParameters {
        PortParameters::new(600, DataBits::Seven, StopBits::Two, Parity::None)
            .dtr(true)
            .rts(true)
    }

    fn start(&self, device: Arc<dyn DataDevice>) {
        if !self.state.begin() {
            return;
        }
        info!(device = device.name(), "ME-32 decoder started");

        let poll_state = Arc::clone(&self.state);
        let poll_device = Arc::clone(&device);
        let poll = thread::spawn(move || {
            while poll_state.is_running() {
                if let Err(e) = poll_device.write(&[POLL_COMMAND]) {
                    warn!(device = poll_device.name(), error = %e, "poll write failed");
                }
                thread::sleep(POLL_INTERVAL);
            }
        });

        let mut buffer = [0u8; FRAME_LEN];
        let mut pos = 0usize;
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
            if byte == FRAME_DELIMITER {
                // Anything shorter than a full frame at the delimiter
                // is a partial pickup, typically from attaching
                // mid-transmission.
                if pos == FRAME_LEN {
                    match decode_frame(&buffer) {
                        Some(measurement) => self.state.publish(&measurement),
                        None => debug!(device = device.name(), "discarding undecodable frame"),
                    }
                }
                pos = 0;
            } else if pos < FRAME_LEN {
                buffer[pos] = byte;
                pos += 1;
            }
        }

        self.state.finish();
        let _ = poll.join();
        info!(device = device.name(), "ME-32 decoder stopped");
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

/// Decode one full frame. `None` means the frame is unusable and gets
/// dropped without ending the stream.
fn decode_frame(frame: &[u8; FRAME_LEN]) -> Option<Measurement> {
    let text = String::from_utf8_lossy(frame);
    let chars: Vec<char> = text.chars().collect();
    if chars.len() != FRAME_LEN {
        return None;
    }

    let number: String = chars[3..9].iter().collect();
    let number = number.replace(".L", "").replace('L', "").replace('O', "0");
    let value: Decimal = number.trim().parse().ok()?;

    let prefix_char = chars[9];
    let prefix = if prefix_char == ' ' {
        Prefix::None
    } else {
        let mut buf = [0u8; 4];
        Prefix::from_symbol(prefix_char.encode_utf8(&mut buf))?
    };

    let unit: String = chars[10..13].iter().collect();
    let unit = normalize_unit(unit.trim());

    Some(Measurement::new(value, unit, prefix))
}

/// Map the meter's unit spellings onto proper symbols.
fn normalize_unit(unit: &str) -> String {
    if unit.eq_ignore_ascii_case("ohm") {
        "\u{03a9}".to_string()
    } else if unit.eq_ignore_ascii_case("c") {
        "\u{00b0}C".to_string()
    } else {
        unit.to_string()
    }
}
