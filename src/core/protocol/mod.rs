//! Wire-protocol decoders for the supported meters.
//!
//! One state machine per device family:
//! - Voltcraft ME-32: polled, CR-delimited 13-byte ASCII frames
//! - Voltcraft VC-840: continuous position-tagged 14-nibble segments

mod me32;
mod vc840;

pub use me32::VoltcraftMe32;
pub use vc840::VoltcraftVc840;
