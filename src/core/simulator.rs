//! Simulated meters and scriptable devices.
//!
//! In-memory [`DataDevice`] implementations for development without
//! hardware and for deterministic tests:
//! - [`PipeDevice`]: producer-fed byte queue with write capture
//! - [`ReplayDevice`]: replays a fixed byte script, then ends
//! - [`SimulatedMe32`]: answers each poll with a plausible frame
//! - [`SimulatedVc840`]: endless segment stream with a wandering value

use crate::core::device::{DataDevice, DeviceError};
use parking_lot::{Condvar, Mutex};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct PipeQueue {
    bytes: VecDeque<u8>,
    closed: bool,
}

struct PipeShared {
    queue: Mutex<PipeQueue>,
    available: Condvar,
}

impl PipeShared {
    fn close(&self) {
        let mut queue = self.queue.lock();
        queue.closed = true;
        self.available.notify_all();
    }
}

/// In-memory byte-stream device. A [`PipeProducer`] feeds the read
/// side; bytes written by the decoder are captured for inspection.
///
/// Readers drain buffered bytes first and see end of stream once the
/// producer has closed.
pub struct PipeDevice {
    name: String,
    shared: Arc<PipeShared>,
    written: Mutex<Vec<u8>>,
}

/// Producer half of a [`PipeDevice`]. Dropping it ends the stream.
pub struct PipeProducer {
    shared: Arc<PipeShared>,
}

impl PipeDevice {
    /// Create a device and its producer handle.
    pub fn new(name: impl Into<String>) -> (Arc<Self>, PipeProducer) {
        let shared = Arc::new(PipeShared {
            queue: Mutex::new(PipeQueue {
                bytes: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
        });
        let device = Arc::new(Self {
            name: name.into(),
            shared: Arc::clone(&shared),
            written: Mutex::new(Vec::new()),
        });
        (device, PipeProducer { shared })
    }

    /// Bytes the decoder has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    fn pop_byte(&self) -> Result<u8, DeviceError> {
        let mut queue = self.shared.queue.lock();
        loop {
            if let Some(byte) = queue.bytes.pop_front() {
                return Ok(byte);
            }
            if queue.closed {
                return Err(DeviceError::EndOfStream);
            }
            self.shared.available.wait(&mut queue);
        }
    }
}

impl DataDevice for PipeDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&self) -> Result<u8, DeviceError> {
        self.pop_byte()
    }

    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.pop_byte()?);
        }
        Ok(bytes)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn shutdown(&self) {
        self.shared.close();
    }
}

impl PipeProducer {
    /// Append bytes to the read side.
    pub fn feed(&self, bytes: &[u8]) {
        let mut queue = self.shared.queue.lock();
        queue.bytes.extend(bytes.iter().copied());
        self.shared.available.notify_all();
    }

    /// Close the stream. Readers see end of stream once drained.
    pub fn close(&self) {
        self.shared.close();
    }
}

impl Drop for PipeProducer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Device that replays a fixed byte script, then reports end of
/// stream. Writes are captured like on a [`PipeDevice`].
pub struct ReplayDevice {
    name: String,
    script: Mutex<VecDeque<u8>>,
    written: Mutex<Vec<u8>>,
    closed: AtomicBool,
}

impl ReplayDevice {
    /// Device serving exactly `script`, in order.
    pub fn new(name: impl Into<String>, script: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            written: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Bytes the decoder has written so far.
    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    fn pop_byte(&self) -> Result<u8, DeviceError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(DeviceError::EndOfStream);
        }
        self.script
            .lock()
            .pop_front()
            .ok_or(DeviceError::EndOfStream)
    }
}

impl DataDevice for ReplayDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&self) -> Result<u8, DeviceError> {
        self.pop_byte()
    }

    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.pop_byte()?);
        }
        Ok(bytes)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.written.lock().extend_from_slice(bytes);
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Displayed value that wanders like a real reading: integer tenths
/// with a small random step each sample, clamped to the display range.
struct ReadingWalk {
    tenths: i32,
}

impl ReadingWalk {
    fn new(tenths: i32) -> Self {
        Self { tenths }
    }

    fn step(&mut self) -> i32 {
        let jitter = rand::thread_rng().gen_range(-3..=3);
        self.tenths = (self.tenths + jitter).clamp(0, 9999);
        self.tenths
    }
}

const ME32_POLL: u8 = 0x44;
const ME32_DELIMITER: u8 = 0x0D;

/// Simulated Voltcraft ME-32: idles until polled, answers each poll
/// command with one millivolt reading frame.
pub struct SimulatedMe32 {
    pipe: Arc<PipeDevice>,
    producer: PipeProducer,
    walk: Mutex<ReadingWalk>,
}

impl SimulatedMe32 {
    /// New simulated meter reading around 12.3 mV.
    pub fn new() -> Self {
        let (pipe, producer) = PipeDevice::new("sim:me32");
        Self {
            pipe,
            producer,
            walk: Mutex::new(ReadingWalk::new(123)),
        }
    }

    fn next_frame(&self) -> Vec<u8> {
        let tenths = self.walk.lock().step();
        let value = f64::from(tenths) / 10.0;
        let mut frame = format!("DC {value:>6.1}mV  ").into_bytes();
        frame.push(ME32_DELIMITER);
        frame
    }
}

impl Default for SimulatedMe32 {
    fn default() -> Self {
        Self::new()
    }
}

impl DataDevice for SimulatedMe32 {
    fn name(&self) -> &str {
        self.pipe.name()
    }

    fn read_byte(&self) -> Result<u8, DeviceError> {
        self.pipe.read_byte()
    }

    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError> {
        self.pipe.read_exact(count)
    }

    fn write(&self, bytes: &[u8]) -> Result<(), DeviceError> {
        self.pipe.write(bytes)?;
        for &byte in bytes {
            if byte == ME32_POLL {
                self.producer.feed(&self.next_frame());
            }
        }
        Ok(())
    }

    fn shutdown(&self) {
        self.pipe.shutdown();
    }
}

/// Segment patterns for digits 0..=9, first and second nibble.
const DIGIT_SEGMENTS: [(u8, u8); 10] = [
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

/// Encode a millivolt reading in tenths as one position-tagged
/// VC-840 segment.
fn encode_vc840_segment(tenths: i32) -> [u8; 14] {
    let mut nibbles = [0u8; 14];
    for (i, ch) in format!("{tenths:04}").bytes().enumerate() {
        let (first, second) = DIGIT_SEGMENTS[usize::from(ch - b'0')];
        nibbles[i * 2 + 1] = first;
        nibbles[i * 2 + 2] = second;
    }
    nibbles[7] |= 0b1000; // point left of the last digit
    nibbles[10] = 0b1000; // milli
    nibbles[12] = 0b0100; // volt
    let mut bytes = [0u8; 14];
    for (i, nibble) in nibbles.iter().enumerate() {
        bytes[i] = ((i as u8 + 1) << 4) | nibble;
    }
    bytes
}

/// Simulated Voltcraft VC-840: an endless stream of valid segments,
/// one new reading per `interval`.
pub struct SimulatedVc840 {
    name: String,
    buffered: Mutex<VecDeque<u8>>,
    walk: Mutex<ReadingWalk>,
    closed: AtomicBool,
    interval: Duration,
}

impl SimulatedVc840 {
    /// New simulated meter emitting roughly four readings per second.
    pub fn new() -> Self {
        Self::with_interval(Duration::from_millis(250))
    }

    /// Simulated meter pacing readings by `interval`. Zero makes the
    /// stream run as fast as the decoder reads.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            name: "sim:vc840".to_string(),
            buffered: Mutex::new(VecDeque::new()),
            walk: Mutex::new(ReadingWalk::new(123)),
            closed: AtomicBool::new(false),
            interval,
        }
    }
}

impl Default for SimulatedVc840 {
    fn default() -> Self {
        Self::new()
    }
}

impl DataDevice for SimulatedVc840 {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_byte(&self) -> Result<u8, DeviceError> {
        loop {
            if self.closed.load(Ordering::Relaxed) {
                return Err(DeviceError::EndOfStream);
            }
            if let Some(byte) = self.buffered.lock().pop_front() {
                return Ok(byte);
            }
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
            let tenths = self.walk.lock().step();
            self.buffered
                .lock()
                .extend(encode_vc840_segment(tenths));
        }
    }

    fn read_exact(&self, count: usize) -> Result<Vec<u8>, DeviceError> {
        let mut bytes = Vec::with_capacity(count);
        for _ in 0..count {
            bytes.push(self.read_byte()?);
        }
        Ok(bytes)
    }

    fn write(&self, _bytes: &[u8]) -> Result<(), DeviceError> {
        // The real meter has no receive line; accept and ignore.
        Ok(())
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_delivers_fed_bytes_then_end_of_stream() {
        let (device, producer) = PipeDevice::new("pipe");
        producer.feed(&[1, 2, 3]);
        producer.close();
        assert_eq!(device.read_exact(3).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            device.read_byte(),
            Err(DeviceError::EndOfStream)
        ));
    }

    #[test]
    fn test_pipe_unblocks_reader_on_close() {
        let (device, producer) = PipeDevice::new("pipe");
        let reader = thread::spawn(move || device.read_byte());
        thread::sleep(Duration::from_millis(20));
        producer.close();
        assert!(matches!(
            reader.join().unwrap(),
            Err(DeviceError::EndOfStream)
        ));
    }

    #[test]
    fn test_pipe_captures_writes() {
        let (device, _producer) = PipeDevice::new("pipe");
        device.write(b"DD").unwrap();
        assert_eq!(device.written(), b"DD");
    }

    #[test]
    fn test_replay_serves_script_then_ends() {
        let device = ReplayDevice::new("replay", vec![9, 8]);
        assert_eq!(device.read_byte().unwrap(), 9);
        assert_eq!(device.read_byte().unwrap(), 8);
        assert!(matches!(
            device.read_byte(),
            Err(DeviceError::EndOfStream)
        ));
    }

    #[test]
    fn test_replay_shutdown_cuts_script_short() {
        let device = ReplayDevice::new("replay", vec![9, 8]);
        device.shutdown();
        assert!(matches!(
            device.read_byte(),
            Err(DeviceError::EndOfStream)
        ));
    }

    #[test]
    fn test_simulated_me32_answers_polls_only() {
        let device = SimulatedMe32::new();
        device.write(&[0x00]).unwrap();
        device.write(&[ME32_POLL]).unwrap();
        let frame = device.read_exact(14).unwrap();
        assert_eq!(frame.len(), 14);
        assert_eq!(frame[13], ME32_DELIMITER);
        assert_eq!(&frame[..2], b"DC");
    }

    #[test]
    fn test_simulated_me32_frames_have_fixed_width() {
        let device = SimulatedMe32::new();
        for _ in 0..20 {
            device.write(&[ME32_POLL]).unwrap();
            let frame = device.read_exact(14).unwrap();
            assert_eq!(frame[13], ME32_DELIMITER);
        }
    }

    #[test]
    fn test_simulated_vc840_streams_tagged_segments() {
        let device = SimulatedVc840::with_interval(Duration::ZERO);
        let bytes = device.read_exact(28).unwrap();
        for (i, byte) in bytes.iter().enumerate() {
            assert_eq!(byte >> 4, (i % 14) as u8 + 1);
        }
    }

    #[test]
    fn test_encoded_segment_round_trips_digit_patterns() {
        let segment = encode_vc840_segment(123);
        // 0123 with the point before the last digit: 012.3
        assert_eq!(segment[0], 0x10);
        assert_eq!(segment[1] & 0x0F, DIGIT_SEGMENTS[0].0);
        assert_eq!(segment[8] & 0x0F, DIGIT_SEGMENTS[3].1);
        assert_eq!(segment[7] & 0b1000, 0b1000);
    }
}
