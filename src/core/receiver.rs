//! Measurement fan-out to registered receivers.

use crate::core::measurement::Measurement;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

/// Callback interface decoded measurements are delivered through.
pub trait DataReceiver: Send + Sync {
    /// Called once per decoded measurement, in decode order.
    fn on_data(&self, measurement: &Measurement);
}

/// Ordered, identity-deduplicated set of receivers.
///
/// Registration, removal and delivery serialize on one lock, so a
/// receiver never observes a delivery after its removal returned.
#[derive(Default)]
pub struct ReceiverSet {
    receivers: Mutex<Vec<Arc<dyn DataReceiver>>>,
}

impl ReceiverSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a receiver. Re-registering the same one is a no-op.
    pub fn add(&self, receiver: Arc<dyn DataReceiver>) {
        let mut receivers = self.receivers.lock();
        if !receivers.iter().any(|r| Arc::ptr_eq(r, &receiver)) {
            receivers.push(receiver);
        }
    }

    /// Remove a previously registered receiver.
    pub fn remove(&self, receiver: &Arc<dyn DataReceiver>) {
        self.receivers.lock().retain(|r| !Arc::ptr_eq(r, receiver));
    }

    /// Deliver one measurement to every receiver in registration order.
    pub fn publish(&self, measurement: &Measurement) {
        for receiver in self.receivers.lock().iter() {
            receiver.on_data(measurement);
        }
    }

    /// Number of registered receivers.
    pub fn len(&self) -> usize {
        self.receivers.lock().len()
    }

    /// True when no receiver is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiver that forwards each measurement into a channel.
///
/// Send failures are ignored: a dropped consumer simply stops
/// listening.
pub struct ChannelReceiver {
    tx: Sender<Measurement>,
}

impl DataReceiver for ChannelReceiver {
    fn on_data(&self, measurement: &Measurement) {
        let _ = self.tx.send(measurement.clone());
    }
}

/// Unbounded channel adapter: the receiver half registers with a
/// source, measurements arrive on the returned consumer end.
pub fn measurement_channel() -> (Arc<ChannelReceiver>, Receiver<Measurement>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (Arc::new(ChannelReceiver { tx }), rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::si::Prefix;
    use rust_decimal::Decimal;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl DataReceiver for Recorder {
        fn on_data(&self, measurement: &Measurement) {
            self.seen.lock().push(measurement.to_string());
        }
    }

    fn sample() -> Measurement {
        Measurement::new(Decimal::new(123, 1), "V", Prefix::Milli)
    }

    #[test]
    fn test_publish_reaches_all_receivers() {
        let set = ReceiverSet::new();
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        set.add(a.clone());
        set.add(b.clone());
        set.publish(&sample());
        assert_eq!(a.seen.lock().len(), 1);
        assert_eq!(b.seen.lock().len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_ignored() {
        let set = ReceiverSet::new();
        let receiver = Arc::new(Recorder::default());
        set.add(receiver.clone());
        set.add(receiver.clone());
        assert_eq!(set.len(), 1);
        set.publish(&sample());
        assert_eq!(receiver.seen.lock().len(), 1);
    }

    #[test]
    fn test_removed_receiver_gets_nothing() {
        let set = ReceiverSet::new();
        let receiver: Arc<dyn DataReceiver> = Arc::new(Recorder::default());
        set.add(receiver.clone());
        set.remove(&receiver);
        assert!(set.is_empty());
        set.publish(&sample());
    }

    #[test]
    fn test_removing_one_receiver_keeps_the_others() {
        let set = ReceiverSet::new();
        let kept = Arc::new(Recorder::default());
        let removed = Arc::new(Recorder::default());
        let handle: Arc<dyn DataReceiver> = removed.clone();
        set.add(kept.clone());
        set.add(handle.clone());
        set.remove(&handle);
        assert_eq!(set.len(), 1);
        set.publish(&sample());
        assert_eq!(kept.seen.lock().len(), 1);
        assert!(removed.seen.lock().is_empty());
    }

    #[test]
    fn test_distinct_instances_both_register() {
        let set = ReceiverSet::new();
        set.add(Arc::new(Recorder::default()));
        set.add(Arc::new(Recorder::default()));
        assert_eq!(set.len(), 2);
    }

    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DataReceiver for Tagged {
        fn on_data(&self, _measurement: &Measurement) {
            self.log.lock().push(self.tag);
        }
    }

    #[test]
    fn test_delivery_follows_registration_order() {
        let set = ReceiverSet::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            set.add(Arc::new(Tagged {
                tag,
                log: Arc::clone(&log),
            }));
        }
        set.publish(&sample());
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_channel_receiver_forwards() {
        let (receiver, rx) = measurement_channel();
        receiver.on_data(&sample());
        receiver.on_data(&sample());
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_channel_send_after_consumer_drop_is_silent() {
        let (receiver, rx) = measurement_channel();
        drop(rx);
        receiver.on_data(&sample());
    }
}
