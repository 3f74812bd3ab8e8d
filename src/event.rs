//! Interrupt to task signalling.
//!
//! The interrupt handler never touches a descriptor ring. It decodes the MAC's
//! status into an [`InterruptStatus`] and [`post`](Bridge::post)s it; the task that
//! owns the rings picks the events up in [`Driver::process_events`](crate::Driver::process_events).

use core::sync::atomic::{AtomicBool, Ordering};

/// Something that can be woken.
pub trait Notify {
    fn notify(&self);
}

/// Discards notifications.
impl Notify for () {
    fn notify(&self) {}
}

impl<N: Notify + ?Sized> Notify for &N {
    fn notify(&self) {
        (**self).notify()
    }
}

/// A level-triggered event flag, safe to set from interrupt context.
#[derive(Debug, Default)]
pub struct Event(AtomicBool);

impl Event {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Clear the event, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Notify for Event {
    fn notify(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// MAC interrupt causes the rings care about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InterruptStatus {
    /// A transmit completed, or the transmitter stopped.
    pub transmitted: bool,
    /// A frame arrived, or the receiver ran out of descriptors.
    pub received: bool,
}

/// Events shared between the MAC interrupt handler, the driver task, and the
/// network stack.
#[derive(Debug, Default)]
pub struct Bridge {
    transmitted: Event,
    received: Event,
    tx_ready: Event,
}

impl Bridge {
    pub const fn new() -> Self {
        Self {
            transmitted: Event::new(),
            received: Event::new(),
            tx_ready: Event::new(),
        }
    }

    /// Record interrupt causes. Call this from the interrupt handler.
    pub fn post(&self, status: InterruptStatus) {
        if status.transmitted {
            self.transmitted.notify();
        }
        if status.received {
            self.received.notify();
        }
    }

    /// Indicates if the driver task has work to do.
    pub fn is_pending(&self) -> bool {
        self.transmitted.is_pending() || self.received.is_pending()
    }

    /// Set when the transmit ring can take another frame.
    ///
    /// The network stack waits on this after a [`RingFull`](crate::TransmitError::RingFull).
    pub fn tx_ready(&self) -> &Event {
        &self.tx_ready
    }

    pub(crate) fn take_transmitted(&self) -> bool {
        self.transmitted.take()
    }

    pub(crate) fn take_received(&self) -> bool {
        self.received.take()
    }
}

#[cfg(test)]
mod tests {
    use super::{Bridge, Event, InterruptStatus, Notify};

    #[test]
    fn event_is_level_triggered() {
        let event = Event::new();
        assert!(!event.take());
        event.notify();
        event.notify();
        assert!(event.is_pending());
        assert!(event.take());
        assert!(!event.take());
    }

    #[test]
    fn post_only_sets_flags() {
        let bridge = Bridge::new();
        assert!(!bridge.is_pending());

        bridge.post(InterruptStatus {
            transmitted: false,
            received: true,
        });
        assert!(bridge.is_pending());
        assert!(!bridge.take_transmitted());
        assert!(bridge.take_received());
        assert!(!bridge.is_pending());
        assert!(!bridge.tx_ready().is_pending());
    }
}
