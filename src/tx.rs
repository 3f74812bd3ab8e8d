//! Transmit path.

use core::sync::atomic::{Ordering, fence};

use crate::{Dma, Notify, TransmitError, bd::Ring, bd::TxDescriptor};

/// Transmit counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStats {
    /// Frames handed to the DMA engine.
    pub frames: u32,
    /// Enqueues refused because the next slot was in flight.
    pub ring_full: u32,
    /// Enqueues refused because the frame was larger than a buffer.
    pub oversized: u32,
}

/// Drives a transmit ring.
///
/// Frames are copied into the slot at the cursor, one frame per descriptor.
pub struct TxRing<'a, D> {
    ring: Ring<'a, D>,
    stats: TxStats,
}

impl<'a, D: TxDescriptor> TxRing<'a, D> {
    pub fn new(ring: Ring<'a, D>) -> Self {
        Self {
            ring,
            stats: TxStats::default(),
        }
    }

    pub fn ring(&self) -> &Ring<'a, D> {
        &self.ring
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }

    /// Drop every queued frame and rewind to the first slot.
    pub(crate) fn reset(&mut self) {
        self.ring.reset();
    }

    /// Indicates if the next enqueue would find a free slot.
    pub fn has_capacity(&self) -> bool {
        self.ring.descriptor(self.ring.cursor()).is_software_owned()
    }

    /// Largest frame accepted by [`enqueue`](Self::enqueue).
    pub fn max_frame_len(&self) -> usize {
        self.ring.buffer_size()
    }

    /// Copy `frame` into the next slot and start the DMA engine.
    ///
    /// See [`enqueue_with`](Self::enqueue_with).
    pub fn enqueue(
        &mut self,
        frame: &[u8],
        dma: &impl Dma,
        ready: &impl Notify,
    ) -> Result<(), TransmitError> {
        self.enqueue_with(frame.len(), dma, ready, |buffer| {
            buffer.copy_from_slice(frame)
        })
    }

    /// Let `f` write a `len` byte frame into the next slot, then start the DMA engine.
    ///
    /// `ready` is notified when another frame can be queued right away: after an
    /// oversized frame is refused, and after a successful enqueue that leaves a free
    /// slot at the cursor. A refused frame never touches the ring or the DMA engine.
    pub fn enqueue_with<R>(
        &mut self,
        len: usize,
        dma: &impl Dma,
        ready: &impl Notify,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> Result<R, TransmitError> {
        let max = self.ring.buffer_size();
        if len > max {
            self.stats.oversized = self.stats.oversized.wrapping_add(1);
            #[cfg(feature = "defmt")]
            defmt::warn!("Dropping {=usize} byte frame; buffers hold {=usize}", len, max);
            ready.notify();
            return Err(TransmitError::OversizedFrame { len, max });
        }

        let index = self.ring.cursor();
        if !self.ring.descriptor(index).is_software_owned() {
            self.stats.ring_full = self.stats.ring_full.wrapping_add(1);
            return Err(TransmitError::RingFull);
        }

        let result = f(&mut self.ring.buffer_mut(index)[..len]);
        // Buffer contents must land before the descriptor changes hands.
        fence(Ordering::SeqCst);
        self.ring
            .descriptor(index)
            .submit(len, self.ring.is_last(index));
        self.ring.step();

        // The descriptor must be visible before the doorbell.
        fence(Ordering::SeqCst);
        dma.start_transmit();
        self.stats.frames = self.stats.frames.wrapping_add(1);

        if self.has_capacity() {
            ready.notify();
        }
        Ok(result)
    }
}
