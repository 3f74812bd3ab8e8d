//! Receive path.
//!
//! The DMA engine fills descriptors in ring order and may spread one frame over
//! several of them. [`RxRing::drain`] looks for a complete start-of-frame /
//! end-of-frame run starting at the cursor, copies it out, and re-arms every
//! descriptor it walked past. A frame whose end hasn't arrived yet is left alone,
//! since the DMA engine may still be writing it.

use core::sync::atomic::{Ordering, fence};

use crate::{Dma, MAX_FRAME_SIZE, ReceiveError, bd::Ring, bd::RxDescriptor, bd::RxStatus};

/// A frame copied out of the receive ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    /// Bytes written to the output buffer.
    pub len: usize,
    /// The DMA engine has already released the next descriptor.
    pub more: bool,
}

/// Receive counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStats {
    /// Frames delivered.
    pub frames: u32,
    /// Complete frames dropped because of error bits or a zero length.
    pub errors: u32,
    /// Descriptors recycled without contributing to a delivered or dropped frame,
    /// typically the remains of a frame aborted by a receive error.
    pub discarded: u32,
}

/// Drives a receive ring.
pub struct RxRing<'a, D> {
    ring: Ring<'a, D>,
    stats: RxStats,
}

/// Result of scanning forward from the cursor. Positions are offsets from the cursor.
struct Scan {
    /// Software-owned descriptors seen before stopping.
    visited: usize,
    start: Option<usize>,
    end: Option<(usize, RxStatus)>,
    /// Error bits accumulated from `start` onward.
    errors: u32,
}

impl<'a, D: RxDescriptor> RxRing<'a, D> {
    pub fn new(ring: Ring<'a, D>) -> Self {
        Self {
            ring,
            stats: RxStats::default(),
        }
    }

    pub fn ring(&self) -> &Ring<'a, D> {
        &self.ring
    }

    #[cfg(test)]
    pub(crate) fn ring_mut(&mut self) -> &mut Ring<'a, D> {
        &mut self.ring
    }

    pub fn stats(&self) -> RxStats {
        self.stats
    }

    /// Hand every descriptor back to hardware and rewind to the first one.
    pub(crate) fn reset(&mut self) {
        self.ring.reset();
    }

    /// Indicates if the DMA engine has released the descriptor at the cursor.
    pub fn has_pending(&self) -> bool {
        self.ring.descriptor(self.ring.cursor()).is_software_owned()
    }

    fn scan(&self) -> Scan {
        let mut scan = Scan {
            visited: 0,
            start: None,
            end: None,
            errors: 0,
        };
        let mut index = self.ring.cursor();
        for offset in 0..self.ring.capacity() {
            let descriptor = self.ring.descriptor(index);
            if !descriptor.is_software_owned() {
                break;
            }
            scan.visited = offset + 1;

            let status = descriptor.status();
            if status.start_of_frame {
                // A new start abandons any earlier, unfinished frame.
                scan.start = Some(offset);
                scan.errors = 0;
            }
            if scan.start.is_some() {
                scan.errors |= status.errors;
                if status.end_of_frame {
                    scan.end = Some((offset, status));
                    break;
                }
            }
            index = self.ring.advance(index);
        }
        scan
    }

    /// Copy the next complete frame into `out`.
    ///
    /// Returns `Ok(None)` when no complete frame is available; try again on the
    /// next receive interrupt. Frames longer than [`MAX_FRAME_SIZE`] or `out` are
    /// truncated. Call repeatedly until `Ok(None)`, since several frames may arrive
    /// between interrupts. An error drops one frame; keep draining after it.
    pub fn drain(&mut self, out: &mut [u8], dma: &impl Dma) -> Result<Option<Frame>, ReceiveError> {
        // Don't read status ahead of the ownership bits hardware released.
        fence(Ordering::Acquire);
        let scan = self.scan();

        let (release, frame) = match (scan.start, scan.end) {
            (Some(start), Some((end, status))) => (end + 1, Some((start, end, status))),
            // A whole ring of data with no end can never complete. Recycle all of it.
            _ if scan.visited == self.ring.capacity() => (scan.visited, None),
            (Some(start), None) => (start, None),
            (None, _) => (scan.visited, None),
        };

        let result = match frame {
            Some(_) if scan.errors != 0 => Err(ReceiveError::Errored {
                errors: scan.errors,
            }),
            Some((_, _, status)) if status.length == 0 => Err(ReceiveError::ZeroLength),
            Some((start, end, status)) => {
                let len = self.copy_frame(start, end, status.length, out);
                Ok(Some(len))
            }
            None => Ok(None),
        };

        let discarded = match frame {
            Some((start, _, _)) => start,
            None => release,
        };
        self.stats.discarded = self.stats.discarded.wrapping_add(discarded as u32);
        if discarded > 0 {
            #[cfg(feature = "defmt")]
            defmt::debug!("Recycled {=usize} receive descriptors without a frame", discarded);
        }

        for _ in 0..release {
            let index = self.ring.cursor();
            self.ring
                .descriptor(index)
                .release(self.ring.is_last(index));
            self.ring.step();
        }
        if release > 0 {
            fence(Ordering::SeqCst);
            dma.resume_receive();
        }

        match result {
            Ok(Some(len)) => {
                self.stats.frames = self.stats.frames.wrapping_add(1);
                Ok(Some(Frame {
                    len,
                    more: self.has_pending(),
                }))
            }
            Ok(None) => Ok(None),
            Err(err) => {
                self.stats.errors = self.stats.errors.wrapping_add(1);
                #[cfg(feature = "defmt")]
                defmt::warn!("Dropped received frame: {}", err);
                Err(err)
            }
        }
    }

    /// Copy descriptors `start..=end`, as offsets from the cursor, into `out`.
    fn copy_frame(&self, start: usize, end: usize, length: usize, out: &mut [u8]) -> usize {
        let mut remaining = length.min(MAX_FRAME_SIZE).min(out.len());
        let mut written = 0;
        let mut index = self.ring.cursor();
        for _ in 0..start {
            index = self.ring.advance(index);
        }
        for _ in start..=end {
            let n = remaining.min(self.ring.buffer_size());
            out[written..written + n].copy_from_slice(&self.ring.buffer(index)[..n]);
            written += n;
            remaining -= n;
            index = self.ring.advance(index);
        }
        written
    }
}
