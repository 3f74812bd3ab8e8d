//! Host-side stand-ins for the DMA engine.

use core::{cell::Cell, sync::atomic::Ordering};

use crate::{
    Dma,
    bd::{Ring, enet, gmac},
};

/// Counts doorbell writes.
#[derive(Default)]
pub struct MockDma {
    pub starts: Cell<usize>,
    pub resumes: Cell<usize>,
}

impl Dma for MockDma {
    fn start_transmit(&self) {
        self.starts.set(self.starts.get() + 1);
    }
    fn resume_receive(&self) {
        self.resumes.set(self.resumes.get() + 1);
    }
}

/// Backing memory for a ring on the heap.
pub struct Storage<D> {
    pub descriptors: Vec<D>,
    pub buffers: Vec<u8>,
    pub buffer_size: usize,
}

impl Storage<gmac::TxBD> {
    pub fn tx(capacity: usize, buffer_size: usize) -> Self {
        Self {
            descriptors: (0..capacity).map(|_| gmac::TxBD::new()).collect(),
            buffers: vec![0; capacity * buffer_size],
            buffer_size,
        }
    }
}

impl Storage<gmac::RxBD> {
    pub fn rx(capacity: usize, buffer_size: usize) -> Self {
        Self {
            descriptors: (0..capacity).map(|_| gmac::RxBD::new()).collect(),
            buffers: vec![0; capacity * buffer_size],
            buffer_size,
        }
    }
}

impl Storage<enet::RxBD> {
    pub fn enet_rx(capacity: usize, buffer_size: usize) -> Self {
        Self {
            descriptors: (0..capacity).map(|_| enet::RxBD::default()).collect(),
            buffers: vec![0; capacity * buffer_size],
            buffer_size,
        }
    }
}

impl<D: crate::Descriptor> Storage<D> {
    pub fn ring(&mut self) -> Ring<'_, D> {
        Ring::new(&mut self.descriptors, &mut self.buffers, self.buffer_size).unwrap()
    }
}

/// Pretend the GMAC finished sending the frame in `index`.
pub fn complete_transmit(ring: &Ring<'_, gmac::TxBD>, index: usize) {
    ring.descriptor(index)
        .status
        .fetch_or(gmac::TX_USED, Ordering::SeqCst);
}

/// Pretend the GMAC wrote `payload` into `index` and released it to software.
pub fn fill_receive(
    ring: &mut Ring<'_, gmac::RxBD>,
    index: usize,
    payload: &[u8],
    status: u32,
) {
    ring.buffer_mut(index)[..payload.len()].copy_from_slice(payload);
    let descriptor = ring.descriptor(index);
    descriptor.status.store(status, Ordering::Relaxed);
    descriptor
        .address
        .fetch_or(gmac::RX_OWNERSHIP, Ordering::SeqCst);
}

/// Pretend the ENET wrote `payload` into `index` and cleared `EMPTY`.
pub fn fill_enet_receive(
    ring: &mut Ring<'_, enet::RxBD>,
    index: usize,
    payload: &[u8],
    flags: u16,
) {
    ring.buffer_mut(index)[..payload.len()].copy_from_slice(payload);
    let descriptor = ring.descriptor(index);
    descriptor
        .data_length
        .store(payload.len() as u16, Ordering::Relaxed);
    let wrap = descriptor.flags.load(Ordering::Relaxed) & enet::RX_FLAGS_WRAP;
    descriptor
        .flags
        .store((flags | wrap) & !enet::RX_FLAGS_EMPTY, Ordering::SeqCst);
}
