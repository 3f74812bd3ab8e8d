//! DMA buffer descriptor rings for Ethernet MACs.
//!
//! The crate moves whole frames between a network stack and a MAC's DMA engine
//! through two fixed-size circular arrays of buffer descriptors. Each descriptor
//! is owned either by software or by the DMA engine, and the ownership bit is the
//! only synchronization between the two.
//!
//! - [`TxRing`] copies outgoing frames into the next free slot and starts the DMA
//!   engine. A slot still in flight is reported as [`TransmitError::RingFull`].
//! - [`RxRing`] reassembles frames that may span several descriptors, then hands
//!   the descriptors back to the DMA engine.
//! - [`AddressFilter`] computes the multicast hash table and exact-match slots.
//! - [`Bridge`] is the only thing an interrupt handler touches. It posts events;
//!   the rings are mutated by [`Driver::process_events`] in task context.
//!
//! Descriptor layouts live in [`bd::gmac`] and [`bd::enet`]. Register access sits
//! behind the [`Dma`] and [`Backend`] traits; enable the `imxrt` feature for the
//! i.MX RT ENET backend.

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod bd;
mod driver;
mod event;
mod filter;
#[cfg(feature = "imxrt")]
pub mod imxrt;
mod rx;
mod tx;

#[cfg(test)]
mod testing;

pub use bd::{Descriptor, IoBuffers, Ring, RxDescriptor, RxStatus, TxDescriptor};
pub use driver::{Driver, RxToken, TxToken};
pub use event::{Bridge, Event, InterruptStatus, Notify};
pub use filter::{AddressFilter, FilterEntry, HashTable, MAX_EXACT_MATCH, hash};
pub use rx::{Frame, RxRing, RxStats};
pub use tx::{TxRing, TxStats};

pub use smoltcp;
use smoltcp::wire::EthernetAddress;

/// Largest frame the receive path will reassemble, including the CRC.
pub const MAX_FRAME_SIZE: usize = 1518;

/// Allows independent transmit and receive functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Duplex {
    /// Transmit and receive functions cannot overlap.
    ///
    /// Specifically, you cannot transmit frames while you're receiving frames.
    /// Similarly, you cannot receive frames while you're sending frames.
    Half,
    /// The MAC can transmit and receive simultaneously.
    Full,
}

/// Negotiated line rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Speed {
    Mbps10,
    Mbps100,
}

/// Link parameters reported by the PHY after auto-negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkConfig {
    pub speed: Speed,
    pub duplex: Duplex,
}

/// A ring could not be constructed.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The ring needs at least one descriptor.
    EmptyRing,
    /// The buffer size isn't a multiple of the layout's alignment, or falls
    /// outside the sizes the descriptor supports.
    BufferSize { size: usize },
    /// The byte storage can't back every descriptor.
    BufferStorage { required: usize, provided: usize },
}

/// A frame was not queued for transmission.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// The frame doesn't fit in one transmit buffer. Fragment or drop it.
    OversizedFrame { len: usize, max: usize },
    /// The DMA engine still owns the next slot. Retry once notified.
    RingFull,
}

/// A complete frame was received, but it was dropped.
///
/// The frame's descriptors have already been returned to the DMA engine.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReceiveError {
    /// A descriptor in the frame carried error bits.
    Errored { errors: u32 },
    /// The final descriptor declared no payload.
    ZeroLength,
}

/// The DMA engine's doorbells.
///
/// Implementations write the hardware registers that make the DMA engine
/// re-read its descriptors.
pub trait Dma {
    /// Tell the DMA engine that a transmit descriptor is ready.
    fn start_transmit(&self);
    /// Tell the DMA engine that receive descriptors are available again.
    fn resume_receive(&self) {}
}

/// A MAC that owns a pair of descriptor rings.
pub trait Backend: Dma {
    type TxDescriptor: TxDescriptor;
    type RxDescriptor: RxDescriptor;

    /// Number of unicast addresses the MAC matches exactly, beyond its own.
    const EXACT_MATCH_SLOTS: usize;

    /// Hash an address into the 64-bit filter table.
    fn filter_hash(address: &EthernetAddress) -> u8 {
        filter::hash(address)
    }

    /// Commit a rebuilt address filter to the MAC.
    fn apply_filter(&mut self, filter: &AddressFilter);

    /// Stop the MAC ahead of a link change.
    ///
    /// Returns `true` if stopping rewound the DMA engine to the first descriptor
    /// of each ring. The rings are then reset, and [`restart`](Backend::restart)
    /// runs once the link is applied.
    fn stop(&mut self) -> bool {
        false
    }

    /// Start the MAC again after [`stop`](Backend::stop) returned `true`.
    fn restart(&mut self) {}

    /// Commit the negotiated link speed and duplex to the MAC.
    fn apply_link(&mut self, link: LinkConfig);

    /// Adjust the capabilities reported to the network stack.
    fn capabilities(&self, caps: &mut smoltcp::phy::DeviceCapabilities) {
        let _ = caps;
    }
}
