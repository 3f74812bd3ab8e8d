//! i.MX RT ENET enhanced buffer descriptors.
//!
//! Definitions come from the i.MX RT 1170 reference manual, revision 2.
//! On both paths, `READY` / `EMPTY` set means the DMA engine owns the slot.
//!
//! The ENET never marks the first descriptor of a frame. Receive buffers must hold
//! a whole frame (see [`RxBD::MIN_BUFFER_SIZE`](super::Descriptor::MIN_BUFFER_SIZE)),
//! so every filled receive descriptor reports start-of-frame and frames never span
//! descriptors.

use core::sync::atomic::{AtomicU16, AtomicU32, Ordering};

use super::{Descriptor, IoBuffers, RxDescriptor, RxStatus, TxDescriptor};
use crate::MAX_FRAME_SIZE;

pub type TransmitBuffers<const COUNT: usize, const MTU: usize> = IoBuffers<TxBD, COUNT, MTU>;
pub type ReceiveBuffers<const COUNT: usize, const MTU: usize> = IoBuffers<RxBD, COUNT, MTU>;

#[repr(C)]
#[derive(Debug, Default)]
pub struct TxBD {
    pub data_length: AtomicU16,
    pub flags: AtomicU16,
    pub data_buffer_pointer: AtomicU32,
    pub errors: AtomicU16,
    pub control: AtomicU16,
    pub launch_time: AtomicU32,
    _reserved0: [u16; 1],
    pub last_bdu: AtomicU16,
    pub timestamp_1588: AtomicU32,
    _reserved1: [u16; 4],
}

pub const TX_FLAGS_READY: u16 = 1 << 15;
pub const TX_FLAGS_WRAP: u16 = 1 << 13;
pub const TX_FLAGS_LAST_IN: u16 = 1 << 11;
pub const TX_FLAGS_TRANSMIT_CRC: u16 = 1 << 10;

/// Receive buffer sizes are programmed in 16 byte units.
const BUFFER_ALIGN: usize = 16;
/// Largest value of the MRBR register.
const MAX_BUFFER_SIZE: usize = 0x3FF0;

impl Descriptor for TxBD {
    const BUFFER_ALIGN: usize = BUFFER_ALIGN;
    const MAX_BUFFER_SIZE: usize = MAX_BUFFER_SIZE;

    fn reset(&self, buffer: *mut u8, wrap: bool) {
        self.data_buffer_pointer
            .store(buffer as _, Ordering::Relaxed);
        self.data_length.store(0, Ordering::Relaxed);
        let wrap = if wrap { TX_FLAGS_WRAP } else { 0 };
        self.flags.store(wrap, Ordering::SeqCst);
    }

    fn is_software_owned(&self) -> bool {
        self.flags.load(Ordering::SeqCst) & TX_FLAGS_READY == 0
    }

    fn wraps(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & TX_FLAGS_WRAP != 0
    }
}

impl TxDescriptor for TxBD {
    fn submit(&self, len: usize, wrap: bool) {
        self.data_length.store(len as _, Ordering::Relaxed);
        let wrap = if wrap { TX_FLAGS_WRAP } else { 0 };
        self.flags.store(
            TX_FLAGS_READY | TX_FLAGS_LAST_IN | TX_FLAGS_TRANSMIT_CRC | wrap,
            Ordering::SeqCst,
        );
    }
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct RxBD {
    pub data_length: AtomicU16,
    pub flags: AtomicU16,
    pub data_buffer_pointer: AtomicU32,
    pub status: AtomicU16,
    pub control: AtomicU16,
    pub checksum: AtomicU16,
    pub header: AtomicU16,
    _reserved0: [u16; 1],
    pub last_bdu: AtomicU16,
    pub timestamp_1588: AtomicU32,
    _reserved1: [u16; 4],
}

pub const RX_FLAGS_EMPTY: u16 = 1 << 15;
pub const RX_FLAGS_WRAP: u16 = 1 << 13;
pub const RX_FLAGS_LAST: u16 = 1 << 11;
pub const RX_FLAGS_MISS: u16 = 1 << 8;
pub const RX_FLAGS_BROADCAST: u16 = 1 << 7;
pub const RX_FLAGS_MULTICAST: u16 = 1 << 6;
pub const RX_FLAGS_LENGTH_VIOLATION: u16 = 1 << 5;
pub const RX_FLAGS_NON_OCTET_VIOLATION: u16 = 1 << 4;
pub const RX_FLAGS_CRC_ERROR: u16 = 1 << 2;
pub const RX_FLAGS_OVERRUN: u16 = 1 << 1;
pub const RX_FLAGS_TRUNCATED: u16 = 1 << 0;

/// Only valid in the last descriptor of a frame.
pub const RX_FLAGS_ERRORS: u16 = RX_FLAGS_LENGTH_VIOLATION
    | RX_FLAGS_NON_OCTET_VIOLATION
    | RX_FLAGS_CRC_ERROR
    | RX_FLAGS_OVERRUN
    | RX_FLAGS_TRUNCATED;

impl Descriptor for RxBD {
    const BUFFER_ALIGN: usize = BUFFER_ALIGN;
    const MAX_BUFFER_SIZE: usize = MAX_BUFFER_SIZE;
    const MIN_BUFFER_SIZE: usize = MAX_FRAME_SIZE.next_multiple_of(BUFFER_ALIGN);

    fn reset(&self, buffer: *mut u8, wrap: bool) {
        self.data_buffer_pointer
            .store(buffer as _, Ordering::Relaxed);
        self.data_length.store(0, Ordering::Relaxed);
        let wrap = if wrap { RX_FLAGS_WRAP } else { 0 };
        // Zero all other flags.
        self.flags.store(RX_FLAGS_EMPTY | wrap, Ordering::SeqCst);
    }

    fn is_software_owned(&self) -> bool {
        self.flags.load(Ordering::SeqCst) & RX_FLAGS_EMPTY == 0
    }

    fn wraps(&self) -> bool {
        self.flags.load(Ordering::Relaxed) & RX_FLAGS_WRAP != 0
    }
}

impl RxDescriptor for RxBD {
    fn status(&self) -> RxStatus {
        let flags = self.flags.load(Ordering::SeqCst);
        let last = flags & RX_FLAGS_LAST != 0;
        RxStatus {
            start_of_frame: true,
            end_of_frame: last,
            length: self.data_length.load(Ordering::Relaxed) as usize,
            errors: if last {
                (flags & RX_FLAGS_ERRORS) as u32
            } else {
                0
            },
        }
    }

    fn release(&self, wrap: bool) {
        let wrap = if wrap { RX_FLAGS_WRAP } else { 0 };
        self.flags.store(RX_FLAGS_EMPTY | wrap, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::Ordering;
    use std::ptr::addr_of;

    use super::*;

    #[test]
    fn tx_field_offsets() {
        let txbd = TxBD::default();
        let start = &txbd as *const _ as *const u8;
        assert_eq!(unsafe { start.add(0x0) }, addr_of!(txbd.data_length).cast());
        assert_eq!(unsafe { start.add(0x2) }, addr_of!(txbd.flags).cast());
        assert_eq!(
            unsafe { start.add(0x4) },
            addr_of!(txbd.data_buffer_pointer).cast()
        );
        assert_eq!(unsafe { start.add(0x8) }, addr_of!(txbd.errors).cast());
        assert_eq!(unsafe { start.add(0xA) }, addr_of!(txbd.control).cast());
        assert_eq!(unsafe { start.add(0xC) }, addr_of!(txbd.launch_time).cast());
        assert_eq!(unsafe { start.add(0x12) }, addr_of!(txbd.last_bdu).cast());
        assert_eq!(
            unsafe { start.add(0x14) },
            addr_of!(txbd.timestamp_1588).cast()
        );
    }

    #[test]
    fn rx_field_offsets() {
        let rxbd = RxBD::default();
        let start = &rxbd as *const _ as *const u8;
        assert_eq!(unsafe { start.add(0x0) }, addr_of!(rxbd.data_length).cast());
        assert_eq!(unsafe { start.add(0x2) }, addr_of!(rxbd.flags).cast());
        assert_eq!(
            unsafe { start.add(0x4) },
            addr_of!(rxbd.data_buffer_pointer).cast()
        );
        assert_eq!(unsafe { start.add(0x8) }, addr_of!(rxbd.status).cast());
        assert_eq!(unsafe { start.add(0xA) }, addr_of!(rxbd.control).cast());
        assert_eq!(unsafe { start.add(0xC) }, addr_of!(rxbd.checksum).cast());
        assert_eq!(unsafe { start.add(0xE) }, addr_of!(rxbd.header).cast());
        assert_eq!(unsafe { start.add(0x12) }, addr_of!(rxbd.last_bdu).cast());
        assert_eq!(
            unsafe { start.add(0x14) },
            addr_of!(rxbd.timestamp_1588).cast()
        );
    }

    #[test]
    fn ready_means_hardware_owned() {
        let txbd = TxBD::default();
        txbd.reset(core::ptr::null_mut(), false);
        assert!(txbd.is_software_owned());
        txbd.submit(42, false);
        assert!(!txbd.is_software_owned());
        assert_eq!(txbd.data_length.load(Ordering::Relaxed), 42);
        txbd.flags.fetch_and(!TX_FLAGS_READY, Ordering::Relaxed);
        assert!(txbd.is_software_owned());
    }

    #[test]
    fn errors_only_reported_on_last() {
        let rxbd = RxBD::default();
        rxbd.reset(core::ptr::null_mut(), true);
        assert!(!rxbd.is_software_owned());

        rxbd.data_length.store(1536, Ordering::Relaxed);
        rxbd.flags
            .store(RX_FLAGS_WRAP | RX_FLAGS_TRUNCATED, Ordering::Relaxed);
        let status = rxbd.status();
        assert!(status.start_of_frame);
        assert!(!status.end_of_frame);
        assert_eq!(status.errors, 0);

        rxbd.flags.store(
            RX_FLAGS_WRAP | RX_FLAGS_LAST | RX_FLAGS_CRC_ERROR | RX_FLAGS_MULTICAST,
            Ordering::Relaxed,
        );
        let status = rxbd.status();
        assert!(status.end_of_frame);
        assert_eq!(status.errors, RX_FLAGS_CRC_ERROR as u32);

        rxbd.release(true);
        assert!(!rxbd.is_software_owned());
        assert!(rxbd.wraps());
        assert_eq!(rxbd.status().errors, 0);
    }
}
