//! Cadence GMAC buffer descriptors, as found on Microchip SAM E70 / V71 parts.
//!
//! Each descriptor is two words. Software and hardware use *different* polarities
//! for the ownership bit on each path:
//!
//! - transmit: `USED` set means software owns the slot. Software clears it to
//!   queue a frame; hardware sets it again once the frame is sent.
//! - receive: `OWNERSHIP` set means software owns the slot. Hardware sets it
//!   after filling the buffer; software clears it to re-arm the slot.

use core::sync::atomic::{AtomicU32, Ordering};

use super::{Descriptor, RxDescriptor, RxStatus, TxDescriptor};

pub const TX_USED: u32 = 1 << 31;
pub const TX_WRAP: u32 = 1 << 30;
pub const TX_LAST: u32 = 1 << 15;
pub const TX_LENGTH: u32 = 0x3FFF;

pub const RX_ADDRESS: u32 = 0xFFFF_FFFC;
pub const RX_WRAP: u32 = 1 << 1;
pub const RX_OWNERSHIP: u32 = 1 << 0;

pub const RX_EOF: u32 = 1 << 15;
pub const RX_SOF: u32 = 1 << 14;
/// FCS status; only meaningful when the MAC forwards frames with bad FCS.
pub const RX_BAD_FCS: u32 = 1 << 13;
pub const RX_LENGTH: u32 = 0x1FFF;

#[repr(C, align(8))]
#[derive(Debug, Default)]
pub struct TxBD {
    pub address: AtomicU32,
    pub status: AtomicU32,
}

impl TxBD {
    pub const fn new() -> Self {
        Self {
            address: AtomicU32::new(0),
            status: AtomicU32::new(0),
        }
    }
}

impl Descriptor for TxBD {
    const BUFFER_ALIGN: usize = 8;
    const MAX_BUFFER_SIZE: usize = TX_LENGTH as usize;

    fn reset(&self, buffer: *mut u8, wrap: bool) {
        self.address.store(buffer as u32, Ordering::Relaxed);
        let wrap = if wrap { TX_WRAP } else { 0 };
        self.status.store(TX_USED | wrap, Ordering::SeqCst);
    }

    fn is_software_owned(&self) -> bool {
        self.status.load(Ordering::Acquire) & TX_USED != 0
    }

    fn wraps(&self) -> bool {
        self.status.load(Ordering::Relaxed) & TX_WRAP != 0
    }
}

impl TxDescriptor for TxBD {
    fn submit(&self, len: usize, wrap: bool) {
        let wrap = if wrap { TX_WRAP } else { 0 };
        // One store: clearing USED hands the slot over with length and flags.
        self.status
            .store(wrap | TX_LAST | (len as u32 & TX_LENGTH), Ordering::SeqCst);
    }
}

#[repr(C, align(8))]
#[derive(Debug, Default)]
pub struct RxBD {
    pub address: AtomicU32,
    pub status: AtomicU32,
}

impl RxBD {
    pub const fn new() -> Self {
        Self {
            address: AtomicU32::new(0),
            status: AtomicU32::new(0),
        }
    }
}

impl Descriptor for RxBD {
    /// The DMA engine sizes receive buffers in 64 byte units.
    const BUFFER_ALIGN: usize = 64;
    const MAX_BUFFER_SIZE: usize = 255 * 64;

    fn reset(&self, buffer: *mut u8, wrap: bool) {
        self.status.store(0, Ordering::Relaxed);
        let wrap = if wrap { RX_WRAP } else { 0 };
        self.address
            .store((buffer as u32 & RX_ADDRESS) | wrap, Ordering::SeqCst);
    }

    fn is_software_owned(&self) -> bool {
        self.address.load(Ordering::Acquire) & RX_OWNERSHIP != 0
    }

    fn wraps(&self) -> bool {
        self.address.load(Ordering::Relaxed) & RX_WRAP != 0
    }
}

impl RxDescriptor for RxBD {
    fn status(&self) -> RxStatus {
        let status = self.status.load(Ordering::Acquire);
        RxStatus {
            start_of_frame: status & RX_SOF != 0,
            end_of_frame: status & RX_EOF != 0,
            length: (status & RX_LENGTH) as usize,
            errors: status & RX_BAD_FCS,
        }
    }

    fn release(&self, wrap: bool) {
        if wrap {
            self.address.fetch_or(RX_WRAP, Ordering::Relaxed);
        }
        self.address.fetch_and(!RX_OWNERSHIP, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::Ordering;
    use std::ptr::addr_of;

    use super::*;

    #[test]
    fn field_offsets() {
        let txbd = TxBD::new();
        let start = &txbd as *const _ as *const u8;
        assert_eq!(start, addr_of!(txbd.address).cast());
        assert_eq!(unsafe { start.add(0x4) }, addr_of!(txbd.status).cast());
        assert_eq!(core::mem::size_of::<TxBD>(), 8);

        let rxbd = RxBD::new();
        let start = &rxbd as *const _ as *const u8;
        assert_eq!(start, addr_of!(rxbd.address).cast());
        assert_eq!(unsafe { start.add(0x4) }, addr_of!(rxbd.status).cast());
        assert_eq!(core::mem::size_of::<RxBD>(), 8);
    }

    #[test]
    fn submit_clears_used_and_keeps_wrap() {
        let txbd = TxBD::new();
        txbd.reset(core::ptr::null_mut(), true);
        assert!(txbd.is_software_owned());
        txbd.submit(64, true);
        assert!(!txbd.is_software_owned());
        assert!(txbd.wraps());
        assert_eq!(
            txbd.status.load(Ordering::Relaxed),
            TX_WRAP | TX_LAST | 64
        );
    }

    #[test]
    fn receive_status_decoding() {
        let rxbd = RxBD::new();
        rxbd.reset(core::ptr::null_mut(), false);
        assert!(!rxbd.is_software_owned());

        rxbd.status.store(RX_SOF | RX_EOF | 60, Ordering::Relaxed);
        rxbd.address.fetch_or(RX_OWNERSHIP, Ordering::Relaxed);
        assert!(rxbd.is_software_owned());
        assert_eq!(
            rxbd.status(),
            RxStatus {
                start_of_frame: true,
                end_of_frame: true,
                length: 60,
                errors: 0,
            }
        );

        rxbd.release(false);
        assert!(!rxbd.is_software_owned());
        assert!(!rxbd.wraps());
    }

    #[test]
    fn release_restores_wrap() {
        let rxbd = RxBD::new();
        rxbd.reset(core::ptr::null_mut(), true);
        rxbd.address.fetch_or(RX_OWNERSHIP, Ordering::Relaxed);
        rxbd.release(true);
        assert!(rxbd.wraps());
        assert!(!rxbd.is_software_owned());
    }
}
