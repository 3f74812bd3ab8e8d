//! A MAC backend plus its transmit and receive rings.

use crate::{
    AddressFilter, Backend, Bridge, FilterEntry, LinkConfig, MAX_FRAME_SIZE, Notify,
    ReceiveError, RxRing, TxRing, bd::Ring,
};

/// Ethernet header plus payload, without the CRC the MAC appends.
const MAX_TRANSMISSION_UNIT: usize = MAX_FRAME_SIZE - 4;

/// Owns the rings and the backend, and runs every ring mutation.
///
/// The driver implements the `phy` interfaces from [`smoltcp`]. Use
/// [`process_events`](Driver::process_events) instead when frames are delivered
/// some other way.
pub struct Driver<'a, B: Backend> {
    backend: B,
    tx: TxRing<'a, B::TxDescriptor>,
    rx: RxRing<'a, B::RxDescriptor>,
    bridge: &'a Bridge,
    frame: [u8; MAX_FRAME_SIZE],
}

impl<'a, B: Backend> Driver<'a, B> {
    /// Take ownership of the backend and both rings.
    ///
    /// The transmitter starts out ready, so [`Bridge::tx_ready`] is signaled.
    pub fn new(
        backend: B,
        tx_ring: Ring<'a, B::TxDescriptor>,
        rx_ring: Ring<'a, B::RxDescriptor>,
        bridge: &'a Bridge,
    ) -> Self {
        bridge.tx_ready().notify();
        Self {
            backend,
            tx: TxRing::new(tx_ring),
            rx: RxRing::new(rx_ring),
            bridge,
            frame: [0; MAX_FRAME_SIZE],
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn tx(&self) -> &TxRing<'a, B::TxDescriptor> {
        &self.tx
    }

    pub fn rx(&self) -> &RxRing<'a, B::RxDescriptor> {
        &self.rx
    }

    /// Queue a frame for transmission.
    pub fn send(&mut self, frame: &[u8]) -> Result<(), crate::TransmitError> {
        self.tx
            .enqueue(frame, &self.backend, self.bridge.tx_ready())
    }

    /// Handle whatever the interrupt handler posted.
    ///
    /// A transmit completion signals [`Bridge::tx_ready`] if the next slot is free.
    /// A receive event drains every complete frame into `deliver`; frames with
    /// errors are dropped. Returns the number of frames delivered.
    pub fn process_events(&mut self, mut deliver: impl FnMut(&[u8])) -> usize {
        if self.bridge.take_transmitted() && self.tx.has_capacity() {
            self.bridge.tx_ready().notify();
        }

        let mut delivered = 0;
        if self.bridge.take_received() {
            loop {
                match self.rx.drain(&mut self.frame, &self.backend) {
                    Ok(Some(frame)) => {
                        deliver(&self.frame[..frame.len]);
                        delivered += 1;
                    }
                    Ok(None) => break,
                    Err(ReceiveError::Errored { .. } | ReceiveError::ZeroLength) => continue,
                }
            }
        }
        delivered
    }

    /// Rebuild the MAC's address filter from the stack's filter table.
    pub fn update_address_filter(&mut self, entries: &[FilterEntry]) {
        let filter = AddressFilter::rebuild_with(entries, B::EXACT_MATCH_SLOTS, B::filter_hash);
        self.backend.apply_filter(&filter);
    }

    /// Apply the speed and duplex negotiated by the PHY.
    ///
    /// If the backend has to stop the MAC, frames still queued for transmit are
    /// lost and both rings start over from their first descriptor.
    pub fn update_link(&mut self, link: LinkConfig) {
        #[cfg(feature = "defmt")]
        defmt::info!("Link {} {}", link.speed, link.duplex);
        let rewound = self.backend.stop();
        if rewound {
            self.tx.reset();
            self.rx.reset();
        }
        self.backend.apply_link(link);
        if rewound {
            self.backend.restart();
            self.bridge.tx_ready().notify();
        }
    }

    /// Copy the next good frame into the frame buffer.
    fn next_frame(&mut self) -> Option<usize> {
        loop {
            match self.rx.drain(&mut self.frame, &self.backend) {
                Ok(Some(frame)) => return Some(frame.len),
                Ok(None) => return None,
                Err(_) => continue,
            }
        }
    }
}

#[doc(hidden)]
pub struct TxToken<'a, 'r, B: Backend> {
    tx: &'a mut TxRing<'r, B::TxDescriptor>,
    backend: &'a B,
    bridge: &'a Bridge,
}

#[doc(hidden)]
pub struct RxToken<'a> {
    frame: &'a [u8],
}

impl<B: Backend> smoltcp::phy::TxToken for TxToken<'_, '_, B> {
    fn consume<R, F>(self, len: usize, f: F) -> R
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        // The token only exists while the cursor slot is free, and smoltcp stays
        // within the advertised MTU.
        match self
            .tx
            .enqueue_with(len, self.backend, self.bridge.tx_ready(), f)
        {
            Ok(result) => result,
            Err(err) => panic!("transmit token could not be used: {err:?}"),
        }
    }
}

impl smoltcp::phy::RxToken for RxToken<'_> {
    fn consume<R, F>(self, f: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        f(self.frame)
    }
}

impl<'r, B: Backend> smoltcp::phy::Device for Driver<'r, B> {
    type RxToken<'a>
        = RxToken<'a>
    where
        Self: 'a;
    type TxToken<'a>
        = TxToken<'a, 'r, B>
    where
        Self: 'a;

    fn receive(
        &mut self,
        _: smoltcp::time::Instant,
    ) -> Option<(Self::RxToken<'_>, Self::TxToken<'_>)> {
        if !self.tx.has_capacity() {
            return None;
        }
        let len = self.next_frame()?;
        let rx = RxToken {
            frame: &self.frame[..len],
        };
        let tx = TxToken {
            tx: &mut self.tx,
            backend: &self.backend,
            bridge: self.bridge,
        };
        Some((rx, tx))
    }

    fn transmit(&mut self, _: smoltcp::time::Instant) -> Option<Self::TxToken<'_>> {
        if !self.tx.has_capacity() {
            return None;
        }
        Some(TxToken {
            tx: &mut self.tx,
            backend: &self.backend,
            bridge: self.bridge,
        })
    }

    fn capabilities(&self) -> smoltcp::phy::DeviceCapabilities {
        let mtu = self.tx.max_frame_len().min(MAX_TRANSMISSION_UNIT);

        let mut caps = smoltcp::phy::DeviceCapabilities::default();
        caps.medium = smoltcp::phy::Medium::Ethernet;
        caps.max_transmission_unit = mtu;
        caps.max_burst_size = Some(mtu);

        self.backend.capabilities(&mut caps);
        caps
    }
}
