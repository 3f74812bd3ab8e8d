//! i.MX RT ENET backend.
//!
//! Pair [`Enet`] with rings built from [`bd::enet`](crate::bd::enet) storage:
//!
//! ```ignore
//! use bdring::{Bridge, Driver, bd::enet::{ReceiveBuffers, TransmitBuffers}};
//!
//! static TX: StaticCell<TransmitBuffers<4, 1536>> = StaticCell::new();
//! static RX: StaticCell<ReceiveBuffers<4, 1536>> = StaticCell::new();
//! static BRIDGE: Bridge = Bridge::new();
//!
//! let tx = TX.init(TransmitBuffers::new()).take();
//! let rx = RX.init(ReceiveBuffers::new()).take();
//! let mut enet = bdring::imxrt::Enet::new(instance, &tx, &rx, source_clock_hz, &mac);
//! enet.enable_interrupts(true);
//! enet.enable_mac(true);
//! let driver = Driver::new(enet, tx, rx, &BRIDGE);
//! ```
//!
//! In the ENET interrupt handler, call [`interrupt_status`] and post the result to
//! the [`Bridge`](crate::Bridge).

use imxrt_ral as ral;

pub use mdio::miim::{Read as MiimRead, Write as MiimWrite};

use crate::{
    AddressFilter, Backend, Dma, Duplex, InterruptStatus, LinkConfig, MAX_FRAME_SIZE, Speed,
    bd::{Ring, enet},
};

/// The ENET hashes with the top six bits of the frame CRC.
pub fn filter_hash(address: &smoltcp::wire::EthernetAddress) -> u8 {
    const CRC32_POLY: u32 = 0xEDB8_8320;
    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in address.as_bytes() {
        let mut data = byte;
        for _ in 0..8 {
            let feedback = (crc ^ u32::from(data)) & 1 != 0;
            crc = (crc >> 1) ^ if feedback { CRC32_POLY } else { 0 };
            data >>= 1;
        }
    }
    (crc >> 26) as u8 & 0x3F
}

/// Read and acknowledge the transmit and receive interrupt causes.
///
/// Safe to call from the interrupt handler; it only touches `EIR`.
pub fn interrupt_status<const N: u8>(enet: &ral::enet::Instance<N>) -> InterruptStatus {
    let (txf, rxf) = ral::read_reg!(ral::enet, enet, EIR, TXF, RXF);
    ral::write_reg!(ral::enet, enet, EIR, TXF: txf, RXF: rxf);
    InterruptStatus {
        transmitted: txf != 0,
        received: rxf != 0,
    }
}

/// Ethernet MAC and related functions.
///
/// The MDIO interface is always enabled. To generally use the MDIO interface,
/// use [`MiimRead`] and [`MiimWrite`]. Once your driver is configured, use
/// [`enable_mac`](Enet::enable_mac) to enable the transmit and receive datapaths.
///
/// The driver optimizes for hardware-based checksumming as much as possible, but
/// this only applies to the network and transport layers.
pub struct Enet<const N: u8> {
    enet: ral::enet::Instance<N>,
}

impl<const N: u8> Enet<N> {
    pub fn new(
        enet: ral::enet::Instance<N>,
        tx_ring: &Ring<'_, enet::TxBD>,
        rx_ring: &Ring<'_, enet::RxBD>,
        source_clock_hz: u32,
        mac: &[u8; 6],
    ) -> Self {
        #[cfg(feature = "defmt")]
        defmt::info!("Initializing ENET{=u8}", N);

        // Reset the module.
        ral::modify_reg!(ral::enet, enet, ECR, RESET: 1);

        ral::modify_reg!(ral::enet, enet, ECR,
            DBSWP: 1,   // Swap data for this little endian device.
            EN1588: 1,  // Use enhanced buffer descriptors.
            RESET: 0,   // I think this auto-clears, but just in case...
            DBGEN: 0,   // Keep running the MAC in debug mode.
        );

        // Interrupts stay off until the user asks for them.
        ral::write_reg!(ral::enet, enet, EIMR, 0);

        // Receive rings only exist with buffers that hold a whole frame.
        ral::write_reg!(ral::enet, enet, MRBR, R_BUF_SIZE: (rx_ring.buffer_size() >> 4) as u32);

        ral::write_reg!(ral::enet, enet, TDSR, tx_ring.as_ptr() as _);
        ral::write_reg!(ral::enet, enet, RDSR, rx_ring.as_ptr() as _);

        const SMI_MDC_FREQUENCY_HZ: u32 = 2_500_000;
        let mii_speed = source_clock_hz.div_ceil(2 * SMI_MDC_FREQUENCY_HZ) - 1;
        let hold_time = 10_u32.div_ceil(1_000_000_000 / source_clock_hz) - 1;
        ral::modify_reg!(ral::enet, enet, MSCR, HOLDTIME: hold_time, MII_SPEED: mii_speed);

        ral::modify_reg!(ral::enet, enet, RCR,
            // Default max frame length without VLAN tags.
            MAX_FL: MAX_FRAME_SIZE as u32,
            LOOP: 0,
            PROM: 0,
            // Broadcasts hash to bit 0 of the group table; let them through
            // regardless.
            BC_REJ: 0,
            PAUFWD: 0,
            // Drop padding and CRC before frames reach the receive ring.
            PADEN: 1,
            CRCFWD: 1,
            NLC: 1,
            FCE: 1,
            // MII or RMII mode; must be set.
            MII_MODE: 1,
            // Default to MII at 100Mbit/sec; see apply_link.
            RMII_MODE: 0,
            RMII_10T: 0,
        );

        ral::modify_reg!(ral::enet, enet, TCR,
            // Frames from the transmit ring never carry a CRC.
            CRCFWD: 0,
            ADDINS: 0,
        );

        // Store-and-forward on both paths; the accelerators below depend on it.
        ral::modify_reg!(ral::enet, enet, TFWR, STRFWD: 1);
        ral::write_reg!(ral::enet, enet, RSFL, 0);

        ral::modify_reg!(ral::enet, enet, RACC,
            LINEDIS: 1,
            PRODIS: 1,
            IPDIS: 1,
            PADREM: 1,
        );
        ral::modify_reg!(ral::enet, enet, TACC,
            PROCHK: 1,
            IPCHK: 1,
        );

        // Empty filters until the stack asks for groups.
        ral::write_reg!(ral::enet, enet, GAUR, 0);
        ral::write_reg!(ral::enet, enet, GALR, 0);
        ral::write_reg!(ral::enet, enet, IAUR, 0);
        ral::write_reg!(ral::enet, enet, IALR, 0);

        // Commit the MAC address so we can match against it in the receive path.
        ral::write_reg!(
            ral::enet,
            enet,
            PALR,
            (mac[0] as u32) << 24 | (mac[1] as u32) << 16 | (mac[2] as u32) << 8 | (mac[3] as u32)
        );
        ral::write_reg!(
            ral::enet,
            enet,
            PAUR,
            (mac[4] as u32) << 24 | (mac[5] as u32) << 16
        );

        Self { enet }
    }

    /// Enable (`true`) or disable (`false`) the MAC.
    ///
    /// A disabled MAC cannot receive or send frames. By default, the MAC is disabled,
    /// and you'll need to enable it once you've completed driver configuration.
    ///
    /// Disabling the MAC rewinds the DMA engine to the first descriptor. Once the
    /// rings are in use, go through [`Driver::update_link`](crate::Driver::update_link)
    /// so that the rings are rewound with it.
    #[inline]
    pub fn enable_mac(&mut self, enable: bool) {
        ral::modify_reg!(ral::enet, self.enet, ECR, ETHEREN: enable as u32);
        if enable {
            ral::write_reg!(ral::enet, self.enet, RDAR, RDAR: 1);
        }
    }

    /// Indicates if the ENET MAC is (`true`) or is not (`false`) enabled.
    #[inline]
    pub fn is_mac_enabled(&self) -> bool {
        ral::read_reg!(ral::enet, self.enet, ECR, ETHEREN == 1)
    }

    /// Enable (`true`) or disable (`false`) the frame interrupts.
    ///
    /// When enabled, a transmitted or received frame raises the ENET interrupt.
    #[inline]
    pub fn enable_interrupts(&mut self, enable: bool) {
        ral::write_reg!(ral::enet, self.enet, EIMR, TXF: enable as u32, RXF: enable as u32);
    }

    /// Enable (`true`) or disable (`false`) RMII mode.
    ///
    /// By default, the driver is in MII mode.
    ///
    /// # Panics
    ///
    /// Panics if called while the MAC is enabled.
    #[inline]
    pub fn enable_rmii_mode(&mut self, enable: bool) {
        debug_assert!(!self.is_mac_enabled());
        ral::modify_reg!(ral::enet, self.enet, RCR, RMII_MODE: enable as u32);
    }

    /// Set the half-/full-duplex operation of the MAC.
    ///
    /// # Panics
    ///
    /// Panics if called while the MAC is enabled.
    #[inline]
    pub fn set_duplex(&mut self, duplex: Duplex) {
        debug_assert!(!self.is_mac_enabled());
        match duplex {
            Duplex::Full => {
                ral::modify_reg!(ral::enet, self.enet, TCR, FDEN: 1);
                ral::modify_reg!(ral::enet, self.enet, RCR, DRT: 0);
            }
            Duplex::Half => {
                ral::modify_reg!(ral::enet, self.enet, TCR, FDEN: 0);
                ral::modify_reg!(ral::enet, self.enet, RCR, DRT: 1);
            }
        }
    }

    /// Enable (`true`) or disable (`false`) management information database
    /// (MIB) statistic indicators.
    #[inline]
    pub fn enable_mib(&mut self, enable: bool) {
        ral::modify_reg!(ral::enet, self.enet, MIBC, MIB_DIS: !enable as u32);
    }

    /// Set to zero all management information database (MIB) statistic indicators.
    #[inline]
    pub fn clear_mib(&mut self) {
        ral::modify_reg!(ral::enet, self.enet, MIBC, MIB_CLEAR: 1);
        ral::modify_reg!(ral::enet, self.enet, MIBC, MIB_CLEAR: 0);
    }
}

impl<const N: u8> Dma for Enet<N> {
    fn start_transmit(&self) {
        ral::write_reg!(ral::enet, self.enet, TDAR, TDAR: 1);
    }

    fn resume_receive(&self) {
        ral::write_reg!(ral::enet, self.enet, RDAR, RDAR: 1);
    }
}

impl<const N: u8> Backend for Enet<N> {
    type TxDescriptor = enet::TxBD;
    type RxDescriptor = enet::RxBD;

    /// Only the station address is matched exactly.
    const EXACT_MATCH_SLOTS: usize = 0;

    fn filter_hash(address: &smoltcp::wire::EthernetAddress) -> u8 {
        filter_hash(address)
    }

    fn apply_filter(&mut self, filter: &AddressFilter) {
        let group = filter.group_table();
        ral::write_reg!(ral::enet, self.enet, GAUR, group.high());
        ral::write_reg!(ral::enet, self.enet, GALR, group.low());

        let individual = filter.unicast_table();
        ral::write_reg!(ral::enet, self.enet, IAUR, individual.high());
        ral::write_reg!(ral::enet, self.enet, IALR, individual.low());
    }

    /// Clearing ETHEREN rewinds both DMA engines.
    fn stop(&mut self) -> bool {
        let running = self.is_mac_enabled();
        if running {
            self.enable_mac(false);
        }
        running
    }

    fn restart(&mut self) {
        self.enable_mac(true);
    }

    /// # Panics
    ///
    /// Panics if called while the MAC is enabled.
    fn apply_link(&mut self, link: LinkConfig) {
        debug_assert!(!self.is_mac_enabled());
        ral::modify_reg!(ral::enet, self.enet, RCR, RMII_10T: (link.speed == Speed::Mbps10) as u32);
        self.set_duplex(link.duplex);
    }

    fn capabilities(&self, caps: &mut smoltcp::phy::DeviceCapabilities) {
        caps.checksum.ipv4 = smoltcp::phy::Checksum::None;
        caps.checksum.udp = smoltcp::phy::Checksum::None;
        caps.checksum.tcp = smoltcp::phy::Checksum::None;
        caps.checksum.icmpv4 = smoltcp::phy::Checksum::None;
    }
}

/// An error during an MII transfer.
///
/// The ENET doesn't report any; transfers wait for the MII interrupt flag.
#[non_exhaustive]
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MiiError {}

impl<const N: u8> mdio::Read for Enet<N> {
    type Error = MiiError;

    #[inline]
    fn read(&mut self, ctrl_bits: u16) -> Result<u16, Self::Error> {
        // Place the control bits in to the high half-word of the register.
        let mmfr = (ctrl_bits as u32) << 16;
        ral::write_reg!(ral::enet, self.enet, MMFR, mmfr);

        while ral::read_reg!(ral::enet, self.enet, EIR, MII == 0) {}
        ral::write_reg!(ral::enet, self.enet, EIR, MII: 1);

        // Automatically discards control bits.
        Ok(ral::read_reg!(ral::enet, self.enet, MMFR, DATA) as u16)
    }
}

impl<const N: u8> mdio::Write for Enet<N> {
    type Error = MiiError;

    #[inline]
    fn write(&mut self, ctrl_bits: u16, data_bits: u16) -> Result<(), Self::Error> {
        // Place control bits into high half-word of register.
        let mmfr = (ctrl_bits as u32) << 16 | data_bits as u32;
        ral::write_reg!(ral::enet, self.enet, MMFR, mmfr);

        while ral::read_reg!(ral::enet, self.enet, EIR, MII == 0) {}
        ral::write_reg!(ral::enet, self.enet, EIR, MII: 1);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use smoltcp::wire::EthernetAddress;

    use super::filter_hash;

    #[test]
    fn crc_hash_is_six_bits_and_stable() {
        for last in 0..=255u8 {
            let address = EthernetAddress([0x01, 0x00, 0x5E, 0x00, 0x00, last]);
            let index = filter_hash(&address);
            assert!(index < 64);
            assert_eq!(index, filter_hash(&address));
        }
    }

    #[test]
    fn crc_hash_spreads_addresses() {
        let distinct: std::collections::BTreeSet<u8> = (0..=255u8)
            .map(|last| filter_hash(&EthernetAddress([0x01, 0x00, 0x5E, 0x00, 0x00, last])))
            .collect();
        assert!(distinct.len() > 32);
    }
}
