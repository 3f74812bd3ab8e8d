//! Destination address filtering.
//!
//! A MAC matches a handful of unicast addresses exactly and everything else
//! through a 64-bit hash table: an address is accepted when the bit at its 6-bit
//! hash is set. The table is always rebuilt from scratch.

use smoltcp::wire::EthernetAddress;

/// Most exact-match unicast slots any supported MAC provides.
pub const MAX_EXACT_MATCH: usize = 3;

/// Right and left shift applied to each address byte before folding.
const FOLD: [(u32, u32); 6] = [(6, 0), (4, 2), (2, 4), (6, 0), (4, 2), (2, 4)];

/// The GMAC hash: XOR-fold the address into six bits.
pub fn hash(address: &EthernetAddress) -> u8 {
    let index = address
        .as_bytes()
        .iter()
        .zip(FOLD)
        .fold(0u32, |acc, (&byte, (right, left))| {
            let byte = u32::from(byte);
            acc ^ (byte >> right) ^ (byte << left)
        });
    (index & 0x3F) as u8
}

/// 64 filter bits, split the way MACs expose them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HashTable([u32; 2]);

impl HashTable {
    pub const fn new() -> Self {
        Self([0; 2])
    }

    pub fn insert(&mut self, index: u8) {
        let index = index & 0x3F;
        self.0[usize::from(index / 32)] |= 1u32 << (index % 32);
    }

    pub fn contains(&self, index: u8) -> bool {
        let index = index & 0x3F;
        self.0[usize::from(index / 32)] & (1u32 << (index % 32)) != 0
    }

    /// Bits 0 through 31.
    pub fn low(&self) -> u32 {
        self.0[0]
    }

    /// Bits 32 through 63.
    pub fn high(&self) -> u32 {
        self.0[1]
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; 2]
    }
}

impl core::ops::BitOr for HashTable {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self([self.0[0] | rhs.0[0], self.0[1] | rhs.0[1]])
    }
}

/// One address the network stack wants to receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEntry {
    pub address: EthernetAddress,
    /// Entries with a zero count are unused.
    pub ref_count: u32,
}

/// A complete filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    group: HashTable,
    unicast: HashTable,
    exact: [EthernetAddress; MAX_EXACT_MATCH],
    exact_len: usize,
}

impl AddressFilter {
    /// Rebuild with three exact-match slots and the GMAC [`hash`].
    pub fn rebuild(entries: &[FilterEntry]) -> Self {
        Self::rebuild_with(entries, MAX_EXACT_MATCH, hash)
    }

    /// Rebuild from every live entry.
    ///
    /// Group addresses always go to the hash table. The first `exact_slots`
    /// unicast addresses take exact-match slots, and the rest are hashed.
    pub fn rebuild_with(
        entries: &[FilterEntry],
        exact_slots: usize,
        hash: impl Fn(&EthernetAddress) -> u8,
    ) -> Self {
        let exact_slots = exact_slots.min(MAX_EXACT_MATCH);
        let mut filter = Self {
            group: HashTable::new(),
            unicast: HashTable::new(),
            exact: [EthernetAddress([0; 6]); MAX_EXACT_MATCH],
            exact_len: 0,
        };

        for entry in entries.iter().filter(|entry| entry.ref_count > 0) {
            if entry.address.is_multicast() {
                filter.group.insert(hash(&entry.address));
            } else if filter.exact_len < exact_slots {
                filter.exact[filter.exact_len] = entry.address;
                filter.exact_len += 1;
            } else {
                filter.unicast.insert(hash(&entry.address));
            }
        }

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "Address filter: group {=u32:X} {=u32:X}, unicast {=u32:X} {=u32:X}, {=usize} exact",
            filter.group.high(),
            filter.group.low(),
            filter.unicast.high(),
            filter.unicast.low(),
            filter.exact_len
        );
        filter
    }

    /// Group and overflowed unicast bits together, for MACs with one table.
    pub fn hash_table(&self) -> HashTable {
        self.group | self.unicast
    }

    /// Bits for group (multicast and broadcast) addresses only.
    pub fn group_table(&self) -> HashTable {
        self.group
    }

    /// Bits for unicast addresses that didn't get an exact-match slot.
    pub fn unicast_table(&self) -> HashTable {
        self.unicast
    }

    /// Unicast addresses for the exact-match slots, in entry order.
    pub fn exact_matches(&self) -> &[EthernetAddress] {
        &self.exact[..self.exact_len]
    }

    /// Indicates if some unicast addresses overflowed into the hash table.
    ///
    /// MACs that share one table between unicast and multicast need unicast
    /// hashing turned on in that case.
    pub fn unicast_hashed(&self) -> bool {
        !self.unicast.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use smoltcp::wire::EthernetAddress;

    use super::{AddressFilter, FilterEntry, HashTable, hash};

    const ALL_HOSTS: EthernetAddress = EthernetAddress([0x01, 0x00, 0x5E, 0x00, 0x00, 0x01]);

    fn entry(bytes: [u8; 6], ref_count: u32) -> FilterEntry {
        FilterEntry {
            address: EthernetAddress(bytes),
            ref_count,
        }
    }

    #[test]
    fn known_hashes() {
        assert_eq!(hash(&ALL_HOSTS), 38);
        assert_eq!(hash(&EthernetAddress::BROADCAST), 0);
    }

    #[test]
    fn hash_is_pure() {
        for seed in 0..=255u8 {
            let address = EthernetAddress([seed | 1, seed, !seed, seed ^ 0x5A, 7, seed]);
            let index = hash(&address);
            assert!(index < 64);
            assert_eq!(index, hash(&address));
        }
    }

    #[test]
    fn empty_entries_clear_everything() {
        let filter = AddressFilter::rebuild(&[]);
        assert!(filter.hash_table().is_empty());
        assert!(filter.exact_matches().is_empty());
        assert!(!filter.unicast_hashed());
    }

    #[test]
    fn one_multicast_sets_one_bit() {
        let entries = [entry(ALL_HOSTS.0, 1)];
        let filter = AddressFilter::rebuild(&entries);
        let table = filter.hash_table();
        assert_eq!(table.low(), 0);
        assert_eq!(table.high(), 1 << 6);
        assert!(table.contains(38));
        assert_eq!(AddressFilter::rebuild(&entries), filter);
    }

    #[test]
    fn unused_entries_are_ignored() {
        let entries = [entry(ALL_HOSTS.0, 0), entry([0x02, 0, 0, 0, 0, 1], 0)];
        let filter = AddressFilter::rebuild(&entries);
        assert!(filter.hash_table().is_empty());
        assert!(filter.exact_matches().is_empty());
    }

    #[test]
    fn unicast_overflows_into_hash() {
        let unicast = [
            [0x02, 0, 0, 0, 0, 1],
            [0x02, 0, 0, 0, 0, 2],
            [0x02, 0, 0, 0, 0, 3],
            [0x02, 0, 0, 0, 0, 4],
        ];
        let three: Vec<_> = unicast[..3].iter().map(|a| entry(*a, 1)).collect();
        let filter = AddressFilter::rebuild(&three);
        assert_eq!(filter.exact_matches().len(), 3);
        assert!(filter.hash_table().is_empty());
        assert!(!filter.unicast_hashed());

        let four: Vec<_> = unicast.iter().map(|a| entry(*a, 2)).collect();
        let filter = AddressFilter::rebuild(&four);
        assert_eq!(
            filter.exact_matches(),
            &[
                EthernetAddress(unicast[0]),
                EthernetAddress(unicast[1]),
                EthernetAddress(unicast[2])
            ]
        );
        assert!(filter.unicast_hashed());
        let mut expected = HashTable::new();
        expected.insert(hash(&EthernetAddress(unicast[3])));
        assert_eq!(filter.hash_table(), expected);
    }

    #[test]
    fn exact_slots_are_configurable() {
        let entries = [entry([0x02, 0, 0, 0, 0, 1], 1), entry(ALL_HOSTS.0, 1)];
        let filter = AddressFilter::rebuild_with(&entries, 0, |_| 63);
        assert!(filter.exact_matches().is_empty());
        assert!(filter.unicast_hashed());
        assert_eq!(filter.hash_table().high(), 1 << 31);
        assert_eq!(filter.hash_table().low(), 0);
    }

    #[test]
    fn rebuild_replaces_previous_contents() {
        let before = AddressFilter::rebuild(&[entry(ALL_HOSTS.0, 1)]);
        let after = AddressFilter::rebuild(&[entry([0x33, 0x33, 0, 0, 0, 1], 1)]);
        assert!(before.hash_table().contains(38));
        assert_eq!(
            after.hash_table().contains(38),
            hash(&EthernetAddress([0x33, 0x33, 0, 0, 0, 1])) == 38
        );
        assert_eq!(
            after.hash_table().low().count_ones() + after.hash_table().high().count_ones(),
            1
        );
    }

    #[test]
    fn address_classes_hash_separately() {
        let unicast = EthernetAddress([0x02, 0, 0, 0, 0, 9]);
        let entries = [entry(ALL_HOSTS.0, 1), entry(unicast.0, 1)];
        let filter = AddressFilter::rebuild_with(&entries, 0, hash);

        let mut group = HashTable::new();
        group.insert(hash(&ALL_HOSTS));
        let mut individual = HashTable::new();
        individual.insert(hash(&unicast));

        assert_eq!(filter.group_table(), group);
        assert_eq!(filter.unicast_table(), individual);
        assert_eq!(filter.hash_table(), group | individual);
        assert!(filter.unicast_hashed());

        let multicast_only = AddressFilter::rebuild_with(&entries[..1], 0, hash);
        assert!(multicast_only.unicast_table().is_empty());
        assert!(!multicast_only.unicast_hashed());
    }
}
