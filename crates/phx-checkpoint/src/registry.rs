//! Hardened checkpoints.
//!
//! A compiled-in table of `(height, hash, timestamp)` per network. A block at
//! a table height must carry the table hash, and the newest entry present on
//! the local main chain is the floor the sync checkpoint resets to.
//!
//! # Attack vectors
//!
//! - **Long-range rewrite:** an attacker with enough hash power could rebuild
//!   deep history. Blocks at registry heights are pinned, so a rewrite below
//!   the last entry is rejected outright.
//! - **Table spoofing:** the table is compiled into the binary. Distributing
//!   a modified binary is outside the threat model.

use std::borrow::Cow;

use phx_core::chain_index::{BlockHandle, ChainIndex};
use phx_core::constants::NetworkType;
use phx_core::types::Hash256;

use crate::error::RegistryError;

/// One hardened checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointEntry {
    pub height: u32,
    pub hash: Hash256,
    /// Block timestamp (Unix seconds).
    pub timestamp: u32,
}

impl CheckpointEntry {
    pub const fn new(height: u32, hash: Hash256, timestamp: u32) -> Self {
        Self {
            height,
            hash,
            timestamp,
        }
    }
}

const fn entry(height: u32, hash: &str, timestamp: u32) -> CheckpointEntry {
    CheckpointEntry::new(height, Hash256::from_hex_const(hash), timestamp)
}

static MAIN_CHECKPOINTS: &[CheckpointEntry] = &[
    entry(1, "006e800301bbd850d7ba67ad9295c3a940f5fc8f5581e3484967bd33c4c8b965", 1_368_040_258),
    entry(100_000, "e6f6b91c942fb9f3bc522e6fc6435c1b77aed48806e99bb942acbc3f809e09e7", 1_381_275_938),
    entry(200_000, "e8bbfa06d1ea5fea06491403094b3d86bc11fbc0e3845add62d0c46dc8b95627", 1_388_828_071),
    entry(300_000, "5c72edfd71f7b7ec5e26147c8d8d3152e3de279d49ca0b7102971cf8f30f83aa", 1_398_261_279),
    entry(400_000, "40a98cddd43ba8154ddf87ded0fb9416631b0398a0d9948f0e53b802f14af4b1", 1_407_916_106),
    entry(500_000, "77b50650fa74d03b8739b4a6d34842df70d7167f4b5aa050da6cd9f74cf4154e", 1_416_796_125),
    entry(600_000, "b18f5e9a9cd9a0dd4b055c432c2f85914286a4f48ced445db3d46698848ee158", 1_425_685_777),
    entry(700_000, "0d18f383033c9eef67455f92327d165bb7234691b62f4f6621b36a4e5be066f8", 1_434_668_550),
    entry(800_000, "49bab7503b7af642f1acd29b00672383f9951992a940a39aa5bb50c0297f1566", 1_443_572_643),
    entry(900_000, "07911e1fb999f49575a1b3efa7bad84d8324c9e789707e03a4822efda7d4b1c0", 1_452_466_519),
    entry(1_000_000, "f635c3a4aa0ca540ea3bfea3d0ac413f9e1b5dcea7d1e528b18523cfba5a02ad", 1_461_358_254),
    entry(1_100_001, "98102b6321f926b1525a6b81d33009b25e1f097a54d04a2460a7d28c9c786554", 1_470_270_740),
    entry(1_200_000, "6996853bdcf79dc878736e34bee9c1f574d9d9bc850ef201b6aae8992c1e0a21", 1_479_145_447),
    entry(1_300_000, "4abd6d77d47ffd7e8dcfc722428078ef2932028e5526e09cb2e028471fc75793", 1_488_037_008),
    entry(1_400_000, "d5abea56a12ddbf81792565789ae11d924cdd929b1e1af4f18b568cbdd74ca07", 1_496_836_525),
    entry(1_500_000, "04b78040e2a22225768c5c9ad41343876d9fa70e1cdcdc550f0756df618ef55b", 1_505_698_751),
    entry(1_600_000, "fd418845a71e37685ba56cd5f94996141ff6e8b9e6a4bc38d5d063e28e987074", 1_514_546_170),
    entry(1_700_000, "2747c57407de0b4504198848a46e86c0f7414203cbe51e37459b9a55c00e3dae", 1_523_446_688),
    entry(1_800_000, "0a168f3016d4ebb6e6a2b49a111a72aadd0381e84cac200ef82f114a75ccbc9f", 1_532_170_865),
    entry(1_900_000, "13c7815537337a25b1da443156686e1133a79ddc6bd8fb95389750205bf58210", 1_540_917_035),
    entry(2_000_000, "b415f4159123aeef929866fa830b67150abf7563c686f8911c99b052d1aeda7d", 1_550_039_975),
    entry(2_100_000, "fe0d9e6fd6f9553ba7aea75a62476eefed30bc54ecbeaa7b5403c122e47f34c2", 1_559_020_950),
    entry(2_200_000, "aa9233229e4b18e7d2abd0084358fe1e9ad52f01f8276ce5c6ad5309a77df429", 1_567_902_553),
    entry(2_300_000, "22cb9e1d5025fbffe0ba4f5bdb031260274fb577937976c171cd5c29cd5976be", 1_577_011_118),
    entry(2_400_000, "4ed40a6fc035a735700ac907d47accff18f40da3b7f2626202446f52ce7993bc", 1_585_985_501),
    entry(2_500_000, "99855dc131f842dd6f14d4d97a6c81e5b51a464115a7851a5a053f2f9858f8eb", 1_594_905_740),
    entry(2_600_000, "4a3b8a4141637104e427b79414570bddd6ef922bbeda48629adf4a11d394b186", 1_604_470_267),
    entry(2_700_000, "777634a0ffc4b17454da00bd2de0aabade9af287638e9db99743f04023d2a0d0", 1_613_536_574),
    entry(2_800_000, "6f0a5f4358455be430bf7e947cc156051e0e32af12833bdbe8e847b5a750b2af", 1_622_468_912),
    entry(2_900_000, "34d363216b5abcde063e6d30b4597cef135783ce54b53b473edb64f73a15463e", 1_631_636_992),
    entry(3_000_000, "3f507f61825551a914b9208e2e62351fd9beb5c86f71b13ca1f7de78d552a4b7", 1_640_684_012),
    entry(3_100_000, "660c4bdf66541ef91d614d993a89bc5031e72388203768bb00f609b95947232c", 1_649_730_605),
    entry(3_200_000, "7addb0cb9b72826ff0bda32acac0ad235de4a2a62451292d06e568237cbf4bfc", 1_658_725_195),
    entry(3_300_000, "7213f51165c3ec304757589ca22b21da48e4e788220732d3ec6b6cac0fdddb74", 1_667_648_119),
    entry(3_400_000, "4c1e72329c99da051e958e31f70e6c333288a745555c5caa6c00ec1330604e80", 1_676_629_459),
    entry(3_500_000, "6b12fb3416df39d198a3e6e0186459e818916b3cbb43b215744ea106ba2f42f8", 1_685_633_927),
    entry(3_600_000, "4fbfc131291f779fee8dcb91283e7d01dd2569adabeb48c5869dcdf8968a1e4e", 1_694_649_476),
    entry(3_700_000, "e874151b9c73b5ec299e7b0e04d50904252b43801bfac9c2355a9cfc9b039eb0", 1_703_676_051),
    entry(3_800_000, "a134c63c612b6c020c6e32d91d9b2d7e40f94fe497b07708dd74cf5928c2ddf3", 1_712_744_560),
    entry(3_900_000, "5edb8a4cf71966d277e0de1efb60db6580705a976fc2421ed85c30afb03ec593", 1_721_636_650),
    entry(4_000_000, "b89c98ec5fae38cb1fc0e255380f7fa86d2a6711d82bd63febf4ac55ace633f9", 1_730_816_840),
];

static TEST_CHECKPOINTS: &[CheckpointEntry] = &[
    entry(1, "ebc580b1c5100b9763d5c5d8a4df724b1d0f32ed78203fd9321fe6f2fbff5373", 1_383_844_822),
];

/// Ordered table of hardened checkpoints.
///
/// Heights are strictly increasing. The table never changes once built.
#[derive(Debug, Clone)]
pub struct CheckpointRegistry {
    entries: Cow<'static, [CheckpointEntry]>,
}

impl CheckpointRegistry {
    /// The compiled-in table for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        let entries = match network {
            NetworkType::Mainnet => MAIN_CHECKPOINTS,
            NetworkType::Testnet => TEST_CHECKPOINTS,
        };
        Self {
            entries: Cow::Borrowed(entries),
        }
    }

    /// Build a registry from an explicit list.
    ///
    /// # Errors
    ///
    /// [`RegistryError::NotIncreasing`] if heights are not strictly
    /// increasing in list order.
    pub fn new(entries: Vec<CheckpointEntry>) -> Result<Self, RegistryError> {
        for pair in entries.windows(2) {
            if pair[1].height <= pair[0].height {
                return Err(RegistryError::NotIncreasing {
                    height: pair[1].height,
                    previous: pair[0].height,
                });
            }
        }
        Ok(Self {
            entries: Cow::Owned(entries),
        })
    }

    pub fn entries(&self) -> &[CheckpointEntry] {
        &self.entries
    }

    /// Entry at exactly `height`, if any.
    pub fn lookup(&self, height: u32) -> Option<&CheckpointEntry> {
        self.entries
            .binary_search_by_key(&height, |e| e.height)
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Verify that a block at `height` matches the registry.
    ///
    /// Heights without an entry always pass.
    pub fn check_hardened(&self, height: u32, hash: &Hash256) -> Result<(), RegistryError> {
        match self.lookup(height) {
            Some(entry) if entry.hash != *hash => Err(RegistryError::HardenedMismatch {
                height,
                expected: entry.hash,
                got: *hash,
            }),
            _ => Ok(()),
        }
    }

    /// Height of the newest entry, or 0 for an empty table.
    pub fn highest_height(&self) -> u32 {
        self.entries.last().map_or(0, |e| e.height)
    }

    /// Timestamp of the newest entry, or 0 for an empty table.
    pub fn latest_time(&self) -> u32 {
        self.entries.last().map_or(0, |e| e.timestamp)
    }

    /// Newest entry whose block is indexed locally and on the main chain.
    pub fn find_last_in_chain<I>(&self, index: &I) -> Option<(BlockHandle, &CheckpointEntry)>
    where
        I: ChainIndex + ?Sized,
    {
        self.entries.iter().rev().find_map(|entry| {
            index
                .lookup(&entry.hash)
                .filter(|&handle| index.is_on_main_chain(handle))
                .map(|handle| (handle, entry))
        })
    }

    /// Whether `height` is at or below the newest entry.
    ///
    /// Reorganizations that would disconnect such a block must be refused.
    pub fn is_below_last(&self, height: u32) -> bool {
        !self.entries.is_empty() && height <= self.highest_height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phx_core::chain_index::MemoryChainIndex;

    fn h(n: u8) -> Hash256 {
        Hash256([n; 32])
    }

    fn small() -> CheckpointRegistry {
        CheckpointRegistry::new(vec![
            CheckpointEntry::new(2, h(2), 200),
            CheckpointEntry::new(4, h(4), 400),
        ])
        .unwrap()
    }

    #[test]
    fn compiled_tables_are_strictly_increasing() {
        for net in [NetworkType::Mainnet, NetworkType::Testnet] {
            let registry = CheckpointRegistry::for_network(net);
            assert!(!registry.entries().is_empty());
            assert!(CheckpointRegistry::new(registry.entries().to_vec()).is_ok());
        }
    }

    #[test]
    fn mainnet_table_bounds() {
        let registry = CheckpointRegistry::for_network(NetworkType::Mainnet);
        assert_eq!(registry.highest_height(), 4_000_000);
        assert_eq!(registry.latest_time(), 1_730_816_840);
        let first = registry.lookup(1).unwrap();
        assert_eq!(
            first.hash.to_string(),
            "006e800301bbd850d7ba67ad9295c3a940f5fc8f5581e3484967bd33c4c8b965"
        );
        assert!(registry.lookup(1_100_000).is_none());
        assert!(registry.lookup(1_100_001).is_some());
    }

    #[test]
    fn testnet_table_has_single_entry() {
        let registry = CheckpointRegistry::for_network(NetworkType::Testnet);
        assert_eq!(registry.entries().len(), 1);
        assert_eq!(registry.highest_height(), 1);
        assert_eq!(registry.latest_time(), 1_383_844_822);
    }

    #[test]
    fn non_increasing_rejected() {
        let err = CheckpointRegistry::new(vec![
            CheckpointEntry::new(5, h(5), 0),
            CheckpointEntry::new(5, h(6), 0),
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::NotIncreasing { height: 5, previous: 5 });
    }

    #[test]
    fn check_hardened_pins_registry_heights() {
        let registry = small();
        assert!(registry.check_hardened(2, &h(2)).is_ok());
        assert!(registry.check_hardened(3, &h(99)).is_ok());
        assert_eq!(
            registry.check_hardened(4, &h(99)),
            Err(RegistryError::HardenedMismatch { height: 4, expected: h(4), got: h(99) })
        );
    }

    #[test]
    fn is_below_last() {
        let registry = small();
        assert!(registry.is_below_last(0));
        assert!(registry.is_below_last(4));
        assert!(!registry.is_below_last(5));
        let empty = CheckpointRegistry::new(Vec::new()).unwrap();
        assert!(!empty.is_below_last(0));
        assert_eq!(empty.highest_height(), 0);
    }

    #[test]
    fn find_last_in_chain_requires_main_chain() {
        let index = MemoryChainIndex::new(h(0), 0);
        for n in 1..=5u8 {
            index.insert(h(n), h(n - 1), 0).unwrap();
        }
        index.set_best_chain(index.lookup(&h(5)).unwrap()).unwrap();

        let registry = small();
        let (handle, entry) = registry.find_last_in_chain(&index).unwrap();
        assert_eq!(entry.height, 4);
        assert_eq!(index.hash(handle), Some(h(4)));

        // Fork off at 3 so h(4) leaves the main chain.
        let fork = index.insert(h(40), h(3), 0).unwrap();
        index.set_best_chain(fork).unwrap();
        let (_, entry) = registry.find_last_in_chain(&index).unwrap();
        assert_eq!(entry.height, 2);
    }

    #[test]
    fn find_last_in_chain_none_when_absent() {
        let index = MemoryChainIndex::new(h(0), 0);
        assert!(small().find_last_in_chain(&index).is_none());
    }
}
