pub mod types;

pub use ethereum_types::{Address, Bloom, H256, U256};

use sha3::{Digest, Keccak256};

/// Keccak-256 of an arbitrary byte string.
pub fn keccak(data: impl AsRef<[u8]>) -> H256 {
    H256::from_slice(&Keccak256::new_with_prefix(data).finalize())
}
