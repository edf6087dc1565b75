mod block;
mod chain_config;
mod receipt;
mod transaction;

pub use block::{Block, BlockBody, BlockHeader};
pub use chain_config::{ChainConfig, IstanbulConfig};
pub use receipt::{Log, Receipt, StorageReceipt};
pub use transaction::Transaction;

pub type BlockNumber = u64;
pub type BlockHash = ethereum_types::H256;
pub type Index = u64;
