pub mod alchemy;
pub mod bitquery;
pub mod config;
pub mod db;
pub mod etherscan;
pub mod key_pool;
pub mod observability;
pub mod types;
pub mod upstream;
