//! Bloom filters over content hashes: bit storage, sizing, lookups and the
//! persisted filter format.

pub mod consts;
pub mod errors;
pub mod utils;
pub mod bitfield;
pub mod filter;
pub mod params;

pub use bitfield::{BitField, BitPos};
pub use errors::{FilterError, Result};
pub use filter::{ideal_hashcount, ideal_size, BloomFilter};
pub use params::{FilterInfo, FilterParams};
