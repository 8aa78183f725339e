// crates/hashbloom_core/src/consts.rs

/// Width of each header field. Values fit in far fewer bytes, the wide field is
/// part of the file format.
pub const HDR_FIELD_SIZE: usize = 16;
/// capacity_bits[16] + hash_count[16]
pub const HDR_SIZE: usize = HDR_FIELD_SIZE * 2;

pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Binary (1024-based) unit suffixes used by `BloomFilter::byte_size_human`.
pub const SIZE_SUFFIXES: [&str; 9] = ["bytes", "Kb", "Mb", "Gb", "Tb", "Pb", "Eb", "Zb", "Yb"];

const _: () = { assert!(HDR_SIZE == 32); };
