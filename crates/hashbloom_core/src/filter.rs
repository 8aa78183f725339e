//! Bloom filter over string keys, with its on-disk format.
//!
//! File layout (LE):
//!   capacity_bits[16] = u128
//!   hash_count[16]    = u128
//!   bits[ceil(capacity_bits / 8)] = raw `BitField` buffer
//!
//! The total length must be exactly `32 + ceil(capacity_bits / 8)`.

use crate::bitfield::BitField;
use crate::consts::{HDR_SIZE, SIZE_SUFFIXES};
use crate::errors::{FilterError, Result};
use crate::utils::{fsync_dir, probe, read_u128, write_u128};
use std::f64::consts::LN_2;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    size: usize,
    hash_count: u32,
    filter: BitField,
}

impl BloomFilter {
    /// Size a filter for `expected_items` keys at `fp_rate` false positives.
    ///
    /// Fails when `expected_items` is 0, `fp_rate` is outside (0, 1), or the
    /// derived hash count would be 0 (rates above roughly one half).
    pub fn create(expected_items: u64, fp_rate: f64) -> Result<Self> {
        let size = ideal_size(expected_items, fp_rate)?;
        let hash_count = ideal_hashcount(size, expected_items)?;
        debug!(expected_items, fp_rate, size, hash_count, "sized bloom filter");
        Ok(Self { size, hash_count, filter: BitField::new(size) })
    }

    /// Build a filter with explicit parameters, e.g. to mirror another one.
    pub fn with_params(size: usize, hash_count: u32) -> Result<Self> {
        if size == 0 {
            return Err(FilterError::Config("capacity must be at least 1 bit".into()));
        }
        if hash_count == 0 {
            return Err(FilterError::Config("hash count must be at least 1".into()));
        }
        Ok(Self { size, hash_count, filter: BitField::new(size) })
    }

    #[inline]
    fn probes<'a>(&self, key: &'a str) -> impl Iterator<Item = usize> + 'a {
        let m = self.size;
        (0..self.hash_count).map(move |seed| probe(key.as_bytes(), seed, m))
    }

    pub fn add(&mut self, key: &str) {
        for bit in self.probes(key) {
            self.filter.set_bit(bit);
        }
    }

    /// `false` means `key` was never added; `true` may be a false positive.
    pub fn lookup(&self, key: &str) -> bool {
        self.probes(key).all(|bit| self.filter.get_bit(bit))
    }

    /// Capacity in bits.
    pub fn capacity_bits(&self) -> usize { self.size }

    pub fn hash_count(&self) -> u32 { self.hash_count }

    pub fn bits_set(&self) -> usize { self.filter.count_ones() }

    pub fn byte_size(&self) -> usize { self.size.div_ceil(8) }

    /// Byte size with a binary unit suffix, e.g. `4.0bytes` or `2.0Kb`.
    pub fn byte_size_human(&self) -> String {
        let order = if self.size > 0 {
            ((self.size as f64 / 8.0).log2() / 10.0) as i64
        } else {
            0
        };
        let order = order.clamp(0, SIZE_SUFFIXES.len() as i64 - 1) as usize;
        let scaled = self.byte_size() as f64 / 1024f64.powi(order as i32);
        format!("{}{}", format_decimal(scaled), SIZE_SUFFIXES[order])
    }

    /// Estimated accuracy in percent once `elements` keys have been added.
    pub fn estimated_accuracy(&self, elements: u64) -> f64 {
        Self::accuracy(self.size, self.hash_count, elements)
    }

    /// Percentage of lookups expected to answer correctly for a filter of
    /// `size` bits and `hash_count` probes holding `elements` keys.
    pub fn accuracy(size: usize, hash_count: u32, elements: u64) -> f64 {
        let k = f64::from(hash_count);
        let keep = 1.0 - 1.0 / size as f64;
        let false_positive = (1.0 - keep.powf(k * elements as f64)).powf(k);
        100.0 - false_positive * 100.0
    }

    /// Serialized form: header followed by the raw bit buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HDR_SIZE + self.byte_size());
        buf.extend_from_slice(&(self.size as u128).to_le_bytes());
        buf.extend_from_slice(&u128::from(self.hash_count).to_le_bytes());
        buf.extend_from_slice(self.filter.as_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HDR_SIZE {
            return Err(FilterError::Truncated { len: data.len() });
        }
        let mut hdr = &data[..HDR_SIZE];
        let size = read_u128(&mut hdr)?;
        let hash_count = read_u128(&mut hdr)?;
        let size = usize::try_from(size)
            .map_err(|_| FilterError::BadHeader(format!("capacity {size} does not fit in memory")))?;
        let hash_count = u32::try_from(hash_count)
            .map_err(|_| FilterError::BadHeader(format!("hash count {hash_count} out of range")))?;
        if hash_count == 0 {
            return Err(FilterError::BadHeader("hash count is zero".into()));
        }
        let filter = BitField::from_bytes(size, data[HDR_SIZE..].to_vec())?;
        Ok(Self { size, hash_count, filter })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_u128(w, self.size as u128)?;
        write_u128(w, u128::from(self.hash_count))?;
        w.write_all(self.filter.as_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf)?;
        Self::decode(&buf)
    }

    /// Write the filter to `path`: temp file in the same directory, fsync,
    /// then rename over the target so a crash never leaves a torn file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::Builder::new().prefix(".hashbloom_").tempfile_in(dir)?;
        self.write_to(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        publish(tmp, path)?;
        debug!(path = %path.display(), bytes = HDR_SIZE + self.byte_size(), "saved bloom filter");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let filter = Self::decode(&data)?;
        debug!(
            path = %path.display(),
            size = filter.size,
            hash_count = filter.hash_count,
            "loaded bloom filter"
        );
        Ok(filter)
    }

    /// Replace this filter's parameters and contents with the file at `path`.
    /// Nothing of the current state survives; on error the filter is untouched.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        *self = Self::load(path)?;
        Ok(())
    }
}

fn publish(tmp: NamedTempFile, path: &Path) -> Result<()> {
    let _persisted = tmp.persist(path)?;
    let _ = fsync_dir(path);
    Ok(())
}

/// Ideal capacity in bits: `floor(-n * ln(p) / ln(2)^2)`, at least 1.
pub fn ideal_size(expected_items: u64, fp_rate: f64) -> Result<usize> {
    if expected_items == 0 {
        return Err(FilterError::Config("expected items must be at least 1".into()));
    }
    if !(fp_rate > 0.0 && fp_rate < 1.0) {
        return Err(FilterError::Config(format!("false positive rate {fp_rate} not in (0, 1)")));
    }
    let bits = -(expected_items as f64 * fp_rate.ln()) / (LN_2 * LN_2);
    Ok((bits as usize).max(1))
}

/// Ideal probe count: `floor((m / n) * ln(2))`. Zero is rejected, not clamped.
pub fn ideal_hashcount(size: usize, expected_items: u64) -> Result<u32> {
    if expected_items == 0 {
        return Err(FilterError::Config("expected items must be at least 1".into()));
    }
    let k = ((size as f64 / expected_items as f64) * LN_2) as u64;
    match u32::try_from(k) {
        Ok(0) => Err(FilterError::Config(format!(
            "{size} bits for {expected_items} items gives no hash functions; lower the false positive rate"
        ))),
        Ok(k) => Ok(k),
        Err(_) => Err(FilterError::Config(format!("hash count {k} out of range"))),
    }
}

/// Round to four decimals and keep at least one fractional digit.
fn format_decimal(v: f64) -> String {
    let rounded = (v * 10_000.0).round() / 10_000.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.1}")
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expected_sizes() {
        let bloom = BloomFilter::create(3, 0.01).unwrap();
        assert_eq!(bloom.hash_count(), 6);
        assert_eq!(bloom.capacity_bits(), 28);
        assert_eq!(bloom.byte_size(), 4);
        assert_eq!(bloom.byte_size_human(), "4.0bytes");

        let bloom = BloomFilter::create(1709, 0.01).unwrap();
        assert_eq!(bloom.byte_size_human(), "2.0Kb");

        let bloom = BloomFilter::create(5, 0.02).unwrap();
        assert_eq!(bloom.capacity_bits(), 40);
        assert_eq!(bloom.hash_count(), 5);
    }

    #[test]
    fn sizing_is_deterministic() {
        let a = BloomFilter::create(10_000, 0.001).unwrap();
        let b = BloomFilter::create(10_000, 0.001).unwrap();
        assert_eq!(a.capacity_bits(), b.capacity_bits());
        assert_eq!(a.hash_count(), b.hash_count());
    }

    #[test]
    fn accuracy_converges_on_target() {
        let items = 1000;
        let bloom = BloomFilter::create(items, 0.1).unwrap();
        let accuracy = BloomFilter::accuracy(bloom.capacity_bits(), bloom.hash_count(), items);
        assert_eq!(accuracy.round(), 90.0);
        assert_eq!(bloom.estimated_accuracy(items), accuracy);
        assert_eq!(bloom.estimated_accuracy(0), 100.0);
    }

    #[test]
    fn add_and_lookup() {
        let mut bloom = BloomFilter::create(5, 0.1).unwrap();
        let first = "826e8142e6baabe8af779f5f490cf5f5";
        let second = "1c1c96fd2cf8330db0bfa936ce82f3b9";
        assert!(!bloom.lookup(first));
        assert!(!bloom.lookup(second));

        bloom.add(first);
        assert!(bloom.lookup(first));
        assert!(bloom.bits_set() > 0);
        assert!(bloom.bits_set() <= bloom.hash_count() as usize);
    }

    #[test]
    fn no_false_negatives() {
        let mut bloom = BloomFilter::create(1000, 0.01).unwrap();
        for i in 0..1000 {
            bloom.add(&format!("item_{i}"));
        }
        for i in 0..1000 {
            assert!(bloom.lookup(&format!("item_{i}")), "missing item_{i}");
        }
    }

    #[test]
    fn false_positive_rate_near_target() {
        let mut bloom = BloomFilter::create(1000, 0.01).unwrap();
        for i in 0..1000 {
            bloom.add(&format!("item_{i}"));
        }
        let false_positives = (0..10_000).filter(|i| bloom.lookup(&format!("other_{i}"))).count();
        let rate = false_positives as f64 / 10_000.0;
        assert!(rate < 0.03, "false positive rate too high: {rate}");
    }

    #[test]
    fn rejects_bad_configuration() {
        assert!(matches!(BloomFilter::create(0, 0.01), Err(FilterError::Config(_))));
        assert!(matches!(BloomFilter::create(10, 0.0), Err(FilterError::Config(_))));
        assert!(matches!(BloomFilter::create(10, 1.0), Err(FilterError::Config(_))));
        assert!(matches!(BloomFilter::create(10, f64::NAN), Err(FilterError::Config(_))));
        // m/n * ln 2 < 1: no probes at all
        assert!(matches!(BloomFilter::create(10, 0.9), Err(FilterError::Config(_))));
        assert!(matches!(BloomFilter::with_params(0, 3), Err(FilterError::Config(_))));
        assert!(matches!(BloomFilter::with_params(64, 0), Err(FilterError::Config(_))));
    }

    #[test]
    fn human_size_units() {
        assert_eq!(BloomFilter::with_params(1, 1).unwrap().byte_size_human(), "1.0bytes");
        assert_eq!(BloomFilter::with_params(8 * 1500, 1).unwrap().byte_size_human(), "1.4648Kb");
        assert_eq!(BloomFilter::with_params(8 << 20, 1).unwrap().byte_size_human(), "1.0Mb");
    }

    #[test]
    fn encode_layout() {
        let mut bloom = BloomFilter::create(3, 0.01).unwrap();
        bloom.add("d41d8cd98f00b204e9800998ecf8427e");
        let bytes = bloom.encode();
        assert_eq!(bytes.len(), HDR_SIZE + 4);
        assert_eq!(u128::from_le_bytes(bytes[0..16].try_into().unwrap()), 28);
        assert_eq!(u128::from_le_bytes(bytes[16..32].try_into().unwrap()), 6);
        assert_eq!(&bytes[32..], bloom.filter.as_bytes());

        let mut streamed = Vec::new();
        bloom.write_to(&mut streamed).unwrap();
        assert_eq!(streamed, bytes);
        assert_eq!(BloomFilter::read_from(&mut streamed.as_slice()).unwrap(), bloom);
    }

    #[test]
    fn decode_rejects_bad_lengths() {
        let bloom = BloomFilter::create(3, 0.01).unwrap();
        let bytes = bloom.encode();

        assert!(matches!(
            BloomFilter::decode(&bytes[..20]),
            Err(FilterError::Truncated { len: 20 })
        ));
        assert!(matches!(
            BloomFilter::decode(&bytes[..bytes.len() - 1]),
            Err(FilterError::LengthMismatch { expected: 4, found: 3 })
        ));
        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(
            BloomFilter::decode(&long),
            Err(FilterError::LengthMismatch { expected: 4, found: 5 })
        ));
    }

    #[test]
    fn decode_rejects_zeroed_header() {
        let mut bytes = vec![0u8; HDR_SIZE];
        assert!(matches!(BloomFilter::decode(&bytes), Err(FilterError::BadHeader(_))));

        bytes[0] = 8;
        bytes.push(0);
        assert!(matches!(BloomFilter::decode(&bytes), Err(FilterError::BadHeader(_))));
    }
}
