use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use std::path::Path;

/// MurmurHash3 x86_32 of `key` under `seed`.
///
/// The hash family is part of the file format: filters built with another
/// function are not interchangeable even at identical size and hash count.
pub fn seeded_hash(key: &[u8], seed: u32) -> u32 {
    let mut src = key;
    // Reads from an in-memory slice do not fail.
    murmur3::murmur3_32(&mut src, seed).expect("slice read")
}

/// Probe position for `key` under `seed` in a field of `modulus` bits.
///
/// The 32-bit hash is taken as signed and reduced with a non-negative modulo,
/// which is how existing filter files were populated.
pub fn probe(key: &[u8], seed: u32, modulus: usize) -> usize {
    let signed = i64::from(seeded_hash(key, seed) as i32);
    signed.rem_euclid(modulus as i64) as usize
}

pub fn write_u128<W: Write>(w: &mut W, v: u128) -> io::Result<()> { w.write_u128::<LE>(v) }
pub fn read_u128<R: Read>(r: &mut R) -> io::Result<u128> { r.read_u128::<LE>() }

#[cfg(unix)]
pub fn fsync_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
pub fn fsync_dir(_path: &Path) -> io::Result<()> { Ok(()) }
