use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use md5::{Digest, Md5};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use hashbloom_core::{consts::DEFAULT_FALSE_POSITIVE_RATE, BloomFilter, FilterInfo, FilterParams};

const CHUNK_SIZE: usize = 4096;
const QUICK_PREFIX: u64 = 8192;

#[derive(Parser)]
#[command(name = "hashbloom", about = "Bloom filters of file hashes: which files are new or changed?")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Hash every file under PATHS into a new filter.
    Calculate {
        #[arg(long)]
        filter: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FALSE_POSITIVE_RATE)]
        fp_rate: f64,
        /// Only hash the first 8 KiB of each file
        #[arg(long, default_value_t = false)]
        quick: bool,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Report which files under PATHS are (probably) in the filter.
    Lookup {
        #[arg(long)]
        filter: PathBuf,
        #[arg(long, default_value_t = false)]
        quick: bool,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Build a filter from MD5 hash lists, one digest per line.
    Fromfile {
        #[arg(long)]
        filter: PathBuf,
        #[arg(long, default_value_t = DEFAULT_FALSE_POSITIVE_RATE)]
        fp_rate: f64,
        #[arg(required = true)]
        hashlists: Vec<PathBuf>,
    },

    Info {
        #[arg(long)]
        filter: PathBuf,
        /// Element count for the accuracy estimate
        #[arg(long)]
        elements: Option<u64>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn is_md5(s: &str) -> bool {
    s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lowercase hex MD5 of a file; `None` when the file cannot be read.
fn md5_file(path: &Path, quick: bool) -> Option<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot open file");
            return None;
        }
    };
    let limit = if quick { QUICK_PREFIX } else { u64::MAX };
    let mut reader = file.take(limit);
    let mut hasher = Md5::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buf[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot read file");
                return None;
            }
        }
    }
    Some(hex::encode(hasher.finalize()))
}

/// Regular files at or below `path`. Directory symlinks are not followed.
fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let meta = fs::metadata(path).with_context(|| format!("cannot stat {}", path.display()))?;
    if meta.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }
    if !meta.is_dir() {
        return Ok(());
    }
    let mut entries: Vec<_> = fs::read_dir(path)
        .with_context(|| format!("cannot list {}", path.display()))?
        .collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let ft = entry.file_type()?;
        let p = entry.path();
        if ft.is_dir() {
            collect_files(&p, out)?;
        } else if fs::metadata(&p).map(|m| m.is_file()).unwrap_or(false) {
            out.push(p);
        }
    }
    Ok(())
}

fn gather(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for p in paths {
        collect_files(p, &mut files)?;
    }
    Ok(files)
}

fn calculate_hashes(files: &[PathBuf], bloom: &mut BloomFilter, quick: bool) -> usize {
    let mut added = 0;
    for path in files {
        match md5_file(path, quick) {
            Some(digest) => {
                println!("   {} {}", path.display(), digest);
                bloom.add(&digest);
                added += 1;
            }
            None => println!("{} Permission Denied", path.display()),
        }
    }
    added
}

fn lookup_hashes(files: &[PathBuf], bloom: &BloomFilter, quick: bool) {
    for path in files {
        match md5_file(path, quick) {
            Some(digest) if !bloom.lookup(&digest) => println!("{} is not in filter", path.display()),
            Some(_) => println!("{} is in filter", path.display()),
            None => println!("{} Permission Denied", path.display()),
        }
    }
}

/// Valid digests from hash lists, lowercased; comments and junk lines are skipped.
fn read_hashlists(lists: &[PathBuf]) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for list in lists {
        let f = File::open(list).with_context(|| format!("cannot open {}", list.display()))?;
        for line in BufReader::new(f).lines() {
            let line = line?;
            let digest = line.trim_end();
            if digest.starts_with('#') || !is_md5(digest) {
                continue;
            }
            out.push(digest.to_ascii_lowercase());
        }
    }
    Ok(out)
}

fn save(bloom: &BloomFilter, path: &Path) -> Result<()> {
    println!("[+] Saving {} filter to outfile: {}", bloom.byte_size_human(), path.display());
    bloom.save(path).with_context(|| format!("cannot write {}", path.display()))?;
    println!("[+] Done.");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(io::stderr).init();
    let cli = Cli::parse();

    match cli.cmd {
        Cmd::Calculate { filter, fp_rate, quick, paths } => {
            println!("[+] Counting files. This may take a while");
            let files = gather(&paths)?;
            println!("    Counted {} files.", files.len());
            if files.is_empty() {
                bail!("no files found under the given paths");
            }

            let mut bloom = FilterParams::new(files.len() as u64, fp_rate).build()?;
            println!("[+] Calculating hashes.");
            let added = calculate_hashes(&files, &mut bloom, quick);
            info!(added, total = files.len(), "hashed files");
            save(&bloom, &filter)?;
        }

        Cmd::Lookup { filter, quick, paths } => {
            let bloom = BloomFilter::load(&filter)
                .with_context(|| format!("unable to open {} for reading", filter.display()))?;
            let files = gather(&paths)?;
            lookup_hashes(&files, &bloom, quick);
        }

        Cmd::Fromfile { filter, fp_rate, hashlists } => {
            println!("[+] Counting hashes in {} list(s)", hashlists.len());
            let digests = read_hashlists(&hashlists)?;
            println!("    Counted {} hashes.", digests.len());
            if digests.is_empty() {
                bail!("no valid MD5 digests in the given hash lists");
            }

            let mut bloom = FilterParams::new(digests.len() as u64, fp_rate).build()?;
            for d in &digests {
                bloom.add(d);
            }
            save(&bloom, &filter)?;
        }

        Cmd::Info { filter, elements, json } => {
            let bloom = BloomFilter::load(&filter)
                .with_context(|| format!("unable to open {} for reading", filter.display()))?;
            let info = FilterInfo::of(&bloom, elements);
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("capacity_bits={}", info.capacity_bits);
                println!("hash_count={}", info.hash_count);
                println!("size={} ({} bytes)", info.byte_size_human, info.byte_size);
                println!("bits_set={}", info.bits_set);
                if let Some(acc) = info.accuracy {
                    println!("accuracy={acc:.4}%");
                }
            }
        }
    }
    Ok(())
}
