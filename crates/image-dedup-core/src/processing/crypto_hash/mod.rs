//! Content hashing used to prove that a backup copy is byte-identical to the
//! file it was taken from.
//!
//! The file is streamed through a Blake3 hasher in fixed-size chunks, so
//! memory use does not grow with file size.
use crate::error::Result;
use blake3::Hash as Blake3Hash;

use std::{fs::File, io::Read, path::Path};

/// Compute the cryptographic hash of a file using the Blake3 algorithm
pub fn compute_cryptographic<P: AsRef<Path>>(path: P) -> Result<Blake3Hash> {
    let mut file = File::open(&path)?;
    let mut hasher = blake3::Hasher::new();

    let mut buffer = [0; 8192]; // 8KB buffer
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_hash_matches_blake3_of_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"DUMMY IMAGE DATA").unwrap();

        let expected = blake3::hash(b"DUMMY IMAGE DATA");
        assert_eq!(compute_cryptographic(&path).unwrap(), expected);
    }
}
