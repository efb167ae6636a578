use crate::error::IngestError;
use crate::models::ContentDigest;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const READ_CHUNK_BYTES: usize = 4096;

/// Streaming SHA-256 over file contents, used as the dedup key for documents.
pub struct ContentHasher;

impl ContentHasher {
    pub fn digest_file(path: &Path) -> Result<ContentDigest, IngestError> {
        let file = File::open(path)?;
        Self::digest_reader(BufReader::new(file))
    }

    pub fn digest_reader(mut reader: impl Read) -> Result<ContentDigest, IngestError> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; READ_CHUNK_BYTES];

        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(ContentDigest::new(format!("{:x}", hasher.finalize())))
    }
}
