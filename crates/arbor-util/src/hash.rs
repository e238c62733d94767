use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// BLAKE3 digest of a file's contents, hex-encoded.
///
/// Returns `Ok(None)` when the file does not exist, so callers comparing
/// "what is on disk" against "what we are about to write" need no extra
/// existence check.
///
/// # Errors
/// Returns an error if the file exists but cannot be read.
pub fn file_digest(path: &Path) -> io::Result<Option<String>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Some(hasher.finalize().to_hex().to_string()))
}

/// BLAKE3 digest of a byte slice, hex-encoded.
#[must_use]
pub fn bytes_digest(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
