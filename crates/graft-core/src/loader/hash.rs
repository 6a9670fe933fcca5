use std::path::Path;

/// Compute the Blake3 hash of a byte slice as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Compute the Blake3 hash of a file's content.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let content = std::fs::read(path)?;
    Ok(hash_bytes(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_bytes_consistency() {
        assert_eq!(hash_bytes(b"source"), hash_bytes(b"source"));
        assert_ne!(hash_bytes(b"source"), hash_bytes(b"patched"));
    }

    #[test]
    fn test_hash_file_matches_hash_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"var x = 1;").unwrap();
        file.flush().unwrap();

        assert_eq!(hash_file(file.path()).unwrap(), hash_bytes(b"var x = 1;"));
    }
}
