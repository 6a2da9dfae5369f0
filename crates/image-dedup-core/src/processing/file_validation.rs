use log::debug;
use std::path::Path;

use crate::types::SkipReason;

/// Files above this size get a debug note before decoding
const LARGE_FILE_BYTES: u64 = 50 * 1024 * 1024;

/// Discovery-time checks: the entry must be an accessible regular file within
/// the size guard. Returns the file size.
pub fn validate_metadata(path: &Path, max_file_size: u64) -> Result<u64, SkipReason> {
    let metadata =
        std::fs::metadata(path).map_err(|e| SkipReason::Inaccessible(e.to_string()))?;

    if !metadata.is_file() {
        return Err(SkipReason::Inaccessible("not a regular file".to_string()));
    }

    let file_size = metadata.len();
    if file_size > max_file_size {
        return Err(SkipReason::Oversize(file_size));
    }

    Ok(file_size)
}

/// Decode-time checks: the file must still exist and must not be empty.
/// Returns the file size.
pub fn validate_before_decode(path: &Path) -> Result<u64, SkipReason> {
    let metadata =
        std::fs::metadata(path).map_err(|e| SkipReason::Inaccessible(e.to_string()))?;

    let file_size = metadata.len();
    if file_size == 0 {
        return Err(SkipReason::ZeroSized);
    }

    // Permission problems surface here rather than as decode errors
    std::fs::File::open(path).map_err(|e| SkipReason::Inaccessible(e.to_string()))?;

    if file_size > LARGE_FILE_BYTES {
        debug!(
            "Decoding large file ({}MB): '{}'",
            file_size / 1_000_000,
            path.display()
        );
    }

    Ok(file_size)
}

/// Get file extension as lowercase string
pub fn get_file_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_oversize_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.png");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        assert_eq!(validate_metadata(&path, 4096), Ok(2048));
        assert_eq!(validate_metadata(&path, 1024), Err(SkipReason::Oversize(2048)));
    }

    #[test]
    fn test_directory_is_not_a_regular_file() {
        let dir = tempdir().unwrap();
        let sub = dir.path().join("folder.png");
        std::fs::create_dir(&sub).unwrap();

        assert!(matches!(
            validate_metadata(&sub, u64::MAX),
            Err(SkipReason::Inaccessible(_))
        ));
    }

    #[test]
    fn test_empty_file_is_rejected_before_decode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::File::create(&path).unwrap();

        assert_eq!(validate_before_decode(&path), Err(SkipReason::ZeroSized));
    }

    #[test]
    fn test_missing_file_is_inaccessible() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gone.jpg");

        assert!(matches!(
            validate_before_decode(&path),
            Err(SkipReason::Inaccessible(_))
        ));
    }

    #[test]
    fn test_get_file_extension() {
        assert_eq!(get_file_extension(Path::new("a/B.JPEG")), "jpeg");
        assert_eq!(get_file_extension(Path::new("noext")), "");
    }
}
