//! Binary persistence of shares as `<path>.sh.bin` files.

use anyhow::{Context, Result};

use crate::errors::ProtocolError;
use crate::sharing::ShareCodec;

/// Persist a share next to its party-specific path.
pub fn save_share<S: ShareCodec>(file_path: &str, share: &S) -> Result<()> {
    let full_path = format!("{}.sh.bin", file_path);
    let mut buffer = Vec::new();
    share.encode(&mut buffer);
    std::fs::write(&full_path, &buffer)
        .with_context(|| format!("saving share to {} @{}:{}", full_path, file!(), line!()))?;
    Ok(())
}

/// Load a share previously written by [save_share].
pub fn load_share<S: ShareCodec>(file_path: &str) -> Result<S> {
    let full_path = format!("{}.sh.bin", file_path);
    let buffer = std::fs::read(&full_path)
        .with_context(|| format!("loading share from {} @{}:{}", full_path, file!(), line!()))?;
    if buffer.is_empty() {
        return Err(
            ProtocolError::Serialization(format!("loaded buffer is empty: {}", full_path)).into(),
        );
    }
    S::decode(&buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharing::{RepShare, RepShareVec};

    #[test]
    fn test_save_load_roundtrip() {
        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = format!("{}/share_io_roundtrip", dir.display());

        let sh = RepShare::new(3, 4);
        save_share(&path, &sh).unwrap();
        let back: RepShare = load_share(&path).unwrap();
        assert_eq!(back, sh);

        let mut v = RepShareVec::new(2);
        v.data[0] = vec![7, 8];
        v.data[1] = vec![9, 10];
        save_share(&path, &v).unwrap();
        let back: RepShareVec = load_share(&path).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let res: Result<RepShare> = load_share("/nonexistent/definitely/not/here");
        assert!(res.is_err());
    }
}
