use std::hash::Hasher;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use anyhow::Result;
use rustc_hash::FxHasher;

use crate::fs::Fs;

/// Digest of a step's declared outputs: each resolved path contributes its
/// name, length, and mtime, so touching or replacing any output changes the
/// digest and forces a re-run. Declared paths with nothing on disk behind
/// them contribute a tombstone, so their later appearance is also a change.
pub fn fingerprint_outputs(fs: &Fs, outputs: &[PathBuf]) -> Result<u64> {
    let mut hasher = FxHasher::default();
    for declared in outputs {
        let mut resolved = fs.resolve(declared)?;
        resolved.sort();

        hasher.write(declared.to_string_lossy().as_bytes());
        if resolved.is_empty() {
            hasher.write_u8(0);
            continue;
        }
        for path in resolved {
            hasher.write(path.to_string_lossy().as_bytes());
            match std::fs::metadata(&path) {
                Ok(meta) => {
                    hasher.write_u64(meta.len());
                    if let Ok(mtime) = meta.modified() {
                        if let Ok(elapsed) = mtime.duration_since(UNIX_EPOCH) {
                            hasher.write_u64(elapsed.as_secs());
                            hasher.write_u32(elapsed.subsec_nanos());
                        }
                    }
                }
                // path vanished between resolve and stat; treat as absent
                Err(_) => hasher.write_u8(0),
            }
        }
    }
    Ok(hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_stable_for_unchanged_outputs() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let out = dir.path().join("out.tsv");
        std::fs::write(&out, "data")?;

        let outputs = vec![out];
        assert_eq!(
            fingerprint_outputs(&fs, &outputs)?,
            fingerprint_outputs(&fs, &outputs)?
        );
        Ok(())
    }

    #[test]
    fn test_changes_when_output_changes() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let out = dir.path().join("out.tsv");
        std::fs::write(&out, "data")?;

        let outputs = vec![out.clone()];
        let before = fingerprint_outputs(&fs, &outputs)?;
        std::fs::write(&out, "data, but considerably longer")?;
        assert_ne!(before, fingerprint_outputs(&fs, &outputs)?);
        Ok(())
    }

    #[test]
    fn test_changes_when_missing_output_appears() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let out = dir.path().join("late.tsv");

        let outputs = vec![out.clone()];
        let absent = fingerprint_outputs(&fs, &outputs)?;
        std::fs::write(&out, "here now")?;
        assert_ne!(absent, fingerprint_outputs(&fs, &outputs)?);
        Ok(())
    }

    #[test]
    fn test_covers_glob_matches() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        std::fs::write(dir.path().join("a.gff"), "x")?;

        let outputs = vec![dir.path().join("*.gff")];
        let one = fingerprint_outputs(&fs, &outputs)?;
        std::fs::write(dir.path().join("b.gff"), "y")?;
        assert_ne!(one, fingerprint_outputs(&fs, &outputs)?);
        Ok(())
    }
}
