use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::fs::Fs;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed checkpoint record: {0}")]
    Malformed(String),
    #[error("Unknown checkpoint status \"{0}\"")]
    UnknownStatus(String),
}

/// Completion state recorded for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointStatus {
    Pending,
    Completed,
    Failed,
}

impl CheckpointStatus {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(Error::UnknownStatus(s.to_owned())),
        }
    }
}

/// A persisted per-step completion record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub status: CheckpointStatus,
    /// Digest of the step's declared outputs at completion time.
    pub fingerprint: u64,
    /// Non-zero exit recorded when a failure was tolerated.
    pub exit: Option<i32>,
}

/// Persists one record per step id in the checkpoint directory.
///
/// Records are written whole and only ever replaced whole, so a reader
/// either sees the previous record or the new one, never a blend.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Create a store over the given (already existing) directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record file for the given step id.
    pub fn record_path(&self, step_id: &str) -> PathBuf {
        self.dir.join(step_id)
    }

    /// Load the record for a step, if one was ever written.
    pub fn load(&self, fs: &Fs, step_id: &str) -> Result<Option<Checkpoint>> {
        let path = self.record_path(step_id);
        if !fs.exists(&path) {
            return Ok(None);
        }
        let text = fs
            .read_to_string(&path)
            .with_context(|| format!("while reading checkpoint record for \"{step_id}\""))?;
        let ckpt = parse_record(&text)
            .with_context(|| format!("while parsing checkpoint record {path:?}"))?;
        Ok(Some(ckpt))
    }

    /// Write (or fully rewrite) the record for a step.
    pub fn write(&self, fs: &Fs, step_id: &str, ckpt: &Checkpoint) -> Result<()> {
        let mut text = String::with_capacity(64);
        text.push_str(ckpt.status.as_str());
        text.push('\n');
        text.push_str(&format!("fingerprint {:016x}\n", ckpt.fingerprint));
        if let Some(code) = ckpt.exit {
            text.push_str(&format!("exit {code}\n"));
        }
        fs.write_file(self.record_path(step_id), &text)
            .with_context(|| format!("while writing checkpoint record for \"{step_id}\""))
    }

    /// Remove a stale record; absent records are not an error.
    pub fn remove(&self, fs: &Fs, step_id: &str) -> Result<()> {
        fs.delete_file_if_exists(self.record_path(step_id))
            .with_context(|| format!("while removing checkpoint record for \"{step_id}\""))
    }
}

fn parse_record(text: &str) -> Result<Checkpoint> {
    let mut lines = text.lines();
    let status = lines
        .next()
        .ok_or_else(|| Error::Malformed("empty record".to_owned()))?;
    let status = CheckpointStatus::parse(status.trim())?;

    let mut fingerprint = None;
    let mut exit = None;
    for line in lines {
        match line.trim().split_once(' ') {
            Some(("fingerprint", hex)) => {
                let parsed = u64::from_str_radix(hex, 16)
                    .map_err(|_| Error::Malformed(format!("bad fingerprint \"{hex}\"")))?;
                fingerprint = Some(parsed);
            }
            Some(("exit", code)) => {
                let parsed = code
                    .parse::<i32>()
                    .map_err(|_| Error::Malformed(format!("bad exit code \"{code}\"")))?;
                exit = Some(parsed);
            }
            _ if line.trim().is_empty() => {}
            _ => return Err(Error::Malformed(format!("unexpected line \"{line}\"")).into()),
        }
    }

    // records written by the standalone script artifact carry no
    // fingerprint; zero never matches real outputs, forcing a re-check
    Ok(Checkpoint {
        status,
        fingerprint: fingerprint.unwrap_or(0),
        exit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_record_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());

        let ckpt = Checkpoint {
            status: CheckpointStatus::Completed,
            fingerprint: 0xdead_beef_0123,
            exit: Some(2),
        };
        store.write(&fs, "virfinder", &ckpt)?;
        assert_eq!(store.load(&fs, "virfinder")?, Some(ckpt));
        Ok(())
    }

    #[test]
    fn test_load_missing_record() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());
        assert_eq!(store.load(&fs, "nope")?, None);
        Ok(())
    }

    #[test]
    fn test_record_without_exit_note() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());

        let ckpt = Checkpoint {
            status: CheckpointStatus::Completed,
            fingerprint: 42,
            exit: None,
        };
        store.write(&fs, "index", &ckpt)?;
        assert_eq!(store.load(&fs, "index")?, Some(ckpt));
        Ok(())
    }

    #[test]
    fn test_malformed_record_rejected() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());

        fs.write_file(store.record_path("bad"), "completed\nnot a field\n")?;
        assert!(store.load(&fs, "bad").is_err());

        fs.write_file(store.record_path("worse"), "sideways\nfingerprint 0\n")?;
        assert!(store.load(&fs, "worse").is_err());
        Ok(())
    }

    #[test]
    fn test_script_written_record_has_zero_fingerprint() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());

        // what the compiled script artifact writes on its own:
        fs.write_file(store.record_path("manual"), "completed\n")?;
        let ckpt = store.load(&fs, "manual")?.unwrap();
        assert_eq!(ckpt.status, CheckpointStatus::Completed);
        assert_eq!(ckpt.fingerprint, 0);
        Ok(())
    }

    #[test]
    fn test_remove_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let fs = Fs::new(dir.path());
        let store = CheckpointStore::new(dir.path());
        store.remove(&fs, "never-written")?;
        Ok(())
    }
}
