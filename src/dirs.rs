use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

/// Well-known directories of one pipeline run, plus the dynamically named
/// per-step intermediate directories.
///
/// The whole tree is created up front; the engine assumes its checkpoint
/// and log directories exist by the time it runs.
#[derive(Debug)]
pub struct ProjectDirs {
    /// root of this run; bounds all destructive engine operations
    pub project: PathBuf,
    pub output: PathBuf,
    pub log: PathBuf,
    pub tmp: PathBuf,
    pub checkpoints: PathBuf,
    pub intermediate: PathBuf,
    /// per-step intermediate dirs, keyed by `{order}__{id}` label
    steps: FxHashMap<String, PathBuf>,
}

impl ProjectDirs {
    /// Create the full directory tree for a run rooted at `project`.
    /// `tmpdir` overrides the default `<project>/tmp` location.
    pub fn create(project: &Path, tmpdir: Option<&Path>) -> Result<Self> {
        fs::create_dir_all(project)
            .with_context(|| format!("while creating project directory {project:?}"))?;
        let project = project.canonicalize()?;

        let output = make_dir(project.join("output"))?;
        let log = make_dir(project.join("log"))?;
        let checkpoints = make_dir(project.join("checkpoints"))?;
        let intermediate = make_dir(project.join("intermediate"))?;
        let tmp = match tmpdir {
            Some(dir) => make_dir(dir.to_path_buf())?,
            None => make_dir(project.join("tmp"))?,
        };

        Ok(Self {
            project,
            output,
            log,
            tmp,
            checkpoints,
            intermediate,
            steps: FxHashMap::default(),
        })
    }

    /// `intermediate/{order}__{id}`, created on first use.
    pub fn intermediate_step(&mut self, order: u32, id: &str) -> Result<&Path> {
        let label = format!("{order}__{id}");
        if !self.steps.contains_key(&label) {
            let dir = make_dir(self.intermediate.join(&label))?;
            self.steps.insert(label.clone(), dir);
        }
        Ok(&self.steps[&label])
    }

    /// The compiled script artifact lives at the project root.
    pub fn commands_script(&self) -> PathBuf {
        self.project.join("commands.sh")
    }
}

fn make_dir(dir: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&dir).with_context(|| format!("while creating directory {dir:?}"))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_builds_full_tree() -> Result<()> {
        let dir = tempdir()?;
        let root = dir.path().join("run");
        let dirs = ProjectDirs::create(&root, None)?;

        for sub in ["output", "log", "tmp", "checkpoints", "intermediate"] {
            assert!(dirs.project.join(sub).is_dir(), "{sub} missing");
        }
        Ok(())
    }

    #[test]
    fn test_tmpdir_override() -> Result<()> {
        let dir = tempdir()?;
        let elsewhere = dir.path().join("scratch");
        let dirs = ProjectDirs::create(&dir.path().join("run"), Some(&elsewhere))?;
        assert_eq!(dirs.tmp, elsewhere);
        assert!(elsewhere.is_dir());
        Ok(())
    }

    #[test]
    fn test_intermediate_step_dirs() -> Result<()> {
        let dir = tempdir()?;
        let mut dirs = ProjectDirs::create(dir.path(), None)?;

        let created = dirs.intermediate_step(1, "virfinder")?.to_path_buf();
        assert!(created.is_dir());
        assert!(created.ends_with("intermediate/1__virfinder"));

        // asking again returns the same dir without re-creating:
        assert_eq!(dirs.intermediate_step(1, "virfinder")?, created.as_path());
        Ok(())
    }
}
