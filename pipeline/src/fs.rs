use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{Context, Result};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Path is not valid UTF-8: {0}")]
    PathEncoding(String),
    #[error("Invalid glob pattern \"{0}\": {1}")]
    BadPattern(String, glob::PatternError),
    #[error("Can't perform IO operation: \"{0}\" is not whitelisted")]
    NotWhitelisted(String),
}

/// All file operations in the engine go through this struct.
///
/// Destructive operations check that the path in question is a child of the
/// single whitelisted prefix (the project dir), otherwise they will not be
/// performed. Step commands run through the host shell and can break this
/// rule; it is up to the pipeline author to keep them inside the project.
#[derive(Debug, Clone)]
pub struct Fs {
    /// The directory we are allowed to modify
    project_prefix: PathBuf,
}

impl Fs {
    /// Create a new `Fs` rooted at the given project directory.
    pub fn new(project_prefix: &Path) -> Self {
        Self {
            project_prefix: project_prefix.to_path_buf(),
        }
    }

    /// Check if path exists on disk.
    pub fn exists<T: AsRef<Path>>(&self, path: T) -> bool {
        let path = path.as_ref();
        path.exists() || path.is_symlink()
    }

    /// Check if path is a non-empty file, or a directory with at least one entry.
    pub fn is_nonempty<T: AsRef<Path>>(&self, path: T) -> Result<bool> {
        let path = path.as_ref();
        if path.is_file() {
            let len = fs::metadata(path).context("reading file metadata")?.len();
            Ok(len > 0)
        } else if path.is_dir() {
            let mut entries = fs::read_dir(path).context("listing dir")?;
            Ok(entries.next().is_some())
        } else {
            // symlink to nothing, or gone entirely
            Ok(false)
        }
    }

    /// Resolve a declared path: a plain path resolves to itself when it
    /// exists, a glob pattern resolves to its matches. An empty Vec means
    /// nothing on disk satisfies the declaration.
    pub fn resolve(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if is_pattern(path) {
            self.expand(path)
        } else if self.exists(path) {
            Ok(vec![path.to_path_buf()])
        } else {
            Ok(Vec::with_capacity(0))
        }
    }

    /// Expand a glob pattern into matching paths (empty if none match).
    pub fn expand(&self, pattern: &Path) -> Result<Vec<PathBuf>> {
        let pattern = path_str(pattern)?;
        let paths = glob::glob(pattern)
            .map_err(|e| Error::BadPattern(pattern.to_owned(), e))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("while expanding glob \"{pattern}\""))?;
        Ok(paths)
    }

    /// Create a file, and return a writable `File` handle.
    pub fn create_file<T: AsRef<Path>>(&self, path: T) -> Result<fs::File> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        let f = fs::File::create(path).context("creating file")?;
        Ok(f)
    }

    /// Write entire str to a file.
    pub fn write_file<T: AsRef<Path>>(&self, path: T, text: &str) -> Result<()> {
        let path = path.as_ref();
        self.check_whitelist(path)?;
        fs::write(path, text).context("writing file")?;
        Ok(())
    }

    /// Delete a file; absent files are not an error.
    pub fn delete_file_if_exists<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        let path = path.as_ref();
        if !self.exists(path) {
            return Ok(());
        }
        self.check_whitelist(path)?;
        fs::remove_file(path).context("deleting file")?;
        Ok(())
    }

    /// Read entire file into a String.
    pub fn read_to_string<T: AsRef<Path>>(&self, path: T) -> Result<String, io::Error> {
        fs::read_to_string(path)
    }

    fn check_whitelist(&self, path: &Path) -> Result<()> {
        if path.starts_with(&self.project_prefix) {
            Ok(())
        } else {
            Err(Error::NotWhitelisted(path_str(path)?.to_owned()).into())
        }
    }
}

/// true if `path` contains glob metacharacters.
pub fn is_pattern(path: &Path) -> bool {
    match path.to_str() {
        Some(s) => s.contains(['*', '?', '[']),
        None => false,
    }
}

/// The leading components of `path` before the first glob component.
/// A plain path is returned whole.
pub fn literal_prefix(path: &Path) -> PathBuf {
    let mut prefix = PathBuf::with_capacity(path.as_os_str().len());
    for component in path.components() {
        if is_pattern(component.as_ref()) {
            break;
        }
        prefix.push(component);
    }
    prefix
}

pub(crate) fn path_str(path: &Path) -> Result<&str, Error> {
    path.to_str()
        .ok_or_else(|| Error::PathEncoding(path.to_string_lossy().into_owned()))
}
