use std::path::Path;

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;

use pipeline::Cmd;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Tool \"{0}\" is not configured; add it to the tool config")]
    NotConfigured(String),
    #[error("Malformed row {0} in tool config (expected name<TAB>executable)")]
    MalformedRow(usize),
    #[error("Tool config names no executables")]
    Empty,
    #[error("Missing executables in tool config: {0}")]
    MissingTools(String),
    #[error("Path is not valid UTF-8: {0}")]
    PathEncoding(String),
}

/// How to invoke one external tool: a program plus any leading arguments,
/// so an accessory script can run as `python /path/to/script.py`.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub leading_args: Vec<String>,
}

impl Invocation {
    fn parse(raw: &str) -> Option<Self> {
        let mut tokens = raw.split_whitespace();
        let program = tokens.next()?.to_owned();
        let leading_args = tokens.map(str::to_owned).collect();
        Some(Self {
            program,
            leading_args,
        })
    }
}

/// Explicit mapping from tool name to invocation path.
///
/// Step builders receive this mapping as an argument; nothing is resolved
/// through the ambient process environment at use sites.
#[derive(Debug, Clone, Default)]
pub struct ToolConfig {
    tools: FxHashMap<String, Invocation>,
}

impl ToolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a two-column TSV (`name<TAB>executable`). A `name executable`
    /// header row and blank or `#`-prefixed lines are skipped.
    pub fn from_tsv(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("while reading tool config file {path:?}"))?;
        Self::parse_tsv(&text).with_context(|| format!("while parsing tool config file {path:?}"))
    }

    fn parse_tsv(text: &str) -> Result<Self> {
        let mut config = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (name, executable) = line.split_once('\t').ok_or(Error::MalformedRow(i + 1))?;
            let (name, executable) = (name.trim(), executable.trim());
            if i == 0 && name == "name" && executable == "executable" {
                continue;
            }
            if executable.is_empty() {
                return Err(Error::MalformedRow(i + 1).into());
            }
            config.insert(name, executable);
        }
        if config.tools.is_empty() {
            return Err(Error::Empty.into());
        }
        Ok(config)
    }

    /// Resolve every requested tool as `<prefix>/bin/<name>`.
    pub fn from_conda_prefix(prefix: &Path, names: &[&str]) -> Result<Self> {
        let mut config = Self::new();
        for name in names {
            let path = prefix.join("bin").join(name);
            let path = path
                .to_str()
                .ok_or_else(|| Error::PathEncoding(path.to_string_lossy().into_owned()))?;
            config.insert(name, path);
        }
        Ok(config)
    }

    /// Register (or override) one tool.
    pub fn insert(&mut self, name: &str, invocation: &str) {
        if let Some(invocation) = Invocation::parse(invocation) {
            self.tools.insert(name.to_owned(), invocation);
        }
    }

    /// Register an accessory script living in `scripts_dir`. Python scripts
    /// run through `python`; anything else is invoked directly.
    pub fn add_script(&mut self, name: &str, scripts_dir: &Path) -> Result<()> {
        let path = scripts_dir.join(name);
        let path = path
            .to_str()
            .ok_or_else(|| Error::PathEncoding(path.to_string_lossy().into_owned()))?;
        let invocation = if name.ends_with(".py") {
            Invocation {
                program: "python".to_owned(),
                leading_args: vec![path.to_owned()],
            }
        } else {
            Invocation {
                program: path.to_owned(),
                leading_args: Vec::new(),
            }
        };
        self.tools.insert(name.to_owned(), invocation);
        Ok(())
    }

    /// Look up a tool's invocation.
    pub fn get(&self, name: &str) -> Result<&Invocation, Error> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::NotConfigured(name.to_owned()))
    }

    /// Start building a command for the given tool.
    pub fn cmd(&self, name: &str) -> Result<Cmd, Error> {
        let invocation = self.get(name)?;
        let mut cmd = Cmd::new(&invocation.program);
        for arg in &invocation.leading_args {
            cmd = cmd.arg(arg);
        }
        Ok(cmd)
    }

    /// Verify that every required tool is present, listing all that are not.
    pub fn require(&self, names: &[&str]) -> Result<(), Error> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|name| !self.tools.contains_key(**name))
            .copied()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingTools(missing.join(", ")))
        }
    }

    /// Configured tools in sorted order (for banners).
    pub fn iter_sorted(&self) -> Vec<(&str, &Invocation)> {
        let mut entries: Vec<_> = self
            .tools
            .iter()
            .map(|(name, inv)| (name.as_str(), inv))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries
    }
}
