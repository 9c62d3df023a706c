use std::path::PathBuf;

use anyhow::Result;

use crate::args::{Args, PipelineCommand};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("No tool source configured; pass --path-config or --conda-prefix")]
    NoToolSource,
    #[error("Both --path-config and --conda-prefix were given; pick one")]
    AmbiguousToolSource,
    #[error("Tool config file does not exist: {0}")]
    ConfigNotFound(String),
    #[error("Scripts directory does not exist: {0}")]
    ScriptsDirNotFound(String),
}

/// Where tool invocation paths come from.
#[derive(Debug)]
pub enum ToolSource {
    /// two-column TSV file mapping name to executable
    ConfigFile(PathBuf),
    /// <prefix>/bin/<name> for every required tool
    CondaPrefix(PathBuf),
}

/// Settings are like Args, except all the logic has
/// been applied so e.g. defaults are added in.
pub struct Settings {
    pub command: PipelineCommand,
    pub tool_source: ToolSource,
    pub scripts_dir: Option<PathBuf>,
    pub n_jobs: usize,
    pub random_state: u64,
    pub restart_from_checkpoint: Option<String>,
    pub tmpdir: Option<PathBuf>,
    pub dry_run: bool,
    pub verbose: u8,
}

impl TryFrom<Args> for Settings {
    type Error = anyhow::Error;
    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let tool_source = match (args.path_config, args.conda_prefix) {
            (Some(_), Some(_)) => return Err(Error::AmbiguousToolSource.into()),
            (None, None) => return Err(Error::NoToolSource.into()),
            (Some(config), None) => {
                let config = PathBuf::from(config);
                if !config.exists() {
                    return Err(
                        Error::ConfigNotFound(config.to_string_lossy().into_owned()).into(),
                    );
                }
                ToolSource::ConfigFile(config.canonicalize()?)
            }
            (None, Some(prefix)) => ToolSource::CondaPrefix(PathBuf::from(prefix)),
        };

        let scripts_dir = match args.scripts_dir {
            Some(dir) => {
                let dir = PathBuf::from(dir);
                if !dir.is_dir() {
                    return Err(
                        Error::ScriptsDirNotFound(dir.to_string_lossy().into_owned()).into(),
                    );
                }
                Some(dir.canonicalize()?)
            }
            None => None,
        };

        Ok(Self {
            command: args.command,
            tool_source,
            scripts_dir,
            n_jobs: args.n_jobs,
            random_state: args.random_state,
            restart_from_checkpoint: args.restart_from_checkpoint,
            tmpdir: args.tmpdir.map(PathBuf::from),
            dry_run: args.dry_run,
            verbose: args.verbose,
        })
    }
}
