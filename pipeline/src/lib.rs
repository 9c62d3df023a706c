/// Structured shell-command construction
mod command;
pub use command::{Cmd, PathEncodingError, ShellExpr};

/// The step data model
mod step;
pub use step::Step;

/// Persistent per-step completion records
mod checkpoint;
pub use checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};

/// Output fingerprints for staleness detection
mod fingerprint;

/// Filesystem interface
mod fs;
pub use fs::Fs;

/// Step registration, compilation, and execution entry points
mod pipeline;
pub use pipeline::{Error as ConfigError, Pipeline};

/// Generation of the compiled script artifact
mod script;

/// Step-by-step execution against the checkpoint store
mod executor;
pub use executor::{Error as ExecError, ExecutionSummary, StepOutcome, StepReport};

/// Run a subprocess
mod run_cmd;
