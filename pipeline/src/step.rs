use std::path::PathBuf;

use crate::ShellExpr;

/// An immutable description of one pipeline stage.
///
/// Constructed once by the caller (the field-by-field struct literal is the
/// intended call-site shape), then consumed by the compiler and executor.
/// The engine never interprets `command` beyond rendering it for the host
/// shell; the I/O declarations and policy flags are the whole contract.
#[derive(Debug, Clone)]
pub struct Step {
    /// Unique within a pipeline; doubles as the checkpoint and log key.
    pub id: String,
    /// Strictly increasing execution position.
    pub order: u32,
    /// Human-readable, purely informational.
    pub description: String,
    /// The executable unit; opaque to the engine.
    pub command: ShellExpr,
    /// Paths the step reads: files, directories, or glob patterns.
    pub input_paths: Vec<PathBuf>,
    /// Paths the step must produce.
    pub output_paths: Vec<PathBuf>,
    /// Enforce existence of `input_paths` before execution.
    pub validate_inputs: bool,
    /// Enforce existence and non-emptiness of `output_paths` after execution.
    pub validate_outputs: bool,
    /// A non-zero exit (or missing output) does not abort the pipeline.
    pub errors_ok: bool,
}

impl Step {
    /// `{order}__{id}`, used to prefix log files and script sections.
    pub fn label(&self) -> String {
        format!("{}__{}", self.order, self.id)
    }
}
