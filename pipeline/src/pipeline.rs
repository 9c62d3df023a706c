use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::checkpoint::CheckpointStore;
use crate::executor::{self, ExecutionSummary, Executor};
use crate::fs::{self, Fs};
use crate::script::{ScriptBuilder, ScriptPaths};
use crate::step::Step;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Duplicate step id \"{0}\"")]
    DuplicateStepId(String),
    #[error("Step \"{id}\" has order {order}; must be greater than the previous step's order {prev}")]
    OrderNotIncreasing { id: String, order: u32, prev: u32 },
    #[error("Pipeline is already compiled; no further steps can be added")]
    AlreadyCompiled,
    #[error("Pipeline must be compiled before it can be executed")]
    NotCompiled,
    #[error("Restart target \"{0}\" does not name a step in this pipeline")]
    UnknownRestartTarget(String),
}

/// An ordered, checkpointed sequence of `Step`s.
///
/// Steps execute strictly in registration order; there is no reordering and
/// no cross-step parallelism (each step generally consumes the previous
/// step's outputs). `compile` freezes the sequence and writes the script
/// artifact; `execute` runs it against the checkpoint store.
///
/// The checkpoint and log directories are exclusively owned by one run;
/// keeping concurrent runs out of them is the caller's responsibility.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    steps: Vec<Step>,
    checkpoints: CheckpointStore,
    log_dir: PathBuf,
    fs: Fs,
    compiled: bool,
}

impl Pipeline {
    /// Create an empty pipeline. `project_dir` bounds all destructive file
    /// operations; the checkpoint and log directories must already exist.
    pub fn new(
        name: impl Into<String>,
        project_dir: &Path,
        checkpoint_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            steps: Vec::with_capacity(8),
            checkpoints: CheckpointStore::new(checkpoint_dir),
            log_dir: log_dir.into(),
            fs: Fs::new(project_dir),
            compiled: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// `{order}__{id}` log prefix for the given step id, if registered.
    pub fn log_prefix(&self, id: &str) -> Option<String> {
        self.steps.iter().find(|s| s.id == id).map(Step::label)
    }

    /// Append a step. The sequence must be registered in execution order:
    /// duplicate ids and non-increasing `order` values are rejected
    /// immediately, leaving the pipeline unchanged.
    pub fn add_step(&mut self, step: Step) -> Result<(), Error> {
        if self.compiled {
            return Err(Error::AlreadyCompiled);
        }
        if self.steps.iter().any(|s| s.id == step.id) {
            return Err(Error::DuplicateStepId(step.id));
        }
        if let Some(prev) = self.steps.last() {
            if step.order <= prev.order {
                return Err(Error::OrderNotIncreasing {
                    id: step.id,
                    order: step.order,
                    prev: prev.order,
                });
            }
        }
        self.steps.push(step);
        Ok(())
    }

    /// Write the executable script artifact for the whole pipeline and
    /// freeze the step sequence.
    ///
    /// Inputs that no earlier step produces must exist now; inputs behind an
    /// earlier step's declared outputs don't exist yet and are checked at
    /// execution time instead.
    pub fn compile<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.check_static_inputs()?;

        let mut strbuf = String::with_capacity(4096);
        let mut script = ScriptBuilder::new(&mut strbuf);
        script.write_header(&self.name);

        script.write_log_map_start();
        for step in &self.steps {
            let paths = self.script_paths(step)?;
            script.write_log_map_entry(&step.label(), &paths);
        }
        script.write_set_options();

        let mut cmd_buf = String::with_capacity(512);
        for step in &self.steps {
            let paths = self.script_paths(step)?;
            cmd_buf.clear();
            step.command.render(&mut cmd_buf)?;
            script.write_step(step, &cmd_buf, &paths);
        }

        out.write_all(strbuf.as_bytes())
            .context("while writing compiled pipeline script")?;
        self.compiled = true;

        log::info!(
            "compiled pipeline \"{}\" with {} steps",
            self.name,
            self.steps.len()
        );
        Ok(())
    }

    /// Run the compiled sequence, honoring existing checkpoints.
    ///
    /// With `restart_from`, every step ordered before the named step is
    /// trusted as completed without re-validation, and the named step and
    /// everything after re-run unconditionally. An unknown restart target
    /// fails before any step runs.
    pub fn execute(&self, restart_from: Option<&str>) -> Result<ExecutionSummary> {
        if !self.compiled {
            return Err(Error::NotCompiled.into());
        }
        let resume_order = match restart_from {
            Some(target) => {
                let step = self
                    .find_restart_target(target)
                    .ok_or_else(|| Error::UnknownRestartTarget(target.to_owned()))?;
                log::info!(
                    "restarting from checkpoint \"{}\" (order {})",
                    step.id,
                    step.order
                );
                Some(step.order)
            }
            None => None,
        };

        let mut executor = Executor::new(&self.steps, &self.checkpoints, &self.fs, &self.log_dir);
        executor.run(resume_order)
    }

    /// The restart parameter may name a step id, or its registration order.
    fn find_restart_target(&self, target: &str) -> Option<&Step> {
        if let Some(step) = self.steps.iter().find(|s| s.id == target) {
            return Some(step);
        }
        let order = target.parse::<u32>().ok()?;
        self.steps.iter().find(|s| s.order == order)
    }

    fn check_static_inputs(&self) -> Result<()> {
        let mut earlier_outputs: Vec<&Path> = Vec::with_capacity(16);
        for step in &self.steps {
            if step.validate_inputs {
                for input in &step.input_paths {
                    if produced_by_earlier(input, &earlier_outputs) {
                        continue;
                    }
                    if self.fs.resolve(input)?.is_empty() {
                        return Err(executor::Error::MissingInput {
                            step: step.id.clone(),
                            path: input.to_string_lossy().into_owned(),
                        }
                        .into());
                    }
                }
            }
            earlier_outputs.extend(step.output_paths.iter().map(PathBuf::as_path));
        }
        Ok(())
    }

    fn script_paths(&self, step: &Step) -> Result<ScriptPaths> {
        let files = step_files(&self.checkpoints, &self.log_dir, step);
        Ok(ScriptPaths {
            checkpoint: fs::path_str(&files.checkpoint)?.to_owned(),
            stdout_log: fs::path_str(&files.stdout_log)?.to_owned(),
            stderr_log: fs::path_str(&files.stderr_log)?.to_owned(),
        })
    }
}

/// The bookkeeping files belonging to one step.
#[derive(Debug)]
pub(crate) struct StepFiles {
    pub checkpoint: PathBuf,
    pub stdout_log: PathBuf,
    pub stderr_log: PathBuf,
}

pub(crate) fn step_files(store: &CheckpointStore, log_dir: &Path, step: &Step) -> StepFiles {
    let label = step.label();
    StepFiles {
        checkpoint: store.record_path(&step.id),
        stdout_log: log_dir.join(format!("{label}.o")),
        stderr_log: log_dir.join(format!("{label}.e")),
    }
}

/// An input that lives under (or above) an earlier step's declared output
/// doesn't exist until that step runs. Glob declarations are compared by
/// their literal prefixes.
fn produced_by_earlier(input: &Path, earlier_outputs: &[&Path]) -> bool {
    let input = fs::literal_prefix(input);
    earlier_outputs.iter().any(|out| {
        let out = fs::literal_prefix(out);
        input.starts_with(&out) || out.starts_with(&input)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Cmd, ShellExpr};

    fn step(id: &str, order: u32) -> Step {
        Step {
            id: id.to_owned(),
            order,
            description: String::new(),
            command: Cmd::new("true").into(),
            input_paths: Vec::new(),
            output_paths: Vec::new(),
            validate_inputs: false,
            validate_outputs: false,
            errors_ok: false,
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new("test", Path::new("/tmp"), "/tmp/ckpt", "/tmp/log")
    }

    #[test]
    fn test_add_step_rejects_duplicate_id() {
        let mut p = pipeline();
        p.add_step(step("a", 1)).unwrap();
        let err = p.add_step(step("a", 2)).unwrap_err();
        assert!(matches!(err, Error::DuplicateStepId(_)));
        assert_eq!(p.steps().len(), 1);
    }

    #[test]
    fn test_add_step_rejects_non_increasing_order() {
        let mut p = pipeline();
        p.add_step(step("a", 2)).unwrap();
        let err = p.add_step(step("b", 2)).unwrap_err();
        assert!(matches!(err, Error::OrderNotIncreasing { .. }));
        let err = p.add_step(step("c", 1)).unwrap_err();
        assert!(matches!(err, Error::OrderNotIncreasing { .. }));
        assert_eq!(p.steps().len(), 1);
    }

    #[test]
    fn test_add_step_rejected_after_compile() -> Result<()> {
        let mut p = pipeline();
        p.add_step(step("a", 1))?;
        p.compile(&mut std::io::sink())?;
        let err = p.add_step(step("b", 2)).unwrap_err();
        assert!(matches!(err, Error::AlreadyCompiled));
        Ok(())
    }

    #[test]
    fn test_execute_requires_compile() {
        let mut p = pipeline();
        p.add_step(step("a", 1)).unwrap();
        assert!(p.execute(None).is_err());
    }

    #[test]
    fn test_log_prefix() {
        let mut p = pipeline();
        p.add_step(step("virfinder", 1)).unwrap();
        assert_eq!(p.log_prefix("virfinder").as_deref(), Some("1__virfinder"));
        assert_eq!(p.log_prefix("nope"), None);
    }

    #[test]
    fn test_deferred_input_detection() {
        let outputs = [Path::new("run/intermediate/1__index/coassembly.fasta")];
        assert!(produced_by_earlier(
            Path::new("run/intermediate/1__index/coassembly.fasta"),
            &outputs
        ));
        // parent dir of a declared output is also deferred:
        assert!(produced_by_earlier(
            Path::new("run/intermediate/1__index"),
            &outputs
        ));
        assert!(!produced_by_earlier(Path::new("reads.tsv"), &outputs));

        let glob_outputs = [Path::new("run/intermediate/2__alignment/*/mapped.sorted.bam")];
        assert!(produced_by_earlier(
            Path::new("run/intermediate/2__alignment/*/mapped.sorted.bam"),
            &glob_outputs
        ));
    }

    #[test]
    fn test_compiled_script_contains_guards() -> Result<()> {
        let mut p = pipeline();
        let mut a = step("a", 1);
        a.command = ShellExpr::from(Cmd::new("echo").arg("hi")).stdout_to("/tmp/out.txt");
        p.add_step(a)?;

        let mut buf = Vec::new();
        p.compile(&mut buf)?;
        let text = String::from_utf8(buf).unwrap();

        assert!(text.starts_with("#!/usr/bin/env bash\n"));
        assert!(text.contains("set -eo pipefail"));
        assert!(text.contains("# 1__a"));
        assert!(text.contains("grep -qs '^completed'"));
        assert!(text.contains("already completed"));
        assert!(text.contains("echo hi > /tmp/out.txt"));
        Ok(())
    }
}
