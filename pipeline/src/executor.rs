use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use crate::checkpoint::{Checkpoint, CheckpointStatus, CheckpointStore};
use crate::fingerprint::fingerprint_outputs;
use crate::fs::Fs;
use crate::pipeline::step_files;
use crate::run_cmd::run_cmd;
use crate::step::Step;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Missing input for step \"{step}\": {path}")]
    MissingInput { step: String, path: String },
    #[error("Missing or empty output for step \"{step}\": {path}")]
    MissingOutput { step: String, path: String },
    #[error("Step \"{step}\" failed with exit code {code} (log: {log})")]
    StepFailed {
        step: String,
        code: i32,
        log: String,
    },
}

/// Terminal state of one step in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// checkpoint was valid; the step did not run
    Skipped,
    /// ordered before the restart target; checkpoint trusted without re-validation
    Trusted,
    /// ran to completion
    Completed,
    /// ran and failed, but the step's policy tolerates failure
    ToleratedFailure,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub id: String,
    pub outcome: StepOutcome,
}

/// Per-step outcomes of one pipeline run.
#[derive(Debug, Default)]
pub struct ExecutionSummary {
    reports: Vec<StepReport>,
}

impl ExecutionSummary {
    pub fn reports(&self) -> &[StepReport] {
        &self.reports
    }

    pub fn outcome(&self, id: &str) -> Option<StepOutcome> {
        self.reports.iter().find(|r| r.id == id).map(|r| r.outcome)
    }

    /// Number of steps that actually executed.
    pub fn num_ran(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    StepOutcome::Completed | StepOutcome::ToleratedFailure
                )
            })
            .count()
    }

    /// Number of steps satisfied without executing.
    pub fn num_skipped(&self) -> usize {
        self.reports.len() - self.num_ran()
    }

    fn push(&mut self, step: &Step, outcome: StepOutcome) {
        self.reports.push(StepReport {
            id: step.id.clone(),
            outcome,
        });
    }
}

/// `Executor` walks the frozen step sequence one final time and runs it.
///
/// For each step it decides skip vs. run from the checkpoint store, checks
/// declared inputs before executing, invokes the command through the host
/// shell with output teed into the step's log files, checks declared outputs
/// after, and records a fresh checkpoint. A fatal failure halts the whole
/// pipeline immediately; checkpoints of already-completed steps stay valid.
pub(crate) struct Executor<'a> {
    steps: &'a [Step],
    store: &'a CheckpointStore,
    fs: &'a Fs,
    log_dir: &'a Path,
}

impl<'a> Executor<'a> {
    pub fn new(
        steps: &'a [Step],
        store: &'a CheckpointStore,
        fs: &'a Fs,
        log_dir: &'a Path,
    ) -> Self {
        Self {
            steps,
            store,
            fs,
            log_dir,
        }
    }
}

impl Executor<'_> {
    pub fn run(&mut self, resume_order: Option<u32>) -> Result<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();

        for step in self.steps {
            let label = step.label();

            if let Some(resume) = resume_order {
                if step.order < resume {
                    eprintln!("{} {label} (precedes restart target)", "SKIP".green());
                    summary.push(step, StepOutcome::Trusted);
                    continue;
                }
            } else if self.checkpoint_is_current(step)? {
                eprintln!("{} {label} (already completed)", "SKIP".green());
                summary.push(step, StepOutcome::Skipped);
                continue;
            }

            let outcome = self.run_step(step, &label)?;
            summary.push(step, outcome);
        }

        eprintln!("\n{}", "Completed pipeline.".green());
        Ok(summary)
    }

    /// true if the step has a completed record whose fingerprint still
    /// matches the outputs on disk.
    fn checkpoint_is_current(&self, step: &Step) -> Result<bool> {
        match self.store.load(self.fs, &step.id)? {
            Some(ckpt) if ckpt.status == CheckpointStatus::Completed => {
                Ok(ckpt.fingerprint == fingerprint_outputs(self.fs, &step.output_paths)?)
            }
            _ => Ok(false),
        }
    }

    fn run_step(&mut self, step: &Step, label: &str) -> Result<StepOutcome> {
        let files = step_files(self.store, self.log_dir, step);

        // a stale record must not outlive a failure below
        self.store.remove(self.fs, &step.id)?;

        eprintln!("\n{} {label}: {}", "RUN".green(), step.description);

        if step.validate_inputs {
            self.check_inputs(step)
                .with_context(|| format!("while checking inputs of step \"{}\"", step.id))?;
        }

        let status = run_cmd(&step.command, &files, self.fs)
            .with_context(|| format!("while running step \"{}\"", step.id))?;

        let mut tolerated = false;
        let mut exit = None;
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            if step.errors_ok {
                eprintln!(
                    "{} {label} exited with code {code}; policy tolerates failure",
                    "WARN".yellow()
                );
                log::warn!("step \"{}\" failed with tolerated exit {code}", step.id);
                tolerated = true;
                exit = Some(code);
            } else {
                eprintln!(
                    "{} {label}: {}",
                    "FAILED".red(),
                    step.command.to_shell_string()?
                );
                return Err(Error::StepFailed {
                    step: step.id.clone(),
                    code,
                    log: files.stderr_log.to_string_lossy().into_owned(),
                }
                .into());
            }
        }

        if step.validate_outputs {
            if let Err(e) = self.check_outputs(step) {
                if step.errors_ok {
                    eprintln!("{} {e}; policy tolerates failure", "WARN".yellow());
                    log::warn!("{e}");
                    tolerated = true;
                } else {
                    return Err(e.into());
                }
            }
        }

        let fingerprint = fingerprint_outputs(self.fs, &step.output_paths)?;
        self.store.write(
            self.fs,
            &step.id,
            &Checkpoint {
                status: CheckpointStatus::Completed,
                fingerprint,
                exit,
            },
        )?;

        eprintln!("{} {label}", "COMPLETED".green());
        Ok(if tolerated {
            StepOutcome::ToleratedFailure
        } else {
            StepOutcome::Completed
        })
    }

    fn check_inputs(&self, step: &Step) -> Result<()> {
        for path in &step.input_paths {
            if self.fs.resolve(path)?.is_empty() {
                return Err(Error::MissingInput {
                    step: step.id.clone(),
                    path: path.to_string_lossy().into_owned(),
                }
                .into());
            }
        }
        Ok(())
    }

    fn check_outputs(&self, step: &Step) -> Result<(), Error> {
        for path in &step.output_paths {
            let missing_output = || Error::MissingOutput {
                step: step.id.clone(),
                path: path.to_string_lossy().into_owned(),
            };

            let resolved = match self.fs.resolve(path) {
                Ok(resolved) => resolved,
                Err(_) => return Err(missing_output()),
            };
            if resolved.is_empty() {
                return Err(missing_output());
            }
            for found in resolved {
                match self.fs.is_nonempty(&found) {
                    Ok(true) => {}
                    _ => return Err(missing_output()),
                }
            }
        }
        Ok(())
    }
}
