use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::{tempdir, TempDir};
use virapipe_pipeline::{
    Checkpoint, CheckpointStatus, CheckpointStore, Cmd, Fs, Pipeline, ShellExpr, Step, StepOutcome,
};

struct TestProject {
    dir: TempDir,
}

impl TestProject {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        for sub in ["checkpoints", "log", "out"] {
            fs::create_dir(dir.path().join(sub))?;
        }
        Ok(Self { dir })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self, name: &str) -> PathBuf {
        self.root().join("out").join(name)
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            "test",
            self.root(),
            self.root().join("checkpoints"),
            self.root().join("log"),
        )
    }

    fn store(&self) -> (CheckpointStore, Fs) {
        (
            CheckpointStore::new(self.root().join("checkpoints")),
            Fs::new(self.root()),
        )
    }

    fn checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let (store, fs) = self.store();
        store.load(&fs, id)
    }
}

/// A step whose command writes the current nanosecond timestamp to `out`,
/// so re-runs are observable as content changes.
fn stamp_step(project: &TestProject, id: &str, order: u32, out_name: &str) -> Step {
    let out = project.out(out_name);
    Step {
        id: id.to_owned(),
        order,
        description: format!("stamp {out_name}"),
        command: ShellExpr::from(Cmd::new("date").arg("+%s.%N"))
            .stdout_to(&out)
            .grouped(),
        input_paths: Vec::new(),
        output_paths: vec![out],
        validate_inputs: false,
        validate_outputs: true,
        errors_ok: false,
    }
}

fn failing_step(id: &str, order: u32, errors_ok: bool) -> Step {
    Step {
        id: id.to_owned(),
        order,
        description: "always fails".to_owned(),
        command: Cmd::new("false").into(),
        input_paths: Vec::new(),
        output_paths: Vec::new(),
        validate_inputs: false,
        validate_outputs: false,
        errors_ok,
    }
}

fn compile(pipeline: &mut Pipeline) -> Result<()> {
    pipeline.compile(&mut std::io::sink())?;
    Ok(())
}

fn abc_pipeline(project: &TestProject) -> Result<Pipeline> {
    let mut p = project.pipeline();
    p.add_step(stamp_step(project, "A", 1, "a.txt"))?;
    p.add_step(stamp_step(project, "B", 2, "b.txt"))?;
    p.add_step(stamp_step(project, "C", 3, "c.txt"))?;
    Ok(p)
}

#[test]
fn test_full_run_then_idempotent_rerun() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let first = p.execute(None)?;
    assert_eq!(first.num_ran(), 3);
    for id in ["A", "B", "C"] {
        assert_eq!(first.outcome(id), Some(StepOutcome::Completed));
    }
    let a_content = fs::read_to_string(project.out("a.txt"))?;

    // compile + execute again from scratch: all steps skip, nothing re-runs
    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let second = p.execute(None)?;
    assert_eq!(second.num_ran(), 0);
    assert_eq!(second.num_skipped(), 3);
    for id in ["A", "B", "C"] {
        assert_eq!(second.outcome(id), Some(StepOutcome::Skipped));
    }
    assert_eq!(fs::read_to_string(project.out("a.txt"))?, a_content);
    Ok(())
}

#[test]
fn test_restart_reruns_target_and_later_steps_only() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    p.execute(None)?;

    let a_before = fs::read_to_string(project.out("a.txt"))?;
    let b_before = fs::read_to_string(project.out("b.txt"))?;
    let c_before = fs::read_to_string(project.out("c.txt"))?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let summary = p.execute(Some("B"))?;

    assert_eq!(summary.outcome("A"), Some(StepOutcome::Trusted));
    assert_eq!(summary.outcome("B"), Some(StepOutcome::Completed));
    assert_eq!(summary.outcome("C"), Some(StepOutcome::Completed));

    assert_eq!(fs::read_to_string(project.out("a.txt"))?, a_before);
    assert_ne!(fs::read_to_string(project.out("b.txt"))?, b_before);
    assert_ne!(fs::read_to_string(project.out("c.txt"))?, c_before);
    Ok(())
}

#[test]
fn test_restart_target_by_registration_order() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    p.execute(None)?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let summary = p.execute(Some("3"))?;
    assert_eq!(summary.outcome("A"), Some(StepOutcome::Trusted));
    assert_eq!(summary.outcome("B"), Some(StepOutcome::Trusted));
    assert_eq!(summary.outcome("C"), Some(StepOutcome::Completed));
    Ok(())
}

#[test]
fn test_unknown_restart_target_fails_before_any_step() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let err = p.execute(Some("Z")).unwrap_err();
    assert!(err.to_string().contains("Restart target"));

    // nothing ran, nothing was checkpointed:
    assert!(!project.out("a.txt").exists());
    assert!(project.checkpoint("A")?.is_none());
    Ok(())
}

#[test]
fn test_fatal_failure_halts_pipeline() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = project.pipeline();
    p.add_step(stamp_step(&project, "A", 1, "a.txt"))?;
    p.add_step(failing_step("B", 2, false))?;
    p.add_step(stamp_step(&project, "C", 3, "c.txt"))?;
    compile(&mut p)?;

    let err = p.execute(None).unwrap_err();
    assert!(err.to_string().contains("Step \"B\" failed with exit code 1"));

    // C never executed, and no checkpoint was written for B:
    assert!(!project.out("c.txt").exists());
    assert!(project.checkpoint("B")?.is_none());
    // A's checkpoint remains valid:
    assert_eq!(
        project.checkpoint("A")?.map(|c| c.status),
        Some(CheckpointStatus::Completed)
    );
    Ok(())
}

#[test]
fn test_tolerated_failure_continues_and_checkpoints() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = project.pipeline();
    p.add_step(stamp_step(&project, "A", 1, "a.txt"))?;
    p.add_step(failing_step("B", 2, true))?;
    p.add_step(stamp_step(&project, "C", 3, "c.txt"))?;
    compile(&mut p)?;

    let summary = p.execute(None)?;
    assert_eq!(summary.outcome("B"), Some(StepOutcome::ToleratedFailure));
    assert_eq!(summary.outcome("C"), Some(StepOutcome::Completed));
    assert!(project.out("c.txt").exists());

    // B's checkpoint is completed, with the failure noted:
    let ckpt = project.checkpoint("B")?.unwrap();
    assert_eq!(ckpt.status, CheckpointStatus::Completed);
    assert_eq!(ckpt.exit, Some(1));
    Ok(())
}

#[test]
fn test_missing_output_is_fatal() -> Result<()> {
    let project = TestProject::new()?;

    let out = project.out("out.tsv");
    let mut p = project.pipeline();
    p.add_step(Step {
        id: "quiet".to_owned(),
        order: 1,
        description: "claims an output it never writes".to_owned(),
        command: Cmd::new("true").into(),
        input_paths: Vec::new(),
        output_paths: vec![out],
        validate_inputs: false,
        validate_outputs: true,
        errors_ok: false,
    })?;
    compile(&mut p)?;

    let err = p.execute(None).unwrap_err();
    assert!(format!("{err:?}").contains("Missing or empty output"));
    assert!(project.checkpoint("quiet")?.is_none());
    Ok(())
}

#[test]
fn test_empty_output_is_fatal() -> Result<()> {
    let project = TestProject::new()?;

    let out = project.out("out.tsv");
    let mut p = project.pipeline();
    p.add_step(Step {
        id: "hollow".to_owned(),
        order: 1,
        description: "writes an empty output".to_owned(),
        command: Cmd::new("touch").path(&out).into(),
        input_paths: Vec::new(),
        output_paths: vec![out],
        validate_inputs: false,
        validate_outputs: true,
        errors_ok: false,
    })?;
    compile(&mut p)?;

    let err = p.execute(None).unwrap_err();
    assert!(format!("{err:?}").contains("Missing or empty output"));
    Ok(())
}

#[test]
fn test_stale_output_forces_rerun() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    p.execute(None)?;

    // tamper with B's output; only B should re-run
    fs::write(project.out("b.txt"), "tampered with, at length")?;

    let mut p = abc_pipeline(&project)?;
    compile(&mut p)?;
    let summary = p.execute(None)?;
    assert_eq!(summary.outcome("A"), Some(StepOutcome::Skipped));
    assert_eq!(summary.outcome("B"), Some(StepOutcome::Completed));
    assert_eq!(summary.outcome("C"), Some(StepOutcome::Skipped));
    Ok(())
}

#[test]
fn test_missing_input_halts_at_execution_time() -> Result<()> {
    let project = TestProject::new()?;

    // A declares out/a.txt, B reads it; B's input is produced by an earlier
    // step, so compilation defers the check to run time.
    let a_out = project.out("a.txt");
    let mut p = project.pipeline();
    p.add_step(Step {
        id: "A".to_owned(),
        order: 1,
        description: "pretends to write a.txt".to_owned(),
        command: Cmd::new("true").into(),
        input_paths: Vec::new(),
        output_paths: vec![a_out.clone()],
        validate_inputs: false,
        validate_outputs: false,
        errors_ok: false,
    })?;
    let b_out = project.out("b.txt");
    p.add_step(Step {
        id: "B".to_owned(),
        order: 2,
        description: "reads a.txt".to_owned(),
        command: ShellExpr::from(Cmd::new("cat").path(&a_out)).stdout_to(&b_out),
        input_paths: vec![a_out],
        output_paths: vec![b_out],
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;
    compile(&mut p)?;

    let err = p.execute(None).unwrap_err();
    assert!(format!("{err:?}").contains("Missing input"));
    assert!(project.checkpoint("B")?.is_none());
    Ok(())
}

#[test]
fn test_compile_rejects_missing_static_input() -> Result<()> {
    let project = TestProject::new()?;

    let mut p = project.pipeline();
    p.add_step(Step {
        id: "A".to_owned(),
        order: 1,
        description: "reads a file nobody produces".to_owned(),
        command: Cmd::new("true").into(),
        input_paths: vec![project.root().join("nonexistent.fasta")],
        output_paths: Vec::new(),
        validate_inputs: true,
        validate_outputs: false,
        errors_ok: false,
    })?;

    let err = compile(&mut p).unwrap_err();
    assert!(format!("{err:?}").contains("Missing input"));
    Ok(())
}

#[test]
fn test_glob_outputs_resolve_and_skip() -> Result<()> {
    let project = TestProject::new()?;

    let make = |project: &TestProject| -> Result<Pipeline> {
        let mut p = project.pipeline();
        p.add_step(Step {
            id: "genes".to_owned(),
            order: 1,
            description: "writes two gff files".to_owned(),
            command: ShellExpr::all(vec![
                ShellExpr::from(Cmd::new("echo").arg("x")).stdout_to(project.out("m1.gff")),
                ShellExpr::from(Cmd::new("echo").arg("y")).stdout_to(project.out("m2.gff")),
            ]),
            input_paths: Vec::new(),
            output_paths: vec![project.out("*.gff")],
            validate_inputs: false,
            validate_outputs: true,
            errors_ok: false,
        })?;
        Ok(p)
    };

    let mut p = make(&project)?;
    compile(&mut p)?;
    assert_eq!(p.execute(None)?.outcome("genes"), Some(StepOutcome::Completed));

    let mut p = make(&project)?;
    compile(&mut p)?;
    assert_eq!(p.execute(None)?.outcome("genes"), Some(StepOutcome::Skipped));
    Ok(())
}
