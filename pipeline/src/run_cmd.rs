use std::fs::File;
use std::io::{stderr, stdout, Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

use anyhow::{Context, Result};

use crate::command::ShellExpr;
use crate::fs::Fs;
use crate::pipeline::StepFiles;

/// Run a step's command through the host shell, teeing its stdout and
/// stderr into the step's log files.
/// Based on:
/// <https://stackoverflow.com/questions/66060139/how-to-tee-stdout-stderr-from-a-subprocess-in-rust>
pub fn run_cmd(expr: &ShellExpr, files: &StepFiles, fs: &Fs) -> Result<ExitStatus> {
    let script = expr.to_shell_string()?;
    log::debug!("step command: {script}");

    let out_file = fs
        .create_file(&files.stdout_log)
        .context("creating stdout log file")?;
    let err_file = fs
        .create_file(&files.stderr_log)
        .context("creating stderr log file")?;

    let mut child = Command::new("/usr/bin/env")
        .arg("bash")
        .arg("-eo")
        .arg("pipefail")
        .arg("-c")
        .arg(&script)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to spawn shell for command: {script}"))?;

    let child_out = child.stdout.take().expect("Cannot attach to child stdout");
    let child_err = child.stderr.take().expect("Cannot attach to child stderr");

    let thread_out = thread::spawn(move || {
        communicate(child_out, out_file, stdout()).expect("error communicating with child stdout")
    });
    let thread_err = thread::spawn(move || {
        communicate(child_err, err_file, stderr()).expect("error communicating with child stderr")
    });

    thread_out.join().expect("Error joining stdout thread");
    thread_err.join().expect("Error joining stderr thread");

    let status = child.wait().context("failed to wait on child process")?;
    Ok(status)
}

fn communicate<R: Read, W: Write>(
    mut stream: R,
    mut file: File,
    mut output: W,
) -> std::io::Result<()> {
    let mut buf = [0u8; 1024];
    loop {
        let num_read = stream.read(&mut buf)?;
        if num_read == 0 {
            break;
        }

        let buf = &buf[..num_read];
        file.write_all(buf)?;
        output.write_all(buf)?;
    }

    Ok(())
}
