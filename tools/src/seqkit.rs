use std::path::Path;

use anyhow::Result;

use pipeline::{Cmd, ShellExpr};

use crate::ToolConfig;

/// `cat <fasta> | seqkit seq -m <min_len>`: drop contigs shorter than
/// `min_len`. Returned as pipe stages so callers can extend the pipe.
pub fn length_filter(
    tools: &ToolConfig,
    fasta: &Path,
    min_len: u64,
) -> Result<Vec<ShellExpr>> {
    Ok(vec![
        Cmd::new("cat").path(fasta).into(),
        tools
            .cmd("seqkit")?
            .arg("seq")
            .flag("-m", min_len.to_string())
            .into(),
    ])
}

/// Length filter plus `seqkit grep --pattern-file <list>`: keep only the
/// named contigs. Both binning stages that subset a fasta use this shape.
pub fn filter_to_patterns(
    tools: &ToolConfig,
    fasta: &Path,
    min_len: u64,
    pattern_file: &Path,
) -> Result<Vec<ShellExpr>> {
    let mut stages = length_filter(tools, fasta, min_len)?;
    stages.push(
        tools
            .cmd("seqkit")?
            .arg("grep")
            .flag_path("--pattern-file", pattern_file)
            .into(),
    );
    Ok(stages)
}

/// `seqkit stats -b -T [-a] -j <n_jobs> <subject>`: tabular sequence
/// statistics. The subject may be a glob; callers add the redirect.
pub fn stats_table(
    tools: &ToolConfig,
    subject: &Path,
    n_jobs: usize,
    all_stats: bool,
) -> Result<Cmd> {
    let mut cmd = tools.cmd("seqkit")?.arg("stats");
    if all_stats {
        cmd = cmd.arg("-a");
    }
    cmd = cmd
        .flag("-j", n_jobs.to_string())
        .arg("-T")
        .arg("-b")
        .path(subject);
    Ok(cmd)
}
