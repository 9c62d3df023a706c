use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use pipeline::{Cmd, Pipeline, ShellExpr, Step};
use tools::{stats_table, ToolConfig};

use crate::args::CoassemblyArgs;
use crate::dirs::ProjectDirs;
use crate::settings::Settings;

pub const REQUIRED_TOOLS: &[&str] = &[
    "bowtie2-build",
    "bowtie2",
    "samtools",
    "featureCounts",
    "seqkit",
    "parallel",
];
pub const ACCESSORY_SCRIPTS: &[&str] = &["fasta_to_saf.py"];

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Reads table row {line} has {found} columns; expected 3 (sample<TAB>r1<TAB>r2)")]
    ReadsTableColumns { line: usize, found: usize },
    #[error("Reads table is empty")]
    ReadsTableEmpty,
}

/// The reads table drives the per-sample alignment fan-out, so a malformed
/// row has to be caught before any step runs.
pub fn validate_reads_table(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("while reading reads table {path:?}"))?;
    let mut rows = 0;
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let found = line.split('\t').count();
        if found != 3 {
            return Err(Error::ReadsTableColumns { line: i + 1, found }.into());
        }
        rows += 1;
    }
    if rows == 0 {
        return Err(Error::ReadsTableEmpty.into());
    }
    Ok(())
}

/// Assemble the coassembly pipeline: length-filter and index the coassembly,
/// align every sample's reads against it in parallel, count reads per
/// feature, and symlink the results into the output directory.
pub fn create_pipeline(
    opts: &CoassemblyArgs,
    settings: &Settings,
    dirs: &mut ProjectDirs,
    tools: &ToolConfig,
) -> Result<Pipeline> {
    let reads = PathBuf::from(&opts.reads);
    validate_reads_table(&reads)?;

    let mut p = Pipeline::new("coassembly", &dirs.project, &dirs.checkpoints, &dirs.log);

    let fasta = PathBuf::from(&opts.fasta);
    let n_jobs = settings.n_jobs;

    // ==========
    // Index
    // ==========
    let out_dir = dirs.intermediate_step(1, "index")?.to_path_buf();
    let coassembly = out_dir.join("coassembly.fasta");
    let saf = out_dir.join("coassembly.fasta.saf");
    let stats = out_dir.join("seqkit_stats.tsv");

    let length_filter = ShellExpr::pipe(vec![
        Cmd::new("cat").path(&fasta).into(),
        tools
            .cmd("seqkit")?
            .arg("seq")
            .flag("-m", opts.minimum_contig_length.to_string())
            .flag("-j", n_jobs.to_string())
            .args_split(&opts.seqkit_seq_options)
            .into(),
    ])
    .stdout_to(&coassembly);

    let saf_table =
        ShellExpr::from(tools.cmd("fasta_to_saf.py")?.flag_path("-i", &coassembly))
            .stdout_to(&saf);

    // the index is written alongside the reference, under the same name:
    let bowtie2_index = tools
        .cmd("bowtie2-build")?
        .flag("--threads", n_jobs.to_string())
        .flag("--seed", settings.random_state.to_string())
        .args_split(&opts.bowtie2_index_options)
        .path(&coassembly)
        .path(&coassembly);

    p.add_step(Step {
        id: "index".to_owned(),
        order: 1,
        description: "Preprocess fasta file and build Bowtie2 index".to_owned(),
        command: ShellExpr::all(vec![
            length_filter,
            saf_table,
            bowtie2_index.into(),
            ShellExpr::from(stats_table(tools, &coassembly, n_jobs, true)?).stdout_to(&stats),
        ]),
        input_paths: vec![fasta],
        output_paths: vec![
            coassembly.clone(),
            saf.clone(),
            stats.clone(),
            out_dir.join("coassembly.fasta.*.bt2"),
        ],
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;

    // ==========
    // Alignment
    // ==========
    let out_dir = dirs.intermediate_step(2, "alignment")?.to_path_buf();
    let sample_dir = out_dir.join("{1}");
    let sorted_bam = sample_dir.join("mapped.sorted.bam");

    // per-sample command template; parallel substitutes {1}..{3} from the
    // reads table columns
    let per_sample = ShellExpr::all(vec![
        Cmd::new("mkdir").arg("-p").path(&sample_dir).into(),
        ShellExpr::pipe(vec![
            tools
                .cmd("bowtie2")?
                .flag_path("-x", &coassembly)
                .flag("-1", "{2}")
                .flag("-2", "{3}")
                .flag("--threads", "1")
                .flag("--seed", settings.random_state.to_string())
                .arg("--no-unal")
                .args_split(&opts.bowtie2_options)
                .into(),
            tools
                .cmd("samtools")?
                .arg("sort")
                .flag("--threads", "1")
                .flag_path("--reference", &coassembly)
                .flag_path("-T", dirs.tmp.join("samtools_sort_{1}"))
                .into(),
        ])
        .stdout_to(&sorted_bam),
        tools
            .cmd("samtools")?
            .arg("index")
            .flag("-@", "1")
            .path(&sorted_bam)
            .into(),
    ]);

    p.add_step(Step {
        id: "alignment".to_owned(),
        order: 2,
        description: "Aligning reads to coassembly".to_owned(),
        command: ShellExpr::all(vec![
            // clear temporary directory just in case
            Cmd::new("rm").arg("-rf").path(dirs.tmp.join("*")).into(),
            tools
                .cmd("parallel")?
                .flag("--jobs", n_jobs.to_string())
                .flag_path("-a", &reads)
                .flag("-C", "\\t")
                .arg(per_sample.to_shell_string()?)
                .into(),
        ]),
        input_paths: vec![reads, coassembly.clone()],
        output_paths: vec![out_dir.join("*/mapped.sorted.bam")],
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;
    let alignment_dir = out_dir;

    // ==========
    // featureCounts
    // ==========
    let out_dir = dirs.intermediate_step(3, "featurecounts")?.to_path_buf();
    let counts_tmp = dirs.tmp.join("featurecounts");
    let counts_tsv = out_dir.join("featurecounts.tsv");
    let bams = alignment_dir.join("*/mapped.sorted.bam");

    let feature_counts = tools
        .cmd("featureCounts")?
        .flag_path("-a", &saf)
        .flag_path("-o", &counts_tsv)
        .flag("-F", "SAF")
        .flag_path("--tmpDir", &counts_tmp)
        .flag("-T", n_jobs.to_string())
        .args_split(&opts.featurecounts_options)
        .path(&bams);

    p.add_step(Step {
        id: "featurecounts".to_owned(),
        order: 3,
        description: "Counting reads".to_owned(),
        command: ShellExpr::all(vec![
            Cmd::new("mkdir").arg("-p").path(&counts_tmp).into(),
            ShellExpr::from(feature_counts).grouped(),
            Cmd::new("gzip").arg("-f").path(&counts_tsv).into(),
        ]),
        input_paths: vec![saf.clone(), bams],
        output_paths: vec![out_dir.join("featurecounts.tsv.gz")],
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;
    let counts_gz = out_dir.join("featurecounts.tsv.gz");

    // ==========
    // Symlink
    // ==========
    let out_dir = dirs.output.clone();
    let sources = [
        coassembly,
        saf,
        stats,
        alignment_dir.join("*"),
        counts_gz,
    ];

    let links: Vec<ShellExpr> = sources
        .iter()
        .map(|src| Cmd::new("ln").arg("-f").arg("-s").path(src).path(&out_dir).into())
        .collect();

    let mut output_paths = Vec::with_capacity(sources.len());
    for src in &sources {
        // basename of each source, under the output dir ("*" stays a glob)
        if let Some(name) = src.file_name() {
            output_paths.push(out_dir.join(name));
        }
    }

    p.add_step(Step {
        id: "symlink".to_owned(),
        order: 4,
        description: "Symlinking relevant output files".to_owned(),
        command: ShellExpr::all(links).grouped(),
        input_paths: sources.to_vec(),
        output_paths,
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;

    Ok(p)
}
