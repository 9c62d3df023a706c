use std::path::{Path, PathBuf};

use anyhow::Result;

use pipeline::{Cmd, Pipeline, ShellExpr, Step};
use tools::{filter_to_patterns, length_filter, stats_table, ToolConfig};

use crate::args::ViralBinningArgs;
use crate::dirs::ProjectDirs;
use crate::settings::Settings;

pub const REQUIRED_TOOLS: &[&str] = &["prodigal", "checkv", "seqkit"];
pub const ACCESSORY_SCRIPTS: &[&str] = &[
    "partition_gene_models.py",
    "append_geneid_to_prodigal_gff.py",
    "filter_checkv_results.py",
    "VirFinder_wrapper.R",
];

/// Assemble the viral binning pipeline: subset contigs, identify viral ones
/// with VirFinder, verify with CheckV, call genes with Prodigal, and merge
/// the per-genome results into the output directory.
pub fn create_pipeline(
    opts: &ViralBinningArgs,
    settings: &Settings,
    dirs: &mut ProjectDirs,
    tools: &ToolConfig,
) -> Result<Pipeline> {
    let mut p = Pipeline::new("viral-binning", &dirs.project, &dirs.checkpoints, &dirs.log);

    let fasta = PathBuf::from(&opts.fasta);
    let min_len = opts.minimum_contig_length;

    // ==========
    // Subset
    // ==========
    let binning_fasta = match &opts.contig_identifiers {
        Some(identifiers) => {
            let identifiers = PathBuf::from(identifiers);
            let out_dir = dirs.intermediate_step(0, "preprocessing")?.to_path_buf();
            let subset = out_dir.join("input.fasta");

            p.add_step(Step {
                id: "preprocessing".to_owned(),
                order: 0,
                description: "Splitting contigs from fasta".to_owned(),
                command: ShellExpr::pipe(filter_to_patterns(
                    tools,
                    &fasta,
                    min_len,
                    &identifiers,
                )?)
                .stdout_to(&subset)
                .grouped(),
                input_paths: vec![fasta.clone(), identifiers],
                output_paths: vec![subset.clone()],
                validate_inputs: true,
                validate_outputs: true,
                errors_ok: false,
            })?;
            subset
        }
        None => fasta.clone(),
    };

    // ==========
    // VirFinder
    // ==========
    let out_dir = dirs.intermediate_step(1, "virfinder")?.to_path_buf();
    let virfinder_tsv = out_dir.join("virfinder_output.tsv");
    let binned_list = out_dir.join("binned.list");

    let wrapper = tools
        .cmd("VirFinder_wrapper.R")?
        .flag_path("-f", &binning_fasta)
        .flag_path("-o", &virfinder_tsv)
        .args_split(&opts.virfinder_options);
    // keep contigs under the p-value threshold (header row skipped):
    let pvalue_filter = Cmd::new("awk")
        .flag("-F", "\t")
        .flag("-v", format!("p={}", opts.virfinder_pvalue))
        .arg("NR > 1 && $4 < p { print $1 }")
        .path(&virfinder_tsv);

    let mut parts = vec![
        ShellExpr::from(wrapper).grouped(),
        ShellExpr::from(pvalue_filter).stdout_to(&binned_list).grouped(),
    ];
    if opts.contig_identifiers.is_some() && opts.remove_temporary_fasta {
        parts.push(Cmd::new("rm").arg("-rf").path(&binning_fasta).into());
    }

    p.add_step(Step {
        id: "virfinder".to_owned(),
        order: 1,
        description: "Viral identification with VirFinder".to_owned(),
        command: ShellExpr::all(parts),
        input_paths: vec![binning_fasta.clone()],
        output_paths: vec![virfinder_tsv, binned_list.clone()],
        validate_inputs: true,
        validate_outputs: true,
        errors_ok: false,
    })?;

    // ==========
    // CheckV
    // ==========
    let out_dir = dirs.intermediate_step(2, "checkv")?.to_path_buf();
    let checkv_fasta = dirs.tmp.join("unbinned_contigs_for_checkv.fasta");
    let filtered = out_dir.join("filtered");

    let checkv = tools
        .cmd("checkv")?
        .arg("end_to_end")
        .path(&checkv_fasta)
        .path(&out_dir)
        .flag("-t", settings.n_jobs.to_string())
        .flag("-d", opts.checkv_database.as_str())
        .arg("--restart")
        .args_split(&opts.checkv_options);

    let mut filter_results = tools
        .cmd("filter_checkv_results.py")?
        .flag_path("-i", out_dir.join("quality_summary.tsv"))
        .flag_path("-f", &checkv_fasta)
        .flag_path("-o", &filtered)
        .flag("-m", min_len.to_string())
        .arg("--unbinned")
        .flag("-p", format!("{}__VIRFINDER__Virus.", opts.name))
        .flag(
            "--multiplier_viral_to_host_genes",
            opts.multiplier_viral_to_host_genes.to_string(),
        )
        .flag("--completeness", opts.checkv_completeness.to_string())
        .flag("--checkv_quality", opts.checkv_quality.as_str())
        .flag("--miuvig_quality", opts.miuvig_quality.as_str());
    if opts.include_provirus {
        filter_results = filter_results.arg("--include_provirus");
    }

    let mut parts = vec![
        ShellExpr::pipe(filter_to_patterns(tools, &fasta, min_len, &binned_list)?)
            .stdout_to(&checkv_fasta)
            .grouped(),
        // checkv insists on creating its own output directory:
        Cmd::new("rm").arg("-rf").path(&out_dir).into(),
        ShellExpr::from(checkv).grouped(),
        ShellExpr::from(filter_results).grouped(),
    ];
    if opts.remove_temporary_fasta {
        parts.push(Cmd::new("rm").arg("-rf").path(&checkv_fasta).into());
    }

    p.add_step(Step {
        id: "checkv".to_owned(),
        order: 2,
        description: "Viral verification with CheckV".to_owned(),
        command: ShellExpr::all(parts),
        input_paths: vec![fasta.clone(), binned_list],
        output_paths: vec![
            out_dir.join("quality_summary.tsv"),
            filtered.join("binned.list"),
            filtered.join("unbinned.list"),
            filtered.join("quality_summary.filtered.tsv"),
        ],
        validate_inputs: true,
        validate_outputs: false,
        errors_ok: false,
    })?;

    // ==========
    // Prodigal
    // ==========
    let out_dir = dirs.intermediate_step(3, "prodigal")?.to_path_buf();
    let genomes_dir = filtered.join("genomes");
    let scaffolds_to_bins = filtered.join("scaffolds_to_bins.tsv");
    let gff = out_dir.join("gene_models.gff");
    let ffn = out_dir.join("gene_models.ffn");
    let faa = out_dir.join("gene_models.faa");

    let gene_calls = ShellExpr::pipe(vec![
        Cmd::new("cat").path(genomes_dir.join("*.fa")).into(),
        tools
            .cmd("prodigal")?
            .flag("-p", "meta")
            .flag("-g", opts.prodigal_genetic_code.to_string())
            .flag("-f", "gff")
            .flag_path("-d", &ffn)
            .flag_path("-a", &faa)
            .into(),
        tools
            .cmd("append_geneid_to_prodigal_gff.py")?
            .flag("-a", "gene_id")
            .into(),
    ])
    .stdout_to(&gff)
    .grouped();

    let partition = tools
        .cmd("partition_gene_models.py")?
        .flag_path("-i", &scaffolds_to_bins)
        .flag_path("-g", &gff)
        .flag_path("-d", &ffn)
        .flag_path("-a", &faa)
        .flag_path("-o", &out_dir);

    let cleanup = ShellExpr::all(vec![
        Cmd::new("rm").arg("-f").path(&gff).into(),
        Cmd::new("rm").arg("-f").path(&ffn).into(),
        Cmd::new("rm").arg("-f").path(&faa).into(),
    ])
    .grouped();

    p.add_step(Step {
        id: "prodigal".to_owned(),
        order: 3,
        description: "Viral gene calls via Prodigal".to_owned(),
        command: ShellExpr::all(vec![
            gene_calls,
            ShellExpr::from(partition).grouped(),
            cleanup,
        ]),
        input_paths: vec![genomes_dir, scaffolds_to_bins],
        output_paths: vec![
            out_dir.join("*.gff"),
            out_dir.join("*.faa"),
            out_dir.join("*.ffn"),
        ],
        validate_inputs: false,
        validate_outputs: false,
        errors_ok: true,
    })?;
    let prodigal_dir = out_dir;

    // ==========
    // Output
    // ==========
    let out_dir = dirs.output.clone();
    let unbinned_fasta = out_dir.join("unbinned.fasta");

    // most of these get overwritten by the symlinks below; the length filter
    // only survives when CheckV binned nothing
    let mut parts = vec![ShellExpr::pipe(length_filter(tools, &fasta, min_len)?)
        .stdout_to(&unbinned_fasta)];
    for name in [
        "scaffolds_to_bins.tsv",
        "binned.list",
        "unbinned.fasta",
        "unbinned.list",
    ] {
        parts.push(symlink(&filtered.join(name), &out_dir.join(name)));
    }
    parts.push(
        ShellExpr::all(vec![
            ln_sf(&filtered.join("genomes"), &out_dir.join("genomes")),
            ln_sf(&prodigal_dir, &out_dir.join("gene_models")),
        ])
        .grouped(),
    );
    parts.push(symlink(&filtered.join("bins.list"), &out_dir.join("bins.list")));
    parts.push(
        ShellExpr::from(stats_table(
            tools,
            &out_dir.join("genomes").join("*.fa"),
            settings.n_jobs,
            false,
        )?)
        .stdout_to(out_dir.join("genome_statistics.tsv"))
        .grouped(),
    );

    p.add_step(Step {
        id: "output".to_owned(),
        order: 4,
        description: "Merging results for output".to_owned(),
        command: ShellExpr::all(parts),
        input_paths: vec![filtered, prodigal_dir],
        output_paths: vec![
            out_dir.join("scaffolds_to_bins.tsv"),
            out_dir.join("binned.list"),
            out_dir.join("unbinned.fasta"),
            out_dir.join("unbinned.list"),
            out_dir.join("genomes"),
            out_dir.join("gene_models"),
            out_dir.join("bins.list"),
            out_dir.join("genome_statistics.tsv"),
        ],
        validate_inputs: false,
        validate_outputs: false,
        errors_ok: false,
    })?;

    Ok(p)
}

fn ln_sf(src: &Path, dst: &Path) -> ShellExpr {
    Cmd::new("ln").arg("-sf").path(src).path(dst).into()
}

fn symlink(src: &Path, dst: &Path) -> ShellExpr {
    ln_sf(src, dst).grouped()
}
