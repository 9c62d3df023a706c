use clap::{Args as ClapArgs, Parser, Subcommand};

const CMD_NAME: &str = "vp";

/// Stores our command-line args format.
#[derive(Parser)]
#[command(name = CMD_NAME, version, about = None, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: PipelineCommand,

    /// Tool config file (TSV with name and executable columns)
    #[arg(long, value_name = "FILE", global = true)]
    #[arg(env = "VIRAPIPE_CONFIG")]
    pub path_config: Option<String>,

    /// Resolve tools from <DIR>/bin instead of a config file
    #[arg(long, value_name = "DIR", global = true)]
    #[arg(env = "VIRAPIPE_CONDA_PREFIX")]
    pub conda_prefix: Option<String>,

    /// Directory containing the accessory scripts
    #[arg(long, value_name = "DIR", global = true)]
    #[arg(env = "VIRAPIPE_SCRIPTS")]
    pub scripts_dir: Option<String>,

    /// Number of threads passed to the wrapped tools
    #[arg(short = 'p', long, value_name = "N", default_value_t = 1, global = true)]
    pub n_jobs: usize,

    /// Seed forwarded to tools that accept one
    #[arg(long, value_name = "N", default_value_t = 0, global = true)]
    pub random_state: u64,

    /// Restart from a particular checkpoint
    #[arg(long, value_name = "STEP", global = true)]
    pub restart_from_checkpoint: Option<String>,

    /// Set temporary directory
    #[arg(long, value_name = "DIR", global = true)]
    pub tmpdir: Option<String>,

    /// Compile the pipeline script but don't execute anything
    #[arg(short = 'n', long, global = true)]
    pub dry_run: bool,

    /// Print additional debugging info
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// Identify, quality-filter, and bin viral genomes from assembled contigs
    ViralBinning(ViralBinningArgs),
    /// Index a coassembly, align reads per sample, and count features
    Coassembly(CoassemblyArgs),
}

#[derive(ClapArgs)]
pub struct ViralBinningArgs {
    /// path/to/scaffolds.fasta
    #[arg(short, long, value_name = "FILE")]
    pub fasta: String,

    /// Subset to these contig identifiers before binning
    #[arg(short = 'l', long, value_name = "FILE")]
    pub contig_identifiers: Option<String>,

    /// Name of sample
    #[arg(short = 'N', long)]
    pub name: String,

    /// path/to/project_directory
    #[arg(short = 'o', long, value_name = "DIR")]
    #[arg(default_value = "virapipe_output/binning/viral")]
    pub project_directory: String,

    /// Minimum contig length
    #[arg(short = 'm', long, value_name = "N", default_value_t = 1500)]
    pub minimum_contig_length: u64,

    /// Prodigal -g translation table
    #[arg(long, value_name = "N", default_value_t = 11)]
    pub prodigal_genetic_code: u32,

    /// Include provirus viral detection
    #[arg(long)]
    pub include_provirus: bool,

    /// VirFinder p-value threshold
    #[arg(long, value_name = "P", default_value_t = 0.05)]
    pub virfinder_pvalue: f64,

    /// VirFinder | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub virfinder_options: String,

    /// CheckV database directory
    #[arg(long, value_name = "DIR")]
    pub checkv_database: String,

    /// CheckV | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub checkv_options: String,

    /// Minimum ratio of viral to host genes
    #[arg(long, value_name = "N", default_value_t = 5)]
    pub multiplier_viral_to_host_genes: u32,

    /// Minimum CheckV completeness
    #[arg(long, value_name = "PCT", default_value_t = 50.0)]
    pub checkv_completeness: f64,

    /// Acceptable CheckV quality tiers (comma-separated)
    #[arg(long, value_name = "TIERS")]
    #[arg(default_value = "High-quality,Medium-quality,Complete")]
    pub checkv_quality: String,

    /// Acceptable MIUViG quality tiers (comma-separated)
    #[arg(long, value_name = "TIERS")]
    #[arg(default_value = "High-quality,Medium-quality,Complete")]
    pub miuvig_quality: String,

    /// Remove the temporary subset fasta when binning finishes
    #[arg(long)]
    pub remove_temporary_fasta: bool,
}

#[derive(ClapArgs)]
pub struct CoassemblyArgs {
    /// path/to/coassembly.fasta
    #[arg(short, long, value_name = "FILE")]
    pub fasta: String,

    /// Three-column reads table: sample<TAB>r1.fastq.gz<TAB>r2.fastq.gz, no header
    #[arg(short, long, value_name = "FILE")]
    pub reads: String,

    /// path/to/output_directory
    #[arg(short = 'o', long, value_name = "DIR")]
    #[arg(default_value = "virapipe_output/assembly/coassembly")]
    pub output_directory: String,

    /// Minimum contig length
    #[arg(short = 'm', long, value_name = "N", default_value_t = 1500)]
    pub minimum_contig_length: u64,

    /// seqkit seq | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub seqkit_seq_options: String,

    /// bowtie2-build | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub bowtie2_index_options: String,

    /// bowtie2 | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub bowtie2_options: String,

    /// featureCounts | extra options passed through verbatim
    #[arg(long, value_name = "OPTS", default_value = "")]
    pub featurecounts_options: String,
}
