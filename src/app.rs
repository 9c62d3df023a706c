use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use pipeline::Pipeline;
use tools::ToolConfig;

use crate::args::PipelineCommand;
use crate::dirs::ProjectDirs;
use crate::pipelines::{coassembly, viral_binning};
use crate::settings::{Settings, ToolSource};
use crate::ui::Ui;

/// This struct actually runs the command-line app.
pub struct App {
    /// Interpreted command line settings
    settings: Settings,
    /// User interface
    ui: Ui,
}

impl App {
    /// Create a new `App`.
    pub fn new(settings: Settings) -> Self {
        let ui = Ui::new(settings.verbose > 0);
        Self { settings, ui }
    }

    /// Run the app: resolve tools, build the selected pipeline, compile the
    /// script artifact, and (unless this is a dry run) execute it.
    pub fn run(mut self) -> Result<()> {
        self.ui
            .header(&format!("virapipe v{}", env!("CARGO_PKG_VERSION")), '=');
        if let Ok(cwd) = std::env::current_dir() {
            self.ui.verbose_msg(&format!("Directory: {cwd:?}"));
        }

        let (required, scripts) = match &self.settings.command {
            PipelineCommand::ViralBinning(_) => (
                viral_binning::REQUIRED_TOOLS,
                viral_binning::ACCESSORY_SCRIPTS,
            ),
            PipelineCommand::Coassembly(_) => {
                (coassembly::REQUIRED_TOOLS, coassembly::ACCESSORY_SCRIPTS)
            }
        };
        let tools = self.resolve_tools(required, scripts)?;

        let mut dirs = self.create_dirs()?;
        self.ui
            .verbose_msg(&format!("Using project directory {:?}", dirs.project));

        let mut pipeline = match &self.settings.command {
            PipelineCommand::ViralBinning(opts) => {
                viral_binning::create_pipeline(opts, &self.settings, &mut dirs, &tools)?
            }
            PipelineCommand::Coassembly(opts) => {
                coassembly::create_pipeline(opts, &self.settings, &mut dirs, &tools)?
            }
        };

        self.compile(&mut pipeline, &dirs)?;

        if self.settings.dry_run {
            eprintln!("{}", "Dry run; not executing the pipeline.".magenta());
            return Ok(());
        }

        self.execute(&pipeline)
    }

    fn compile(&mut self, pipeline: &mut Pipeline, dirs: &ProjectDirs) -> Result<()> {
        let script_path = dirs.commands_script();
        self.ui.verbose_progress("Compiling pipeline");

        let mut script = std::fs::File::create(&script_path)
            .with_context(|| format!("while creating pipeline script {script_path:?}"))?;
        pipeline
            .compile(&mut script)
            .context("while compiling pipeline")?;
        make_executable(&script_path)?;

        self.ui.done();
        eprintln!(
            "Compiled {} steps to {script_path:?}.",
            pipeline.steps().len()
        );
        Ok(())
    }

    fn execute(&mut self, pipeline: &Pipeline) -> Result<()> {
        eprintln!("\n{}\n", "Starting pipeline execution.".magenta());
        self.ui.start_timer();

        let summary = pipeline
            .execute(self.settings.restart_from_checkpoint.as_deref())
            .context("while executing pipeline")?;

        if self.ui.verbose {
            self.ui.print_elapsed("Pipeline execution");
        }
        eprintln!(
            "{} {} steps ran, {} already satisfied.",
            "DONE".green(),
            summary.num_ran(),
            summary.num_skipped()
        );
        Ok(())
    }

    fn resolve_tools(&self, required: &[&str], scripts: &[&str]) -> Result<ToolConfig> {
        let mut tools = match &self.settings.tool_source {
            ToolSource::ConfigFile(path) => {
                self.ui
                    .verbose_msg(&format!("Resolving tools from config file {path:?}"));
                ToolConfig::from_tsv(path)?
            }
            ToolSource::CondaPrefix(prefix) => {
                self.ui
                    .verbose_msg(&format!("Resolving tools from prefix {prefix:?}"));
                ToolConfig::from_conda_prefix(prefix, required)?
            }
        };

        if let Some(dir) = &self.settings.scripts_dir {
            for name in scripts {
                tools.add_script(name, dir)?;
            }
        }
        tools.require(required)?;
        tools.require(scripts)?;

        if self.ui.verbose {
            self.ui.header("Tools:", '-');
            for (name, invocation) in tools.iter_sorted() {
                let mut line = invocation.program.clone();
                for arg in &invocation.leading_args {
                    line.push(' ');
                    line.push_str(arg);
                }
                eprintln!("{name} --> {line}");
            }
        }
        Ok(tools)
    }

    fn create_dirs(&self) -> Result<ProjectDirs> {
        let root = match &self.settings.command {
            PipelineCommand::ViralBinning(opts) => {
                PathBuf::from(&opts.project_directory).join(&opts.name)
            }
            PipelineCommand::Coassembly(opts) => PathBuf::from(&opts.output_directory),
        };
        ProjectDirs::create(&root, self.settings.tmpdir.as_deref())
    }
}

/// The compiled artifact should be runnable on its own.
#[cfg(unix)]
fn make_executable(path: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)
        .context("reading script metadata")?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    std::fs::set_permissions(path, perms).context("marking script executable")?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &std::path::Path) -> Result<()> {
    Ok(())
}
