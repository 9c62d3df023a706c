use std::path::Path;

use crate::command::push_quoted;
use crate::fs::is_pattern;
use crate::step::Step;

/// String forms of a step's bookkeeping files, for embedding in the script.
pub struct ScriptPaths {
    pub checkpoint: String,
    pub stdout_log: String,
    pub stderr_log: String,
}

/// Utility for building the contents of the compiled `commands.sh` artifact.
/// Note that it modifies a String reference held internally;
/// read that String to get the script's contents.
///
/// The artifact mirrors what the executor enforces in-process, so a pipeline
/// can be inspected, or re-run outside the engine, step guards included.
/// The in-script checkpoint guard only tests for a completed record; the
/// engine's fingerprint comparison has no shell equivalent.
#[derive(Debug)]
pub struct ScriptBuilder<'a> {
    strbuf: &'a mut String,
}

impl<'a> ScriptBuilder<'a> {
    pub fn new(strbuf: &'a mut String) -> Self {
        Self { strbuf }
    }
}

impl ScriptBuilder<'_> {
    /// shebang line, pipeline name, and bash options
    pub fn write_header(&mut self, pipeline_name: &str) {
        self.strbuf.clear();
        self.strbuf.push_str("#!/usr/bin/env bash\n");
        self.strbuf.push_str("# Pipeline: ");
        self.strbuf.push_str(pipeline_name);
        self.strbuf.push('\n');
    }

    /// one `label -> log files` line in the header comment block
    pub fn write_log_map_entry(&mut self, label: &str, paths: &ScriptPaths) {
        self.strbuf.push_str("#   ");
        self.strbuf.push_str(label);
        self.strbuf.push_str(" -> ");
        self.strbuf.push_str(&paths.stdout_log);
        self.strbuf.push_str(", ");
        self.strbuf.push_str(&paths.stderr_log);
        self.strbuf.push('\n');
    }

    pub fn write_log_map_start(&mut self) {
        self.strbuf.push_str("# Log files:\n");
    }

    pub fn write_set_options(&mut self) {
        self.strbuf.push_str("set -eo pipefail\n");
    }

    /// one fully guarded step: checkpoint skip, input pre-checks, the
    /// command with log redirection, output post-checks, checkpoint write.
    pub fn write_step(&mut self, step: &Step, rendered_cmd: &str, paths: &ScriptPaths) {
        let label = step.label();

        self.strbuf.push('\n');
        self.strbuf.push_str("# ");
        self.strbuf.push_str(&label);
        self.strbuf.push_str(": ");
        self.strbuf.push_str(&step.description);
        self.strbuf.push('\n');

        // checkpoint guard
        self.strbuf.push_str("if grep -qs '^completed' ");
        push_quoted(self.strbuf, &paths.checkpoint);
        self.strbuf.push_str("; then\n");
        self.write_echo(&label, "already completed");
        self.strbuf.push_str("else\n");

        if step.validate_inputs {
            for input in &step.input_paths {
                let input = input.to_string_lossy();
                self.write_path_check(&label, &input, "-e", "missing input", false);
            }
        }

        // the command itself, with per-step logs
        self.strbuf.push_str("    ( ");
        self.strbuf.push_str(rendered_cmd);
        self.strbuf.push_str(" ) > ");
        push_quoted(self.strbuf, &paths.stdout_log);
        self.strbuf.push_str(" 2> ");
        push_quoted(self.strbuf, &paths.stderr_log);
        if step.errors_ok {
            self.strbuf.push_str(" || echo \"[");
            self.strbuf.push_str(&label);
            self.strbuf.push_str("] command failed (tolerated)\" >&2");
        }
        self.strbuf.push('\n');

        if step.validate_outputs {
            for output in &step.output_paths {
                let output = output.to_string_lossy();
                self.write_path_check(
                    &label,
                    &output,
                    "-s",
                    "missing or empty output",
                    step.errors_ok,
                );
            }
        }

        // record completion
        self.strbuf.push_str("    printf 'completed\\n' > ");
        push_quoted(self.strbuf, &paths.checkpoint);
        self.strbuf.push('\n');
        self.strbuf.push_str("fi\n");
    }

    fn write_path_check(&mut self, label: &str, path: &str, test: &str, msg: &str, tolerated: bool) {
        self.strbuf.push_str("    ");
        if is_pattern(Path::new(path)) {
            // glob declarations pass when they match at least one path
            self.strbuf.push_str("ls -d ");
            self.strbuf.push_str(path);
            self.strbuf.push_str(" > /dev/null 2>&1");
        } else {
            self.strbuf.push_str("[ ");
            self.strbuf.push_str(test);
            self.strbuf.push(' ');
            push_quoted(self.strbuf, path);
            self.strbuf.push_str(" ]");
        }
        if tolerated {
            self.strbuf.push_str(" || echo \"[");
            self.strbuf.push_str(label);
            self.strbuf.push_str("] ");
            self.strbuf.push_str(msg);
            self.strbuf.push_str(": ");
            self.strbuf.push_str(path);
            self.strbuf.push_str(" (tolerated)\" >&2\n");
        } else {
            self.strbuf.push_str(" || { echo \"[");
            self.strbuf.push_str(label);
            self.strbuf.push_str("] ");
            self.strbuf.push_str(msg);
            self.strbuf.push_str(": ");
            self.strbuf.push_str(path);
            self.strbuf.push_str("\" >&2; exit 1; }\n");
        }
    }

    fn write_echo(&mut self, label: &str, msg: &str) {
        self.strbuf.push_str("    echo \"[");
        self.strbuf.push_str(label);
        self.strbuf.push_str("] ");
        self.strbuf.push_str(msg);
        self.strbuf.push_str("\"\n");
    }
}
