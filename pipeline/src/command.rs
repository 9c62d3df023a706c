use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("Command path is not valid UTF-8: {0:?}")]
pub struct PathEncodingError(pub PathBuf);

/// Arguments are stored unrendered so path-encoding problems surface
/// in one place, at render time.
#[derive(Debug, Clone)]
enum Arg {
    Str(String),
    Path(PathBuf),
}

/// A single program invocation: the program name plus its arguments.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<Arg>,
}

impl Cmd {
    /// Create a new `Cmd` invoking the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::with_capacity(8),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Str(arg.into()));
        self
    }

    /// Append a path argument.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.args.push(Arg::Path(path.into()));
        self
    }

    /// Append a `-flag value` pair.
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// Append a `-flag path` pair.
    pub fn flag_path(self, flag: &str, path: impl Into<PathBuf>) -> Self {
        self.arg(flag).path(path)
    }

    /// Append whitespace-separated tokens from a free-form options string
    /// (e.g. a `--checkv-options` passthrough value). Empty input is a no-op.
    pub fn args_split(mut self, options: &str) -> Self {
        for token in options.split_whitespace() {
            self.args.push(Arg::Str(token.to_owned()));
        }
        self
    }
}

/// A shell expression built from structured parts, so the engine can
/// validate and log commands without parsing strings.
///
/// Rendering produces a single bash string; the host shell is responsible
/// for glob expansion inside arguments, so glob characters are left bare.
#[derive(Debug, Clone)]
pub enum ShellExpr {
    /// a single program invocation
    Exec(Cmd),
    /// expressions joined with `|`
    Pipe(Vec<ShellExpr>),
    /// expressions joined with `&&`
    AndThen(Vec<ShellExpr>),
    /// `( expression )`
    Group(Box<ShellExpr>),
    /// `expression > path`
    RedirectStdout(Box<ShellExpr>, PathBuf),
}

impl From<Cmd> for ShellExpr {
    fn from(cmd: Cmd) -> Self {
        Self::Exec(cmd)
    }
}

impl ShellExpr {
    /// Join the given expressions with `|`.
    pub fn pipe(stages: Vec<ShellExpr>) -> Self {
        Self::Pipe(stages)
    }

    /// Join the given expressions with `&&`.
    pub fn all(exprs: Vec<ShellExpr>) -> Self {
        Self::AndThen(exprs)
    }

    /// Wrap self in `( ... )`.
    pub fn grouped(self) -> Self {
        Self::Group(Box::new(self))
    }

    /// Redirect self's stdout to the given path.
    pub fn stdout_to(self, path: impl Into<PathBuf>) -> Self {
        Self::RedirectStdout(Box::new(self), path.into())
    }

    /// Render this expression as bash text, appending to `buf`.
    pub fn render(&self, buf: &mut String) -> Result<(), PathEncodingError> {
        match self {
            Self::Exec(cmd) => {
                push_quoted(buf, &cmd.program);
                for arg in &cmd.args {
                    buf.push(' ');
                    match arg {
                        Arg::Str(s) => push_quoted(buf, s),
                        Arg::Path(p) => push_quoted(buf, path_str(p)?),
                    }
                }
            }
            Self::Pipe(stages) => {
                for (i, stage) in stages.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(" | ");
                    }
                    // `&&` binds looser than `|`, so compound stages need parens:
                    stage.render_grouping_chains(buf)?;
                }
            }
            Self::AndThen(exprs) => {
                for (i, expr) in exprs.iter().enumerate() {
                    if i > 0 {
                        buf.push_str(" && ");
                    }
                    expr.render(buf)?;
                }
            }
            Self::Group(inner) => {
                buf.push_str("( ");
                inner.render(buf)?;
                buf.push_str(" )");
            }
            Self::RedirectStdout(inner, path) => {
                inner.render_grouping_chains(buf)?;
                buf.push_str(" > ");
                push_quoted(buf, path_str(path)?);
            }
        }
        Ok(())
    }

    /// Render self, wrapped in parens if it is a `&&` chain.
    fn render_grouping_chains(&self, buf: &mut String) -> Result<(), PathEncodingError> {
        if matches!(self, Self::AndThen(_)) {
            buf.push_str("( ");
            self.render(buf)?;
            buf.push_str(" )");
            Ok(())
        } else {
            self.render(buf)
        }
    }

    /// Render into a fresh String.
    pub fn to_shell_string(&self) -> Result<String, PathEncodingError> {
        let mut buf = String::with_capacity(256);
        self.render(&mut buf)?;
        Ok(buf)
    }
}

fn path_str(path: &Path) -> Result<&str, PathEncodingError> {
    path.to_str().ok_or_else(|| PathEncodingError(path.to_owned()))
}

/// Quote only when the shell would otherwise mangle the token.
/// Glob characters stay bare so the shell expands them.
pub(crate) fn push_quoted(buf: &mut String, s: &str) {
    let needs_quoting = s.is_empty()
        || s.chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\' | '$' | '`'));
    if !needs_quoting {
        buf.push_str(s);
        return;
    }
    buf.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            buf.push('\\');
        }
        buf.push(c);
    }
    buf.push('"');
}
