//! External tool invocation
//!
//! Every compiler, assembler, linker and packager call goes through a
//! `ToolRunner`, so the pipeline can be driven without a real toolchain.

use crate::config::BuildConfig;
use crate::error::{BuildError, BuildResult};
use crate::source::{Language, SourceKind, SourceUnit};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// One external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Files the command reads
    pub inputs: Vec<PathBuf>,
    /// File the command produces, if any
    pub output: Option<PathBuf>,
    /// Working directory
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            inputs: Vec::new(),
            output: None,
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument and record it as an input
    pub fn input(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        self.args.push(path.display().to_string());
        self.inputs.push(path);
        self
    }

    /// Record the produced file without adding an argument
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Full command line, for logging
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Raw diagnostic text: stderr, falling back to stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim_end();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim_end();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        format!("exited with status {}", self.exit_code)
    }
}

/// Executes external commands
///
/// `run` returns `Err` only when the command could not be started at all; a
/// non-zero exit is a successful `run` with a failing `ToolOutput`. Called
/// from compile workers, hence `Send + Sync`.
pub trait ToolRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput>;

    /// Whether `program` can be located
    fn is_available(&self, program: &str) -> bool;
}

/// Runs commands as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?
            .wait_with_output()?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

/// Run an invocation, mapping spawn and exit failures to `BuildError`
///
/// A spawn `NotFound` becomes `ToolNotFound`; a non-zero exit becomes
/// `ToolInvocation` carrying the raw diagnostic.
pub fn run_checked(runner: &dyn ToolRunner, invocation: &Invocation) -> BuildResult<ToolOutput> {
    let output = run_tool(runner, invocation)?;
    if output.success() {
        Ok(output)
    } else {
        Err(BuildError::tool(&invocation.program, output.diagnostic()))
    }
}

/// Run an invocation, mapping only spawn failures
pub fn run_tool(runner: &dyn ToolRunner, invocation: &Invocation) -> BuildResult<ToolOutput> {
    runner.run(invocation).map_err(|e| spawn_error(&invocation.program, e))
}

fn spawn_error(program: &str, error: io::Error) -> BuildError {
    if error.kind() == io::ErrorKind::NotFound {
        BuildError::ToolNotFound {
            tool: program.to_string(),
        }
    } else {
        BuildError::tool(program, error)
    }
}

/// Build the command that turns one source unit into its object
pub fn compile_invocation(config: &BuildConfig, unit: &SourceUnit) -> Invocation {
    let cwd = &config.project_root;
    let tools = &config.tools;
    let flags = &config.flags;
    let bootstrap = unit.kind == SourceKind::Bootstrap;

    let invocation = match unit.language {
        Language::C | Language::Gas => {
            let cflags = match unit.language {
                Language::C => c_flags_for(config, &unit.rel),
                _ => flags.cflags.as_slice(),
            };
            Invocation::new(&tools.cc, cwd)
                .args(cflags.iter().cloned())
                .args(config.profile.compile_flags())
                .args(flags.cppflags.iter().cloned())
                .args(bootstrap_flags(config, bootstrap))
                .arg("-c")
                .input(&unit.path)
        }
        Language::Nasm => Invocation::new(&tools.nasm, cwd)
            .args(flags.nasmflags.iter().cloned())
            .args(config.profile.nasm_flags())
            .args(bootstrap_flags(config, bootstrap))
            .input(&unit.path),
        Language::Binary => {
            let resource_args = config
                .embeds
                .iter()
                .find(|e| e.source == unit.path)
                .map(|e| e.args.clone())
                .unwrap_or_default();
            // objcopy takes positional input and output
            return Invocation::new(&tools.objcopy, cwd)
                .args(flags.objcopy_args.iter().cloned())
                .args(resource_args)
                .input(&unit.path)
                .arg(unit.object.display().to_string())
                .with_output(&unit.object);
        }
    };

    invocation
        .arg("-o")
        .arg(unit.object.display().to_string())
        .with_output(&unit.object)
}

fn bootstrap_flags(config: &BuildConfig, bootstrap: bool) -> Vec<String> {
    if bootstrap {
        config.flags.bootstrap_flags.clone()
    } else {
        Vec::new()
    }
}

/// Base C flags for a unit, honoring the first matching override
pub fn c_flags_for<'a>(config: &'a BuildConfig, rel: &Path) -> &'a [String] {
    let rel = rel.to_string_lossy().to_lowercase();
    config
        .flags
        .overrides
        .iter()
        .find(|o| rel.contains(&o.pattern))
        .map(|o| o.cflags.as_slice())
        .unwrap_or(config.flags.cflags.as_slice())
}

/// `ld <ldflags> -T <script> <objects...> -o <out>`
pub fn link_invocation(config: &BuildConfig, objects: &[PathBuf], output: &Path) -> Invocation {
    let mut invocation = Invocation::new(&config.tools.ld, &config.project_root)
        .args(config.flags.ldflags.iter().cloned())
        .arg("-T")
        .input(&config.linker_script);
    for object in objects {
        invocation = invocation.input(object);
    }
    invocation
        .arg("-o")
        .arg(output.display().to_string())
        .with_output(output)
}

/// `objcopy -O binary <image> <bin>`
pub fn extract_invocation(config: &BuildConfig, image: &Path, output: &Path) -> Invocation {
    Invocation::new(&config.tools.objcopy, &config.project_root)
        .args(["-O", "binary"])
        .input(image)
        .arg(output.display().to_string())
        .with_output(output)
}
