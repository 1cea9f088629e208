//! Typst subprocess compiler.
//!
//! The compiler is modelled as a capability: given a templated document and a
//! target path it either produces the artifact or reports why it could not.
//! [`TypstCompiler`] drives the real `typst` binary as
//! `typst compile - <output>`, feeding the document on stdin.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::CompileError;

/// Default compiler program, resolved via `PATH`.
pub const DEFAULT_PROGRAM: &str = "typst";

/// Default timeout for one compilation.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// One compilation job.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Full templated Typst document, written to stdin.
    pub document: &'a str,
    /// Artifact path passed as the output argument.
    pub output_path: &'a Path,
    /// Working directory of the compiler process.
    pub working_dir: &'a Path,
}

/// Outcome of a compilation that ran to completion.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Process exit code, `-1` if terminated by a signal.
    pub exit_code: i32,
    /// Captured stderr (empty when capture is disabled).
    pub stderr: String,
    /// Wall-clock time spent in the subprocess.
    pub duration: Duration,
}

/// Anything able to turn a Typst document into an artifact on disk.
pub trait Compiler: Send + Sync {
    /// Compiles `request.document` into `request.output_path`.
    ///
    /// Implementations must return [`CompileError::CompilerNotFound`] when
    /// the compiler itself is unavailable, so callers can tell configuration
    /// problems apart from a bad expression.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, CompileError>;
}

impl<C: Compiler + ?Sized> Compiler for &C {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
        (**self).compile(request)
    }
}

impl<C: Compiler + ?Sized> Compiler for Box<C> {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
        (**self).compile(request)
    }
}

/// Configuration for [`TypstCompiler`].
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Program name or path of the typst executable.
    pub program: String,
    /// Maximum time one compilation may take. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Whether to capture the compiler's stderr for diagnostics.
    pub capture_stderr: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            capture_stderr: true,
        }
    }
}

impl CompilerConfig {
    /// Creates a new config for the given program.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Sets the timeout duration.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the timeout in seconds. Zero disables the timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = (secs > 0).then(|| Duration::from_secs(secs));
        self
    }

    /// Sets whether stderr is captured.
    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.capture_stderr = capture;
        self
    }
}

/// The typst subprocess compiler.
#[derive(Debug, Clone, Default)]
pub struct TypstCompiler {
    config: CompilerConfig,
}

impl TypstCompiler {
    /// Creates a compiler with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a compiler with the given configuration.
    pub fn with_config(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Resolves the configured program against `PATH`.
    ///
    /// Resolution happens on every call so a compiler installed mid-build is
    /// picked up.
    pub fn locate(&self) -> Result<PathBuf, CompileError> {
        which::which(&self.config.program)
            .map_err(|_| CompileError::compiler_not_found(&self.config.program))
    }

    /// Runs `<typst> --version` and returns its first line of output.
    pub fn version(&self) -> Result<String, CompileError> {
        let program = self.locate()?;
        let output = Command::new(program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(CompileError::SpawnFailed)?;
        if !output.status.success() {
            return Err(CompileError::process_failed(
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl Compiler for TypstCompiler {
    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput, CompileError> {
        let program = self.locate()?;

        // typst compile - <output>
        let mut cmd = Command::new(&program);
        cmd.arg("compile")
            .arg("-")
            .arg(request.output_path)
            .current_dir(request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null());

        if self.config.capture_stderr {
            cmd.stderr(Stdio::piped());
        }

        tracing::debug!(
            program = %program.display(),
            output = %request.output_path.display(),
            "spawning typst"
        );

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(CompileError::SpawnFailed)?;
        let stderr_reader = spawn_stderr_reader(&mut child);

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(request.document.as_bytes()) {
                Ok(()) => {}
                // The compiler may exit before reading its input; its exit
                // status is the more useful report.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CompileError::WriteStdinFailed(e));
                }
            }
            // stdin is dropped here, closing the pipe.
        }

        let status = wait_with_timeout(&mut child, self.config.timeout)?;
        let stderr = join_stderr_reader(stderr_reader);
        let duration = start.elapsed();

        if !status.success() {
            let exit_code = status.code().unwrap_or(-1);
            return Err(CompileError::process_failed(exit_code, stderr));
        }

        // typst resolves a relative output path against its working directory.
        let written_path = request.working_dir.join(request.output_path);
        let written = std::fs::metadata(&written_path)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(CompileError::NoOutput { path: written_path });
        }

        Ok(CompileOutput {
            exit_code: status.code().unwrap_or(0),
            stderr,
            duration,
        })
    }
}

/// Drains the child's stderr on a separate thread so a chatty compiler
/// never blocks on a full pipe.
fn spawn_stderr_reader(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut pipe = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }))
}

fn join_stderr_reader(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// Polls the child until it exits. On timeout the child is killed and
/// reaped; a stderr reader left behind finishes once the pipe closes.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> Result<ExitStatus, CompileError> {
    let start = Instant::now();

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if let Some(timeout) = timeout {
                    if start.elapsed() > timeout {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(CompileError::Timeout { timeout });
                    }
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(CompileError::WaitFailed(e)),
        }
    }
}
