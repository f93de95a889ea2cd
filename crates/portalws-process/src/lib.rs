//! Spawning the external package manager.
//!
//! Cache completion shells out to Maven (or a wrapper) and those runs can stall on the
//! network, so [`run_command`] enforces a wall-clock deadline that takes down the whole
//! process tree and caps how much output it keeps.

use std::{
    fmt,
    io::{self, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio},
    thread,
    time::{Duration, Instant},
};

/// Time a terminated tree gets to exit before it is force-killed.
#[cfg(unix)]
const KILL_GRACE: Duration = Duration::from_millis(250);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Deadline after which the process tree is killed.
    pub timeout: Option<Duration>,
    /// Bytes kept from each of stdout and stderr.
    pub output_limit: usize,
    /// Let the child write straight to our terminal; nothing is captured.
    pub inherit_stdio: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            output_limit: 1024 * 1024,
            inherit_stdio: false,
        }
    }
}

/// Working directory, program and arguments of one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: &Path, args: &[String]) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.to_path_buf(),
            args: args.to_vec(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            if arg.chars().any(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// What a finished (or killed) command left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: ExitStatus,
    /// Empty when stdio was inherited.
    pub stdout: String,
    pub stderr: String,
    /// Either stream exceeded [`RunOptions::output_limit`].
    pub truncated: bool,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success() && !self.timed_out
    }
}

/// A run that exited non-zero or hit its deadline.
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub command: CommandSpec,
    pub output: CommandOutput,
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let output = &self.output;
        if output.timed_out {
            write!(f, "`{}` timed out and was killed", self.command)?;
        } else {
            write!(f, "`{}` exited with {}", self.command, output.status)?;
        }
        let stderr = output.stderr.trim_end();
        if !stderr.is_empty() {
            write!(f, "\n{stderr}")?;
            if output.truncated {
                f.write_str("\n[output truncated]")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CommandFailure {}

#[derive(Debug, thiserror::Error)]
pub enum RunCommandError {
    #[error("failed to run `{command}`")]
    Io {
        command: CommandSpec,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Failed(Box<CommandFailure>),
}

impl RunCommandError {
    /// `Ok(output)` for a successful run, [`RunCommandError::Failed`] otherwise.
    pub fn check(command: CommandSpec, output: CommandOutput) -> Result<CommandOutput, Self> {
        if output.success() {
            Ok(output)
        } else {
            Err(Self::Failed(Box::new(CommandFailure { command, output })))
        }
    }
}

/// Something that can run an external program.
///
/// Cache completion only talks to this trait; tests substitute a fake that records
/// invocations.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultCommandRunner {
    pub options: RunOptions,
}

impl DefaultCommandRunner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }
}

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> io::Result<CommandOutput> {
        run_command(&CommandSpec::new(cwd, program, args), &self.options)
    }
}

/// Run `command` to completion or until its deadline passes.
pub fn run_command(command: &CommandSpec, opts: &RunOptions) -> io::Result<CommandOutput> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null());
    if opts.inherit_stdio {
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    }
    own_process_group(&mut cmd);

    tracing::debug!(target = "portalws.process", command = %command, "spawning");
    let mut child = cmd.spawn()?;
    let capture = if opts.inherit_stdio {
        None
    } else {
        Some(Capture::start(&mut child, opts.output_limit)?)
    };

    let (status, timed_out) = match opts.timeout {
        Some(timeout) => wait_until(&mut child, Instant::now() + timeout, command)?,
        None => (child.wait()?, false),
    };

    let (stdout, stderr, truncated) = match capture {
        Some(capture) => capture.finish()?,
        None => Default::default(),
    };

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        truncated,
        timed_out,
    })
}

/// [`run_command`], with non-zero exits and timeouts turned into errors.
pub fn run_command_checked(
    command: &CommandSpec,
    opts: &RunOptions,
) -> Result<CommandOutput, RunCommandError> {
    let output = run_command(command, opts).map_err(|source| RunCommandError::Io {
        command: command.clone(),
        source,
    })?;
    RunCommandError::check(command.clone(), output)
}

fn wait_until(
    child: &mut Child,
    deadline: Instant,
    command: &CommandSpec,
) -> io::Result<(ExitStatus, bool)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, false));
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(
                target = "portalws.process",
                command = %command,
                "deadline passed; killing process tree"
            );
            return Ok((kill_tree(child)?, true));
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}

// Wrapper scripts fork a JVM; a dedicated group lets a timeout reach both.
#[cfg(unix)]
fn own_process_group(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: `setpgid` is async-signal-safe and does not allocate.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) == 0 {
                Ok(())
            } else {
                Err(io::Error::last_os_error())
            }
        });
    }
}

#[cfg(not(unix))]
fn own_process_group(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> io::Result<ExitStatus> {
    // A negative pid addresses the group created in `own_process_group`.
    let group = -(child.id() as i32);
    // SAFETY: plain syscall on a pid we spawned.
    unsafe { libc::kill(group, libc::SIGTERM) };

    let grace_ends = Instant::now() + KILL_GRACE;
    while Instant::now() < grace_ends {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(Duration::from_millis(25));
    }

    // SAFETY: as above.
    unsafe { libc::kill(group, libc::SIGKILL) };
    child.wait()
}

#[cfg(windows)]
fn kill_tree(child: &mut Child) -> io::Result<ExitStatus> {
    // `mvn.cmd` leaves a JVM holding our pipes; `/T` reaches it too.
    let _ = Command::new("taskkill")
        .args(["/PID", &child.id().to_string(), "/T", "/F"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
    let _ = child.kill();
    child.wait()
}

#[cfg(not(any(unix, windows)))]
fn kill_tree(child: &mut Child) -> io::Result<ExitStatus> {
    let _ = child.kill();
    child.wait()
}

/// Background readers draining both pipes so a chatty child never blocks on a full pipe.
struct Capture {
    stdout: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
    stderr: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>,
}

impl Capture {
    fn start(child: &mut Child, limit: usize) -> io::Result<Self> {
        let stdout: ChildStdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout is not piped"))?;
        let stderr: ChildStderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr is not piped"))?;
        Ok(Self {
            stdout: thread::spawn(move || drain(stdout, limit)),
            stderr: thread::spawn(move || drain(stderr, limit)),
        })
    }

    fn finish(self) -> io::Result<(String, String, bool)> {
        let (out, out_cut) = join(self.stdout)?;
        let (err, err_cut) = join(self.stderr)?;
        Ok((
            String::from_utf8_lossy(&out).into_owned(),
            String::from_utf8_lossy(&err).into_owned(),
            out_cut || err_cut,
        ))
    }
}

fn join(handle: thread::JoinHandle<io::Result<(Vec<u8>, bool)>>) -> io::Result<(Vec<u8>, bool)> {
    handle
        .join()
        .map_err(|_| io::Error::other("output reader panicked"))?
}

/// Keep the first `limit` bytes of `reader`, discard the rest, and report whether anything
/// was discarded.
fn drain(mut reader: impl Read, limit: usize) -> io::Result<(Vec<u8>, bool)> {
    let mut kept = Vec::new();
    reader.by_ref().take(limit as u64).read_to_end(&mut kept)?;
    let discarded = io::copy(&mut reader, &mut io::sink())?;
    Ok((kept, discarded > 0))
}
