//! Spawning `git` with a controlled environment, a time budget, and
//! option-injection checks on untrusted arguments.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use amitrace_core::{AmitraceError, GitConfig};

use crate::sanitize::sanitize_credential_urls;

/// Locale every subprocess runs under.
pub const DEFAULT_LOCALE: &str = "C";

/// A `git` invocation under construction.
///
/// Arguments added with [`GitCommand::add_arguments`] are trusted.
/// Arguments that come from user input go through
/// [`GitCommand::add_dynamic_arguments`], which refuses anything that could be
/// read as an option; a refused argument poisons the command so that running
/// it fails with [`AmitraceError::BrokenCommand`] and nothing is spawned.
///
/// # Examples
///
/// ```
/// use amitrace_core::GitConfig;
/// use amitrace_git::command::GitCommand;
///
/// let mut cmd = GitCommand::new(&GitConfig::default(), &["log"]);
/// cmd.add_dynamic_arguments(&["--output=/etc/passwd"]);
/// assert!(cmd.is_broken());
/// ```
#[derive(Debug, Clone)]
pub struct GitCommand {
    program: String,
    args: Vec<String>,
    base_env: Vec<(String, String)>,
    default_timeout: Duration,
    broken: Option<(String, String)>,
    description: Option<String>,
}

/// Per-run options.
#[derive(Debug, Default)]
pub struct RunOpts<'a> {
    /// Working directory.
    pub dir: Option<&'a Path>,
    /// Replacement environment. `None` inherits the parent's.
    pub env: Option<Vec<(String, String)>>,
    /// Overrides the command's default budget.
    pub timeout: Option<Duration>,
    /// Bytes written to stdin before it is closed.
    pub stdin: Option<Vec<u8>>,
}

impl<'a> RunOpts<'a> {
    /// Options that only set the working directory.
    pub fn in_dir(dir: &'a Path) -> Self {
        Self {
            dir: Some(dir),
            ..Self::default()
        }
    }

    /// Inherit the parent environment plus `key=value`.
    pub fn with_extra_env(mut self, key: &str, value: impl Into<String>) -> Self {
        let env = self.env.get_or_insert_with(|| std::env::vars().collect());
        env.push((key.to_string(), value.into()));
        self
    }

    /// Override the time budget.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Feed `bytes` to stdin.
    pub fn with_stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }
}

impl GitCommand {
    /// Start a command from trusted arguments.
    pub fn new(config: &GitConfig, args: &[&str]) -> Self {
        Self {
            program: config.executable.clone(),
            args: args.iter().map(|a| a.to_string()).collect(),
            base_env: common_env(config),
            default_timeout: config.timeout(),
            broken: None,
            description: None,
        }
    }

    /// Append trusted arguments.
    pub fn add_arguments(&mut self, args: &[&str]) -> &mut Self {
        self.args.extend(args.iter().map(|a| a.to_string()));
        self
    }

    /// Append arguments that originate from user input.
    ///
    /// Empty values and values starting with `-` are refused and mark the
    /// command broken.
    pub fn add_dynamic_arguments<S: AsRef<str>>(&mut self, args: &[S]) -> &mut Self {
        for arg in args {
            let arg = arg.as_ref();
            if arg.is_empty() {
                self.mark_broken(arg, "dynamic argument is empty");
            } else if arg.starts_with('-') {
                self.mark_broken(arg, "dynamic argument starts with '-'");
            }
        }
        if self.broken.is_none() {
            self.args.extend(args.iter().map(|a| a.as_ref().to_string()));
        }
        self
    }

    /// Append `opt=value` as one argument. The value may begin with `-`
    /// because git reads it as the option's value.
    pub fn add_option_value(&mut self, opt: &str, value: &str) -> &mut Self {
        if !opt.starts_with('-') {
            self.mark_broken(opt, "option name must start with '-'");
            return self;
        }
        self.args.push(format!("{opt}={value}"));
        self
    }

    /// Append `--` followed by paths, which git then never reads as options.
    pub fn add_dashes_and_list<S: AsRef<str>>(&mut self, items: &[S]) -> &mut Self {
        self.args.push("--".into());
        self.args.extend(items.iter().map(|i| i.as_ref().to_string()));
        self
    }

    /// Set the text used in logs. It is sanitized before use.
    pub fn set_description(&mut self, desc: impl Into<String>) -> &mut Self {
        self.description = Some(desc.into());
        self
    }

    /// Whether a refused argument poisoned the command.
    pub fn is_broken(&self) -> bool {
        self.broken.is_some()
    }

    /// Arguments as they will be passed to the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Sanitized human-readable form, for logging.
    pub fn description(&self, dir: Option<&Path>) -> String {
        let raw = match &self.description {
            Some(d) => d.clone(),
            None => format!(
                "{} {} [repo_path: {}]",
                self.program,
                self.args.join(" "),
                dir.map(|d| d.display().to_string()).unwrap_or_default()
            ),
        };
        sanitize_credential_urls(&raw)
    }

    fn mark_broken(&mut self, arg: &str, reason: &str) {
        if self.broken.is_none() {
            self.broken = Some((arg.to_string(), reason.to_string()));
        }
    }

    fn check_broken(&self) -> Result<(), AmitraceError> {
        match &self.broken {
            Some((arg, reason)) => Err(AmitraceError::BrokenCommand {
                arg: arg.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn build(&self, opts: &RunOpts<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(env) = &opts.env {
            cmd.env_clear();
            cmd.envs(env.iter().map(|(k, v)| (k, v)));
        }
        cmd.envs(self.base_env.iter().map(|(k, v)| (k, v)));
        if let Some(dir) = opts.dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run to completion, discarding stdout.
    pub fn run(&self, opts: RunOpts<'_>) -> Result<(), AmitraceError> {
        self.run_with_stdout(opts, |out| {
            std::io::copy(out, &mut std::io::sink())?;
            Ok(())
        })
    }

    /// Run and capture stdout as bytes.
    ///
    /// # Errors
    ///
    /// [`AmitraceError::Git`] with trimmed stderr when git exits non-zero,
    /// [`AmitraceError::ExecTimeout`] when the budget runs out.
    pub fn run_std_bytes(&self, opts: RunOpts<'_>) -> Result<Vec<u8>, AmitraceError> {
        self.run_with_stdout(opts, |out| {
            let mut buf = Vec::new();
            out.read_to_end(&mut buf)?;
            Ok(buf)
        })
    }

    /// Run and capture stdout as (lossy) UTF-8.
    pub fn run_std_string(&self, opts: RunOpts<'_>) -> Result<String, AmitraceError> {
        let bytes = self.run_std_bytes(opts)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Run, handing stdout to `consume` on the calling thread as it arrives.
    ///
    /// Stdin is fed and stderr collected on helper threads; a watchdog kills
    /// the child when the budget runs out. All helpers are joined before
    /// this returns. If `consume` fails the child is killed and the
    /// consumer's error is returned.
    pub fn run_with_stdout<T, F>(&self, opts: RunOpts<'_>, consume: F) -> Result<T, AmitraceError>
    where
        F: FnOnce(&mut dyn BufRead) -> Result<T, AmitraceError>,
    {
        self.check_broken()?;
        let desc = self.description(opts.dir);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        tracing::debug!(target: "amitrace::git", command = %desc, ?timeout, "spawning");

        let mut cmd = self.build(&opts);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.stdin(if opts.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .map_err(|e| AmitraceError::Git(format!("failed to spawn {desc}: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AmitraceError::Git("child stdout was not captured".into()))?;
        let stderr_pump = child.stderr.take().map(|mut err| {
            thread::spawn(move || {
                let mut buf = Vec::new();
                let _ = err.read_to_end(&mut buf);
                buf
            })
        });
        let stdin_pump = match (child.stdin.take(), opts.stdin) {
            (Some(mut pipe), Some(bytes)) => Some(thread::spawn(move || {
                // A child that exits early closes the pipe; that is not our error.
                let _ = pipe.write_all(&bytes);
            })),
            _ => None,
        };

        let child = Arc::new(Mutex::new(child));
        let watchdog = Watchdog::start(Arc::clone(&child), timeout);

        let mut reader = BufReader::new(stdout);
        let consumed = consume(&mut reader);
        if consumed.is_err() {
            kill(&child);
        }
        drop(reader);

        let timed_out = watchdog.finish();
        if let Some(pump) = stdin_pump {
            let _ = pump.join();
        }
        let status = lock(&child).wait()?;
        let stderr = stderr_pump
            .and_then(|p| p.join().ok())
            .map(|b| String::from_utf8_lossy(&b).trim().to_string())
            .unwrap_or_default();

        tracing::debug!(
            target: "amitrace::git",
            command = %desc,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = status.success(),
            "finished"
        );

        if timed_out {
            return Err(AmitraceError::ExecTimeout { duration: timeout });
        }
        let value = consumed?;
        if !status.success() {
            let detail = if stderr.is_empty() {
                status.to_string()
            } else {
                stderr
            };
            return Err(AmitraceError::Git(format!("{desc}: {detail}")));
        }
        Ok(value)
    }

    /// Start a long-lived child with piped stdin/stdout, for batch sessions.
    pub fn spawn_piped(&self, dir: &Path) -> Result<PipedChild, AmitraceError> {
        self.check_broken()?;
        let desc = self.description(Some(dir));
        tracing::debug!(target: "amitrace::git", command = %desc, "spawning session");
        let mut child = self
            .build(&RunOpts::in_dir(dir))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AmitraceError::Git(format!("failed to spawn {desc}: {e}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AmitraceError::Git("child stdin was not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AmitraceError::Git("child stdout was not captured".into()))?;
        Ok(PipedChild {
            child,
            stdin,
            stdout,
            description: desc,
        })
    }
}

/// A running child whose stdin and stdout were taken by the caller.
#[derive(Debug)]
pub struct PipedChild {
    /// The process handle.
    pub child: Child,
    /// Request side.
    pub stdin: ChildStdin,
    /// Response side.
    pub stdout: ChildStdout,
    /// Sanitized description used in logs.
    pub description: String,
}

struct Watchdog {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<bool>,
}

impl Watchdog {
    fn start(child: Arc<Mutex<Child>>, timeout: Duration) -> Self {
        let (stop, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || match rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                kill(&child);
                true
            }
            _ => false,
        });
        Self { stop, handle }
    }

    /// Stop watching; returns whether the child was killed for running long.
    fn finish(self) -> bool {
        let _ = self.stop.send(());
        self.handle.join().unwrap_or(false)
    }
}

fn lock(child: &Mutex<Child>) -> std::sync::MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn kill(child: &Mutex<Child>) {
    let _ = lock(child).kill();
}

/// Environment appended to every git subprocess.
pub fn common_env(config: &GitConfig) -> Vec<(String, String)> {
    let mut env = vec![
        ("HOME".to_string(), config.home_dir.display().to_string()),
        ("GIT_NO_REPLACE_OBJECTS".to_string(), "1".to_string()),
    ];
    for key in &config.pass_through_env {
        if let Ok(value) = std::env::var(key) {
            env.push((key.clone(), value));
        }
    }
    env.push(("LC_ALL".to_string(), DEFAULT_LOCALE.to_string()));
    env.push(("GIT_TERMINAL_PROMPT".to_string(), "0".to_string()));
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GitConfig {
        GitConfig::default()
    }

    #[test]
    fn dynamic_dash_argument_breaks_command() {
        let mut cmd = GitCommand::new(&config(), &["rev-parse"]);
        cmd.add_dynamic_arguments(&["--exec=rm"]);
        let err = cmd.run(RunOpts::default()).unwrap_err();
        match err {
            AmitraceError::BrokenCommand { arg, .. } => assert_eq!(arg, "--exec=rm"),
            other => panic!("expected BrokenCommand, got {other:?}"),
        }
    }

    #[test]
    fn broken_command_keeps_argument_list_clean() {
        let mut cmd = GitCommand::new(&config(), &["log"]);
        cmd.add_dynamic_arguments(&["main", "-p"]);
        assert!(cmd.is_broken());
        assert_eq!(cmd.args(), &["log".to_string()]);
    }

    #[test]
    fn option_value_may_start_with_dash() {
        let mut cmd = GitCommand::new(&config(), &["diff"]);
        cmd.add_option_value("--skip-to", "-weird-name");
        assert!(!cmd.is_broken());
        assert_eq!(cmd.args().last().unwrap(), "--skip-to=-weird-name");
    }

    #[test]
    fn description_is_sanitized() {
        let mut cmd = GitCommand::new(&config(), &["fetch"]);
        cmd.add_dynamic_arguments(&["https://alice:pw@example.com/r.git"]);
        let desc = cmd.description(None);
        assert!(desc.contains("sanitized-credential@example.com"));
        assert!(!desc.contains("alice"));
    }

    #[test]
    fn common_env_is_reproducible() {
        let env = common_env(&config());
        assert!(env.contains(&("LC_ALL".into(), "C".into())));
        assert!(env.contains(&("GIT_TERMINAL_PROMPT".into(), "0".into())));
        assert!(env.contains(&("GIT_NO_REPLACE_OBJECTS".into(), "1".into())));
        assert!(env.contains(&("HOME".into(), "/tmp".into())));
    }

    #[test]
    fn runs_git_version() {
        let cmd = GitCommand::new(&config(), &["version"]);
        let out = cmd.run_std_string(RunOpts::default()).unwrap();
        assert!(out.starts_with("git version"));
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = GitCommand::new(&config(), &["rev-parse", "--verify", "HEAD"]);
        let err = cmd.run(RunOpts::in_dir(dir.path())).unwrap_err();
        assert!(matches!(err, AmitraceError::Git(_)));
    }

    #[test]
    fn timeout_kills_child() {
        let mut git = config();
        git.executable = "sleep".into();
        let cmd = GitCommand::new(&git, &["5"]);
        let started = Instant::now();
        let err = cmd
            .run(RunOpts::default().with_timeout(Duration::from_millis(100)))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn stdin_is_fed() {
        let mut git = config();
        git.executable = "cat".into();
        let cmd = GitCommand::new(&git, &[]);
        let out = cmd
            .run_std_string(RunOpts::default().with_stdin(b"hello\n".to_vec()))
            .unwrap();
        assert_eq!(out, "hello\n");
    }
}
