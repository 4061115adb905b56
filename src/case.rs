use crate::types::{CaseOutput, Parameters, RunContext, TestCaseSpec};
use crate::{t, t_args};
use anyhow::{Context, Result, anyhow, bail};
use indexmap::IndexMap;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

/// 5 minutes per command
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// How long output is still collected after the command itself has exited.
/// Background processes it started may keep the pipes open indefinitely.
pub const PIPE_GRACE: Duration = Duration::from_millis(250);

/// A runnable unit of test logic. The scheduler only sees this interface.
pub trait TestCase: Send + Sync {
    fn run(&self, ctx: &RunContext) -> Result<CaseOutput>;

    /// Checks configuration before the set starts running.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Always passes. Useful as a milestone other cases can depend on.
#[derive(Debug, Clone, Default)]
pub struct NoopCase {
    pub message: Option<String>,
}

impl NoopCase {
    pub fn from_spec(spec: &TestCaseSpec) -> Result<Self> {
        let message = match spec.parameters.get("message") {
            Some(v) => Some(scalar(v).ok_or_else(|| anyhow!(t!("case-message-not-string")))?),
            None => None,
        };
        Ok(Self { message })
    }
}

impl TestCase for NoopCase {
    fn run(&self, _ctx: &RunContext) -> Result<CaseOutput> {
        Ok(CaseOutput::pass().with_output(self.message.clone().unwrap_or_default()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Program { program: String, args: Vec<String> },
    Shell(String),
}

/// Runs an external program and passes when it exits with the expected status.
#[derive(Debug, Clone)]
pub struct CommandCase {
    pub name: String,
    pub invocation: Invocation,
    pub timeout: Duration,
    pub expect_status: i32,
    pub cwd: Option<PathBuf>,
    pub env: IndexMap<String, String>,
}

fn scalar(v: &serde_yaml::Value) -> Option<String> {
    match v {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_param(params: &Parameters, key: &str) -> Result<Option<String>> {
    match params.get(key) {
        None | Some(serde_yaml::Value::Null) => Ok(None),
        Some(v) => scalar(v)
            .map(Some)
            .ok_or_else(|| anyhow!(t_args!("case-param-not-scalar", "key" => key))),
    }
}

impl CommandCase {
    pub fn from_spec(spec: &TestCaseSpec) -> Result<Self> {
        let params = &spec.parameters;
        let program = string_param(params, "command")?;
        let shell = string_param(params, "shell")?;
        let invocation = match (program, shell) {
            (Some(program), None) => {
                let args = match params.get("args") {
                    None | Some(serde_yaml::Value::Null) => Vec::new(),
                    Some(serde_yaml::Value::Sequence(seq)) => seq
                        .iter()
                        .map(|v| {
                            scalar(v).ok_or_else(|| anyhow!(t_args!("case-param-not-scalar", "key" => "args")))
                        })
                        .collect::<Result<Vec<_>>>()?,
                    Some(v) => vec![
                        scalar(v).ok_or_else(|| anyhow!(t_args!("case-param-not-scalar", "key" => "args")))?,
                    ],
                };
                Invocation::Program { program, args }
            }
            (None, Some(line)) => Invocation::Shell(line),
            (Some(_), Some(_)) => bail!(t!("case-command-and-shell")),
            (None, None) => bail!(t!("case-command-missing")),
        };
        let timeout = match params.get("timeout_secs") {
            None => DEFAULT_TIMEOUT,
            Some(v) => Duration::from_secs(
                v.as_u64()
                    .ok_or_else(|| anyhow!(t_args!("case-param-not-number", "key" => "timeout_secs")))?,
            ),
        };
        let expect_status = match params.get("expect_status") {
            None => 0,
            Some(v) => v
                .as_i64()
                .and_then(|n| i32::try_from(n).ok())
                .ok_or_else(|| anyhow!(t_args!("case-param-not-number", "key" => "expect_status")))?,
        };
        let cwd = string_param(params, "cwd")?.map(PathBuf::from);
        let mut env = IndexMap::new();
        if let Some(v) = params.get("env") {
            let map = v
                .as_mapping()
                .ok_or_else(|| anyhow!(t!("case-env-not-mapping")))?;
            for (k, v) in map {
                let key = scalar(k).ok_or_else(|| anyhow!(t!("case-env-not-mapping")))?;
                let value = scalar(v).ok_or_else(|| anyhow!(t!("case-env-not-mapping")))?;
                env.insert(key, value);
            }
        }
        Ok(Self {
            name: spec.name.clone(),
            invocation,
            timeout,
            expect_status,
            cwd,
            env,
        })
    }

    fn command(&self, ctx: &RunContext) -> Command {
        let mut cmd = match &self.invocation {
            Invocation::Program { program, args } => {
                let mut c = Command::new(program);
                c.args(args);
                c
            }
            Invocation::Shell(line) => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(line);
                c
            }
        };
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        cmd.env("TESTSET_CASE", &self.name);
        if let Some(target) = &ctx.target {
            cmd.env("TESTSET_TARGET", target);
        }
        if let Some(inventory) = &ctx.inventory {
            cmd.env("TESTSET_INVENTORY", inventory);
        }
        cmd.envs(&self.env);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so a timeout reaches everything the command started.
            cmd.process_group(0);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn program(&self) -> &str {
        match &self.invocation {
            Invocation::Program { program, .. } => program,
            Invocation::Shell(_) => "sh",
        }
    }

    fn write_log(&self, ctx: &RunContext, output: &str) -> Result<()> {
        if let Some(dir) = &ctx.log_dir {
            fs::create_dir_all(dir)
                .with_context(|| t_args!("case-log-dir-failed", "dir" => dir.display()))?;
            let file = dir.join(format!("{}.log", self.name));
            fs::write(&file, output)
                .with_context(|| t_args!("case-log-write-failed", "file" => file.display()))?;
        }
        Ok(())
    }
}

/// Drains one pipe on its own thread.
struct PipeReader {
    buf: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl PipeReader {
    fn spawn<R: Read + Send + 'static>(mut pipe: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let (tx, done) = mpsc::channel();
        std::thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            let _ = tx.send(());
        });
        Self { buf, done }
    }

    /// Everything read until the pipe closed or `deadline` passed.
    /// The thread keeps draining in the background if a writer is still alive.
    fn finish(self, deadline: Instant) -> Vec<u8> {
        let _ = self
            .done
            .recv_timeout(deadline.saturating_duration_since(Instant::now()));
        std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            debug!("{}", t_args!("debug-killpg-failed", "pid" => pid, "error" => e));
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}

impl TestCase for CommandCase {
    fn run(&self, ctx: &RunContext) -> Result<CaseOutput> {
        debug!("{}", t_args!("debug-command-start", "case" => &self.name, "cmd" => self.program()));
        let mut child = self
            .command(ctx)
            .spawn()
            .with_context(|| t_args!("case-failed-to-start", "cmd" => self.program()))?;

        // The child stalls once a pipe buffer fills, so both are drained while we wait.
        let stdout = child.stdout.take().ok_or_else(|| anyhow!(t!("case-missing-stdout")))?;
        let stderr = child.stderr.take().ok_or_else(|| anyhow!(t!("case-missing-stderr")))?;
        let out_reader = PipeReader::spawn(stdout);
        let err_reader = PipeReader::spawn(stderr);

        let status = match child.wait_timeout(self.timeout)? {
            Some(status) => Some(status),
            None => {
                kill_process_group(&mut child);
                let _ = child.wait();
                None
            }
        };

        let deadline = Instant::now() + PIPE_GRACE;
        let mut output = String::from_utf8_lossy(&out_reader.finish(deadline)).into_owned();
        let stderr_text = String::from_utf8_lossy(&err_reader.finish(deadline)).into_owned();
        if !stderr_text.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&stderr_text);
        }
        self.write_log(ctx, &output)?;

        let Some(status) = status else {
            return Ok(CaseOutput::fail(t_args!("case-timeout", "secs" => self.timeout.as_secs()))
                .with_output(output));
        };
        match status.code() {
            Some(code) if code == self.expect_status => Ok(CaseOutput::pass().with_output(output)),
            Some(code) => Ok(CaseOutput::fail(t_args!("case-unexpected-status",
                "code" => code,
                "expected" => self.expect_status
            ))
            .with_output(output)),
            None => Ok(CaseOutput::fail(t_args!("case-killed-by-signal", "status" => status))
                .with_output(output)),
        }
    }

    fn validate(&self) -> Result<()> {
        let program = self.program();
        if program.contains(std::path::MAIN_SEPARATOR) {
            let path = match &self.cwd {
                Some(dir) if !std::path::Path::new(program).is_absolute() => dir.join(program),
                _ => PathBuf::from(program),
            };
            if !path.exists() {
                bail!(t_args!("case-program-not-found", "cmd" => program));
            }
            return Ok(());
        }
        which::which(program)
            .map(|_| ())
            .map_err(|_| anyhow!(t_args!("case-program-not-found", "cmd" => program)))
    }
}
