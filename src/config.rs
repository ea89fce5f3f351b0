//! # Worker and tunnel configuration.
//!
//! Provides the settings consumed by the runtime:
//! - [`WorkerConfig`] what a [`Worker`](crate::Worker) spawns (target, env, cwd, stdio)
//! - [`WorkerProps`] how a worker reacts to its child's death
//! - [`TunnelConfig`] where a [`TunnelSupervisor`](crate::TunnelSupervisor) connects
//!
//! ## Example
//! ```rust
//! use procvisor::{ExecTarget, Interpreter, WorkerConfig};
//!
//! let cfg = WorkerConfig::new("bot", ExecTarget::code(Interpreter::node(), "require('./dist').default.start(8075)"))
//!     .with_env("BP_API_URL", "http://localhost:3000");
//!
//! assert_eq!(cfg.env.get("BP_API_URL").map(String::as_str), Some("http://localhost:3000"));
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::TunnelError;
use crate::role::ProcessRole;

/// Interpreter used to evaluate inline code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Interpreter {
    /// Program to execute (looked up in `PATH`).
    pub program: String,
    /// Flag that makes `program` evaluate the next argument as source.
    pub eval_flag: String,
}

impl Interpreter {
    /// Creates an interpreter from a program and its eval flag.
    pub fn new(program: impl Into<String>, eval_flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            eval_flag: eval_flag.into(),
        }
    }

    /// POSIX shell (`sh -c`).
    pub fn shell() -> Self {
        Self::new("sh", "-c")
    }

    /// Node.js (`node -e`).
    pub fn node() -> Self {
        Self::new("node", "-e")
    }
}

/// What the child process runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExecTarget {
    /// Inline source evaluated by an interpreter.
    Code {
        interpreter: Interpreter,
        code: String,
    },
    /// Executable file with arguments.
    File { path: PathBuf, args: Vec<String> },
}

impl ExecTarget {
    /// Inline `code` evaluated by `interpreter`.
    pub fn code(interpreter: Interpreter, code: impl Into<String>) -> Self {
        Self::Code {
            interpreter,
            code: code.into(),
        }
    }

    /// Executable at `path` without arguments.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File {
            path: path.into(),
            args: Vec::new(),
        }
    }

    /// Program and argument list to hand to the OS.
    pub(crate) fn command_line(&self) -> (String, Vec<String>) {
        match self {
            ExecTarget::Code { interpreter, code } => (
                interpreter.program.clone(),
                vec![interpreter.eval_flag.clone(), code.clone()],
            ),
            ExecTarget::File { path, args } => {
                (path.to_string_lossy().into_owned(), args.clone())
            }
        }
    }
}

/// Where the child's standard streams go.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StdioMode {
    /// Share the parent's stdin/stdout/stderr (default; dev servers print to the terminal).
    #[default]
    Inherit,
    /// Discard all streams.
    Null,
}

/// Process configuration of a [`Worker`](crate::Worker).
///
/// ## Field semantics
/// - `name`: label used as event `source`
/// - `env`: variables added on top of the parent's environment
/// - `cwd`: working directory (`None` = parent's)
/// - `role_flag`: append [`ProcessRole::CHILD_FLAG`] so the child knows its role
#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub name: String,
    pub target: ExecTarget,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    pub stdio: StdioMode,
    pub role_flag: bool,
}

impl WorkerConfig {
    /// Creates a configuration with no env overrides, inherited stdio and no role flag.
    pub fn new(name: impl Into<String>, target: ExecTarget) -> Self {
        Self {
            name: name.into(),
            target,
            env: BTreeMap::new(),
            cwd: None,
            stdio: StdioMode::default(),
            role_flag: false,
        }
    }

    /// Adds one environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Adds every variable of `vars`; later keys win.
    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_stdio(mut self, stdio: StdioMode) -> Self {
        self.stdio = stdio;
        self
    }

    /// Marks the spawned process as [`ProcessRole::Child`] on its command line.
    pub fn with_role_flag(mut self) -> Self {
        self.role_flag = true;
        self
    }

    /// Program and full argument list, including the role flag when enabled.
    pub(crate) fn command_line(&self) -> (String, Vec<String>) {
        let (program, mut args) = self.target.command_line();
        if self.role_flag {
            args.push(ProcessRole::CHILD_FLAG.to_string());
        }
        (program, args)
    }
}

/// Behavioural knobs of a [`Worker`](crate::Worker).
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerProps {
    /// When `true`, `Worker::wait()` ignores natural deaths and only settles on
    /// a kill or an error. Default: `false`.
    pub hang_on_exit: bool,
}

/// Default keep-alive cadence of a tunnel.
pub const DEFAULT_HELLO_INTERVAL: Duration = Duration::from_secs(5);

/// Endpoint of a [`TunnelSupervisor`](crate::TunnelSupervisor).
#[derive(Clone, Debug)]
pub struct TunnelConfig {
    /// Relay endpoint.
    pub url: Url,
    /// Identifier the relay routes inbound traffic by.
    pub tunnel_id: String,
    /// Keep-alive cadence; prevents the relay from closing an idle tunnel.
    pub hello_interval: Duration,
}

impl TunnelConfig {
    /// Parses `url` and builds a config with the default keep-alive cadence.
    pub fn new(url: &str, tunnel_id: impl Into<String>) -> Result<Self, TunnelError> {
        let url = Url::parse(url).map_err(|e| TunnelError::InvalidUrl {
            url: url.to_string(),
            error: e.to_string(),
        })?;
        Ok(Self {
            url,
            tunnel_id: tunnel_id.into(),
            hello_interval: DEFAULT_HELLO_INTERVAL,
        })
    }

    pub fn with_hello_interval(mut self, interval: Duration) -> Self {
        self.hello_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_target_uses_eval_flag() {
        let cfg = WorkerConfig::new("w", ExecTarget::code(Interpreter::shell(), "exit 0"));
        let (program, args) = cfg.command_line();
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c".to_string(), "exit 0".to_string()]);
    }

    #[test]
    fn test_role_flag_is_appended_last() {
        let cfg = WorkerConfig::new(
            "w",
            ExecTarget::File {
                path: PathBuf::from("/usr/bin/bot"),
                args: vec!["--port".into(), "8075".into()],
            },
        )
        .with_role_flag();
        let (program, args) = cfg.command_line();
        assert_eq!(program, "/usr/bin/bot");
        assert_eq!(args.last().map(String::as_str), Some(ProcessRole::CHILD_FLAG));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_later_env_wins() {
        let cfg = WorkerConfig::new("w", ExecTarget::file("bot"))
            .with_env("A", "1")
            .with_envs([("A", "2"), ("B", "3")]);
        assert_eq!(cfg.env.get("A").map(String::as_str), Some("2"));
        assert_eq!(cfg.env.len(), 2);
    }

    #[test]
    fn test_tunnel_config_rejects_garbage_url() {
        let err = TunnelConfig::new("not a url", "id").unwrap_err();
        assert_eq!(err.as_label(), "tunnel_invalid_url");
    }

    #[test]
    fn test_tunnel_config_defaults() {
        let cfg = TunnelConfig::new("ws://localhost:8080", "abc").unwrap();
        assert_eq!(cfg.hello_interval, DEFAULT_HELLO_INTERVAL);
        assert_eq!(cfg.url.port(), Some(8080));
    }
}
