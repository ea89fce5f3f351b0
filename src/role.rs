//! # Parent/child role of the current process.
//!
//! A program that spawns copies of itself as workers needs to know which side
//! it is running on. The role travels on the command line
//! ([`ProcessRole::CHILD_FLAG`], appended when
//! [`WorkerConfig::with_role_flag`](crate::WorkerConfig::with_role_flag) is set)
//! and is read back with [`ProcessRole::from_args`].
//!
//! ## Example
//! ```rust
//! use procvisor::ProcessRole;
//!
//! let role = ProcessRole::from_args(["bot", "--port", "8075", "--worker-child"]);
//! assert_eq!(role, ProcessRole::Child);
//! assert_eq!(ProcessRole::from_args(["bot"]), ProcessRole::Main);
//! ```

/// Which side of a worker relationship this process is on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ProcessRole {
    /// Supervising process (default).
    #[default]
    Main,
    /// Process spawned by a [`Worker`](crate::Worker).
    Child,
}

impl ProcessRole {
    /// Command-line flag marking a worker child.
    pub const CHILD_FLAG: &'static str = "--worker-child";

    /// Detects the role from an argument list (usually `std::env::args()`).
    pub fn from_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if args.into_iter().any(|a| a.as_ref() == Self::CHILD_FLAG) {
            ProcessRole::Child
        } else {
            ProcessRole::Main
        }
    }

    #[inline]
    pub fn is_child(self) -> bool {
        matches!(self, ProcessRole::Child)
    }
}
