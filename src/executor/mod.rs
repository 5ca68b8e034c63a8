//! Command executor module.
//!
//! Handles safe subprocess spawning and the privileged execution boundary.

mod output;
mod privileged;
mod subprocess;

pub use output::summarize_output;
pub use privileged::{
    host_command_prefix, ActionOutput, PrivilegedAction, PrivilegedExecutor, Program,
    SystemExecutor,
};
pub use subprocess::{run_command, SubprocessBuilder, SubprocessResult};
