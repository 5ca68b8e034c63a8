//! PHP versions and the xdebug toggle.

pub mod versions;
mod xdebug;

pub use versions::{installed, version_from_cli_output, InstalledPhp};
pub use xdebug::{FpmRestart, Xdebug, XdebugState, XdebugUpdate};
