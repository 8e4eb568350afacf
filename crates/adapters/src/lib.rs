// SPDX-License-Identifier: MIT

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! warden-adapters: subprocess and SSH adapters.
//!
//! Every privileged operation in the system is expressed as a subprocess
//! (`pfexec <tool>` composed by callers); these adapters own spawning,
//! capture, and timeout enforcement, nothing domain-specific.

pub mod ssh;
pub mod subprocess;

pub use ssh::{ExecResult, RsyncOptions, SshCredentials, SshError, SshSession, SshTarget};
pub use subprocess::{
    sh_quote, CommandOutput, CommandRunner, DEFAULT_COMMAND_TIMEOUT, PKG_COMMAND_TIMEOUT,
};
