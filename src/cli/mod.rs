//! Command-line interface definitions for the `exomachine` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `exomachine` binary.
#[derive(Debug, Parser)]
#[command(
    name = "exomachine",
    about = "Provision and manage Exoscale virtual machines",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Machine name, used for the instance and its generated key pair.
    #[arg(long, value_name = "NAME", env = "EXOMACHINE_NAME")]
    pub(crate) name: String,
    /// Directory holding the machine's state file and private key.
    ///
    /// Defaults to `~/.exomachine/machines/<name>`.
    #[arg(long, value_name = "DIR", env = "EXOMACHINE_STORE_PATH")]
    pub(crate) store_path: Option<String>,
    /// Lifecycle action to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Lifecycle actions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Subcommand)]
pub(crate) enum Command {
    /// Provision the machine, its groups, and SSH access.
    Create,
    /// Power the machine on.
    Start,
    /// Power the machine off.
    Stop,
    /// Reboot the machine.
    Restart,
    /// Power the machine off without a graceful shutdown request.
    Kill,
    /// Delete the machine and its temporary key pair.
    Remove,
    /// Print the machine state.
    State,
    /// Print the Docker endpoint of the running machine.
    Url,
    /// Print the host name to use for SSH.
    SshHostname,
    /// Print the username to use for SSH.
    SshUsername,
}
