//! Debfab: Debian Server Provisioning Tasks over SSH.

// Serde helper module.
mod serde;
// Command line arguments and configuration.
pub mod config;
// How to parse and resolve hosts.
pub mod host;
// Error handling.
pub mod error;
// Shell quoting.
pub mod shell;
// Version ordering.
pub mod version;
// SSH session wrapper.
pub mod session;
// Task-facing connection context.
pub mod connection;
// Remote file helpers.
pub mod files;
// Command templates.
pub mod template;
// Provisioning tasks and their registry.
pub mod tasks;
// Command line task parsing and execution.
pub mod dispatch;

pub use config::Config;
pub use connection::{Connection, RunOpts};
pub use dispatch::{execute, parse, Invocation, Step};
pub use error::FabError;
pub use host::{load_hosts_file, resolve, ConnectionSpec};
pub use session::{RunOutput, Session, SshSession};
pub use tasks::{Param, ParamKind, Task, TaskArgs, TaskContext, TaskRegistry};
pub use template::Templates;
pub use version::Version;
