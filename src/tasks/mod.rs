//! Provisioning tasks.
//!
//! A task is a named sequence of remote commands run against the
//! [`Connection`] of the current invocation. Tasks declare their flags as
//! [`Param`]s; the dispatcher validates flags against them before anything
//! runs, so task bodies can rely on every declared parameter being present.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::connection::Connection;
use crate::error::FabError;
use crate::session::RunOutput;
use crate::template::Templates;

// Name to task mapping.
mod registry;
// Base system setup: debian, dotfiles, bbr, swap.
mod system;
// Third-party software: nodejs, docker, python, trojan.
mod software;

pub use registry::TaskRegistry;
pub use software::{Docker, Nodejs, Python, Trojan};
pub use system::{Bbr, Debian, Dotfiles, Swap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Str,
}

/// A task flag, given as `--name value` or `-s value`.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub short: Option<char>,
    pub help: &'static str,
    pub kind: ParamKind,
    /// `None` makes the flag required.
    pub default: Option<&'static str>,
    /// Extra check on a given value, run while parsing the command line.
    pub validate: Option<fn(&str) -> Result<(), String>>,
}

impl Param {
    /// The long flag, with underscores turned into dashes.
    pub fn long(&self) -> String {
        self.name.replace('_', "-")
    }
}

#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-line description shown by `-l`.
    fn about(&self) -> &'static str;

    fn params(&self) -> &'static [Param] {
        &[]
    }

    async fn run(&self, ctx: &TaskContext<'_>) -> Result<(), FabError>;
}

/// Arguments of one task in an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskArgs {
    task: String,
    values: HashMap<String, String>,
}

impl TaskArgs {
    pub fn new(task: &str) -> Self {
        Self {
            task: task.to_string(),
            values: HashMap::new(),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn str(&self, name: &str) -> Result<&str, FabError> {
        self.get(name).ok_or_else(|| self.invalid(format!("missing --{}", name)))
    }

    pub fn int(&self, name: &str) -> Result<u64, FabError> {
        let value = self.str(name)?;
        value
            .parse()
            .map_err(|_| self.invalid(format!("expected an integer for --{}, got '{}'", name, value)))
    }

    pub(crate) fn invalid(&self, reason: String) -> FabError {
        FabError::InvalidTaskArgs {
            task: self.task.clone(),
            reason,
        }
    }

    fn values(&self) -> &HashMap<String, String> {
        &self.values
    }
}

/// What a task body sees: the connection, its own arguments and the
/// template registry.
pub struct TaskContext<'a> {
    pub conn: &'a Connection<'a>,
    pub args: &'a TaskArgs,
    templates: &'a Templates,
}

impl<'a> TaskContext<'a> {
    pub fn new(conn: &'a Connection<'a>, args: &'a TaskArgs, templates: &'a Templates) -> Self {
        Self {
            conn,
            args,
            templates,
        }
    }

    /// Renders a command template with the task arguments, `hostname` and `user`.
    pub fn render(&self, template: &str) -> Result<String, FabError> {
        self.render_with(template, &[])
    }

    /// Like [`render`](Self::render) with extra parameters layered on top.
    pub fn render_with(&self, template: &str, extra: &[(&str, &str)]) -> Result<String, FabError> {
        let spec = self.conn.spec();
        let mut params = self.args.values().clone();
        params.insert("hostname".to_string(), spec.host.clone());
        if let Some(user) = &spec.user {
            params.insert("user".to_string(), user.clone());
        }
        for (key, value) in extra {
            params.insert(key.to_string(), value.to_string());
        }
        self.templates.render(template, &params)
    }

    pub async fn run(&self, template: &str) -> Result<RunOutput, FabError> {
        self.conn.run(&self.render(template)?).await
    }

    pub async fn sudo(&self, template: &str) -> Result<RunOutput, FabError> {
        self.conn.sudo(&self.render(template)?).await
    }

    /// Prints a status message prefixed with the host.
    pub fn note(&self, message: &str) {
        eprintln!("{} {}", self.conn.spec().prettify(), message);
    }
}
