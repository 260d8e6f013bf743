//! The connection context handed to tasks.
//!
//! Wraps a [`Session`] with the run/sudo/put vocabulary task bodies are
//! written in. A non-zero exit aborts the task with
//! [`FabError::RemoteCommand`] unless the command was run with `warn`.

use std::path::Path;

use crate::error::FabError;
use crate::host::ConnectionSpec;
use crate::session::{RunOutput, Session};
use crate::shell::quote;

/// Options for [`Connection::run_with`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOpts {
    /// Return the output of a failed command instead of failing.
    pub warn: bool,
    /// Don't stream the command's output to the terminal.
    pub hide: bool,
    /// Run through `sudo`.
    pub sudo: bool,
}

impl RunOpts {
    pub fn warn() -> Self {
        Self {
            warn: true,
            ..Default::default()
        }
    }

    pub fn quiet() -> Self {
        Self {
            warn: true,
            hide: true,
            ..Default::default()
        }
    }

    pub fn sudo(mut self) -> Self {
        self.sudo = true;
        self
    }
}

pub struct Connection<'s> {
    spec: ConnectionSpec,
    session: &'s dyn Session,
}

impl<'s> Connection<'s> {
    pub fn new(spec: ConnectionSpec, session: &'s dyn Session) -> Self {
        Self { spec, session }
    }

    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    pub async fn run(&self, command: &str) -> Result<RunOutput, FabError> {
        self.run_with(command, RunOpts::default()).await
    }

    pub async fn sudo(&self, command: &str) -> Result<RunOutput, FabError> {
        self.run_with(command, RunOpts::default().sudo()).await
    }

    pub async fn run_with(&self, command: &str, opts: RunOpts) -> Result<RunOutput, FabError> {
        let command = if opts.sudo {
            sudo_wrap(command)
        } else {
            command.to_string()
        };
        let output = self.session.exec(&command, None, opts.hide).await?;
        self.checked(command, output, opts.warn)
    }

    /// Runs quietly and reports whether the command succeeded.
    pub async fn check(&self, command: &str) -> Result<bool, FabError> {
        Ok(self.run_with(command, RunOpts::quiet()).await?.ok())
    }

    pub async fn sudo_check(&self, command: &str) -> Result<bool, FabError> {
        Ok(self.run_with(command, RunOpts::quiet().sudo()).await?.ok())
    }

    /// Runs quietly and returns the trimmed stdout.
    pub async fn output(&self, command: &str) -> Result<String, FabError> {
        let opts = RunOpts {
            hide: true,
            ..Default::default()
        };
        Ok(self.run_with(command, opts).await?.stdout.trim().to_string())
    }

    /// Writes `contents` to `remote_path`, replacing the file.
    pub async fn write_file(
        &self,
        contents: &[u8],
        remote_path: &str,
        sudo: bool,
    ) -> Result<(), FabError> {
        let command = if sudo {
            format!("sudo tee {} > /dev/null", quote_path(remote_path))
        } else {
            format!("cat > {}", quote_path(remote_path))
        };
        let output = self.session.exec(&command, Some(contents), true).await?;
        self.checked(command, output, false)?;
        Ok(())
    }

    /// Uploads a local file.
    pub async fn put(&self, local_path: impl AsRef<Path>, remote_path: &str) -> Result<(), FabError> {
        let contents = tokio::fs::read(local_path).await?;
        self.write_file(&contents, remote_path, false).await
    }

    fn checked(&self, command: String, output: RunOutput, warn: bool) -> Result<RunOutput, FabError> {
        if output.failed() && !warn {
            return Err(FabError::RemoteCommand {
                host: self.spec.to_string(),
                status: output.status(),
                exit_code: output.exit_code,
                command,
            });
        }
        Ok(output)
    }
}

fn sudo_wrap(command: &str) -> String {
    format!("sudo -H sh -c {}", quote(command))
}

/// Quotes a remote path while still letting `~/` and `$HOME/` expand.
pub(crate) fn quote_path(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        format!("~/{}", quote(rest))
    } else if let Some(rest) = path.strip_prefix("$HOME/") {
        format!("\"$HOME\"/{}", quote(rest))
    } else {
        quote(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sudo_wrap_quotes_command() {
        assert_eq!(
            sudo_wrap("mkswap /swap1G"),
            "sudo -H sh -c 'mkswap /swap1G'"
        );
    }

    #[test]
    fn test_quote_path_keeps_home_expansion() {
        assert_eq!(quote_path("/etc/fstab"), "/etc/fstab");
        assert_eq!(quote_path("~/.bash_profile"), "~/.bash_profile");
        assert_eq!(quote_path("$HOME/trojan/start.sh"), "\"$HOME\"/trojan/start.sh");
        assert_eq!(quote_path("/tmp/a b"), "'/tmp/a b'");
    }
}
