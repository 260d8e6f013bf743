use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabError {
    #[error("Unknown task '{0}'. Use -l to list available tasks.")]
    UnknownTask(String),
    #[error("Task '{0}' is registered more than once.")]
    DuplicateTask(String),
    #[error("Invalid arguments for task '{task}': {reason}")]
    InvalidTaskArgs { task: String, reason: String },
    #[error("Flag '{0}' must follow the task it belongs to.")]
    StrayFlag(String),
    #[error("No tasks given. Use -l to list available tasks.")]
    NoTasks,
    #[error("Invalid host specification '{spec}': {reason}")]
    InvalidHostSpec { spec: String, reason: String },
    #[error("Failed to load hosts file {path}: {reason}")]
    HostsFile { path: String, reason: String },
    #[error("Remote command '{command}' failed on {host} ({status})")]
    RemoteCommand {
        host: String,
        command: String,
        status: String,
        exit_code: Option<i32>,
    },
    #[error("Invalid version string '{0}'")]
    InvalidVersion(String),
    #[error("No release found: {0}")]
    MissingRelease(String),
    #[error("Failed to connect SSH session or execute SSH command: {0}")]
    SshError(#[from] openssh::Error),
    #[error("Local I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to render command template: {0}")]
    TemplateError(#[from] handlebars::RenderError),
    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FabError {
    /// Process exit code for this error.
    ///
    /// A failed remote command passes its own exit code through.
    pub fn exit_code(&self) -> u8 {
        match self {
            FabError::RemoteCommand {
                exit_code: Some(code),
                ..
            } if (1..=255).contains(code) => *code as u8,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(exit_code: Option<i32>) -> FabError {
        FabError::RemoteCommand {
            host: "[web]".to_string(),
            command: "false".to_string(),
            status: "exit status: 3".to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_remote_exit_code_passes_through() {
        assert_eq!(remote(Some(3)).exit_code(), 3);
        assert_eq!(remote(Some(255)).exit_code(), 255);
    }

    #[test]
    fn test_exit_code_falls_back_to_one() {
        assert_eq!(remote(None).exit_code(), 1);
        assert_eq!(remote(Some(0)).exit_code(), 1);
        assert_eq!(remote(Some(300)).exit_code(), 1);
        assert_eq!(FabError::UnknownTask("x".into()).exit_code(), 1);
    }
}
