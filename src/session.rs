use std::io::Write;

use async_trait::async_trait;
use colored::ColoredString;
use futures::future::join3;
use openssh::{KnownHosts, Session as SSHSession, SessionBuilder, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};

use crate::error::FabError;
use crate::host::ConnectionSpec;

/// Result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    /// `None` when the remote process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    pub fn ok(&self) -> bool {
        self.exit_code == Some(0)
    }

    pub fn failed(&self) -> bool {
        !self.ok()
    }

    pub fn status(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Executes shell commands on one remote host.
#[async_trait]
pub trait Session: Send + Sync {
    /// Runs `command` through `sh -c`, feeding `stdin` when given.
    /// Output is streamed to the terminal unless `hide` is set, and always captured.
    async fn exec(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        hide: bool,
    ) -> Result<RunOutput, FabError>;
}

pub struct SshSession {
    colorhost: ColoredString,
    session: SSHSession,
}

impl SshSession {
    pub async fn connect(spec: &ConnectionSpec) -> Result<Self, FabError> {
        let colorhost = spec.prettify();
        let mut builder = SessionBuilder::default();
        builder.known_hosts_check(KnownHosts::Add);
        if let Some(user) = &spec.user {
            builder.user(user.clone());
        }
        if let Some(port) = spec.port {
            builder.port(port);
        }
        let session = match builder.connect_mux(&spec.host).await {
            Ok(session) => session,
            Err(e) => {
                eprintln!("{} Failed to connect to host: {}", colorhost, e);
                return Err(e.into());
            }
        };
        eprintln!("{} Connected to host.", colorhost);
        Ok(Self { colorhost, session })
    }

    pub async fn close(self) {
        eprintln!("{} Terminating connection.", self.colorhost);
        if let Err(e) = self.session.close().await {
            eprintln!("{} Error while terminating: {}", self.colorhost, e);
        }
    }

    /// Reads a stream to the end, printing each line with the host prefix
    /// unless hidden, and returns everything read.
    async fn collect<B: AsyncRead + Unpin>(
        &self,
        stream: Option<B>,
        hide: bool,
    ) -> std::io::Result<String> {
        let stream = match stream {
            Some(stream) => stream,
            None => return Ok(String::new()),
        };
        let mut reader = BufReader::new(stream);
        let mut captured = Vec::new();
        let mut line = Vec::with_capacity(reader.buffer().len());
        loop {
            line.clear();
            read_until2(&mut reader, b'\r', b'\n', &mut line).await?;
            // An empty buffer means that EOF was reached.
            if line.is_empty() {
                break;
            }
            captured.extend_from_slice(&line);
            if !hide {
                // Without the lock, lines from stdout and stderr get mixed.
                let stdout = std::io::stdout();
                let mut guard = stdout.lock();
                let text = String::from_utf8_lossy(&line);
                writeln!(
                    guard,
                    "{} {}",
                    self.colorhost,
                    text.trim_end_matches(['\r', '\n'])
                )?;
            }
        }
        Ok(String::from_utf8_lossy(&captured).into_owned())
    }
}

#[async_trait]
impl Session for SshSession {
    async fn exec(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        hide: bool,
    ) -> Result<RunOutput, FabError> {
        if !hide {
            println!("{} === run '{}' ===", self.colorhost, command);
        }
        let mut cmd = self.session.command("sh");
        cmd.arg("-c").arg(command);
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let mut process = cmd.spawn().await?;

        let pipe_in = process.stdin().take();
        let pipe_out = process.stdout().take();
        let pipe_err = process.stderr().take();
        let feed = async move {
            if let (Some(mut pipe), Some(bytes)) = (pipe_in, stdin) {
                pipe.write_all(bytes).await?;
                pipe.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, stdout, stderr) = join3(
            feed,
            self.collect(pipe_out, hide),
            self.collect(pipe_err, hide),
        )
        .await;
        fed?;
        let (stdout, stderr) = (stdout?, stderr?);

        let status = process.wait().await?;
        if !hide {
            println!("{} === done ({}) ===", self.colorhost, status);
        }
        Ok(RunOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Reads into `buf` until either delimiter (inclusive) or EOF.
async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_until2_splits_on_either_delimiter() {
        let mut reader = BufReader::new(&b"one\rtwo\nthree"[..]);
        let mut buf = Vec::new();

        read_until2(&mut reader, b'\r', b'\n', &mut buf).await.unwrap();
        assert_eq!(buf, b"one\r");
        buf.clear();
        read_until2(&mut reader, b'\r', b'\n', &mut buf).await.unwrap();
        assert_eq!(buf, b"two\n");
        buf.clear();
        read_until2(&mut reader, b'\r', b'\n', &mut buf).await.unwrap();
        assert_eq!(buf, b"three");
        buf.clear();
        read_until2(&mut reader, b'\r', b'\n', &mut buf).await.unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_run_output_status() {
        let ok = RunOutput {
            exit_code: Some(0),
            ..Default::default()
        };
        assert!(ok.ok());
        let killed = RunOutput::default();
        assert!(killed.failed());
        assert_eq!(killed.status(), "terminated by signal");
    }
}
