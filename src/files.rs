//! Idempotent helpers for remote files.

use crate::connection::{quote_path, Connection};
use crate::error::FabError;
use crate::shell::quote;

/// Whether `path` exists. `~` and variables in the path are expanded remotely.
pub async fn exists(conn: &Connection<'_>, path: &str) -> Result<bool, FabError> {
    conn.check(&format!("test -e \"$(echo {})\"", path)).await
}

/// Whether `path` contains `line` as a whole line.
pub async fn contains(conn: &Connection<'_>, path: &str, line: &str) -> Result<bool, FabError> {
    conn.check(&format!("grep -qxF -- {} {}", quote(line), quote_path(path)))
        .await
}

/// Appends `line` to `path` as root.
pub async fn append(conn: &Connection<'_>, path: &str, line: &str) -> Result<(), FabError> {
    conn.run(&format!(
        "echo {} | sudo tee -a {} > /dev/null",
        quote(line),
        quote_path(path)
    ))
    .await?;
    Ok(())
}

/// Appends `line` to `path` unless it is already there.
pub async fn ensure_line(conn: &Connection<'_>, path: &str, line: &str) -> Result<(), FabError> {
    if !contains(conn, path, line).await? {
        append(conn, path, line).await?;
    }
    Ok(())
}
