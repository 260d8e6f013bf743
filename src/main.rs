use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;
use colored::*;

use debfab::{
    execute, load_hosts_file, parse, resolve, Config, Connection, FabError, SshSession,
    TaskRegistry,
};

async fn run(cli: Config) -> Result<(), FabError> {
    let registry = TaskRegistry::builtin()?;

    if cli.list {
        print!("{}", registry.listing());
        return Ok(());
    }

    // Validate the whole invocation before connecting anywhere.
    let invocation = parse(&cli.tasks, &registry)?;
    if invocation.is_empty() {
        return Err(FabError::NoTasks);
    }

    let aliases = match &cli.hosts_file {
        Some(hosts_file) => load_hosts_file(hosts_file)?,
        None => HashMap::new(),
    };
    let spec = resolve(cli.host.as_deref().unwrap_or_default(), &aliases)?;

    let session = SshSession::connect(&spec).await?;
    let result = {
        let conn = Connection::new(spec, &session);
        execute(&registry, &invocation, &conn).await
    };
    session.close().await;
    result
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Config::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "[debfab]".red().bold(), e);
            ExitCode::from(e.exit_code())
        }
    }
}
