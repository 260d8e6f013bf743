//! Configuration for debfab.
//!
//! Holds the clap struct for command line arguments and flags. Everything
//! after the first task name is left to the dispatcher, since task flags
//! depend on the task.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Config {
    /// List available tasks
    #[arg(long, short)]
    pub list: bool,

    /// Host to provision, as [user@]host[:port] or an alias from the hosts file
    #[arg(long = "host", short = 'H', required_unless_present = "list")]
    pub host: Option<String>,

    /// YAML file mapping host aliases to connection parameters
    #[arg(long)]
    pub hosts_file: Option<String>,

    /// Tasks to run in order, each followed by its own flags (e.g. `swap -g 2 docker`)
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tasks: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn test_task_flags_are_passed_through() {
        let config =
            Config::try_parse_from(["debfab", "-H", "root@web", "swap", "-g", "2", "debian"])
                .unwrap();
        assert_eq!(config.host.as_deref(), Some("root@web"));
        assert_eq!(config.tasks, vec!["swap", "-g", "2", "debian"]);
        assert!(!config.list);
    }

    #[test]
    fn test_list_needs_no_host() {
        let config = Config::try_parse_from(["debfab", "-l"]).unwrap();
        assert!(config.list);
        assert!(config.host.is_none());
        assert!(config.tasks.is_empty());
    }

    #[test]
    fn test_host_is_required_to_run_tasks() {
        assert!(Config::try_parse_from(["debfab", "swap"]).is_err());
    }
}
