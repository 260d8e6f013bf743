//! Turning the task part of the command line into an [`Invocation`] and
//! running it.
//!
//! Everything is validated up front: an unknown task or a bad flag anywhere in
//! the list fails before the first remote command is issued.

use crate::connection::Connection;
use crate::error::FabError;
use crate::tasks::{Param, ParamKind, Task, TaskArgs, TaskContext, TaskRegistry};
use crate::template::Templates;

/// One task of an invocation, with its arguments (defaults filled in).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub task: String,
    pub args: TaskArgs,
}

/// The ordered list of tasks requested on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub steps: Vec<Step>,
}

impl Invocation {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.task.as_str()).collect()
    }
}

/// Parses `task [flags] task [flags] ...`.
///
/// Flags belong to the task before them and may be written `-g 2`, `-g2`,
/// `--gb 2` or `--gb=2`.
pub fn parse(args: &[String], registry: &TaskRegistry) -> Result<Invocation, FabError> {
    let mut steps = vec![];
    let mut current: Option<(&dyn Task, TaskArgs)> = None;
    let mut tokens = args.iter();

    while let Some(token) = tokens.next() {
        if token.len() > 1 && token.starts_with('-') {
            let (task, task_args) = match current.as_mut() {
                Some(current) => current,
                None => return Err(FabError::StrayFlag(token.clone())),
            };
            let (param, inline) = find_param(*task, token)?;
            let value = match inline {
                Some(value) => value.to_string(),
                None => match tokens.next() {
                    Some(value) => value.clone(),
                    None => {
                        return Err(task_args.invalid(format!("--{} needs a value", param.long())))
                    }
                },
            };
            check_value(param, &value).map_err(|reason| task_args.invalid(reason))?;
            task_args.set(param.name, value);
        } else {
            if let Some(done) = current.take() {
                steps.push(finish(done)?);
            }
            let task = registry.lookup(token)?;
            current = Some((task, TaskArgs::new(task.name())));
        }
    }
    if let Some(done) = current.take() {
        steps.push(finish(done)?);
    }

    Ok(Invocation { steps })
}

/// Finds the parameter a flag token refers to, with its inline value if any.
fn find_param<'t>(task: &dyn Task, token: &'t str) -> Result<(&'static Param, Option<&'t str>), FabError> {
    let unknown = || FabError::InvalidTaskArgs {
        task: task.name().to_string(),
        reason: format!("unknown flag '{}'", token),
    };

    if let Some(long) = token.strip_prefix("--") {
        let (name, inline) = match long.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (long, None),
        };
        let param = task
            .params()
            .iter()
            .find(|param| param.long() == name)
            .ok_or_else(unknown)?;
        Ok((param, inline))
    } else {
        let rest = &token[1..];
        let short = rest.chars().next().ok_or_else(unknown)?;
        let param = task
            .params()
            .iter()
            .find(|param| param.short == Some(short))
            .ok_or_else(unknown)?;
        let attached = &rest[short.len_utf8()..];
        let inline = match attached {
            "" => None,
            attached => Some(attached.strip_prefix('=').unwrap_or(attached)),
        };
        Ok((param, inline))
    }
}

/// Type check plus the parameter's own validator.
fn check_value(param: &Param, value: &str) -> Result<(), String> {
    if param.kind == ParamKind::Int && value.parse::<u64>().is_err() {
        return Err(format!(
            "expected an integer for --{}, got '{}'",
            param.long(),
            value
        ));
    }
    match param.validate {
        Some(validate) => validate(value),
        None => Ok(()),
    }
}

/// Fills in defaults and checks required flags.
fn finish((task, mut args): (&dyn Task, TaskArgs)) -> Result<Step, FabError> {
    for param in task.params() {
        if args.contains(param.name) {
            continue;
        }
        match param.default {
            Some(default) => {
                check_value(param, default).map_err(|reason| args.invalid(reason))?;
                args.set(param.name, default);
            }
            None => return Err(args.invalid(format!("missing required flag --{}", param.long()))),
        }
    }
    Ok(Step {
        task: task.name().to_string(),
        args,
    })
}

/// Runs every step in order against one connection, stopping at the first error.
pub async fn execute(
    registry: &TaskRegistry,
    invocation: &Invocation,
    conn: &Connection<'_>,
) -> Result<(), FabError> {
    let templates = Templates::new();
    let total = invocation.steps.len();
    for (index, step) in invocation.steps.iter().enumerate() {
        let task = registry.lookup(&step.task)?;
        eprintln!(
            "[debfab] ({}/{}) Running task '{}' on {}",
            index + 1,
            total,
            step.task,
            conn.spec()
        );
        let ctx = TaskContext::new(conn, &step.args, &templates);
        if let Err(e) = task.run(&ctx).await {
            eprintln!("[debfab] Task '{}' failed. Aborting.", step.task);
            return Err(e);
        }
    }
    eprintln!("[debfab] All {} task(s) done.", total);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parse_args(list: &[&str]) -> Result<Invocation, FabError> {
        let registry = TaskRegistry::builtin().unwrap();
        parse(&args(list), &registry)
    }

    #[test]
    fn test_tasks_keep_command_line_order() {
        let invocation = parse_args(&["swap", "debian", "bbr", "swap"]).unwrap();
        assert_eq!(invocation.task_names(), vec!["swap", "debian", "bbr", "swap"]);
    }

    #[test]
    fn test_defaults_are_filled_in() {
        let invocation = parse_args(&["swap", "python"]).unwrap();
        assert_eq!(invocation.steps[0].args.get("gb"), Some("1"));
        assert_eq!(invocation.steps[1].args.get("version"), Some("3"));
    }

    #[test]
    fn test_flag_spellings() {
        for spelling in [
            &["swap", "-g", "2"][..],
            &["swap", "-g2"][..],
            &["swap", "-g=2"][..],
            &["swap", "--gb", "2"][..],
            &["swap", "--gb=2"][..],
        ] {
            let invocation = parse_args(spelling).unwrap();
            assert_eq!(invocation.steps[0].args.get("gb"), Some("2"), "{:?}", spelling);
        }
    }

    #[test]
    fn test_flags_bind_to_preceding_task() {
        let invocation = parse_args(&["swap", "-g", "4", "python", "-v", "3.11"]).unwrap();
        assert_eq!(invocation.steps[0].args.get("gb"), Some("4"));
        assert_eq!(invocation.steps[1].args.get("version"), Some("3.11"));
        assert_eq!(invocation.steps[1].args.get("gb"), None);
    }

    #[test]
    fn test_unknown_task_fails_even_after_valid_ones() {
        match parse_args(&["swap", "-g", "2", "nginx", "debian"]) {
            Err(FabError::UnknownTask(name)) => assert_eq!(name, "nginx"),
            other => panic!("expected UnknownTask, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_flags() {
        assert!(matches!(
            parse_args(&["-g", "2", "swap"]),
            Err(FabError::StrayFlag(flag)) if flag == "-g"
        ));
        assert!(matches!(
            parse_args(&["swap", "--size", "2"]),
            Err(FabError::InvalidTaskArgs { .. })
        ));
        assert!(matches!(
            parse_args(&["swap", "-g"]),
            Err(FabError::InvalidTaskArgs { .. })
        ));
        assert!(matches!(
            parse_args(&["swap", "-g", "two"]),
            Err(FabError::InvalidTaskArgs { .. })
        ));
        assert!(matches!(
            parse_args(&["debian", "-g", "2"]),
            Err(FabError::InvalidTaskArgs { .. })
        ));
    }

    #[test]
    fn test_required_flag() {
        match parse_args(&["trojan"]) {
            Err(FabError::InvalidTaskArgs { task, reason }) => {
                assert_eq!(task, "trojan");
                assert!(reason.contains("--domain"));
            }
            other => panic!("expected InvalidTaskArgs, got {:?}", other),
        }
        let invocation = parse_args(&["trojan", "-d", "proxy.example.com"]).unwrap();
        assert_eq!(invocation.steps[0].args.get("domain"), Some("proxy.example.com"));
        assert_eq!(invocation.steps[0].args.get("password"), Some(""));
    }

    #[test]
    fn test_zero_swap_size_fails_before_running() {
        for list in [&["swap", "-g", "0"][..], &["dotfiles", "swap", "--gb=0"][..]] {
            match parse_args(list) {
                Err(FabError::InvalidTaskArgs { task, reason }) => {
                    assert_eq!(task, "swap");
                    assert!(reason.contains("at least 1 GB"), "{}", reason);
                }
                other => panic!("expected InvalidTaskArgs for {:?}, got {:?}", list, other),
            }
        }
        assert!(parse_args(&["swap", "-g", "1"]).is_ok());
    }

    #[test]
    fn test_bad_domain_fails_before_running() {
        for domain in ["bad domain;rm", "", "-rf", "$(reboot)"] {
            match parse_args(&["docker", "trojan", "-d", domain]) {
                Err(FabError::InvalidTaskArgs { task, reason }) => {
                    assert_eq!(task, "trojan");
                    assert!(reason.contains("not a domain name"), "{}", reason);
                }
                other => panic!("expected InvalidTaskArgs for {:?}, got {:?}", domain, other),
            }
        }
        assert!(parse_args(&["trojan", "--domain=proxy-1.example.com"]).is_ok());
    }

    #[test]
    fn test_empty_invocation() {
        assert!(parse_args(&[]).unwrap().is_empty());
    }
}
