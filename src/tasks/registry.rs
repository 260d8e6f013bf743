use std::collections::BTreeMap;
use std::fmt::Write;

use crate::error::FabError;
use crate::tasks::{Bbr, Debian, Docker, Dotfiles, Nodejs, ParamKind, Python, Swap, Task, Trojan};

/// Tasks by name, iterated in name order.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, Box<dyn Task>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in provisioning task.
    pub fn builtin() -> Result<Self, FabError> {
        let mut registry = Self::new();
        let tasks: Vec<Box<dyn Task>> = vec![
            Box::new(Debian),
            Box::new(Dotfiles),
            Box::new(Bbr),
            Box::new(Swap),
            Box::new(Nodejs),
            Box::new(Docker),
            Box::new(Python),
            Box::new(Trojan),
        ];
        for task in tasks {
            registry.register(task)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, task: Box<dyn Task>) -> Result<(), FabError> {
        let name = task.name();
        if self.tasks.contains_key(name) {
            return Err(FabError::DuplicateTask(name.to_string()));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn Task, FabError> {
        self.tasks
            .get(name)
            .map(|task| task.as_ref())
            .ok_or_else(|| FabError::UnknownTask(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.tasks.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Text printed by `-l`.
    pub fn listing(&self) -> String {
        let width = self.names().map(str::len).max().unwrap_or(0);
        let mut out = String::from("Available tasks:\n\n");
        for (name, task) in &self.tasks {
            let _ = writeln!(out, "  {:width$}  {}", name, task.about(), width = width);
            for param in task.params() {
                let short = match param.short {
                    Some(c) => format!("-{}, ", c),
                    None => String::new(),
                };
                let kind = match param.kind {
                    ParamKind::Int => "INT",
                    ParamKind::Str => "STRING",
                };
                let default = match param.default {
                    Some("") => String::new(),
                    Some(default) => format!(" [default: {}]", default),
                    None => " [required]".to_string(),
                };
                let _ = writeln!(
                    out,
                    "  {:width$}    {}--{} <{}>  {}{}",
                    "",
                    short,
                    param.long(),
                    kind,
                    param.help,
                    default,
                    width = width
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskContext;
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Task for Noop {
        fn name(&self) -> &'static str {
            self.0
        }

        fn about(&self) -> &'static str {
            "Does nothing"
        }

        async fn run(&self, _ctx: &TaskContext<'_>) -> Result<(), FabError> {
            Ok(())
        }
    }

    #[test]
    fn test_builtin_tasks_are_all_found() {
        let registry = TaskRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 8);
        for name in [
            "debian", "dotfiles", "bbr", "swap", "nodejs", "docker", "python", "trojan",
        ] {
            assert_eq!(registry.lookup(name).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_task() {
        let registry = TaskRegistry::builtin().unwrap();
        match registry.lookup("nginx") {
            Err(FabError::UnknownTask(name)) => assert_eq!(name, "nginx"),
            other => panic!("expected UnknownTask, got {:?}", other.map(|t| t.name())),
        }
        assert!(TaskRegistry::new().lookup("debian").is_err());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = TaskRegistry::new();
        registry.register(Box::new(Noop("noop"))).unwrap();
        assert!(matches!(
            registry.register(Box::new(Noop("noop"))),
            Err(FabError::DuplicateTask(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_listing_shows_tasks_and_flags() {
        let listing = TaskRegistry::builtin().unwrap().listing();
        assert!(listing.starts_with("Available tasks:"));
        assert!(listing.contains("swap"));
        assert!(listing.contains("-g, --gb <INT>"));
        assert!(listing.contains("[default: 1]"));
        assert!(listing.contains("-d, --domain <STRING>"));
        assert!(listing.contains("[required]"));
        // Name order.
        assert!(listing.find("bbr").unwrap() < listing.find("debian").unwrap());
    }
}
