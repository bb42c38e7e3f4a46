//! Point-in-time views of a command tree for help, completion and dumps.
//!
//! A [`CommandSnapshot`] copies everything a presentation layer needs out of
//! the live tree, so renderers never hold locks on it and can be written as
//! plain functions over data.

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::command::{Command, MAX_TREE_DEPTH, MutexGroup, RequiredGroup};
use crate::error::Result;
use crate::flag::{Flag, FlagKind};

/// One flag as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlagSnapshot {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub long: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short: String,
    pub usage: String,
    pub kind: FlagKind,
    /// Default rendered the way a user would type it.
    pub default: String,
    pub value: Value,
    pub is_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
    pub builtin: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<String>,
}

impl FlagSnapshot {
    fn capture(flag: &dyn Flag, builtin: bool) -> Self {
        Self {
            long: flag.long_name().to_string(),
            short: flag.short_name().to_string(),
            usage: flag.usage().to_string(),
            kind: flag.kind(),
            default: flag.default_string(),
            value: flag.value_json(),
            is_set: flag.is_set(),
            env: flag.env_var(),
            builtin,
            choices: flag.choices(),
        }
    }

    /// `-s, --long` style label.
    pub fn label(&self) -> String {
        match (self.short.is_empty(), self.long.is_empty()) {
            (false, false) => format!("-{}, --{}", self.short, self.long),
            (false, true) => format!("-{}", self.short),
            _ => format!("    --{}", self.long),
        }
    }
}

/// One command and its descendants as seen at snapshot time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSnapshot {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub short: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub flags: Vec<FlagSnapshot>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mutex_groups: Vec<MutexGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_groups: Vec<RequiredGroup>,
    pub parsed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subcommands: Vec<CommandSnapshot>,
}

impl CommandSnapshot {
    /// Finds a descendant by a path of long or short names.
    pub fn find(&self, names: &[&str]) -> Option<&CommandSnapshot> {
        let mut current = self;
        for name in names {
            current = current
                .subcommands
                .iter()
                .find(|child| child.name == *name || (!child.short.is_empty() && child.short == *name))?;
        }
        Some(current)
    }

    pub fn flag(&self, name: &str) -> Option<&FlagSnapshot> {
        self.flags
            .iter()
            .find(|flag| flag.long == name || (!flag.short.is_empty() && flag.short == name))
    }
}

impl Command {
    /// Captures this command and its descendants.
    pub fn snapshot(&self) -> CommandSnapshot {
        self.snapshot_at(0)
    }

    fn snapshot_at(&self, depth: usize) -> CommandSnapshot {
        let config = self.config();
        let flags = self
            .flags()
            .list()
            .iter()
            .map(|flag| FlagSnapshot::capture(flag.as_ref(), self.is_builtin(flag.name())))
            .collect();
        let subcommands = if depth < MAX_TREE_DEPTH {
            self.subcommands()
                .iter()
                .map(|child| child.snapshot_at(depth + 1))
                .collect()
        } else {
            Vec::new()
        };

        CommandSnapshot {
            name: self.name().to_string(),
            short: if self.long_name().is_empty() {
                String::new()
            } else {
                self.short_name().to_string()
            },
            path: self.path(),
            description: self.description().to_string(),
            version: config.version,
            flags,
            mutex_groups: config.mutex_groups,
            required_groups: config.required_groups,
            parsed: self.is_parsed(),
            args: self.args(),
            subcommands,
        }
    }

    /// Renders help for this command with `renderer`.
    pub fn render_help(&self, renderer: &dyn HelpRenderer) -> String {
        renderer.render(&self.snapshot())
    }
}

/// Turns a snapshot into help text.
///
/// Implemented for any `Fn(&CommandSnapshot) -> String`.
pub trait HelpRenderer {
    fn render(&self, command: &CommandSnapshot) -> String;
}

impl<F> HelpRenderer for F
where
    F: Fn(&CommandSnapshot) -> String,
{
    fn render(&self, command: &CommandSnapshot) -> String {
        self(command)
    }
}

/// Produces a shell completion script for a whole tree.
pub trait CompletionGenerator {
    /// # Errors
    ///
    /// Implementations return [`Error::NotFound`](crate::Error::NotFound)
    /// for a shell they do not support.
    fn generate(&self, tree: &CommandSnapshot, shell: &str) -> Result<String>;
}

/// Plain-text help in the usual `Usage / Commands / Flags` layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHelp;

impl HelpRenderer for PlainHelp {
    fn render(&self, command: &CommandSnapshot) -> String {
        let mut out = String::new();
        let commands = if command.subcommands.is_empty() {
            ""
        } else {
            " <command>"
        };
        let _ = writeln!(out, "Usage: {} [flags]{commands} [args]", command.path);
        if !command.description.is_empty() {
            let _ = writeln!(out, "\n{}", command.description);
        }

        if !command.subcommands.is_empty() {
            out.push_str("\nCommands:\n");
            let rows: Vec<(String, &str)> = command
                .subcommands
                .iter()
                .map(|child| {
                    let label = if child.short.is_empty() {
                        child.name.clone()
                    } else {
                        format!("{}, {}", child.name, child.short)
                    };
                    (label, child.description.as_str())
                })
                .collect();
            write_rows(&mut out, &rows);
        }

        if !command.flags.is_empty() {
            out.push_str("\nFlags:\n");
            let rows: Vec<(String, String)> = command
                .flags
                .iter()
                .map(|flag| {
                    let label = match flag.kind {
                        FlagKind::Bool => flag.label(),
                        kind => format!("{} {}", flag.label(), kind.label()),
                    };
                    (label, describe(flag))
                })
                .collect();
            let rows: Vec<(String, &str)> = rows
                .iter()
                .map(|(label, text)| (label.clone(), text.as_str()))
                .collect();
            write_rows(&mut out, &rows);
        }
        out
    }
}

fn describe(flag: &FlagSnapshot) -> String {
    let mut text = flag.usage.clone();
    if !flag.choices.is_empty() {
        let _ = write!(text, " [{}]", flag.choices.join("|"));
    }
    let zero = matches!(flag.default.as_str(), "" | "false" | "0" | "[]" | "{}" | "0s");
    if !zero {
        let _ = write!(text, " (default {})", flag.default);
    }
    if let Some(env) = &flag.env {
        let _ = write!(text, " [env {env}]");
    }
    text.trim().to_string()
}

fn write_rows(out: &mut String, rows: &[(String, &str)]) {
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
    for (label, text) in rows {
        let line = format!("  {label:<width$}  {text}");
        out.push_str(line.trim_end());
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::flag::{BoolFlag, EnumFlag, IntFlag};

    fn tree() -> std::sync::Arc<Command> {
        let root = Command::new("app", "", "demo application");
        root.set_version("0.3.0");
        root.add_flag(IntFlag::new("port", "p", 8080, "listen port").unwrap().with_env("PORT"))
            .unwrap();
        let serve = Command::new("serve", "s", "run the server");
        serve
            .add_flag(EnumFlag::new("log", "", "info", ["debug", "info"], "log level").unwrap())
            .unwrap();
        root.add_subcommand(&serve).unwrap();
        root.add_builtin_flags().unwrap();
        root
    }

    #[test]
    fn test_snapshot_captures_tree() {
        let root = tree();
        let snap = root.snapshot();

        assert_eq!(snap.name, "app");
        assert_eq!(snap.version.as_deref(), Some("0.3.0"));
        let port = snap.flag("p").unwrap();
        assert_eq!(port.default, "8080");
        assert_eq!(port.env.as_deref(), Some("PORT"));
        assert!(!port.builtin);
        assert!(snap.flag("help").unwrap().builtin);

        let serve = snap.find(&["s"]).unwrap();
        assert_eq!(serve.path, "app serve");
        assert_eq!(serve.flag("log").unwrap().choices, vec!["debug", "info"]);
        assert!(serve.flag("help").unwrap().builtin);
    }

    #[test]
    fn test_user_flag_named_like_builtin_is_not_marked() {
        let root = Command::new("app", "", "");
        root.set_version("1.0");
        let sub = Command::new("sub", "", "");
        sub.add_flag(BoolFlag::new("version", "", false, "").unwrap())
            .unwrap();
        root.add_subcommand(&sub).unwrap();
        root.add_builtin_flags().unwrap();

        let snap = root.snapshot();
        assert!(snap.flag("version").unwrap().builtin);
        let sub = snap.find(&["sub"]).unwrap();
        assert!(!sub.flag("version").unwrap().builtin);
        assert!(sub.flag("help").unwrap().builtin);
    }

    #[test]
    fn test_snapshot_reflects_values() {
        let root = tree();
        root.flag("port").unwrap().set_str("9000").unwrap();
        let snap = root.snapshot();
        let port = snap.flag("port").unwrap();
        assert!(port.is_set);
        assert_eq!(port.value, serde_json::json!(9000));

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["subcommands"][0]["name"], "serve");
        assert_eq!(json["flags"][0]["kind"], "int");
    }

    #[test]
    fn test_plain_help() {
        let root = tree();
        let help = root.render_help(&PlainHelp);
        assert!(help.starts_with("Usage: app [flags] <command> [args]"));
        assert!(help.contains("serve, s"));
        assert!(help.contains("-p, --port int"));
        assert!(help.contains("(default 8080) [env PORT]"));
        assert!(help.lines().all(|line| line == line.trim_end()));
    }

    #[test]
    fn test_closure_renderer() {
        let root = Command::new("tool", "", "");
        root.add_flag(BoolFlag::new("quiet", "q", false, "").unwrap()).unwrap();
        let renderer = |snap: &CommandSnapshot| format!("{} has {} flags", snap.name, snap.flags.len());
        assert_eq!(root.render_help(&renderer), "tool has 1 flags");
    }

    struct Words;

    impl CompletionGenerator for Words {
        fn generate(&self, tree: &CommandSnapshot, shell: &str) -> Result<String> {
            if shell != "bash" {
                return Err(Error::NotFound(format!("shell {shell}")));
            }
            let mut words: Vec<String> = tree.subcommands.iter().map(|c| c.name.clone()).collect();
            words.extend(tree.flags.iter().map(|f| format!("--{}", f.long)));
            Ok(format!("complete -W \"{}\" {}", words.join(" "), tree.name))
        }
    }

    #[test]
    fn test_completion_generator_contract() {
        let snap = tree().snapshot();
        let script = Words.generate(&snap, "bash").unwrap();
        assert!(script.contains("serve"));
        assert!(script.contains("--port"));
        assert!(Words.generate(&snap, "fish").is_err());
    }
}
