//! Post-parse validation and declaration checks.
//!
//! [`validate_command`] runs three sweeps, in order, after a successful
//! parse: mutually exclusive groups, required groups, and an enum re-check
//! that catches defaults and values that never went through `set_str`.
//!
//! [`validate_tree`] checks declarations instead of user input: every group
//! member must name a registered flag, and every node must be reachable
//! without a cycle.
//!
//! # Examples
//!
//! ```
//! use flagtree_core::*;
//!
//! let cmd = Command::new("test", "", "");
//! let run = cmd.add_flag(BoolFlag::new("run", "r", false, "").unwrap()).unwrap();
//! let parallel = cmd.add_flag(BoolFlag::new("parallel", "p", false, "").unwrap()).unwrap();
//! cmd.add_mutex_group("mode", &["run", "parallel", "r", "p"], true);
//!
//! run.set(true).unwrap();
//! assert!(validate_command(&cmd).is_ok());
//!
//! parallel.set(true).unwrap();
//! let err = validate_command(&cmd).unwrap_err();
//! assert_eq!(err.code(), ErrorCode::MutexGroupViolation);
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::command::{Command, MAX_TREE_DEPTH, MutexGroup, RequiredGroup};
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::registry::EntryId;

/// Runs every post-parse sweep on one command, stopping at the first
/// violation.
pub fn validate_command(command: &Command) -> Result<()> {
    validate_mutex_groups(command)?;
    validate_required_groups(command)?;
    revalidate_enums(command)?;
    debug!(command = %command.path(), "validation passed");
    Ok(())
}

/// Resolves group members to distinct flags, keeping first-listed order.
fn resolve(
    command: &Command,
    group: &str,
    names: &[String],
) -> Result<Vec<(EntryId, Arc<dyn Flag>)>> {
    let registry = command.flags().registry();
    let mut seen: HashSet<EntryId> = HashSet::new();
    let mut flags = Vec::new();
    for name in names {
        let invalid = || Error::InvalidGroupMember {
            group: group.to_string(),
            name: name.clone(),
        };
        let id = registry.id_of(name).ok_or_else(invalid)?;
        if seen.insert(id) {
            let flag = registry.get_by_id(id).ok_or_else(invalid)?;
            flags.push((id, flag));
        }
    }
    Ok(flags)
}

/// Checks that at most one flag of each mutex group is set, and at least one
/// unless the group allows none.
pub fn validate_mutex_groups(command: &Command) -> Result<()> {
    for MutexGroup {
        name,
        flags,
        allow_none,
    } in command.config().mutex_groups
    {
        let members = resolve(command, &name, &flags)?;
        let set: Vec<String> = members
            .iter()
            .filter(|(_, flag)| flag.is_set())
            .map(|(_, flag)| flag.name().to_string())
            .collect();

        if set.len() > 1 {
            return Err(Error::MutexConflict { group: name, set });
        }
        if set.is_empty() && !allow_none {
            return Err(Error::MutexNoneSet {
                group: name,
                members: members
                    .iter()
                    .map(|(_, flag)| flag.name().to_string())
                    .collect(),
            });
        }
    }
    Ok(())
}

/// Checks that every flag of each required group is set.
pub fn validate_required_groups(command: &Command) -> Result<()> {
    for RequiredGroup { name, flags } in command.config().required_groups {
        let missing: Vec<String> = resolve(command, &name, &flags)?
            .iter()
            .filter(|(_, flag)| !flag.is_set())
            .map(|(_, flag)| flag.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(Error::RequiredGroup {
                group: name,
                missing,
            });
        }
    }
    Ok(())
}

/// Re-checks every flag kind that asks for it (enums) against its current
/// value.
pub fn revalidate_enums(command: &Command) -> Result<()> {
    for flag in command.flags().list() {
        flag.revalidate()?;
    }
    Ok(())
}

/// Checks group declarations across a whole tree.
///
/// Returns every problem found; an empty list means the tree is sound.
pub fn validate_tree(root: &Arc<Command>) -> Vec<Error> {
    let mut errors = Vec::new();
    let mut visited: Vec<*const Command> = Vec::new();
    walk(root, 0, &mut visited, &mut errors);
    errors
}

fn walk(
    command: &Arc<Command>,
    depth: usize,
    visited: &mut Vec<*const Command>,
    errors: &mut Vec<Error>,
) {
    let ptr = Arc::as_ptr(command);
    if depth > MAX_TREE_DEPTH || visited.contains(&ptr) {
        errors.push(Error::CyclicReference {
            parent: command
                .parent()
                .map(|p| p.name().to_string())
                .unwrap_or_default(),
            child: command.name().to_string(),
        });
        return;
    }
    visited.push(ptr);

    let config = command.config();
    for group in &config.mutex_groups {
        if let Err(err) = resolve(command, &group.name, &group.flags) {
            errors.push(err);
        }
    }
    for group in &config.required_groups {
        if let Err(err) = resolve(command, &group.name, &group.flags) {
            errors.push(err);
        }
    }

    for child in command.subcommands() {
        walk(&child, depth + 1, visited, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::flag::{BoolFlag, EnumFlag, FlagCore, StringFlag};

    fn mode_command() -> (Arc<Command>, Arc<BoolFlag>, Arc<BoolFlag>) {
        let cmd = Command::new("test", "", "");
        let run = cmd.add_flag(BoolFlag::new("run", "r", false, "").unwrap()).unwrap();
        let parallel = cmd
            .add_flag(BoolFlag::new("parallel", "p", false, "").unwrap())
            .unwrap();
        cmd.add_mutex_group("mode", &["run", "parallel", "r", "p"], true);
        (cmd, run, parallel)
    }

    #[test]
    fn test_mutex_single_flag_is_clean() {
        let (cmd, run, _) = mode_command();
        run.set_str("true").unwrap();
        assert!(validate_mutex_groups(&cmd).is_ok());
    }

    #[test]
    fn test_mutex_conflict_names_each_flag_once() {
        let (cmd, run, parallel) = mode_command();
        run.set(true).unwrap();
        parallel.set(true).unwrap();

        match validate_mutex_groups(&cmd).unwrap_err() {
            Error::MutexConflict { group, set } => {
                assert_eq!(group, "mode");
                assert_eq!(set, vec!["run", "parallel"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_mutex_none_set() {
        let (cmd, _, _) = mode_command();
        assert!(validate_mutex_groups(&cmd).is_ok());

        let strict = Command::new("strict", "", "");
        strict.add_flag(BoolFlag::new("json", "", false, "").unwrap()).unwrap();
        strict.add_flag(BoolFlag::new("yaml", "", false, "").unwrap()).unwrap();
        strict.add_mutex_group("format", &["json", "yaml"], false);

        let err = validate_mutex_groups(&strict).unwrap_err();
        assert!(matches!(err, Error::MutexNoneSet { .. }));
        assert_eq!(err.code(), ErrorCode::MutexGroupViolation);
    }

    #[test]
    fn test_required_group_reports_missing() {
        let cmd = Command::new("copy", "", "");
        let input = cmd
            .add_flag(StringFlag::new("input", "i", String::new(), "").unwrap())
            .unwrap();
        let output = cmd
            .add_flag(StringFlag::new("output", "o", String::new(), "").unwrap())
            .unwrap();
        cmd.add_required_group("io", &["input", "output"]);

        input.set("a.txt".into()).unwrap();
        match validate_required_groups(&cmd).unwrap_err() {
            Error::RequiredGroup { group, missing } => {
                assert_eq!(group, "io");
                assert_eq!(missing, vec!["output"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        output.set("b.txt".into()).unwrap();
        assert!(validate_command(&cmd).is_ok());
    }

    #[test]
    fn test_invalid_group_member_is_explicit() {
        let cmd = Command::new("app", "", "");
        cmd.add_flag(BoolFlag::new("run", "", false, "").unwrap()).unwrap();
        cmd.add_mutex_group("mode", &["run", "walk"], true);

        let err = validate_command(&cmd).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidGroupMember);
        assert!(err.to_string().contains("walk"));

        let cmd = Command::new("app", "", "");
        cmd.add_required_group("io", &["input"]);
        let err = validate_required_groups(&cmd).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidGroupMember);
    }

    #[test]
    fn test_enum_recheck_catches_default() {
        let cmd = Command::new("app", "", "");
        let format = cmd
            .add_flag(EnumFlag::new("format", "", "xml", ["json", "text"], "").unwrap())
            .unwrap();

        let err = validate_command(&cmd).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationFailed);

        format.set_str("json").unwrap();
        assert!(validate_command(&cmd).is_ok());
    }

    #[test]
    fn test_validate_tree_collects_every_bad_member() {
        let root = Command::new("app", "", "");
        root.add_required_group("a", &["missing-one"]);
        let sub = Command::new("sub", "", "");
        sub.add_mutex_group("b", &["missing-two"], true);
        root.add_subcommand(&sub).unwrap();

        let errors = validate_tree(&root);
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| e.code() == ErrorCode::InvalidGroupMember));
    }
}
