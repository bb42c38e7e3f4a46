//! Name rules for flags and commands.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

static LONG_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("static regex must compile")
});

static COMMAND_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_:.-]*$").expect("static regex must compile")
});

/// Checks a flag's long and short names.
///
/// Long names are written without dashes (`verbose`, not `--verbose`);
/// short names are a single alphanumeric character so they can be chained.
pub fn validate_flag_names(long: &str, short: &str) -> Result<()> {
    if long.is_empty() && short.is_empty() {
        return Err(Error::InvalidName(
            "flag needs a long or a short name".to_string(),
        ));
    }
    if !long.is_empty() && !LONG_NAME.is_match(long) {
        return Err(Error::InvalidName(format!("illegal flag name: {long:?}")));
    }
    if !short.is_empty() {
        let mut chars = short.chars();
        let valid = matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphanumeric());
        if !valid {
            return Err(Error::InvalidName(format!(
                "short flag name must be one alphanumeric character: {short:?}"
            )));
        }
    }
    Ok(())
}

/// Checks a command's long and short names.
pub fn validate_command_names(long: &str, short: &str) -> Result<()> {
    if long.is_empty() && short.is_empty() {
        return Err(Error::InvalidName(
            "command needs a long or a short name".to_string(),
        ));
    }
    for name in [long, short] {
        if !name.is_empty() && !COMMAND_NAME.is_match(name) {
            return Err(Error::InvalidName(format!("illegal command name: {name:?}")));
        }
    }
    Ok(())
}
