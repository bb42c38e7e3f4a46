//! Per-command flag registry and the token grammar that feeds it.
//!
//! Recognized shapes:
//!
//! - `--name value`, `--name=value`
//! - `-n value`, `-n=value`, `-nvalue`
//! - `--bool` / `-b` (implies `true`), `--bool=false`
//! - `-abc` chained booleans; the last letter may take a value
//! - `--` ends flag recognition; everything after it is positional
//!
//! Flag recognition stops at the first non-flag token (a lone `-` counts as
//! positional), leaving it and everything after for the caller. This is what
//! lets a parent command hand `sub --sub-flag` to its subcommand untouched.

use std::sync::Arc;

use tracing::trace;

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::names::validate_flag_names;
use crate::registry::{EntryId, Registry};

/// Flags registered on one command.
#[derive(Debug)]
pub struct FlagSet {
    name: String,
    flags: Registry<Arc<dyn Flag>>,
}

impl FlagSet {
    /// Creates an empty set; `name` labels parse errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Registry::new(),
        }
    }

    /// Registers `flag` and returns a typed handle to it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidName`] for an uninitialized flag,
    /// [`Error::AlreadyExists`] when a name is taken.
    pub fn add<F: Flag + 'static>(&self, flag: F) -> Result<Arc<F>> {
        let flag = Arc::new(flag);
        self.add_shared(flag.clone())?;
        Ok(flag)
    }

    /// Registers an already shared flag.
    pub fn add_shared(&self, flag: Arc<dyn Flag>) -> Result<EntryId> {
        validate_flag_names(flag.long_name(), flag.short_name())?;
        let long = flag.long_name().to_string();
        let short = flag.short_name().to_string();
        self.flags.register(flag, &long, &short)
    }

    /// Registers several flags at once; none are added if any is rejected.
    pub fn add_all(&self, flags: Vec<Arc<dyn Flag>>) -> Result<Vec<EntryId>> {
        let mut entries = Vec::with_capacity(flags.len());
        for flag in flags {
            validate_flag_names(flag.long_name(), flag.short_name())?;
            let long = flag.long_name().to_string();
            let short = flag.short_name().to_string();
            entries.push((flag, long, short));
        }
        self.flags.register_all(entries)
    }

    /// Removes a flag by either name.
    pub fn remove(&self, name: &str) -> Result<Arc<dyn Flag>> {
        self.flags.unregister(name)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Flag>> {
        self.flags.get(name)
    }

    /// Distinct flags in registration order.
    pub fn list(&self) -> Vec<Arc<dyn Flag>> {
        self.flags.list()
    }

    pub fn len(&self) -> usize {
        self.flags.count()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// The backing registry, for alias resolution by id.
    pub fn registry(&self) -> &Registry<Arc<dyn Flag>> {
        &self.flags
    }

    fn long(&self, name: &str) -> Result<Arc<dyn Flag>> {
        self.flags
            .get(name)
            .filter(|flag| flag.long_name() == name)
            .ok_or_else(|| Error::parse(&self.name, format!("unknown flag: --{name}")))
    }

    fn short(&self, name: char) -> Result<Arc<dyn Flag>> {
        let mut buf = [0u8; 4];
        let name: &str = name.encode_utf8(&mut buf);
        self.flags
            .get(name)
            .filter(|flag| flag.short_name() == name)
            .ok_or_else(|| Error::parse(&self.name, format!("unknown shorthand flag: -{name}")))
    }

    fn apply(&self, flag: &Arc<dyn Flag>, spelled: &str, value: &str) -> Result<()> {
        trace!(command = %self.name, flag = flag.name(), value, "setting flag from token");
        flag.set_str(value).map_err(|err| Error::Parse {
            command: self.name.clone(),
            reason: format!("invalid argument {value:?} for {spelled}"),
            source: Some(Box::new(err)),
        })
    }

    /// Applies flag tokens and returns the remaining positional tokens.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] on an unknown flag, a missing value, or a value the
    /// flag rejects. Flags applied before the failing token keep their new
    /// values.
    pub fn parse_tokens(&self, tokens: &[String]) -> Result<Vec<String>> {
        let mut index = 0;
        while index < tokens.len() {
            let token = tokens[index].as_str();

            if token == "--" {
                return Ok(tokens[index + 1..].to_vec());
            }
            if token == "-" || !token.starts_with('-') {
                return Ok(tokens[index..].to_vec());
            }

            if let Some(body) = token.strip_prefix("--") {
                let (name, inline) = match body.split_once('=') {
                    Some((name, value)) => (name, Some(value)),
                    None => (body, None),
                };
                if name.is_empty() {
                    return Err(Error::parse(&self.name, format!("bad flag syntax: {token}")));
                }
                let flag = self.long(name)?;
                let spelled = format!("--{name}");
                match inline {
                    Some(value) => self.apply(&flag, &spelled, value)?,
                    None if flag.is_bool() => self.apply(&flag, &spelled, "true")?,
                    None => {
                        index += 1;
                        let value = tokens.get(index).ok_or_else(|| {
                            Error::parse(&self.name, format!("flag needs an argument: {spelled}"))
                        })?;
                        self.apply(&flag, &spelled, value)?;
                    }
                }
            } else {
                let body = &token[1..];
                if body.starts_with('=') {
                    return Err(Error::parse(&self.name, format!("bad flag syntax: {token}")));
                }
                for (offset, letter) in body.char_indices() {
                    let flag = self.short(letter)?;
                    let spelled = format!("-{letter}");
                    let rest = &body[offset + letter.len_utf8()..];

                    if let Some(value) = rest.strip_prefix('=') {
                        self.apply(&flag, &spelled, value)?;
                        break;
                    }
                    if flag.is_bool() {
                        self.apply(&flag, &spelled, "true")?;
                        continue;
                    }
                    if !rest.is_empty() {
                        self.apply(&flag, &spelled, rest)?;
                        break;
                    }
                    index += 1;
                    let value = tokens.get(index).ok_or_else(|| {
                        Error::parse(&self.name, format!("flag needs an argument: {spelled}"))
                    })?;
                    self.apply(&flag, &spelled, value)?;
                    break;
                }
            }

            index += 1;
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::flag::{BoolFlag, FlagCore, IntFlag, StringFlag};

    fn tokens(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        set: FlagSet,
        verbose: Arc<BoolFlag>,
        all: Arc<BoolFlag>,
        count: Arc<IntFlag>,
        output: Arc<StringFlag>,
    }

    fn fixture() -> Fixture {
        let set = FlagSet::new("app");
        let verbose = set.add(BoolFlag::new("verbose", "v", false, "").unwrap()).unwrap();
        let all = set.add(BoolFlag::new("all", "a", false, "").unwrap()).unwrap();
        let count = set.add(IntFlag::new("count", "c", 1, "").unwrap()).unwrap();
        let output = set
            .add(StringFlag::new("output", "o", String::new(), "").unwrap())
            .unwrap();
        Fixture {
            set,
            verbose,
            all,
            count,
            output,
        }
    }

    #[test]
    fn test_long_forms() {
        let f = fixture();
        let rest = f
            .set
            .parse_tokens(&tokens(&["--count", "3", "--output=out.txt", "--verbose"]))
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(f.count.get(), 3);
        assert_eq!(f.output.get(), "out.txt");
        assert!(f.verbose.get());
    }

    #[test]
    fn test_short_forms_and_chaining() {
        let f = fixture();
        f.set.parse_tokens(&tokens(&["-vac", "7", "-oresult"])).unwrap();
        assert!(f.verbose.get());
        assert!(f.all.get());
        assert_eq!(f.count.get(), 7);
        assert_eq!(f.output.get(), "result");

        let f = fixture();
        f.set.parse_tokens(&tokens(&["-c=9", "-v=false"])).unwrap();
        assert_eq!(f.count.get(), 9);
        assert!(!f.verbose.get());
        assert!(f.verbose.is_set());
    }

    #[test]
    fn test_stops_at_first_positional() {
        let f = fixture();
        let rest = f
            .set
            .parse_tokens(&tokens(&["-v", "run", "--count", "2"]))
            .unwrap();
        assert_eq!(rest, vec!["run", "--count", "2"]);
        assert!(!f.count.is_set());
    }

    #[test]
    fn test_terminator_and_lone_dash() {
        let f = fixture();
        let rest = f
            .set
            .parse_tokens(&tokens(&["--all", "--", "--verbose", "x"]))
            .unwrap();
        assert_eq!(rest, vec!["--verbose", "x"]);
        assert!(!f.verbose.is_set());

        let rest = f.set.parse_tokens(&tokens(&["-", "tail"])).unwrap();
        assert_eq!(rest, vec!["-", "tail"]);
    }

    #[test]
    fn test_value_may_look_like_a_flag() {
        let f = fixture();
        f.set.parse_tokens(&tokens(&["--count", "-4"])).unwrap();
        assert_eq!(f.count.get(), -4);
    }

    #[test]
    fn test_errors_are_parse_failures() {
        let f = fixture();
        for bad in [
            vec!["--missing"],
            vec!["-x"],
            vec!["--count"],
            vec!["-vc"],
            vec!["--count", "many"],
            vec!["--=3"],
            vec!["-=3"],
        ] {
            let err = f.set.parse_tokens(&tokens(&bad)).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ParseFailed, "{bad:?}");
        }
    }

    #[test]
    fn test_short_name_is_not_a_long_form() {
        let f = fixture();
        let err = f.set.parse_tokens(&tokens(&["--v"])).unwrap_err();
        assert!(err.to_string().contains("unknown flag"));
    }

    #[test]
    fn test_rejected_value_keeps_cause() {
        use std::error::Error as _;

        let f = fixture();
        let err = f.set.parse_tokens(&tokens(&["--count=abc"])).unwrap_err();
        let source = err.source().expect("wrapped validation error");
        assert!(source.to_string().contains("count"));
    }

    #[test]
    fn test_add_rejects_uninitialized_and_duplicates() {
        let set = FlagSet::new("app");
        let err = set.add(IntFlag::uninit(0)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidName);

        set.add(IntFlag::new("port", "p", 0, "").unwrap()).unwrap();
        let err = set.add(IntFlag::new("peer", "p", 0, "").unwrap()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_add_all_is_atomic() {
        let set = FlagSet::new("app");
        let first: Arc<dyn Flag> = Arc::new(IntFlag::new("a", "", 0, "").unwrap());
        let clash: Arc<dyn Flag> = Arc::new(IntFlag::new("a", "b", 0, "").unwrap());
        assert!(set.add_all(vec![first, clash]).is_err());
        assert!(set.is_empty());
    }
}
