use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::{BaseFlag, FlagCore, FlagKind, Scalar};
use crate::error::Result;

const DEFAULT_DELIMITER: char = ',';

/// Flag holding a delimited list of scalars.
///
/// Each set replaces the whole list; empty items are rejected.
pub struct SliceFlag<T> {
    base: BaseFlag<Vec<T>>,
    delimiter: char,
}

pub type BoolSliceFlag = SliceFlag<bool>;
pub type IntSliceFlag = SliceFlag<i64>;
pub type UintSliceFlag = SliceFlag<u64>;
pub type FloatSliceFlag = SliceFlag<f64>;
pub type StringSliceFlag = SliceFlag<String>;
pub type DurationSliceFlag = SliceFlag<Duration>;

impl<T: Scalar> fmt::Debug for SliceFlag<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceFlag")
            .field("kind", &T::SLICE_KIND)
            .field("base", &self.base)
            .field("delimiter", &self.delimiter)
            .finish()
    }
}

impl<T: Scalar> SliceFlag<T> {
    pub fn new(long: &str, short: &str, default: Vec<T>, usage: &str) -> Result<Self> {
        let flag = Self {
            base: BaseFlag::new(default),
            delimiter: DEFAULT_DELIMITER,
        };
        flag.base.init(long, short, usage)?;
        Ok(flag)
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_env(self, name: &str) -> Self {
        self.base.bind_env(name);
        self
    }
}

impl<T: Scalar> FlagCore for SliceFlag<T> {
    type Value = Vec<T>;

    const KIND: FlagKind = T::SLICE_KIND;

    fn base(&self) -> &BaseFlag<Vec<T>> {
        &self.base
    }

    fn parse_value(&self, raw: &str) -> std::result::Result<Vec<T>, String> {
        raw.split(self.delimiter)
            .enumerate()
            .map(|(index, item)| {
                let item = item.trim();
                if item.is_empty() {
                    return Err(format!("item {} is empty", index + 1));
                }
                T::parse_scalar(item).map_err(|reason| format!("item {item:?}: {reason}"))
            })
            .collect()
    }

    fn render(&self, value: &Vec<T>) -> String {
        value
            .iter()
            .map(Scalar::render)
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }

    fn value_to_json(&self, value: &Vec<T>) -> Value {
        Value::Array(value.iter().map(Scalar::to_json).collect())
    }
}

/// Flag holding `key=value` pairs, e.g. `--label env=prod,tier=web`.
pub struct MapFlag {
    base: BaseFlag<BTreeMap<String, String>>,
    delimiter: char,
}

impl fmt::Debug for MapFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFlag")
            .field("base", &self.base)
            .field("delimiter", &self.delimiter)
            .finish()
    }
}

impl MapFlag {
    pub fn new(
        long: &str,
        short: &str,
        default: BTreeMap<String, String>,
        usage: &str,
    ) -> Result<Self> {
        let flag = Self {
            base: BaseFlag::new(default),
            delimiter: DEFAULT_DELIMITER,
        };
        flag.base.init(long, short, usage)?;
        Ok(flag)
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_env(self, name: &str) -> Self {
        self.base.bind_env(name);
        self
    }
}

impl FlagCore for MapFlag {
    type Value = BTreeMap<String, String>;

    const KIND: FlagKind = FlagKind::StringMap;

    fn base(&self) -> &BaseFlag<BTreeMap<String, String>> {
        &self.base
    }

    fn parse_value(&self, raw: &str) -> std::result::Result<Self::Value, String> {
        let mut pairs = BTreeMap::new();
        for entry in raw.split(self.delimiter) {
            let entry = entry.trim();
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got {entry:?}"))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("empty key in {entry:?}"));
            }
            if pairs
                .insert(key.to_string(), value.trim().to_string())
                .is_some()
            {
                return Err(format!("duplicate key {key:?}"));
            }
        }
        Ok(pairs)
    }

    fn render(&self, value: &Self::Value) -> String {
        value
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }

    fn value_to_json(&self, value: &Self::Value) -> Value {
        Value::Object(
            value
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flag::Flag;

    #[test]
    fn test_slice_splits_and_replaces() {
        let flag = StringSliceFlag::new("tag", "t", vec!["base".into()], "").unwrap();
        flag.set_str("a, b,c").unwrap();
        assert_eq!(flag.get(), vec!["a", "b", "c"]);

        flag.set_str("d").unwrap();
        assert_eq!(flag.get(), vec!["d"]);
        assert_eq!(flag.kind(), FlagKind::StringSlice);
    }

    #[test]
    fn test_slice_rejects_bad_items_without_mutation() {
        let flag = IntSliceFlag::new("ids", "", vec![1, 2], "").unwrap();
        assert!(flag.set_str("3,,4").is_err());
        assert!(flag.set_str("3,x").is_err());
        assert!(!flag.is_set());
        assert_eq!(flag.get(), vec![1, 2]);
        assert_eq!(flag.value_string(), "1,2");
    }

    #[test]
    fn test_slice_custom_delimiter() {
        let flag = StringSliceFlag::new("path", "", Vec::new(), "")
            .unwrap()
            .with_delimiter(':');
        flag.set_str("/usr/bin:/bin").unwrap();
        assert_eq!(flag.get(), vec!["/usr/bin", "/bin"]);
        assert_eq!(flag.value_json(), serde_json::json!(["/usr/bin", "/bin"]));
    }

    #[test]
    fn test_map_pairs() {
        let flag = MapFlag::new("label", "l", BTreeMap::new(), "").unwrap();
        flag.set_str("env=prod, tier=web").unwrap();

        let value = flag.get();
        assert_eq!(value.get("env").map(String::as_str), Some("prod"));
        assert_eq!(value.get("tier").map(String::as_str), Some("web"));
        assert_eq!(flag.value_string(), "env=prod,tier=web");
    }

    #[test]
    fn test_map_rejects_malformed_pairs() {
        let flag = MapFlag::new("label", "", BTreeMap::new(), "").unwrap();
        assert!(flag.set_str("novalue").is_err());
        assert!(flag.set_str("=x").is_err());
        assert!(flag.set_str("a=1,a=2").is_err());
        assert!(!flag.is_set());
    }

    #[test]
    fn test_get_copy_does_not_alias_storage() {
        let flag = MapFlag::new("label", "", BTreeMap::new(), "").unwrap();
        flag.set_str("a=1").unwrap();
        let mut copy = flag.get();
        copy.insert("b".into(), "2".into());
        assert_eq!(flag.get().len(), 1);
    }
}
