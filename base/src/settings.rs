//! Per-component settings.
//!
//! Every component in a machine description carries a flat map of
//! settings.  Values are integers, floating-point numbers or strings;
//! the component's factory decides which keys it needs.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use conv::ValueFrom;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl SettingValue {
    fn type_name(&self) -> &'static str {
        match self {
            SettingValue::Int(_) => "integer",
            SettingValue::Float(_) => "floating-point",
            SettingValue::Str(_) => "string",
        }
    }
}

impl Display for SettingValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SettingValue::Int(n) => write!(f, "{n}"),
            SettingValue::Float(x) => write!(f, "{x}"),
            SettingValue::Str(s) => write!(f, "{s:?}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettingsError {
    Missing {
        key: String,
        expected: &'static str,
    },
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    OutOfRange {
        key: String,
        value: i64,
    },
    Duplicate(String),
}

impl Display for SettingsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SettingsError::Missing { key, expected } => {
                write!(f, "{expected} setting with name {key} does not exist")
            }
            SettingsError::WrongType {
                key,
                expected,
                found,
            } => write!(f, "setting {key} should be {expected} but is {found}"),
            SettingsError::OutOfRange { key, value } => {
                write!(f, "setting {key} has out-of-range value {value}")
            }
            SettingsError::Duplicate(key) => write!(f, "setting {key} is already defined"),
        }
    }
}

impl Error for SettingsError {}

/// A flat mapping of setting names to values.
///
/// ```
/// use base::Settings;
/// let settings: Settings =
///     serde_json::from_str(r#"{"count": 32, "name": "x"}"#).unwrap();
/// assert_eq!(settings.uint::<usize>("count"), Ok(32));
/// assert_eq!(settings.string("name"), Ok("x"));
/// assert!(settings.int("missing").is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings {
    values: BTreeMap<String, SettingValue>,
}

impl Settings {
    #[must_use]
    pub fn new() -> Settings {
        Settings::default()
    }

    pub fn insert(&mut self, key: &str, value: SettingValue) -> Result<(), SettingsError> {
        if self.values.contains_key(key) {
            return Err(SettingsError::Duplicate(key.to_string()));
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    /// Builder-style insertion, convenient in tests and in code which
    /// assembles machines programmatically.
    #[must_use]
    pub fn with(mut self, key: &str, value: SettingValue) -> Settings {
        self.values.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn lookup(&self, key: &str, expected: &'static str) -> Result<&SettingValue, SettingsError> {
        self.values.get(key).ok_or_else(|| SettingsError::Missing {
            key: key.to_string(),
            expected,
        })
    }

    fn wrong_type(key: &str, expected: &'static str, found: &SettingValue) -> SettingsError {
        SettingsError::WrongType {
            key: key.to_string(),
            expected,
            found: found.type_name(),
        }
    }

    pub fn int(&self, key: &str) -> Result<i64, SettingsError> {
        match self.lookup(key, "integer")? {
            SettingValue::Int(n) => Ok(*n),
            other => Err(Settings::wrong_type(key, "integer", other)),
        }
    }

    /// Fetches an integer setting and converts it to `T`, failing if
    /// the value does not fit.
    pub fn uint<T: ValueFrom<i64>>(&self, key: &str) -> Result<T, SettingsError> {
        let value = self.int(key)?;
        T::value_from(value).map_err(|_| SettingsError::OutOfRange {
            key: key.to_string(),
            value,
        })
    }

    /// Floating-point settings also accept integer values.
    pub fn float(&self, key: &str) -> Result<f64, SettingsError> {
        match self.lookup(key, "floating-point")? {
            SettingValue::Float(x) => Ok(*x),
            SettingValue::Int(n) => Ok(*n as f64),
            other => Err(Settings::wrong_type(key, "floating-point", other)),
        }
    }

    pub fn string(&self, key: &str) -> Result<&str, SettingsError> {
        match self.lookup(key, "string")? {
            SettingValue::Str(s) => Ok(s.as_str()),
            other => Err(Settings::wrong_type(key, "string", other)),
        }
    }

    pub fn optional_uint<T: ValueFrom<i64>>(&self, key: &str) -> Result<Option<T>, SettingsError> {
        if self.contains(key) {
            self.uint(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn optional_string(&self, key: &str) -> Result<Option<&str>, SettingsError> {
        if self.contains(key) {
            self.string(key).map(Some)
        } else {
            Ok(None)
        }
    }
}

#[test]
fn test_missing_and_wrong_type() {
    let settings = Settings::new()
        .with("count", SettingValue::Int(4))
        .with("name", SettingValue::Str("ram".to_string()));
    assert_eq!(
        settings.int("size"),
        Err(SettingsError::Missing {
            key: "size".to_string(),
            expected: "integer"
        })
    );
    assert_eq!(
        settings.string("count"),
        Err(SettingsError::WrongType {
            key: "count".to_string(),
            expected: "string",
            found: "integer"
        })
    );
    assert_eq!(settings.float("count"), Ok(4.0));
}

#[test]
fn test_out_of_range() {
    let settings = Settings::new().with("count", SettingValue::Int(-1));
    assert_eq!(
        settings.uint::<u32>("count"),
        Err(SettingsError::OutOfRange {
            key: "count".to_string(),
            value: -1
        })
    );
    assert_eq!(settings.int("count"), Ok(-1));
}

#[test]
fn test_duplicate_insert() {
    let mut settings = Settings::new();
    settings
        .insert("a", SettingValue::Int(1))
        .expect("first insert should succeed");
    assert_eq!(
        settings.insert("a", SettingValue::Int(2)),
        Err(SettingsError::Duplicate("a".to_string()))
    );
    assert_eq!(settings.int("a"), Ok(1));
}

#[test]
fn test_optional() {
    let settings = Settings::new().with("image", SettingValue::Str("a.bin".to_string()));
    assert_eq!(settings.optional_string("image"), Ok(Some("a.bin")));
    assert_eq!(settings.optional_uint::<u32>("offset"), Ok(None));
}

#[test]
fn test_deserialize_mixed_types() {
    let settings: Settings = serde_json::from_str(r#"{"a": 1, "b": 2.5, "c": "three"}"#)
        .expect("valid settings JSON");
    assert_eq!(settings.int("a"), Ok(1));
    assert_eq!(settings.float("b"), Ok(2.5));
    assert_eq!(settings.string("c"), Ok("three"));
    assert_eq!(settings.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
}
