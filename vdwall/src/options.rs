//! Action options as they arrive from the caller, before and after
//! placeholder substitution.

use std::collections::{BTreeMap, HashMap};

/// Marks the start of a `$(name)` placeholder.
const PLACEHOLDER_OPEN: &str = "$(";
const PLACEHOLDER_CLOSE: char = ')';

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum OptionValue {
    Number(i64),
    Text(String),
}

impl OptionValue {
    /// Integer view of the value. Text is trimmed before parsing.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for OptionValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionValue::Number(n) => write!(f, "{}", n),
            OptionValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<i64> for OptionValue {
    fn from(n: i64) -> Self {
        OptionValue::Number(n)
    }
}

impl From<&str> for OptionValue {
    fn from(s: &str) -> Self {
        OptionValue::Text(s.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(s: String) -> Self {
        OptionValue::Text(s)
    }
}

/// Options keyed by option id, possibly containing placeholders.
pub type RawOptions = BTreeMap<String, OptionValue>;

/// Options whose placeholders have been substituted. This is the only
/// shape the encoder accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ResolvedOptions(BTreeMap<String, OptionValue>);

impl ResolvedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    /// First value present under any of `keys`.
    pub fn get_any(&self, keys: &[&str]) -> Option<&OptionValue> {
        keys.iter().find_map(|k| self.0.get(*k))
    }
}

impl<K: Into<String>, V: Into<OptionValue>> std::iter::FromIterator<(K, V)> for ResolvedOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Substitutes placeholders in a single text value.
pub trait VariableResolver {
    fn resolve(&self, text: &str) -> String;
}

/// Replaces every `$(name)` with the mapped value. Unknown names are left
/// untouched so the result fails validation instead of silently becoming 0.
impl<S: std::hash::BuildHasher> VariableResolver for HashMap<String, String, S> {
    fn resolve(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find(PLACEHOLDER_OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + PLACEHOLDER_OPEN.len()..];

            match after.find(PLACEHOLDER_CLOSE) {
                Some(end) => {
                    let name = &after[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => out.push_str(&rest[start..start + PLACEHOLDER_OPEN.len() + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }
}

/// Produces a resolved copy of `raw`; `raw` itself is left as it was.
///
/// Only text values containing a placeholder go through the resolver, and
/// their result is trimmed. Numbers and plain text pass through unchanged.
pub fn resolve_variables<R: VariableResolver + ?Sized>(
    raw: &RawOptions,
    resolver: &R,
) -> ResolvedOptions {
    ResolvedOptions(
        raw.iter()
            .map(|(key, value)| {
                let value = match value {
                    OptionValue::Text(s) if s.contains(PLACEHOLDER_OPEN) => {
                        OptionValue::Text(resolver.resolve(s).trim().to_string())
                    }
                    other => other.clone(),
                };
                (key.clone(), value)
            })
            .collect(),
    )
}
