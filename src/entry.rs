//! Entry algebra: pure combinators for building ordered key-value lists.
//!
//! Every section compiler in [`crate::quadlet`] is a [`concat`] of the
//! combinators below. None of them branch on "is the field present" at
//! the call site; `fromValue`/`fromArray`/`fromRecord` absorb that,
//! so a missing optional config value disappears from the output
//! instead of requiring an explicit skip.

use std::fmt::Display;

/// A single rendered `key=value` pair, pre-quoting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The INI key (left of `=`).
    pub key: String,
    /// The raw value (right of `=`), not yet escaped.
    pub value: String,
}

impl Entry {
    /// Construct an entry directly from a key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// An ordered sequence of entries. Order is authored order; nothing in
/// this module ever sorts it.
pub type Entries = Vec<Entry>;

fn format_value<T: Display>(v: &T) -> String {
    v.to_string()
}

/// `fromValue(key, v)`: one entry if `v` is `Some`, else none.
pub fn from_value<T: Display>(key: impl Into<String>, v: Option<&T>) -> Entries {
    match v {
        Some(v) => vec![Entry::new(key, format_value(v))],
        None => Vec::new(),
    }
}

/// `fromMaybe(key, v, f)`: like [`from_value`] but with a custom
/// formatter, for types with no natural `Display` rendering (enums,
/// booleans needing lowercase text, etc).
pub fn from_maybe<T>(key: impl Into<String>, v: Option<&T>, f: impl Fn(&T) -> String) -> Entries {
    match v {
        Some(v) => vec![Entry::new(key, f(v))],
        None => Vec::new(),
    }
}

/// `fromArray(key, xs)`: one entry per element, same key, preserving
/// input order. Empty or absent input yields no entries.
pub fn from_array<T: Display>(key: impl Into<String>, xs: Option<&[T]>) -> Entries {
    let key = key.into();
    match xs {
        Some(xs) => xs
            .iter()
            .map(|x| Entry::new(key.clone(), format_value(x)))
            .collect(),
        None => Vec::new(),
    }
}

/// `fromArrayWith(key, xs, f)`: [`from_array`] with a per-element
/// formatter.
pub fn from_array_with<T>(
    key: impl Into<String>,
    xs: Option<&[T]>,
    f: impl Fn(&T) -> String,
) -> Entries {
    let key = key.into();
    match xs {
        Some(xs) => xs.iter().map(|x| Entry::new(key.clone(), f(x))).collect(),
        None => Vec::new(),
    }
}

/// `fromRecord(key, m, f)`: one entry per `(k, v)` pair, in the map's
/// iteration order, rendered by `f` (default `"${k}=${v}"` is the
/// caller's job to supply via `f` since plain `HashMap` does not
/// preserve insertion order; callers that need authored order should
/// pass an ordered sequence of pairs instead).
pub fn from_record<'a, K: Display + 'a, V: Display + 'a>(
    key: impl Into<String>,
    m: impl IntoIterator<Item = (&'a K, &'a V)>,
    f: Option<&dyn Fn(&K, &V) -> String>,
) -> Entries {
    let key = key.into();
    m.into_iter()
        .map(|(k, v)| {
            let rendered = match f {
                Some(f) => f(k, v),
                None => format!("{k}={v}"),
            };
            Entry::new(key.clone(), rendered)
        })
        .collect()
}

/// `concat(...xss)`: monoidal concatenation, left to right.
pub fn concat(groups: impl IntoIterator<Item = Entries>) -> Entries {
    groups.into_iter().flatten().collect()
}

/// `when(pred, key, value)`: one entry if `pred`, else none.
pub fn when(pred: bool, key: impl Into<String>, value: impl Into<String>) -> Entries {
    if pred {
        vec![Entry::new(key, value)]
    } else {
        Vec::new()
    }
}

/// Render a bool the way the compiler renders booleans everywhere:
/// `"true"`/`"false"`, never `1`/`0`.
#[must_use]
pub fn bool_str(b: bool) -> String {
    if b { "true" } else { "false" }.to_string()
}
