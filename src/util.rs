//! Small pure helpers shared by the other modules.

use serde_json::Value;

/// Recursively merge `source` into `target`.
///
/// Objects are merged key by key and arrays index by index (extra source
/// elements are appended, extra target elements kept). Any other
/// combination overwrites `target` with `source`, so `source` wins on
/// conflicting leaves.
pub fn deep_merge(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(source)) => {
            for (index, value) in source.iter().enumerate() {
                match target.get_mut(index) {
                    Some(existing) => deep_merge(existing, value),
                    None => target.push(value.clone()),
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Which registration names an operation applies to.
///
/// Accepts a single name, a collection of names, or every name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// Every currently known name.
    All,
    /// Only the listed names.
    Names(Vec<String>),
}

impl Target {
    /// The explicit names, or `None` for [`Target::All`].
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Target::All => None,
            Target::Names(names) => Some(names),
        }
    }

    /// Whether `name` is covered by this target.
    pub fn contains(&self, name: &str) -> bool {
        match self {
            Target::All => true,
            Target::Names(names) => names.iter().any(|n| n == name),
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Target::Names(vec![name.to_string()])
    }
}

impl From<String> for Target {
    fn from(name: String) -> Self {
        Target::Names(vec![name])
    }
}

impl From<&String> for Target {
    fn from(name: &String) -> Self {
        Target::Names(vec![name.clone()])
    }
}

impl From<Vec<String>> for Target {
    fn from(names: Vec<String>) -> Self {
        Target::Names(names)
    }
}

impl From<Vec<&str>> for Target {
    fn from(names: Vec<&str>) -> Self {
        Target::Names(names.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Target {
    fn from(names: &[&str]) -> Self {
        Target::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Target {
    fn from(names: [&str; N]) -> Self {
        Target::Names(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Option<&str>> for Target {
    fn from(name: Option<&str>) -> Self {
        match name {
            Some(name) => name.into(),
            None => Target::All,
        }
    }
}
