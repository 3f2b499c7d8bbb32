//! Typed results for hierarchy queries that can be only partly answered.

/// Result of a children/descendants query.
///
/// A malformed hierarchy (e.g. a parent cycle in externally supplied data) does not abort the
/// query: whatever could be collected is returned as `Partial`, together with the ids at which
/// traversal had to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Complete(T),
    Partial { value: T, broken: Vec<String> },
}

impl<T> Lookup<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Lookup::Complete(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Lookup::Complete(v) => v,
            Lookup::Partial { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Lookup::Complete(v) => v,
            Lookup::Partial { value, .. } => value,
        }
    }

    pub fn broken(&self) -> &[String] {
        match self {
            Lookup::Complete(_) => &[],
            Lookup::Partial { broken, .. } => broken,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Complete(v) => Lookup::Complete(f(v)),
            Lookup::Partial { value, broken } => Lookup::Partial {
                value: f(value),
                broken,
            },
        }
    }
}
