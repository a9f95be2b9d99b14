//! Changesets, observer identities and observe options.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque per-Observer token.
///
/// Stamped on every Sensor Agent an Observer creates and carried by every
/// changeset those agents dispatch. Only ever compared, never used as a
/// storage key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(Ulid);

impl ObserverId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObserverId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// One Sensor Agent flush: the host element and the resolved values of
/// the variables that changed in the window.
///
/// Immutable once built. Clones share the variable map.
#[derive(Clone, Debug, PartialEq)]
pub struct Changeset<E> {
    element: E,
    variables: Rc<IndexMap<String, String>>,
}

impl<E> Changeset<E> {
    pub fn new(element: E, variables: IndexMap<String, String>) -> Self {
        Self {
            element,
            variables: Rc::new(variables),
        }
    }

    pub fn element(&self) -> &E {
        &self.element
    }

    /// Variable name -> resolved value, in the order the names were first
    /// signalled.
    pub fn variables(&self) -> &IndexMap<String, String> {
        &self.variables
    }

    pub fn get(&self, variable: &str) -> Option<&str> {
        self.variables.get(variable).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// A changeset on its way from a Sensor Agent to the ambient listeners,
/// tagged with the Observer that owns the agent.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedChangeset<E> {
    pub owner: ObserverId,
    pub changeset: Changeset<E>,
}

impl<E> TaggedChangeset<E> {
    pub fn new(owner: ObserverId, changeset: Changeset<E>) -> Self {
        Self { owner, changeset }
    }
}

/// Options for `Observer::observe`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserveOptions {
    /// Every custom property to watch on the element. Replaces the previous
    /// list when the element is observed again.
    pub variables: Vec<String>,
}

impl ObserveOptions {
    pub fn variables<I, S>(variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observer_ids_are_unique_and_round_trip_through_text() {
        let a = ObserverId::new();
        let b = ObserverId::new();
        assert_ne!(a, b);

        let parsed: ObserverId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert!("not-an-id".parse::<ObserverId>().is_err());
    }

    #[test]
    fn changeset_lookup() {
        let mut variables = IndexMap::new();
        variables.insert("--x".to_string(), "1px".to_string());
        variables.insert("--y".to_string(), "2px".to_string());
        let changeset = Changeset::new("host", variables);

        assert_eq!(*changeset.element(), "host");
        assert_eq!(changeset.get("--y"), Some("2px"));
        assert_eq!(changeset.get("--z"), None);
        assert_eq!(changeset.variables().keys().collect::<Vec<_>>(), ["--x", "--y"]);
    }

    #[test]
    fn options_from_json() {
        let options: ObserveOptions =
            serde_json::from_str(r#"{ "variables": ["--accent", "--gap"] }"#).unwrap();
        assert_eq!(options, ObserveOptions::variables(["--accent", "--gap"]));

        let empty: ObserveOptions = serde_json::from_str("{}").unwrap();
        assert!(empty.variables.is_empty());
    }
}
