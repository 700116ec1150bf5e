//! The identity-bearing record abstraction every collection is built over.

use std::fmt::{Debug, Display};
use std::hash::Hash;

use chrono::NaiveDateTime;
use serde::{de::DeserializeOwned, Serialize};

/// A server-owned entity with an immutable identity.
///
/// Views never assume anything about a record's shape beyond what these
/// lookups expose. Filter rules, search fields and aggregations are declared
/// per page in terms of field keys.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Clone + Eq + Hash + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static;

    fn id(&self) -> Self::Id;

    /// Text value of a field, `None` when the field is absent or empty.
    fn field(&self, key: &str) -> Option<String>;

    /// Timestamp value of a field. Sentinel "no value" timestamps are
    /// already mapped to `None` at deserialization.
    fn timestamp(&self, _key: &str) -> Option<NaiveDateTime> {
        None
    }
}

/// Helper for `Record::field` implementations over optional text.
pub fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.is_empty()).cloned()
}
