//! Fluent state with an explicit static/dynamic schema.
//!
//! A [`State`] maps fluent names to [`Value`]s. Each fluent is declared once,
//! through [`StateBuilder`], as either *static* (shared by every fork through
//! an `Arc`) or *dynamic* (deep-copied whenever the state is cloned). After
//! construction the set of fluents and the keys of map-valued fluents are
//! frozen: [`State::set`] only overwrites existing entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::error::StateError;

/// Closed value variant stored in a fluent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a map value from `(key, value)` entries.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Value
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Copy with every nested list sorted, so comparisons ignore list order.
    ///
    /// Map keys are already ordered by `BTreeMap`.
    pub fn canonical(&self) -> Value {
        match self {
            Value::List(items) => {
                let mut items: Vec<Value> = items.iter().map(Value::canonical).collect();
                items.sort();
                Value::List(items)
            }
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.canonical()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Structural equality that ignores key and list order.
    pub fn same_as(&self, other: &Value) -> bool {
        self.canonical() == other.canonical()
    }
}

impl From<bool> for Value {
    fn from(flag: bool) -> Self {
        Value::Bool(flag)
    }
}

impl From<i64> for Value {
    fn from(number: i64) -> Self {
        Value::Int(number)
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Static(Arc<Value>),
    Dynamic(Value),
}

impl Slot {
    fn value(&self) -> &Value {
        match self {
            Slot::Static(shared) => shared,
            Slot::Dynamic(owned) => owned,
        }
    }
}

/// World state: named fluents under a frozen schema.
///
/// `Clone` shares static fluents and deep-copies dynamic ones.
#[derive(Debug, Clone, Default)]
pub struct State {
    fluents: BTreeMap<String, Slot>,
}

/// Declares the fluent schema of a domain's initial state.
#[derive(Debug, Default)]
pub struct StateBuilder {
    fluents: BTreeMap<String, Slot>,
}

impl StateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a static fluent, shared by reference across all forks.
    pub fn fixed(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fluents
            .insert(name.into(), Slot::Static(Arc::new(value.into())));
        self
    }

    /// Declare a dynamic fluent, copied on every fork.
    pub fn dynamic(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fluents
            .insert(name.into(), Slot::Dynamic(value.into()));
        self
    }

    pub fn build(self) -> State {
        State {
            fluents: self.fluents,
        }
    }
}

impl State {
    pub fn get(&self, fluent: &str) -> Option<&Value> {
        self.fluents.get(fluent).map(Slot::value)
    }

    /// Value under `key` of a map-valued fluent.
    pub fn lookup(&self, fluent: &str, key: &str) -> Option<&Value> {
        self.get(fluent)?.get(key)
    }

    /// Boolean entry; missing or non-boolean entries read as `false`.
    pub fn flag(&self, fluent: &str, key: &str) -> bool {
        self.lookup(fluent, key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn text(&self, fluent: &str, key: &str) -> Option<&str> {
        self.lookup(fluent, key).and_then(Value::as_str)
    }

    /// True when the text entry equals `expected`.
    pub fn is(&self, fluent: &str, key: &str, expected: &str) -> bool {
        self.text(fluent, key) == Some(expected)
    }

    pub fn is_static(&self, fluent: &str) -> bool {
        matches!(self.fluents.get(fluent), Some(Slot::Static(_)))
    }

    pub fn fluent_names(&self) -> impl Iterator<Item = &str> {
        self.fluents.keys().map(String::as_str)
    }

    /// Overwrite an existing key of a dynamic map-valued fluent.
    pub fn set(
        &mut self,
        fluent: &str,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<(), StateError> {
        let slot = self
            .fluents
            .get_mut(fluent)
            .ok_or_else(|| StateError::UnknownFluent(fluent.to_string()))?;
        let Slot::Dynamic(Value::Map(entries)) = slot else {
            if matches!(slot, Slot::Static(_)) {
                return Err(StateError::StaticFluent(fluent.to_string()));
            }
            return Err(StateError::UnknownKey {
                fluent: fluent.to_string(),
                key: key.to_string(),
            });
        };
        let entry = entries.get_mut(key).ok_or_else(|| StateError::UnknownKey {
            fluent: fluent.to_string(),
            key: key.to_string(),
        })?;
        *entry = value.into();
        Ok(())
    }

    /// Replace the whole value of a dynamic fluent.
    pub fn replace(&mut self, fluent: &str, value: impl Into<Value>) -> Result<(), StateError> {
        match self.fluents.get_mut(fluent) {
            None => Err(StateError::UnknownFluent(fluent.to_string())),
            Some(Slot::Static(_)) => Err(StateError::StaticFluent(fluent.to_string())),
            Some(Slot::Dynamic(current)) => {
                *current = value.into();
                Ok(())
            }
        }
    }

    /// Compare two states fluent by fluent, ignoring key and list order.
    ///
    /// Static fluents are skipped unless `with_static` is set.
    pub fn compare(&self, other: &State, with_static: bool) -> bool {
        if self.fluents.len() != other.fluents.len() {
            return false;
        }
        self.fluents.iter().all(|(name, slot)| {
            if matches!(slot, Slot::Static(_)) && !with_static {
                return true;
            }
            other
                .fluents
                .get(name)
                .is_some_and(|theirs| slot.value().same_as(theirs.value()))
        })
    }

    /// True when both states point at the same allocation for `fluent`.
    pub fn shares_fluent_with(&self, other: &State, fluent: &str) -> bool {
        match (self.fluents.get(fluent), other.fluents.get(fluent)) {
            (Some(Slot::Static(left)), Some(Slot::Static(right))) => Arc::ptr_eq(left, right),
            _ => false,
        }
    }

    /// Snapshot of every fluent value, for persistence and reports.
    pub fn to_values(&self) -> BTreeMap<String, Value> {
        self.fluents
            .iter()
            .map(|(name, slot)| (name.clone(), slot.value().clone()))
            .collect()
    }

    /// Rebuild a state from a snapshot; every fluent becomes dynamic.
    pub fn from_values(values: BTreeMap<String, Value>) -> State {
        State {
            fluents: values
                .into_iter()
                .map(|(name, value)| (name, Slot::Dynamic(value)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kitchen() -> State {
        StateBuilder::new()
            .fixed("self_name", "kitchen")
            .dynamic("cut", Value::map([("vegetable", false)]))
            .dynamic("tags", Value::List(vec!["b".into(), "a".into()]))
            .build()
    }

    #[test]
    fn clone_shares_static_and_copies_dynamic() {
        let original = kitchen();
        let mut fork = original.clone();
        fork.set("cut", "vegetable", true).expect("set");

        assert!(original.shares_fluent_with(&fork, "self_name"));
        assert!(!original.flag("cut", "vegetable"));
        assert!(fork.flag("cut", "vegetable"));
    }

    #[test]
    fn set_rejects_unknown_and_static_fluents() {
        let mut state = kitchen();
        assert_eq!(
            state.set("missing", "x", true),
            Err(StateError::UnknownFluent("missing".to_string()))
        );
        assert_eq!(
            state.set("cut", "fruit", true),
            Err(StateError::UnknownKey {
                fluent: "cut".to_string(),
                key: "fruit".to_string()
            })
        );
        assert_eq!(
            state.replace("self_name", "pantry"),
            Err(StateError::StaticFluent("self_name".to_string()))
        );
        let names: Vec<&str> = state.fluent_names().collect();
        assert_eq!(names, vec!["cut", "self_name", "tags"]);
    }

    #[test]
    fn compare_ignores_list_order_and_static_fluents() {
        let left = kitchen();
        let mut right = StateBuilder::new()
            .fixed("self_name", "pantry")
            .dynamic("cut", Value::map([("vegetable", false)]))
            .dynamic("tags", Value::List(vec!["a".into(), "b".into()]))
            .build();
        assert!(left.compare(&right, false));
        assert!(!left.compare(&right, true));

        right.set("cut", "vegetable", true).expect("set");
        assert!(!left.compare(&right, false));
    }
}
