//! Scoped value overrides applied to a fragment's section before validation.
//!
//! Each fragment owns a stack of [`Overrides`]. Entries are applied oldest
//! first so the most recently pushed entry wins for every key it names. Scopes
//! are expected to nest strictly; [`OverrideGuard`] pops its entry on drop.

use crate::schema::FragmentId;
use log::{debug, warn};
use parking_lot::Mutex;
use serde_yaml::{Mapping, Value};
use std::collections::HashMap;

/// A single override value.
#[derive(Debug, Clone, PartialEq)]
pub enum OverrideValue {
    /// Replace the field's value.
    Set(Value),
    /// Drop the field so its declared default applies.
    Default,
}

/// Ordered field overrides for one scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    entries: Vec<(String, OverrideValue)>,
}

impl Overrides {
    /// An empty set of overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override `field` with `value`.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(field.into(), OverrideValue::Set(value.into()));
        self
    }

    /// Reset `field` to its declared default.
    pub fn reset(mut self, field: impl Into<String>) -> Self {
        self.insert(field.into(), OverrideValue::Default);
        self
    }

    fn insert(&mut self, field: String, value: OverrideValue) {
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((field, value)),
        }
    }

    /// Whether no field is overridden.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in the order they were first named.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OverrideValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The non-`Default` entries as a mapping.
    pub fn set_values(&self) -> Mapping {
        self.entries
            .iter()
            .filter_map(|(name, value)| match value {
                OverrideValue::Set(value) => Some((Value::String(name.clone()), value.clone())),
                OverrideValue::Default => None,
            })
            .collect()
    }

    /// Apply these overrides to `section` in place.
    pub fn apply_to(&self, section: &mut Mapping) {
        for (name, value) in &self.entries {
            match value {
                OverrideValue::Set(value) => {
                    section.insert(Value::String(name.clone()), value.clone());
                }
                OverrideValue::Default => {
                    section.remove(name.as_str());
                }
            }
        }
    }
}

/// Per-fragment override stacks.
#[derive(Debug, Default)]
pub struct OverrideStacks {
    stacks: Mutex<HashMap<FragmentId, Vec<Overrides>>>,
}

impl OverrideStacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `overrides` for `fragment`, returning the entry's depth.
    pub fn push(&self, fragment: &FragmentId, overrides: Overrides) -> usize {
        let mut stacks = self.stacks.lock();
        let stack = stacks.entry(fragment.clone()).or_default();
        stack.push(overrides);
        let depth = stack.len() - 1;
        debug!("pushed overrides (fragment={fragment}, depth={depth})");
        depth
    }

    /// Remove the most recent entry for `fragment`.
    pub fn pop(&self, fragment: &FragmentId) -> Option<Overrides> {
        let mut stacks = self.stacks.lock();
        let stack = stacks.get_mut(fragment)?;
        let popped = stack.pop();
        if stack.is_empty() {
            stacks.remove(fragment);
        }
        popped
    }

    /// Number of entries currently pushed for `fragment`.
    pub fn depth(&self, fragment: &FragmentId) -> usize {
        self.stacks.lock().get(fragment).map_or(0, Vec::len)
    }

    /// Apply every pushed entry for `fragment`, oldest first.
    pub fn apply(&self, fragment: &FragmentId, section: &mut Mapping) {
        let stacks = self.stacks.lock();
        if let Some(stack) = stacks.get(fragment) {
            for overrides in stack {
                overrides.apply_to(section);
            }
        }
    }

    /// Release the entry pushed at `depth`, dropping anything pushed after it.
    fn release(&self, fragment: &FragmentId, depth: usize) {
        let mut stacks = self.stacks.lock();
        let Some(stack) = stacks.get_mut(fragment) else {
            return;
        };
        if stack.len() > depth + 1 {
            let len = stack.len();
            warn!("overrides released out of order ({fragment}, depth={depth}, len={len})");
        }
        stack.truncate(depth);
        if stack.is_empty() {
            stacks.remove(fragment);
        }
    }
}

/// Pops an override entry when dropped.
#[must_use = "overrides are popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct OverrideGuard<'a> {
    stacks: &'a OverrideStacks,
    fragment: FragmentId,
    depth: usize,
}

impl<'a> OverrideGuard<'a> {
    /// Push `overrides` and return a guard that pops them.
    pub fn push(stacks: &'a OverrideStacks, fragment: FragmentId, overrides: Overrides) -> Self {
        let depth = stacks.push(&fragment, overrides);
        Self {
            stacks,
            fragment,
            depth,
        }
    }

    pub fn fragment(&self) -> &FragmentId {
        &self.fragment
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for OverrideGuard<'_> {
    fn drop(&mut self) {
        self.stacks.release(&self.fragment, self.depth);
        debug!(
            "popped overrides (fragment={}, depth={})",
            self.fragment, self.depth
        );
    }
}
