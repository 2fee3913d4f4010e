//! Inflates a flat mapping of dotted keys into a nested tree.
//!
//! A key may be both a leaf and the parent of deeper keys (`db` and
//! `db.replica`). Such collisions never drop a value: the shallow leaf is kept
//! under [`BASE_KEY`] of the branch created for the deeper keys, whichever of
//! the two was inserted first.

use std::collections::BTreeMap;

/// Synthetic key that holds a value living at the same level as its siblings.
pub const BASE_KEY: &str = "__base__";

/// A node of an inflated tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node<T> {
    Leaf(T),
    Branch(BTreeMap<String, Node<T>>),
}

impl<T> Node<T> {
    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Node::Leaf(value) => Some(value),
            Node::Branch(_) => None,
        }
    }

    pub fn as_branch(&self) -> Option<&BTreeMap<String, Node<T>>> {
        match self {
            Node::Leaf(_) => None,
            Node::Branch(children) => Some(children),
        }
    }
}

/// Inflate `entries` into nested branches, splitting keys on `delimiter`.
pub fn inflate<T, K, I>(entries: I, delimiter: &str, base_key: &str) -> BTreeMap<String, Node<T>>
where
    I: IntoIterator<Item = (K, T)>,
    K: AsRef<str>,
{
    let mut root = BTreeMap::new();
    for (key, value) in entries {
        let parts: Vec<&str> = key.as_ref().split(delimiter).collect();
        insert(&mut root, &parts, value, base_key);
    }
    root
}

/// Insert `value` at `parts` below `level`.
///
/// A leaf found where a branch is needed moves under `base_key` of the new
/// branch; a value landing on an existing branch does the same.
fn insert<T>(level: &mut BTreeMap<String, Node<T>>, parts: &[&str], value: T, base_key: &str) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    if rest.is_empty() {
        match level.get_mut(*first) {
            Some(Node::Branch(children)) => {
                children.insert(base_key.to_string(), Node::Leaf(value));
            }
            _ => {
                level.insert(first.to_string(), Node::Leaf(value));
            }
        }
        return;
    }

    let mut children = match level.remove(*first) {
        Some(Node::Branch(children)) => children,
        Some(leaf) => BTreeMap::from([(base_key.to_string(), leaf)]),
        None => BTreeMap::new(),
    };
    insert(&mut children, rest, value, base_key);
    level.insert(first.to_string(), Node::Branch(children));
}
