//! Synthesizes one strict schema for a whole config file.
//!
//! Fragments are declared independently, each bound to a dotted section. The
//! synthesizer inflates their sections into a tree and materializes every
//! level as a [`SchemaNode`]: intermediate segments become containers,
//! terminal sections become fragment nodes, and a fragment whose section is
//! also the parent of deeper sections contributes its fields to that level.

use crate::ConfigError;
use crate::hierarchy::{self, BASE_KEY, Node};
use crate::registry::FragmentRegistry;
use crate::schema::{Fragment, UnknownKeys, Validator, join_path};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Child of a schema level.
#[derive(Debug, Clone)]
pub enum SchemaChild {
    /// Intermediate level holding further children.
    Container(SchemaNode),
    /// Terminal section validated by one fragment.
    Fragment(Arc<Fragment>),
}

/// One level of a combined schema.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// File-qualified name, unique across files.
    pub name: String,
    /// Fragment whose fields live at this level.
    pub base: Option<Arc<Fragment>>,
    pub children: BTreeMap<String, SchemaChild>,
    pub unknown_keys: UnknownKeys,
}

/// Combined schema for every fragment of one file.
#[derive(Debug, Clone)]
pub struct CombinedSchema {
    pub file: String,
    /// Environment variable all fragments agreed on.
    pub path_env_var: Option<String>,
    /// Delimiter the fragment sections were split on.
    pub delimiter: String,
    pub root: SchemaNode,
}

/// Build the combined schema for `file`, splitting sections on `delimiter`.
///
/// Fails with [`ConfigError::Configuration`] when no fragment targets `file`
/// and with [`ConfigError::Setup`] when fragments disagree on the path env var.
pub fn synthesize(
    registry: &FragmentRegistry,
    file: &str,
    delimiter: &str,
) -> Result<CombinedSchema, ConfigError> {
    let path_env_var = registry.check_file(file)?;
    let mut sections = registry.lookup(file);

    let root_fragment = sections.remove("");
    let mut entries: Vec<(String, Arc<Fragment>)> = sections.into_iter().collect();
    if let Some(root_fragment) = root_fragment {
        entries.push((BASE_KEY.to_string(), root_fragment));
    }
    let tree = hierarchy::inflate(entries, delimiter, BASE_KEY);

    let mut root = materialize(&format!("CombinedConfig[{file}]"), tree);
    root.unknown_keys = UnknownKeys::Forbid;
    Ok(CombinedSchema {
        file: file.to_string(),
        path_env_var,
        delimiter: delimiter.to_string(),
        root,
    })
}

fn materialize(name: &str, tree: BTreeMap<String, Node<Arc<Fragment>>>) -> SchemaNode {
    let mut node = SchemaNode {
        name: name.to_string(),
        base: None,
        children: BTreeMap::new(),
        unknown_keys: UnknownKeys::Ignore,
    };
    for (key, child) in tree {
        match child {
            Node::Leaf(fragment) if key == BASE_KEY => node.base = Some(fragment),
            Node::Leaf(fragment) => {
                node.children.insert(key, SchemaChild::Fragment(fragment));
            }
            Node::Branch(children) => {
                let child_name = format!("{name}.{key}");
                let container = materialize(&child_name, children);
                node.children.insert(key, SchemaChild::Container(container));
            }
        }
    }
    node
}

impl CombinedSchema {
    /// Name of the root level.
    pub fn name(&self) -> &str {
        &self.root.name
    }

    /// Every fragment in the schema with its section.
    pub fn fragments(&self) -> Vec<(String, Arc<Fragment>)> {
        let mut out = Vec::new();
        collect_fragments(&self.root, "", &self.delimiter, &mut out);
        out
    }

    pub(crate) fn validate_with(&self, data: &Value, validator: &mut Validator<'_>) -> Value {
        validate_node(&self.root, Some(data), "", validator)
    }
}

fn collect_fragments(
    node: &SchemaNode,
    path: &str,
    delimiter: &str,
    out: &mut Vec<(String, Arc<Fragment>)>,
) {
    if let Some(base) = &node.base {
        out.push((path.to_string(), base.clone()));
    }
    for (key, child) in &node.children {
        let child_path = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}{delimiter}{key}")
        };
        match child {
            SchemaChild::Container(container) => {
                collect_fragments(container, &child_path, delimiter, out)
            }
            SchemaChild::Fragment(fragment) => out.push((child_path, fragment.clone())),
        }
    }
}

fn validate_node(
    node: &SchemaNode,
    value: Option<&Value>,
    path: &str,
    validator: &mut Validator<'_>,
) -> Value {
    let Some(mut map) = validator.mapping_or_empty(value, path) else {
        return Value::Null;
    };

    let reserved: Vec<&str> = node.children.keys().map(String::as_str).collect();
    let mut out = Mapping::new();
    let (base_fields, unknown_keys) = match &node.base {
        Some(base) => {
            validator.apply_overrides(base, &mut map);
            let strictest = if base.unknown_keys == UnknownKeys::Forbid {
                UnknownKeys::Forbid
            } else {
                node.unknown_keys
            };
            (base.fields.as_slice(), strictest)
        }
        None => (&[][..], node.unknown_keys),
    };
    for (key, value) in validator.fields(base_fields, unknown_keys, &map, path, &reserved) {
        out.insert(key, value);
    }

    for (key, child) in &node.children {
        let child_path = join_path(path, key);
        let child_value = map.get(key.as_str());
        let validated = match child {
            SchemaChild::Container(container) => {
                validate_node(container, child_value, &child_path, validator)
            }
            SchemaChild::Fragment(fragment) => {
                validator.fragment(fragment, child_value, &child_path)
            }
        };
        out.insert(Value::String(key.clone()), validated);
    }
    Value::Mapping(out)
}

impl fmt::Display for CombinedSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_node(f, &self.root, 0)
    }
}

fn write_node(f: &mut fmt::Formatter<'_>, node: &SchemaNode, indent: usize) -> fmt::Result {
    let pad = "  ".repeat(indent);
    writeln!(f, "{pad}{}", node.name)?;
    if let Some(base) = &node.base {
        for field in &base.fields {
            writeln!(f, "{pad}  {} ({})", field.name, base.name)?;
        }
    }
    for (key, child) in &node.children {
        match child {
            SchemaChild::Container(container) => write_node(f, container, indent + 1)?,
            SchemaChild::Fragment(fragment) => {
                writeln!(f, "{pad}  {key}: {}", fragment.name)?;
            }
        }
    }
    Ok(())
}
