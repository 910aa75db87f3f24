//! Bounded value dumps.
//!
//! [`dump`] turns any [`Inspect`] value into a [`DumpNode`] tree whose depth
//! and per-sequence item count never exceed the limits given, so cyclic or
//! very deep graphs still produce a finite result.

use std::cell::Ref;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

mod impls;

pub const DEFAULT_DEPTH: usize = 3;
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Bounds applied to every dump, here and in the generated helper class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpLimits {
    pub depth: usize,
    pub max_items: usize,
}

impl Default for DumpLimits {
    fn default() -> Self {
        Self { depth: DEFAULT_DEPTH, max_items: DEFAULT_MAX_ITEMS }
    }
}

/// Transparent wrappers unwrapped in a row before the value is cut off.
const MAX_INNER_HOPS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "DumpType")]
pub enum DumpNode {
    Primitive {
        #[serde(rename = "PrimitiveValue")]
        value: String,
    },
    Composite {
        #[serde(rename = "TypeName")]
        label: String,
        #[serde(rename = "Children", default)]
        children: Vec<DumpNode>,
    },
    /// A named object member; wraps the member's own dump.
    Member {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Value")]
        value: Box<DumpNode>,
    },
    Truncated {
        #[serde(rename = "Count")]
        remaining: usize,
    },
    Error {
        #[serde(rename = "Message")]
        message: String,
    },
}

impl DumpNode {
    pub fn primitive(value: impl Into<String>) -> Self {
        DumpNode::Primitive { value: value.into() }
    }

    pub fn composite(label: impl Into<String>, children: Vec<DumpNode>) -> Self {
        DumpNode::Composite { label: label.into(), children }
    }

    pub fn member(name: impl Into<String>, value: DumpNode) -> Self {
        DumpNode::Member { name: name.into(), value: Box::new(value) }
    }

    pub fn error(message: impl fmt::Display) -> Self {
        DumpNode::Error { message: message.to_string() }
    }

    /// Nesting depth of composite levels below this node.
    pub fn depth(&self) -> usize {
        match self {
            DumpNode::Composite { children, .. } => {
                children.iter().map(|c| 1 + c.depth()).max().unwrap_or(0)
            }
            DumpNode::Member { value, .. } => value.depth(),
            _ => 0,
        }
    }
}

/// Failure to look at a value or one of its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectError(pub String);

impl fmt::Display for InspectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InspectError {}

/// A child handed out during inspection. Shared handles let cyclic graphs
/// hand out their nodes without borrowing through a `RefCell` guard.
pub enum Child<'a> {
    Borrowed(&'a dyn Inspect),
    Owned(Box<dyn Inspect + 'a>),
    Shared(Rc<dyn Inspect>),
    Cell(Ref<'a, dyn Inspect>),
}

impl Child<'_> {
    fn get(&self) -> &dyn Inspect {
        match self {
            Child::Borrowed(v) => *v,
            Child::Owned(v) => v.as_ref(),
            Child::Shared(v) => v.as_ref(),
            Child::Cell(v) => &**v,
        }
    }
}

pub type Items<'a> = Box<dyn Iterator<Item = Result<Child<'a>, InspectError>> + 'a>;

/// How a value presents itself to the dumper.
pub enum Shape<'a> {
    Primitive(String),
    Members(Vec<(String, Result<Child<'a>, InspectError>)>),
    Items(Items<'a>),
    /// Transparent wrapper; the inner value is dumped in its place.
    Inner(Child<'a>),
}

pub trait Inspect {
    /// Label shown for composite renderings.
    fn type_label(&self) -> String;

    fn inspect(&self) -> Result<Shape<'_>, InspectError>;
}

/// Dump `value` at most `depth` composite levels deep, listing at most
/// `max_items` elements of any sequence.
pub fn dump(value: &dyn Inspect, depth: usize, max_items: usize) -> DumpNode {
    dump_at(value, depth, max_items, 0)
}

fn dump_at(value: &dyn Inspect, depth: usize, max_items: usize, hops: usize) -> DumpNode {
    let shape = match value.inspect() {
        Ok(shape) => shape,
        Err(e) => return DumpNode::error(e),
    };
    match shape {
        Shape::Primitive(text) => DumpNode::Primitive { value: text },
        Shape::Inner(_) if hops >= MAX_INNER_HOPS => DumpNode::composite(value.type_label(), Vec::new()),
        Shape::Inner(child) => dump_at(child.get(), depth, max_items, hops + 1),
        _ if depth == 0 => DumpNode::composite(value.type_label(), Vec::new()),
        Shape::Members(members) => {
            let children = members
                .into_iter()
                .map(|(name, child)| {
                    let node = match child {
                        Ok(child) => dump(child.get(), depth - 1, max_items),
                        Err(e) => DumpNode::error(e),
                    };
                    DumpNode::member(name, node)
                })
                .collect();
            DumpNode::composite(value.type_label(), children)
        }
        Shape::Items(mut items) => {
            let mut children = Vec::new();
            for item in items.by_ref().take(max_items) {
                children.push(match item {
                    Ok(child) => dump(child.get(), depth - 1, max_items),
                    Err(e) => DumpNode::error(e),
                });
            }
            let remaining = items.count();
            if remaining > 0 {
                children.push(DumpNode::Truncated { remaining });
            }
            DumpNode::composite(value.type_label(), children)
        }
    }
}
