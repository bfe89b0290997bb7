//! Variable schema tree.
//!
//! The tree is produced outside this crate (usually by deserializing a schema
//! document with `serde_json`) and handed to the walker, which only ever
//! mutates [`ArrayVariable::chunks`]. Nodes are never added, removed or
//! reordered.
//!
//! JSON layout example:
//!
//! ```json
//! {
//!   "name": "/",
//!   "variables": [
//!     { "name": "temp", "kind": "array", "type": "Float32",
//!       "dims": [ { "name": "y", "size": 4 }, { "name": "x", "size": 4 } ] },
//!     { "name": "station", "kind": "structure", "members": [] }
//!   ],
//!   "groups": []
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::ChunkAnnotation;

/// A group: named container of variables and child groups.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    /// Group name. The root group is conventionally named `/`.
    pub name: String,

    /// Direct member variables, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<Variable>,

    /// Child groups, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<Group>,
}

impl Group {
    /// An empty root group named `/`.
    pub fn root() -> Self {
        Self::new("/")
    }

    /// An empty group with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Group {
            name: name.into(),
            variables: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Add a variable, builder style.
    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.push(variable);
        self
    }

    /// Add a child group, builder style.
    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    /// Find an array by its fully-qualified path (for example `/g1/s.temp`).
    pub fn find_array(&self, fqn: &str) -> Option<&ArrayVariable> {
        let mut found = None;
        self.visit_arrays(&mut |path, array| {
            if found.is_none() && path == fqn {
                found = Some(array);
            }
        });
        found
    }

    /// Call `f` with the path and array of every array in the tree, in walk
    /// order (variables before child groups).
    pub fn visit_arrays<'a>(&'a self, f: &mut dyn FnMut(&str, &'a ArrayVariable)) {
        visit_group(self, &group_path(None, &self.name), f);
    }
}

fn visit_group<'a>(group: &'a Group, path: &str, f: &mut dyn FnMut(&str, &'a ArrayVariable)) {
    for variable in &group.variables {
        visit_variable(variable, &member_path(path, &variable.name), f);
    }
    for child in &group.groups {
        visit_group(child, &group_path(Some(path), &child.name), f);
    }
}

fn visit_variable<'a>(
    variable: &'a Variable,
    path: &str,
    f: &mut dyn FnMut(&str, &'a ArrayVariable),
) {
    match &variable.kind {
        VariableKind::Array(array) => f(path, array),
        VariableKind::Structure { members } => {
            for member in members {
                visit_variable(member, &structure_member_path(path, &member.name), f);
            }
        }
        VariableKind::Atomic { .. } | VariableKind::Sequence { .. } | VariableKind::Grid { .. } => {}
    }
}

/// A named variable of one of the supported kinds.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Variable {
    /// Variable name (not fully qualified).
    pub name: String,

    /// What kind of variable this is, with its kind-specific payload.
    #[serde(flatten)]
    pub kind: VariableKind,
}

impl Variable {
    /// An array variable.
    pub fn array(name: impl Into<String>, array: ArrayVariable) -> Self {
        Variable {
            name: name.into(),
            kind: VariableKind::Array(array),
        }
    }

    /// A scalar variable of the given element type.
    pub fn atomic(name: impl Into<String>, element_type: impl Into<String>) -> Self {
        Variable {
            name: name.into(),
            kind: VariableKind::Atomic {
                element_type: element_type.into(),
            },
        }
    }

    /// A structure with the given members.
    pub fn structure(name: impl Into<String>, members: Vec<Variable>) -> Self {
        Variable {
            name: name.into(),
            kind: VariableKind::Structure { members },
        }
    }

    /// A sequence with the given members.
    pub fn sequence(name: impl Into<String>, members: Vec<Variable>) -> Self {
        Variable {
            name: name.into(),
            kind: VariableKind::Sequence { members },
        }
    }

    /// A grid with the given members.
    pub fn grid(name: impl Into<String>, members: Vec<Variable>) -> Self {
        Variable {
            name: name.into(),
            kind: VariableKind::Grid { members },
        }
    }

    /// The node kind used for policy dispatch.
    pub fn node_kind(&self) -> NodeKind {
        match self.kind {
            VariableKind::Atomic { .. } => NodeKind::Atomic,
            VariableKind::Array(_) => NodeKind::Array,
            VariableKind::Structure { .. } => NodeKind::Structure,
            VariableKind::Sequence { .. } => NodeKind::Sequence,
            VariableKind::Grid { .. } => NodeKind::Grid,
        }
    }
}

/// Kind-specific payload of a [`Variable`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VariableKind {
    /// A scalar.
    Atomic {
        /// Element type name as written in the schema document.
        #[serde(rename = "type")]
        element_type: String,
    },

    /// An N-dimensional array; the only kind that receives a catalog.
    Array(ArrayVariable),

    /// A structure of member variables.
    Structure {
        /// Members, in document order.
        #[serde(default)]
        members: Vec<Variable>,
    },

    /// A sequence (table of records). Not cataloged.
    Sequence {
        /// Members, in document order.
        #[serde(default)]
        members: Vec<Variable>,
    },

    /// A DAP2-style grid. Not allowed in this schema version.
    Grid {
        /// Members, in document order.
        #[serde(default)]
        members: Vec<Variable>,
    },
}

/// Closed set of node kinds the walker dispatches on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Scalar variable.
    Atomic,
    /// Array variable.
    Array,
    /// Structure variable.
    Structure,
    /// Sequence variable.
    Sequence,
    /// Grid variable.
    Grid,
    /// Group.
    Group,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Atomic => "atomic",
            NodeKind::Array => "array",
            NodeKind::Structure => "structure",
            NodeKind::Sequence => "sequence",
            NodeKind::Grid => "grid",
            NodeKind::Group => "group",
        };
        f.write_str(name)
    }
}

/// One dimension of an array.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dimension {
    /// Shared dimension name, if the schema names it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Number of elements along this dimension.
    pub size: u64,
}

/// An array variable and, after indexing, its chunk annotation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArrayVariable {
    /// Element type name as written in the schema document (for example `Float32`).
    #[serde(rename = "type")]
    pub element_type: String,

    /// Dimensions, slowest-varying first.
    #[serde(default)]
    pub dims: Vec<Dimension>,

    /// Chunk layout and catalog, attached by the walker.
    ///
    /// `None` after a build means the array was skipped (or is empty and
    /// reads as all fill values).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<ChunkAnnotation>,
}

impl ArrayVariable {
    /// An array with anonymous dimensions of the given sizes.
    pub fn new(element_type: impl Into<String>, sizes: impl IntoIterator<Item = u64>) -> Self {
        ArrayVariable {
            element_type: element_type.into(),
            dims: sizes
                .into_iter()
                .map(|size| Dimension { name: None, size })
                .collect(),
            chunks: None,
        }
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension sizes, slowest-varying first.
    pub fn shape(&self) -> Vec<u64> {
        self.dims.iter().map(|d| d.size).collect()
    }
}

/// Path of a group. The root group's path is `/`.
pub(crate) fn group_path(parent: Option<&str>, name: &str) -> String {
    match parent {
        None => "/".to_string(),
        Some(parent) => member_path(parent, name),
    }
}

/// Path of a direct member (variable or group) of the group at `group`.
pub(crate) fn member_path(group: &str, name: &str) -> String {
    if group.ends_with('/') {
        format!("{group}{name}")
    } else {
        format!("{group}/{name}")
    }
}

/// Path of a structure member.
pub(crate) fn structure_member_path(structure: &str, name: &str) -> String {
    format!("{structure}.{name}")
}
