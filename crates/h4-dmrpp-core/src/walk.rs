//! Depth-first schema walk with per-kind support policy.
//!
//! Groups are processed variables first, then child groups, each child group
//! fully before the next. Structures recurse into their members. What happens
//! to each node is decided by [`KindPolicy::for_kind`]:
//!
//! | kind      | policy                                   |
//! |-----------|------------------------------------------|
//! | array     | catalog; layout problems skip the array  |
//! | structure | recurse into members                     |
//! | group     | recurse into variables, then groups      |
//! | sequence  | skip with a diagnostic, no recursion     |
//! | grid      | abort the build                          |
//! | atomic    | ignore silently                          |

use snafu::prelude::*;

use crate::{
    build::BuildOptions,
    catalog::CatalogAssembler,
    error::{
        BuildResult, DescribeDatasetSnafu, EnumerateSnafu, UnsupportedVariableKindSnafu,
    },
    grid,
    layout::{self, InspectError},
    schema::{
        ArrayVariable, Group, NodeKind, Variable, VariableKind, group_path, member_path,
        structure_member_path,
    },
    store::BackingStore,
};

/// What the walker does with a node of a given kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindPolicy {
    /// Run the layout/grid/catalog pipeline.
    Catalog,
    /// Visit children.
    Recurse,
    /// Record a recoverable skip and do not descend.
    Skip,
    /// Nothing to do, no diagnostic.
    Ignore,
    /// Abort the build.
    Abort,
}

impl KindPolicy {
    /// The policy table.
    pub const fn for_kind(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Array => KindPolicy::Catalog,
            NodeKind::Structure | NodeKind::Group => KindPolicy::Recurse,
            NodeKind::Sequence => KindPolicy::Skip,
            NodeKind::Grid => KindPolicy::Abort,
            NodeKind::Atomic => KindPolicy::Ignore,
        }
    }
}

/// Why a variable received no catalog.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
pub enum SkipReason {
    /// The node kind is not supported (sequences).
    #[snafu(display("{kind} variables are not supported for chunk cataloging"))]
    UnsupportedKind {
        /// The node kind.
        kind: NodeKind,
    },

    /// The array's layout cannot be cataloged.
    #[snafu(display("{source}"))]
    Layout {
        /// The layout problem.
        source: InspectError,
    },
}

/// One skipped variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    /// Fully-qualified path.
    pub path: String,
    /// Why.
    pub reason: SkipReason,
}

/// Outcome of a walk that did not abort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Paths of arrays that received a catalog, in walk order.
    pub cataloged: Vec<String>,
    /// Variables that were skipped, in walk order.
    pub skipped: Vec<Skipped>,
}

impl BuildReport {
    /// The skip recorded for `path`, if any.
    pub fn skip_for(&self, path: &str) -> Option<&SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.path == path)
            .map(|s| &s.reason)
    }
}

/// Walks one schema tree against one store.
pub struct Walker<'s, S: BackingStore> {
    store: &'s S,
    options: &'s BuildOptions,
    report: BuildReport,
}

impl<'s, S: BackingStore> Walker<'s, S> {
    /// A walker over `store`.
    pub fn new(store: &'s S, options: &'s BuildOptions) -> Self {
        Walker {
            store,
            options,
            report: BuildReport::default(),
        }
    }

    /// Walk the tree rooted at `root`, attaching catalogs in place.
    pub fn walk(mut self, root: &mut Group) -> BuildResult<BuildReport> {
        let path = group_path(None, &root.name);
        self.walk_group(root, &path)?;
        Ok(self.report)
    }

    fn walk_group(&mut self, group: &mut Group, path: &str) -> BuildResult<()> {
        for variable in &mut group.variables {
            let var_path = member_path(path, &variable.name);
            self.walk_variable(variable, var_path)?;
        }
        for child in &mut group.groups {
            let child_path = group_path(Some(path), &child.name);
            self.walk_group(child, &child_path)?;
        }
        Ok(())
    }

    fn walk_variable(&mut self, variable: &mut Variable, path: String) -> BuildResult<()> {
        let kind = variable.node_kind();
        let Variable { name, kind: payload } = variable;

        match (KindPolicy::for_kind(kind), payload) {
            (KindPolicy::Catalog, VariableKind::Array(array)) => {
                self.catalog_array(name, path, array)
            }
            (KindPolicy::Recurse, VariableKind::Structure { members }) => {
                for member in members {
                    let member_path = structure_member_path(&path, &member.name);
                    self.walk_variable(member, member_path)?;
                }
                Ok(())
            }
            (KindPolicy::Abort, _) => UnsupportedVariableKindSnafu { path, kind }.fail(),
            (KindPolicy::Skip, _) => {
                self.skip(path, SkipReason::UnsupportedKind { kind });
                Ok(())
            }
            (KindPolicy::Ignore, _) => Ok(()),
            (policy, _) => {
                // Only reachable if the policy table and VariableKind disagree.
                log::error!("{path}: policy {policy:?} does not apply to a {kind} variable");
                Ok(())
            }
        }
    }

    fn catalog_array(
        &mut self,
        name: &str,
        path: String,
        array: &mut ArrayVariable,
    ) -> BuildResult<()> {
        let store = self.store;

        let dataset = store
            .select(name)
            .context(DescribeDatasetSnafu { path: path.as_str() })?;
        let description = store
            .describe(&dataset)
            .context(DescribeDatasetSnafu { path: path.as_str() })?;

        let inspection = match layout::inspect(&description) {
            Ok(inspection) => inspection,
            Err(source) => {
                self.skip(path, SkipReason::Layout { source });
                return Ok(());
            }
        };

        log::debug!(
            "{path}: {:?}, dims {:?}, byte order {}",
            inspection.layout,
            inspection.dims,
            inspection.byte_order.as_str()
        );

        let mut assembler = CatalogAssembler::new(inspection.layout, inspection.byte_order);
        grid::enumerate(
            store,
            &dataset,
            &inspection.dims,
            self.options.trailing_chunks,
            &mut assembler,
        )
        .context(EnumerateSnafu { path: path.as_str() })?;

        log::debug!("{path}: {} chunk descriptor(s)", assembler.len());
        array.chunks = Some(assembler.finish());
        self.report.cataloged.push(path);
        Ok(())
    }

    fn skip(&mut self, path: String, reason: SkipReason) {
        log::warn!("Could not include chunk metadata for variable {path}: {reason}");
        self.report.skipped.push(Skipped { path, reason });
    }
}
