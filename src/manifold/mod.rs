//! Manifolds as explicit registries of subsets, charts and frames.
//!
//! A [`Manifold`] owns every chart and frame created on it, together with two
//! transition graphs: coordinate changes between charts and changes of basis
//! between frames. Fields do not hold a reference to their manifold; every
//! operation that needs to resolve a transition takes it as an argument.
//!
//! Ids ([`SubsetId`], [`ChartId`], [`FrameId`]) are tagged with the manifold that
//! issued them, so an id can never be mistaken for an object of another manifold.
//!
//! Resolution (`transition_map`, `frame_change`) takes `&self`: composed transitions
//! are cached in the graphs through interior mutability. The registry is meant for
//! single-threaded use.

mod chart;
mod frame;
mod inverse;

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use colored::Colorize;
use tracing::debug;

pub use chart::{Chart, Coordinate, Transition};
pub use frame::{Frame, FrameChange, FrameKind};

use crate::config::GeometryConfig;
use crate::errors::{GeometryError, Result};
use crate::graph::{GraphStats, TransitionGraph};

static NEXT_MANIFOLD: AtomicU64 = AtomicU64::new(1);

/// Identifies a manifold instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifoldId(u64);

macro_rules! registry_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            manifold: ManifoldId,
            index: usize,
        }

        impl $name {
            /// The manifold that issued this id.
            pub fn manifold(&self) -> ManifoldId {
                self.manifold
            }

            /// Position in declaration order.
            pub fn index(&self) -> usize {
                self.index
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}.{}", $prefix, self.manifold.0, self.index)
            }
        }
    };
}

registry_id!(
    /// A subset of a manifold; index 0 is the manifold itself.
    SubsetId,
    "subset#"
);
registry_id!(
    /// A coordinate chart.
    ChartId,
    "chart#"
);
registry_id!(
    /// A vector frame (and its dual coframe).
    FrameId,
    "frame#"
);

#[derive(Debug, Clone)]
struct SubsetData {
    name: String,
    open: bool,
    supersets: Vec<SubsetId>,
    subsets: Vec<SubsetId>,
    atlas: Vec<ChartId>,
    frames: Vec<FrameId>,
    default_chart: Option<ChartId>,
    default_frame: Option<FrameId>,
    coverings: Vec<Vec<SubsetId>>,
}

impl SubsetData {
    fn new(name: &str, open: bool) -> Self {
        Self {
            name: name.to_string(),
            open,
            supersets: Vec::new(),
            subsets: Vec::new(),
            atlas: Vec::new(),
            frames: Vec::new(),
            default_chart: None,
            default_frame: None,
            coverings: Vec::new(),
        }
    }
}

/// A differentiable manifold and the registry of everything defined on it.
pub struct Manifold {
    id: ManifoldId,
    name: String,
    dim: usize,
    start_index: usize,
    config: GeometryConfig,
    subsets: Vec<SubsetData>,
    charts: Vec<Chart>,
    frames: Vec<Frame>,
    transitions: RefCell<TransitionGraph<ChartId, Transition>>,
    /// Reverse transitions that were derived rather than given by the user.
    derived_inverses: BTreeSet<(ChartId, ChartId)>,
    frame_changes: RefCell<TransitionGraph<FrameId, FrameChange>>,
    stats: Cell<GraphStats>,
}

impl Manifold {
    /// Creates a manifold of dimension `dim`; indices start at 0.
    pub fn new(dim: usize, name: &str) -> Self {
        let id = ManifoldId(NEXT_MANIFOLD.fetch_add(1, Ordering::Relaxed));
        debug!(manifold = name, dim, "creating manifold");
        Self {
            id,
            name: name.to_string(),
            dim,
            start_index: 0,
            config: GeometryConfig::default(),
            subsets: vec![SubsetData::new(name, true)],
            charts: Vec::new(),
            frames: Vec::new(),
            transitions: RefCell::new(TransitionGraph::new()),
            derived_inverses: BTreeSet::new(),
            frame_changes: RefCell::new(TransitionGraph::new()),
            stats: Cell::new(GraphStats::default()),
        }
    }

    /// Sets the first index of every index range.
    pub fn with_start_index(mut self, start_index: usize) -> Self {
        self.start_index = start_index;
        self
    }

    pub fn with_config(mut self, config: GeometryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> ManifoldId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// The index range `start_index..start_index + dim`.
    pub fn index_range(&self) -> Range<usize> {
        self.start_index..self.start_index + self.dim
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// The manifold as a subset of itself.
    pub fn root(&self) -> SubsetId {
        SubsetId {
            manifold: self.id,
            index: 0,
        }
    }

    fn foreign(&self, what: &dyn fmt::Display) -> GeometryError {
        GeometryError::DomainMismatch(format!("{what} does not belong to manifold {}", self.name))
    }

    fn subset_data(&self, id: SubsetId) -> Result<&SubsetData> {
        if id.manifold != self.id {
            return Err(self.foreign(&id));
        }
        self.subsets
            .get(id.index)
            .ok_or_else(|| GeometryError::UnknownSubset(id.to_string()))
    }

    fn add_subset(&mut self, name: &str, superset: SubsetId, open: bool) -> Result<SubsetId> {
        let parent = self.subset_data(superset)?;
        if open && !parent.open {
            return Err(GeometryError::DomainMismatch(format!(
                "open subset {name} of non-open subset {}",
                parent.name
            )));
        }
        let id = SubsetId {
            manifold: self.id,
            index: self.subsets.len(),
        };
        let mut data = SubsetData::new(name, open);
        data.supersets.push(superset);
        self.subsets.push(data);
        self.subsets[superset.index].subsets.push(id);
        debug!(subset = name, open, "creating subset");
        Ok(id)
    }

    /// Creates an open subset; charts and frames can be defined on it.
    pub fn open_subset(&mut self, name: &str, superset: SubsetId) -> Result<SubsetId> {
        self.add_subset(name, superset, true)
    }

    /// Creates a subset that is not known to be open.
    pub fn subset(&mut self, name: &str, superset: SubsetId) -> Result<SubsetId> {
        self.add_subset(name, superset, false)
    }

    pub fn subset_name(&self, id: SubsetId) -> Result<&str> {
        Ok(&self.subset_data(id)?.name)
    }

    pub fn is_open(&self, id: SubsetId) -> Result<bool> {
        Ok(self.subset_data(id)?.open)
    }

    /// Every known superset of `id`, including `id`, nearest first.
    fn ancestors(&self, id: SubsetId) -> Result<Vec<SubsetId>> {
        self.subset_data(id)?;
        let mut seen = BTreeSet::from([id]);
        let mut order = vec![id];
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            for parent in &self.subsets[current.index].supersets {
                if seen.insert(*parent) {
                    order.push(*parent);
                    queue.push_back(*parent);
                }
            }
        }
        Ok(order)
    }

    /// Whether `a` is contained in `b`.
    pub fn is_subset(&self, a: SubsetId, b: SubsetId) -> Result<bool> {
        self.subset_data(b)?;
        Ok(self.ancestors(a)?.contains(&b))
    }

    /// The smaller of two nested subsets.
    ///
    /// Fails with `DomainMismatch` when neither contains the other.
    pub fn common_subset(&self, a: SubsetId, b: SubsetId) -> Result<SubsetId> {
        if self.is_subset(a, b)? {
            Ok(a)
        } else if self.is_subset(b, a)? {
            Ok(b)
        } else {
            Err(GeometryError::DomainMismatch(format!(
                "subsets {} and {} are not nested",
                self.subsets[a.index].name, self.subsets[b.index].name
            )))
        }
    }

    /// Records that `whole` is the union of `parts`.
    pub fn declare_union(&mut self, whole: SubsetId, parts: &[SubsetId]) -> Result<()> {
        for part in parts {
            if !self.is_subset(*part, whole)? {
                return Err(GeometryError::DomainMismatch(format!(
                    "{} is not contained in {}",
                    self.subsets[part.index].name, self.subsets[whole.index].name
                )));
            }
        }
        self.subsets[whole.index].coverings.push(parts.to_vec());
        Ok(())
    }

    /// The coverings of `whole` declared with [`Manifold::declare_union`].
    pub fn coverings(&self, whole: SubsetId) -> Result<&[Vec<SubsetId>]> {
        Ok(&self.subset_data(whole)?.coverings)
    }

    /// Charts defined exactly on `subset`, in declaration order.
    pub fn atlas(&self, subset: SubsetId) -> Result<&[ChartId]> {
        Ok(&self.subset_data(subset)?.atlas)
    }

    /// Charts whose domain contains `subset`, in declaration order.
    pub fn charts_covering(&self, subset: SubsetId) -> Result<Vec<ChartId>> {
        let ancestors = self.ancestors(subset)?;
        Ok(self
            .charts
            .iter()
            .filter(|c| ancestors.contains(&c.domain()))
            .map(Chart::id)
            .collect())
    }

    /// Frames defined exactly on `subset`, in declaration order.
    pub fn frames(&self, subset: SubsetId) -> Result<&[FrameId]> {
        Ok(&self.subset_data(subset)?.frames)
    }

    /// Frames whose domain contains `subset`, in declaration order.
    pub fn frames_covering(&self, subset: SubsetId) -> Result<Vec<FrameId>> {
        let ancestors = self.ancestors(subset)?;
        Ok(self
            .frames
            .iter()
            .filter(|f| ancestors.contains(&f.domain()))
            .map(Frame::id)
            .collect())
    }

    /// The default chart of `subset`, inherited from the nearest superset that has one.
    pub fn default_chart(&self, subset: SubsetId) -> Result<Option<ChartId>> {
        Ok(self
            .ancestors(subset)?
            .into_iter()
            .find_map(|s| self.subsets[s.index].default_chart))
    }

    pub fn set_default_chart(&mut self, subset: SubsetId, chart: ChartId) -> Result<()> {
        let domain = self.chart_info(chart)?.domain();
        if !self.is_subset(subset, domain)? {
            return Err(GeometryError::DomainMismatch(format!(
                "chart {} is not defined on {}",
                self.charts[chart.index].name(),
                self.subsets[subset.index].name
            )));
        }
        self.subsets[subset.index].default_chart = Some(chart);
        Ok(())
    }

    /// The default frame of `subset`, inherited from the nearest superset that has one.
    pub fn default_frame(&self, subset: SubsetId) -> Result<Option<FrameId>> {
        Ok(self
            .ancestors(subset)?
            .into_iter()
            .find_map(|s| self.subsets[s.index].default_frame))
    }

    pub fn set_default_frame(&mut self, subset: SubsetId, frame: FrameId) -> Result<()> {
        let domain = self.frame_info(frame)?.domain();
        if !self.is_subset(subset, domain)? {
            return Err(GeometryError::DomainMismatch(format!(
                "frame {} is not defined on {}",
                self.frames[frame.index].name(),
                self.subsets[subset.index].name
            )));
        }
        self.subsets[subset.index].default_frame = Some(frame);
        Ok(())
    }

    /// Counters of transition resolution since creation or the last reset.
    pub fn graph_stats(&self) -> GraphStats {
        self.stats.get()
    }

    pub fn reset_graph_stats(&self) {
        self.stats.set(GraphStats::default());
    }

    fn bump<F>(&self, update: F)
    where
        F: FnOnce(&mut GraphStats),
    {
        let mut stats = self.stats.get();
        update(&mut stats);
        self.stats.set(stats);
    }
}

impl fmt::Debug for Manifold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} of dimension {}",
            "Manifold".bold(),
            self.name.cyan(),
            self.dim
        )?;
        for subset in &self.subsets {
            writeln!(
                f,
                "  {} {}: {} charts, {} frames",
                "subset".yellow(),
                subset.name,
                subset.atlas.len(),
                subset.frames.len()
            )?;
        }
        for chart in &self.charts {
            writeln!(f, "  {} {}", "chart".green(), chart)?;
        }
        write!(
            f,
            "  {} transitions, {} frame changes",
            self.transitions.borrow().edge_count(),
            self.frame_changes.borrow().edge_count()
        )
    }
}
