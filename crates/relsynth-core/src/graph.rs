//! Foreign-key dependency graph.
//!
//! Tables are arena nodes addressed by [`TableId`]; every foreign key is one
//! edge pointing from the referencing table to the referenced table. The
//! graph derives a generation order in which parents precede children.
//!
//! Two kinds of edge cannot be satisfied during generation and end up in the
//! deferred set handed to the constraint enforcer:
//! - self-references, which never take part in ordering or cycle detection
//! - edges removed to break a multi-table cycle; the table with the most
//!   incoming edges (ties broken by lexical name) becomes the seed and loses
//!   its outgoing edges inside the cycle

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::DatabaseSchema;

/// Arena index of a table node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl TableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One foreign key, directed referencing -> referenced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FkEdge {
    pub from: TableId,
    pub to: TableId,
    /// Position of the FK within the referencing table's `foreign_keys`.
    pub fk_index: usize,
    pub columns: Vec<String>,
    pub referenced_columns: Vec<String>,
}

impl FkEdge {
    pub fn is_self_reference(&self) -> bool {
        self.from == self.to
    }
}

/// Tables forming one strongly-connected component of size two or more.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    pub tables: Vec<String>,
}

impl Cycle {
    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|t| t == table)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.tables.clone();
        if let Some(first) = self.tables.first() {
            parts.push(first.clone());
        }
        write!(f, "{}", parts.join(" -> "))
    }
}

/// Why an FK edge is resolved by the enforcer instead of during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferReason {
    SelfReference,
    CycleBreak,
}

/// FK edge whose values are only best-effort at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredEdge {
    pub table: String,
    pub fk_index: usize,
    pub referenced_table: String,
    pub columns: Vec<String>,
    pub reason: DeferReason,
}

/// Non-fatal record of a multi-table cycle and how it was broken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CyclicDependencyWarning {
    pub tables: Vec<String>,
    pub seed_table: String,
    pub deferred: Vec<DeferredEdge>,
}

impl fmt::Display for CyclicDependencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cyclic dependency between [{}]; '{}' generated first with {} deferred foreign key(s)",
            self.tables.join(", "),
            self.seed_table,
            self.deferred.len()
        )
    }
}

/// Safe generation order derived from the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOrder {
    /// Parents before children; isolated tables first.
    pub order: Vec<String>,
    /// Dependency levels: every table's parents live in earlier waves.
    pub waves: Vec<Vec<String>>,
    /// Self-references plus cycle-broken edges.
    pub deferred: Vec<DeferredEdge>,
    pub warnings: Vec<CyclicDependencyWarning>,
}

impl GenerationOrder {
    pub fn is_deferred(&self, table: &str, fk_index: usize) -> bool {
        self.deferred
            .iter()
            .any(|edge| edge.table == table && edge.fk_index == fk_index)
    }

    pub fn has_deferred(&self, table: &str) -> bool {
        self.deferred.iter().any(|edge| edge.table == table)
    }

    pub fn position(&self, table: &str) -> Option<usize> {
        self.order.iter().position(|name| name == table)
    }
}

/// Directed FK graph over the tables of one schema.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    ids: BTreeMap<String, TableId>,
    edges: Vec<FkEdge>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph; a foreign key naming an absent table is fatal.
    pub fn build(schema: &DatabaseSchema) -> Result<Self> {
        let mut names = Vec::with_capacity(schema.tables.len());
        let mut ids = BTreeMap::new();

        for table in &schema.tables {
            let id = TableId(names.len() as u32);
            if ids.insert(table.name.clone(), id).is_some() {
                return Err(Error::integrity(&table.name, "duplicate table name"));
            }
            names.push(table.name.clone());
        }

        let mut edges = Vec::new();
        let mut outgoing = vec![Vec::new(); names.len()];
        let mut incoming = vec![Vec::new(); names.len()];

        for (table_idx, table) in schema.tables.iter().enumerate() {
            for (fk_index, fk) in table.foreign_keys.iter().enumerate() {
                let to = *ids.get(&fk.referenced_table).ok_or_else(|| {
                    Error::integrity(
                        &table.name,
                        format!(
                            "foreign key {} references missing table '{}'",
                            fk.label(),
                            fk.referenced_table
                        ),
                    )
                })?;
                let from = TableId(table_idx as u32);
                let edge_idx = edges.len();
                edges.push(FkEdge {
                    from,
                    to,
                    fk_index,
                    columns: fk.columns.clone(),
                    referenced_columns: fk.referenced_columns.clone(),
                });
                outgoing[from.index()].push(edge_idx);
                incoming[to.index()].push(edge_idx);
            }
        }

        Ok(Self {
            names,
            ids,
            edges,
            outgoing,
            incoming,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn node_id(&self, table: &str) -> Option<TableId> {
        self.ids.get(table).copied()
    }

    pub fn table_name(&self, id: TableId) -> &str {
        &self.names[id.index()]
    }

    pub fn edges(&self) -> &[FkEdge] {
        &self.edges
    }

    /// Edges leaving `id`, i.e. the tables it references.
    pub fn parents(&self, id: TableId) -> impl Iterator<Item = &FkEdge> {
        self.outgoing[id.index()].iter().map(|&idx| &self.edges[idx])
    }

    /// Edges entering `id`, i.e. the tables referencing it.
    pub fn children(&self, id: TableId) -> impl Iterator<Item = &FkEdge> {
        self.incoming[id.index()].iter().map(|&idx| &self.edges[idx])
    }

    pub fn self_references(&self) -> Vec<&FkEdge> {
        self.edges
            .iter()
            .filter(|edge| edge.is_self_reference())
            .collect()
    }

    /// Multi-table cycles, ignoring self-references.
    pub fn cycles(&self) -> Vec<Cycle> {
        let active = self.non_self_edges();
        self.cyclic_components(&active)
            .into_iter()
            .map(|component| Cycle {
                tables: component
                    .iter()
                    .map(|&node| self.names[node].clone())
                    .collect(),
            })
            .collect()
    }

    /// Table names, parents before children.
    pub fn topological_order(&self) -> Vec<String> {
        self.generation_order().order
    }

    /// Full ordering: sequence, waves, deferred edges and cycle warnings.
    pub fn generation_order(&self) -> GenerationOrder {
        let mut active = self.non_self_edges();
        let mut deferred: Vec<DeferredEdge> = self
            .edges
            .iter()
            .filter(|edge| edge.is_self_reference())
            .map(|edge| self.deferred_edge(edge, DeferReason::SelfReference))
            .collect();
        let mut warnings = Vec::new();

        loop {
            let components = self.cyclic_components(&active);
            if components.is_empty() {
                break;
            }

            for component in components {
                let members: BTreeSet<usize> = component.iter().copied().collect();
                let seed = self.pick_seed(&members, &active);
                let mut broken = Vec::new();
                for &edge_idx in &self.outgoing[seed] {
                    let edge = &self.edges[edge_idx];
                    if active[edge_idx] && members.contains(&edge.to.index()) {
                        active[edge_idx] = false;
                        broken.push(self.deferred_edge(edge, DeferReason::CycleBreak));
                    }
                }
                warnings.push(CyclicDependencyWarning {
                    tables: members.iter().map(|&node| self.names[node].clone()).collect(),
                    seed_table: self.names[seed].clone(),
                    deferred: broken.clone(),
                });
                deferred.extend(broken);
            }
        }

        let parents = self.parent_lists(&active);
        let mut connected = vec![false; self.len()];
        for (idx, edge) in self.edges.iter().enumerate() {
            if active[idx] {
                connected[edge.from.index()] = true;
                connected[edge.to.index()] = true;
            }
        }

        let mut visited = vec![false; self.len()];
        let mut order = Vec::with_capacity(self.len());
        for node in 0..self.len() {
            if !connected[node] {
                visited[node] = true;
                order.push(node);
            }
        }
        for node in 0..self.len() {
            visit_postorder(node, &parents, &mut visited, &mut order);
        }

        let mut levels = vec![0usize; self.len()];
        for &node in &order {
            levels[node] = parents[node]
                .iter()
                .map(|&parent| levels[parent] + 1)
                .max()
                .unwrap_or(0);
        }
        let depth = levels.iter().copied().max().map(|max| max + 1).unwrap_or(0);
        let mut waves = vec![Vec::new(); depth];
        for &node in &order {
            waves[levels[node]].push(self.names[node].clone());
        }

        GenerationOrder {
            order: order.iter().map(|&node| self.names[node].clone()).collect(),
            waves,
            deferred,
            warnings,
        }
    }

    fn non_self_edges(&self) -> Vec<bool> {
        self.edges
            .iter()
            .map(|edge| !edge.is_self_reference())
            .collect()
    }

    fn parent_lists(&self, active: &[bool]) -> Vec<Vec<usize>> {
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); self.len()];
        for (idx, edge) in self.edges.iter().enumerate() {
            if !active[idx] {
                continue;
            }
            let list = &mut parents[edge.from.index()];
            if !list.contains(&edge.to.index()) {
                list.push(edge.to.index());
            }
        }
        parents
    }

    /// Strongly-connected components of size > 1, members and components
    /// sorted by declaration order.
    fn cyclic_components(&self, active: &[bool]) -> Vec<Vec<usize>> {
        let adjacency = self.parent_lists(active);
        let mut components: Vec<Vec<usize>> = strongly_connected(&adjacency)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|mut component| {
                component.sort_unstable();
                component
            })
            .collect();
        components.sort();
        components
    }

    fn pick_seed(&self, members: &BTreeSet<usize>, active: &[bool]) -> usize {
        let mut best: Option<(usize, usize)> = None;
        for &node in members {
            let count = self.incoming[node]
                .iter()
                .filter(|&&idx| active[idx])
                .count();
            best = match best {
                None => Some((node, count)),
                Some((current, current_count)) => {
                    if count > current_count
                        || (count == current_count && self.names[node] < self.names[current])
                    {
                        Some((node, count))
                    } else {
                        Some((current, current_count))
                    }
                }
            };
        }
        best.map(|(node, _)| node).unwrap_or_default()
    }

    fn deferred_edge(&self, edge: &FkEdge, reason: DeferReason) -> DeferredEdge {
        DeferredEdge {
            table: self.names[edge.from.index()].clone(),
            fk_index: edge.fk_index,
            referenced_table: self.names[edge.to.index()].clone(),
            columns: edge.columns.clone(),
            reason,
        }
    }
}

fn visit_postorder(
    node: usize,
    parents: &[Vec<usize>],
    visited: &mut [bool],
    order: &mut Vec<usize>,
) {
    if visited[node] {
        return;
    }
    visited[node] = true;
    for &parent in &parents[node] {
        visit_postorder(parent, parents, visited, order);
    }
    order.push(node);
}

fn strongly_connected(adjacency: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let mut tarjan = Tarjan {
        adjacency,
        index_counter: 0,
        indices: vec![None; adjacency.len()],
        lowlinks: vec![0; adjacency.len()],
        on_stack: vec![false; adjacency.len()],
        stack: Vec::new(),
        components: Vec::new(),
    };
    for node in 0..adjacency.len() {
        if tarjan.indices[node].is_none() {
            tarjan.strongconnect(node);
        }
    }
    tarjan.components
}

/// Tarjan's strongly-connected components over index adjacency lists.
struct Tarjan<'a> {
    adjacency: &'a [Vec<usize>],
    index_counter: usize,
    indices: Vec<Option<usize>>,
    lowlinks: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    components: Vec<Vec<usize>>,
}

impl Tarjan<'_> {
    fn strongconnect(&mut self, v: usize) {
        self.indices[v] = Some(self.index_counter);
        self.lowlinks[v] = self.index_counter;
        self.index_counter += 1;
        self.stack.push(v);
        self.on_stack[v] = true;

        let adjacency = self.adjacency;
        for &w in &adjacency[v] {
            match self.indices[w] {
                None => {
                    self.strongconnect(w);
                    self.lowlinks[v] = self.lowlinks[v].min(self.lowlinks[w]);
                }
                Some(w_index) if self.on_stack[w] => {
                    self.lowlinks[v] = self.lowlinks[v].min(w_index);
                }
                Some(_) => {}
            }
        }

        if Some(self.lowlinks[v]) == self.indices[v] {
            let mut component = Vec::new();
            while let Some(w) = self.stack.pop() {
                self.on_stack[w] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}
