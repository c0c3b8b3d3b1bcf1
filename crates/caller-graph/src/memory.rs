//! In-memory graph store with per-type adjacency indexes.

use caller_types::{
    CallDirection, CallFilters, Edge, EdgeMetadata, EdgeType, GraphQuery, GraphStats, GraphStore,
    GraphStoreError, MetadataError, MetadataRegistry, Node,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// edge_type -> phone -> edge ids, in insertion order.
type AdjacencyIndex = HashMap<EdgeType, HashMap<String, Vec<String>>>;

/// Everything behind the store lock.
#[derive(Debug, Default)]
pub(crate) struct GraphState {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    /// from -> edge ids.
    out_index: AdjacencyIndex,
    /// to -> edge ids.
    in_index: AdjacencyIndex,
    edge_counter: u64,
}

impl GraphState {
    fn add_edge_to_index(index: &mut AdjacencyIndex, edge_type: &EdgeType, phone: &str, edge_id: &str) {
        index
            .entry(edge_type.clone())
            .or_default()
            .entry(phone.to_string())
            .or_default()
            .push(edge_id.to_string());
    }

    fn remove_edge_from_index(
        index: &mut AdjacencyIndex,
        edge_type: &EdgeType,
        phone: &str,
        edge_id: &str,
    ) {
        if let Some(by_phone) = index.get_mut(edge_type) {
            if let Some(list) = by_phone.get_mut(phone) {
                list.retain(|x| x != edge_id);
                if list.is_empty() {
                    by_phone.remove(phone);
                }
            }
            if by_phone.is_empty() {
                index.remove(edge_type);
            }
        }
    }

    fn edge_ids<'a>(index: &'a AdjacencyIndex, edge_type: &EdgeType, phone: &str) -> &'a [String] {
        index
            .get(edge_type)
            .and_then(|by_phone| by_phone.get(phone))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn outgoing<'a>(&'a self, phone: &str, edge_type: &EdgeType) -> impl Iterator<Item = &'a Edge> + 'a {
        Self::edge_ids(&self.out_index, edge_type, phone)
            .iter()
            .filter_map(move |id| self.edges.get(id))
    }

    fn incoming<'a>(&'a self, phone: &str, edge_type: &EdgeType) -> impl Iterator<Item = &'a Edge> + 'a {
        Self::edge_ids(&self.in_index, edge_type, phone)
            .iter()
            .filter_map(move |id| self.edges.get(id))
    }

    fn has_edge_between(&self, from: &str, to: &str, edge_type: &EdgeType) -> bool {
        self.outgoing(from, edge_type).any(|e| e.to == to)
    }

    /// Create a bare node if the phone key is unknown. Returns true if a node was created.
    pub(crate) fn ensure_node(&mut self, phone: &str) -> bool {
        if self.nodes.contains_key(phone) {
            return false;
        }
        self.nodes.insert(phone.to_string(), Node::new(phone));
        true
    }

    /// Insert or name a node. An existing node only gains a name if it had none.
    pub(crate) fn upsert_named_node(&mut self, phone: &str, name: Option<&str>) -> bool {
        let created = self.ensure_node(phone);
        if let (Some(node), Some(name)) = (self.nodes.get_mut(phone), name) {
            if node.name.is_none() && !name.is_empty() {
                node.name = Some(name.to_string());
            }
        }
        created
    }

    fn next_edge_id(&mut self, edge_type: &EdgeType) -> String {
        loop {
            self.edge_counter += 1;
            let id = format!("{}_{}", edge_type, self.edge_counter);
            if !self.edges.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Insert an edge whose metadata is already validated. Nothing changes on error.
    ///
    /// `created_at` comes from the metadata timestamp, then `fallback_time`, then now.
    pub(crate) fn insert_edge(
        &mut self,
        id: Option<String>,
        from: &str,
        to: &str,
        metadata: EdgeMetadata,
        fallback_time: Option<DateTime<Utc>>,
    ) -> Result<Edge, GraphStoreError> {
        let edge_type = metadata.edge_type();
        if let Some(ref id) = id {
            if self.edges.contains_key(id) {
                return Err(GraphStoreError::EdgeExists(id.clone()));
            }
        }
        if edge_type.unique_per_pair() && self.has_edge_between(from, to, &edge_type) {
            return Err(GraphStoreError::EdgeExists(format!(
                "{} {} -> {}",
                edge_type, from, to
            )));
        }

        self.ensure_node(from);
        self.ensure_node(to);
        let id = match id {
            Some(id) => id,
            None => self.next_edge_id(&edge_type),
        };
        let created_at = metadata
            .timestamp()
            .or(fallback_time)
            .unwrap_or_else(Utc::now);
        let edge = Edge {
            id: id.clone(),
            from: from.to_string(),
            to: to.to_string(),
            metadata,
            created_at,
        };
        Self::add_edge_to_index(&mut self.out_index, &edge_type, from, &id);
        Self::add_edge_to_index(&mut self.in_index, &edge_type, to, &id);
        self.edges.insert(id, edge.clone());
        Ok(edge)
    }

    fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        let edge = self.edges.remove(id)?;
        let edge_type = edge.edge_type();
        Self::remove_edge_from_index(&mut self.out_index, &edge_type, &edge.from, id);
        Self::remove_edge_from_index(&mut self.in_index, &edge_type, &edge.to, id);
        Some(edge)
    }

    /// Remove `phone`'s own adjacency lists from `index`, all edge types.
    fn take_lists(index: &mut AdjacencyIndex, phone: &str) -> Vec<(EdgeType, Vec<String>)> {
        let mut taken = Vec::new();
        index.retain(|edge_type, by_phone| {
            if let Some(ids) = by_phone.remove(phone) {
                taken.push((edge_type.clone(), ids));
            }
            !by_phone.is_empty()
        });
        taken
    }

    /// Drop `ids` from the far endpoints' lists, one pass per list.
    fn prune_index(index: &mut AdjacencyIndex, doomed: HashMap<(EdgeType, String), HashSet<String>>) {
        for ((edge_type, phone), ids) in doomed {
            if let Some(by_phone) = index.get_mut(&edge_type) {
                if let Some(list) = by_phone.get_mut(&phone) {
                    list.retain(|id| !ids.contains(id));
                    if list.is_empty() {
                        by_phone.remove(&phone);
                    }
                }
                if by_phone.is_empty() {
                    index.remove(&edge_type);
                }
            }
        }
    }

    /// Remove every edge with `phone` as an endpoint. Linear in the number of edges removed.
    fn detach_node(&mut self, phone: &str) -> usize {
        // Far endpoint lists to prune: (type, phone) -> edge ids.
        let mut far_in: HashMap<(EdgeType, String), HashSet<String>> = HashMap::new();
        let mut far_out: HashMap<(EdgeType, String), HashSet<String>> = HashMap::new();
        let mut removed = 0usize;

        for (edge_type, ids) in Self::take_lists(&mut self.out_index, phone) {
            for id in ids {
                let Some(edge) = self.edges.remove(&id) else {
                    continue;
                };
                removed += 1;
                if edge.to != phone {
                    far_in.entry((edge_type.clone(), edge.to)).or_default().insert(id);
                }
            }
        }
        // Self-loops were already removed above.
        for (edge_type, ids) in Self::take_lists(&mut self.in_index, phone) {
            for id in ids {
                let Some(edge) = self.edges.remove(&id) else {
                    continue;
                };
                removed += 1;
                far_out.entry((edge_type.clone(), edge.from)).or_default().insert(id);
            }
        }

        Self::prune_index(&mut self.in_index, far_in);
        Self::prune_index(&mut self.out_index, far_out);
        removed
    }
}

/// In-memory implementation of GraphStore.
///
/// One reader/writer lock guards all state: queries share it, mutations hold it exclusively.
/// Clones share the same graph.
#[derive(Clone)]
pub struct InMemoryGraphStore {
    pub(crate) state: Arc<RwLock<GraphState>>,
    pub(crate) registry: Arc<MetadataRegistry>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::with_registry(MetadataRegistry::new())
    }

    /// Store accepting the edge types known to `registry`.
    pub fn with_registry(registry: MetadataRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(GraphState::default())),
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub(crate) fn check_phone(phone: &str) -> Result<(), GraphStoreError> {
        if phone.trim().is_empty() {
            return Err(GraphStoreError::InvalidPhone(phone.to_string()));
        }
        Ok(())
    }

    /// Endpoint and metadata checks shared by `add_edge` and the seed importers.
    pub(crate) fn prepare_edge(
        &self,
        from: &str,
        to: &str,
        metadata: &mut EdgeMetadata,
    ) -> Result<(), GraphStoreError> {
        Self::check_phone(from)?;
        Self::check_phone(to)?;
        let edge_type = metadata.edge_type();
        if !self.registry.is_registered(&edge_type) {
            return Err(MetadataError::Validation(format!(
                "edge type not registered: {}",
                edge_type
            ))
            .into());
        }
        metadata.validate()?;
        Ok(())
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GraphQuery for InMemoryGraphStore {
    async fn get_users_with_contact(&self, phone: &str) -> Result<Vec<String>, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state
            .incoming(phone, &EdgeType::Contact)
            .map(|e| e.from.clone())
            .collect())
    }

    async fn is_direct_contact(&self, user: &str, caller: &str) -> Result<bool, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state.has_edge_between(user, caller, &EdgeType::Contact))
    }

    async fn get_second_level_contact_count(
        &self,
        user: &str,
        caller: &str,
    ) -> Result<usize, GraphStoreError> {
        let state = self.state.read().await;
        let mut visited = HashSet::new();
        let mut count = 0usize;
        for edge in state.outgoing(user, &EdgeType::Contact) {
            let intermediate = edge.to.as_str();
            if !visited.insert(intermediate) {
                continue;
            }
            if state.has_edge_between(intermediate, caller, &EdgeType::Contact) {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_outgoing_edges(
        &self,
        phone: &str,
        edge_type: &EdgeType,
    ) -> Result<Vec<Edge>, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state.outgoing(phone, edge_type).cloned().collect())
    }

    async fn get_incoming_edges(
        &self,
        phone: &str,
        edge_type: &EdgeType,
    ) -> Result<Vec<Edge>, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state.incoming(phone, edge_type).cloned().collect())
    }

    async fn get_calls_with_filters(
        &self,
        phone: &str,
        filters: &CallFilters,
        direction: CallDirection,
    ) -> Result<Vec<Edge>, GraphStoreError> {
        let state = self.state.read().await;
        let candidates: Vec<&Edge> = match direction {
            CallDirection::Outgoing => state.outgoing(phone, &EdgeType::Call).collect(),
            CallDirection::Incoming => state.incoming(phone, &EdgeType::Call).collect(),
            CallDirection::Both => {
                // A self-call sits in both lists; report it once.
                let mut seen = HashSet::new();
                state
                    .outgoing(phone, &EdgeType::Call)
                    .chain(state.incoming(phone, &EdgeType::Call))
                    .filter(|e| seen.insert(e.id.clone()))
                    .collect()
            }
        };
        Ok(candidates
            .into_iter()
            .filter(|e| filters.matches(e))
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn add_node(&self, phone: &str, name: Option<&str>) -> Result<Node, GraphStoreError> {
        Self::check_phone(phone)?;
        let mut state = self.state.write().await;
        if state.nodes.contains_key(phone) {
            return Err(GraphStoreError::NodeExists(phone.to_string()));
        }
        let mut node = Node::new(phone);
        if let Some(name) = name {
            node = node.with_name(name);
        }
        state.nodes.insert(phone.to_string(), node.clone());
        Ok(node)
    }

    async fn get_node(&self, phone: &str) -> Result<Node, GraphStoreError> {
        let state = self.state.read().await;
        state
            .nodes
            .get(phone)
            .cloned()
            .ok_or_else(|| GraphStoreError::NodeNotFound(phone.to_string()))
    }

    async fn node_exists(&self, phone: &str) -> Result<bool, GraphStoreError> {
        let state = self.state.read().await;
        Ok(state.nodes.contains_key(phone))
    }

    async fn get_all_nodes(&self) -> Result<Vec<Node>, GraphStoreError> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.phone_number.cmp(&b.phone_number));
        Ok(nodes)
    }

    async fn delete_node(&self, phone: &str) -> Result<usize, GraphStoreError> {
        let mut state = self.state.write().await;
        if state.nodes.remove(phone).is_none() {
            return Err(GraphStoreError::NodeNotFound(phone.to_string()));
        }
        let deleted = state.detach_node(phone);
        tracing::debug!(phone = %phone, edges = deleted, "node deleted");
        Ok(deleted)
    }

    async fn add_edge(
        &self,
        from: &str,
        to: &str,
        metadata: EdgeMetadata,
    ) -> Result<Edge, GraphStoreError> {
        let mut metadata = metadata;
        self.prepare_edge(from, to, &mut metadata)?;
        let mut state = self.state.write().await;
        state.insert_edge(None, from, to, metadata, None)
    }

    async fn get_edge(&self, id: &str) -> Result<Edge, GraphStoreError> {
        let state = self.state.read().await;
        state
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| GraphStoreError::EdgeNotFound(id.to_string()))
    }

    async fn delete_edge(&self, id: &str) -> Result<(), GraphStoreError> {
        let mut state = self.state.write().await;
        state
            .remove_edge(id)
            .map(|_| ())
            .ok_or_else(|| GraphStoreError::EdgeNotFound(id.to_string()))
    }

    async fn stats(&self) -> Result<GraphStats, GraphStoreError> {
        let state = self.state.read().await;
        let mut edges_by_type: BTreeMap<String, usize> = BTreeMap::new();
        for edge in state.edges.values() {
            *edges_by_type.entry(edge.edge_type().to_string()).or_default() += 1;
        }
        Ok(GraphStats {
            nodes: state.nodes.len(),
            edges: state.edges.len(),
            edges_by_type,
        })
    }
}
