//! Seed data import: graph seed files (nodes + typed edges) and user contact lists.
//!
//! Input is decoded and validated record by record before the store lock is taken. A malformed
//! container fails the whole import; a bad record is skipped and listed in the report.

use crate::InMemoryGraphStore;
use caller_types::{ContactMetadata, EdgeMetadata, EdgeType, GraphStoreError, PropertyMap};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct GraphSeed {
    #[serde(default)]
    nodes: Vec<Value>,
    #[serde(default)]
    edges: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SeedNode {
    phone_number: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedEdge {
    #[serde(default)]
    id: Option<String>,
    from: String,
    to: String,
    #[serde(rename = "type")]
    edge_type: EdgeType,
    #[serde(default)]
    properties: PropertyMap,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserSeed {
    #[serde(default)]
    users: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SeedUser {
    #[serde(default)]
    id: Option<String>,
    phone_number: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contacts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SeedContact {
    phone_number: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    added_at: Option<DateTime<Utc>>,
}

/// A seed record that was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Position in the input, e.g. `edges[3]` or `users[0].contacts[2]`.
    pub record: String,
    pub reason: String,
}

/// Outcome of one seed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// Nodes created, including endpoints created implicitly by edges.
    pub nodes_added: usize,
    pub edges_added: usize,
    pub skipped: Vec<SkippedRecord>,
}

impl SeedReport {
    fn skip(&mut self, record: String, reason: impl ToString) {
        let reason = reason.to_string();
        tracing::warn!(record = %record, reason = %reason, "seed record skipped");
        self.skipped.push(SkippedRecord { record, reason });
    }
}

/// An edge decoded and validated, ready to insert.
struct PreparedEdge {
    record: String,
    id: Option<String>,
    from: String,
    to: String,
    metadata: EdgeMetadata,
    created_at: Option<DateTime<Utc>>,
}

/// Use the record-level `created_at` where the metadata has no time of its own.
fn fill_timestamp(metadata: &mut EdgeMetadata, created_at: Option<DateTime<Utc>>) {
    match metadata {
        EdgeMetadata::Contact(c) if c.added_at.is_none() => c.added_at = created_at,
        EdgeMetadata::Call(c) if c.timestamp.is_none() => c.timestamp = created_at,
        _ => {}
    }
}

impl InMemoryGraphStore {
    /// Import a graph seed document: `{"nodes": [...], "edges": [...]}`.
    pub async fn import_graph_seed(&self, data: &[u8]) -> Result<SeedReport, GraphStoreError> {
        let seed: GraphSeed = serde_json::from_slice(data)
            .map_err(|e| GraphStoreError::Seed(format!("invalid graph seed: {}", e)))?;
        let mut report = SeedReport::default();

        let mut nodes = Vec::with_capacity(seed.nodes.len());
        for (i, raw) in seed.nodes.into_iter().enumerate() {
            let record = format!("nodes[{}]", i);
            match serde_json::from_value::<SeedNode>(raw) {
                Ok(node) => match Self::check_phone(&node.phone_number) {
                    Ok(()) => nodes.push(node),
                    Err(e) => report.skip(record, e),
                },
                Err(e) => report.skip(record, e),
            }
        }

        let mut edges = Vec::with_capacity(seed.edges.len());
        for (i, raw) in seed.edges.into_iter().enumerate() {
            let record = format!("edges[{}]", i);
            match self.prepare_seed_edge(record.clone(), raw) {
                Ok(edge) => edges.push(edge),
                Err(e) => report.skip(record, e),
            }
        }

        let mut state = self.state.write().await;
        let nodes_before = state.node_count();
        for node in &nodes {
            state.upsert_named_node(&node.phone_number, node.name.as_deref());
        }
        for edge in edges {
            match state.insert_edge(edge.id, &edge.from, &edge.to, edge.metadata, edge.created_at) {
                Ok(_) => report.edges_added += 1,
                Err(e) => report.skip(edge.record, e),
            }
        }
        report.nodes_added = state.node_count() - nodes_before;
        drop(state);

        tracing::info!(
            nodes = report.nodes_added,
            edges = report.edges_added,
            skipped = report.skipped.len(),
            "graph seed imported"
        );
        Ok(report)
    }

    fn prepare_seed_edge(&self, record: String, raw: Value) -> Result<PreparedEdge, GraphStoreError> {
        let seed: SeedEdge = serde_json::from_value(raw)
            .map_err(|e| GraphStoreError::Seed(format!("invalid edge record: {}", e)))?;
        let mut metadata = self.registry.decode(&seed.edge_type, &seed.properties)?;
        fill_timestamp(&mut metadata, seed.created_at);
        self.prepare_edge(&seed.from, &seed.to, &mut metadata)?;
        Ok(PreparedEdge {
            record,
            id: seed.id.filter(|id| !id.trim().is_empty()),
            from: seed.from,
            to: seed.to,
            metadata,
            created_at: seed.created_at,
        })
    }

    /// Import user contact lists: `{"users": [{phone_number, name, contacts: [...]}]}`.
    ///
    /// Each user becomes a named node; each listed contact becomes a contact edge from the user.
    pub async fn import_user_seed(&self, data: &[u8]) -> Result<SeedReport, GraphStoreError> {
        let seed: UserSeed = serde_json::from_slice(data)
            .map_err(|e| GraphStoreError::Seed(format!("invalid user seed: {}", e)))?;
        let mut report = SeedReport::default();

        let mut users = Vec::with_capacity(seed.users.len());
        let mut edges = Vec::new();
        for (i, raw) in seed.users.into_iter().enumerate() {
            let record = format!("users[{}]", i);
            let user = match serde_json::from_value::<SeedUser>(raw) {
                Ok(user) => user,
                Err(e) => {
                    report.skip(record, e);
                    continue;
                }
            };
            if let Err(e) = Self::check_phone(&user.phone_number) {
                report.skip(record, e);
                continue;
            }
            tracing::trace!(user_id = ?user.id, phone = %user.phone_number, "seed user");

            for (j, raw) in user.contacts.iter().enumerate() {
                let record = format!("users[{}].contacts[{}]", i, j);
                match self.prepare_seed_contact(record.clone(), &user.phone_number, raw) {
                    Ok(edge) => edges.push(edge),
                    Err(e) => report.skip(record, e),
                }
            }
            users.push((user.phone_number, user.name));
        }

        let mut state = self.state.write().await;
        let nodes_before = state.node_count();
        for (phone, name) in &users {
            state.upsert_named_node(phone, name.as_deref());
        }
        for edge in edges {
            match state.insert_edge(None, &edge.from, &edge.to, edge.metadata, edge.created_at) {
                Ok(_) => report.edges_added += 1,
                Err(e) => report.skip(edge.record, e),
            }
        }
        report.nodes_added = state.node_count() - nodes_before;
        drop(state);

        tracing::info!(
            users = users.len(),
            nodes = report.nodes_added,
            contact_edges = report.edges_added,
            skipped = report.skipped.len(),
            "user seed imported"
        );
        Ok(report)
    }

    fn prepare_seed_contact(
        &self,
        record: String,
        owner: &str,
        raw: &Value,
    ) -> Result<PreparedEdge, GraphStoreError> {
        let contact = SeedContact::deserialize(raw)
            .map_err(|e| GraphStoreError::Seed(format!("invalid contact record: {}", e)))?;
        let mut metadata = EdgeMetadata::Contact(ContactMetadata {
            name: contact.name,
            added_at: contact.added_at,
        });
        self.prepare_edge(owner, &contact.phone_number, &mut metadata)?;
        Ok(PreparedEdge {
            record,
            id: None,
            from: owner.to_string(),
            to: contact.phone_number,
            metadata,
            created_at: contact.added_at,
        })
    }

    /// Read and import a graph seed file.
    pub async fn load_graph_seed_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<SeedReport, GraphStoreError> {
        let data = read_seed_file(path.as_ref()).await?;
        self.import_graph_seed(&data).await
    }

    /// Read and import a user contact seed file.
    pub async fn load_user_seed_file(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<SeedReport, GraphStoreError> {
        let data = read_seed_file(path.as_ref()).await?;
        self.import_user_seed(&data).await
    }
}

async fn read_seed_file(path: &Path) -> Result<Vec<u8>, GraphStoreError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| GraphStoreError::Seed(format!("{}: {}", path.display(), e)))
}
