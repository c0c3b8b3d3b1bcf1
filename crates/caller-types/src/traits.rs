//! Store traits and the error taxonomy shared across crates.

use crate::{CallDirection, CallFilters, Edge, EdgeMetadata, EdgeType, GraphStats, MetadataError, Node};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Read-only traversal queries. Scoring rules depend only on this trait.
#[async_trait]
pub trait GraphQuery: Send + Sync {
    /// Phone numbers `p` with a contact edge `p -> phone`, in edge insertion order.
    async fn get_users_with_contact(&self, phone: &str) -> Result<Vec<String>, GraphStoreError>;

    /// True iff a contact edge `user -> caller` exists.
    async fn is_direct_contact(&self, user: &str, caller: &str) -> Result<bool, GraphStoreError>;

    /// Number of distinct `m` with contact edges `user -> m` and `m -> caller`.
    async fn get_second_level_contact_count(
        &self,
        user: &str,
        caller: &str,
    ) -> Result<usize, GraphStoreError>;

    /// Edges of `edge_type` leaving `phone`, with metadata.
    async fn get_outgoing_edges(
        &self,
        phone: &str,
        edge_type: &EdgeType,
    ) -> Result<Vec<Edge>, GraphStoreError>;

    /// Edges of `edge_type` arriving at `phone`, with metadata.
    async fn get_incoming_edges(
        &self,
        phone: &str,
        edge_type: &EdgeType,
    ) -> Result<Vec<Edge>, GraphStoreError>;

    /// Call edges selected by `direction` and narrowed by every set filter.
    async fn get_calls_with_filters(
        &self,
        phone: &str,
        filters: &CallFilters,
        direction: CallDirection,
    ) -> Result<Vec<Edge>, GraphStoreError>;
}

/// Node and edge CRUD on top of the query surface.
#[async_trait]
pub trait GraphStore: GraphQuery {
    /// Fails with `NodeExists` if the phone key is taken.
    async fn add_node(&self, phone: &str, name: Option<&str>) -> Result<Node, GraphStoreError>;

    async fn get_node(&self, phone: &str) -> Result<Node, GraphStoreError>;

    async fn node_exists(&self, phone: &str) -> Result<bool, GraphStoreError>;

    /// All nodes, sorted by phone key.
    async fn get_all_nodes(&self) -> Result<Vec<Node>, GraphStoreError>;

    /// Remove the node and every edge it is an endpoint of. Returns the number of edges removed.
    async fn delete_node(&self, phone: &str) -> Result<usize, GraphStoreError>;

    /// Validate metadata, create missing endpoints, assign an id and insert. All-or-nothing.
    async fn add_edge(
        &self,
        from: &str,
        to: &str,
        metadata: EdgeMetadata,
    ) -> Result<Edge, GraphStoreError>;

    async fn get_edge(&self, id: &str) -> Result<Edge, GraphStoreError>;

    async fn delete_edge(&self, id: &str) -> Result<(), GraphStoreError>;

    async fn stats(&self) -> Result<GraphStats, GraphStoreError>;
}

/// Coarse error category, used by the transport layer to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    Deserialization,
    Configuration,
    Internal,
}

impl ErrorKind {
    /// Caused by the request rather than the server.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound
                | ErrorKind::AlreadyExists
                | ErrorKind::Validation
                | ErrorKind::Deserialization
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Deserialization => "DESERIALIZATION",
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphStoreError {
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("edge not found: {0}")]
    EdgeNotFound(String),
    #[error("edge already exists: {0}")]
    EdgeExists(String),
    #[error("invalid phone number: {0:?}")]
    InvalidPhone(String),
    #[error("invalid metadata: {0}")]
    Metadata(#[from] MetadataError),
    #[error("seed data error: {0}")]
    Seed(String),
}

impl GraphStoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphStoreError::NodeNotFound(_) | GraphStoreError::EdgeNotFound(_) => {
                ErrorKind::NotFound
            }
            GraphStoreError::NodeExists(_) | GraphStoreError::EdgeExists(_) => {
                ErrorKind::AlreadyExists
            }
            GraphStoreError::InvalidPhone(_)
            | GraphStoreError::Metadata(MetadataError::Validation(_)) => ErrorKind::Validation,
            GraphStoreError::Metadata(MetadataError::Deserialization(_))
            | GraphStoreError::Seed(_) => ErrorKind::Deserialization,
        }
    }
}
