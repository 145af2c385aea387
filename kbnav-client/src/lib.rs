pub mod client;
pub mod error;
pub mod types;

pub use client::{ApiClient, Credentials};
pub use error::ClientError;
pub use types::{
    Ack, Backlinks, FileContent, FileRecord, GraphEdge, GraphNode, GraphPayload, NodeKind,
    SearchHit, WikiLink,
};
