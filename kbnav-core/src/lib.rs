pub mod autosave;
pub mod config;
pub mod error;
pub mod graph;
pub mod links;
pub mod render;
pub mod state;
pub mod tree;

pub use config::{Config, DiagramBackend, Overrides};
pub use error::{ConfigError, DiagramError, MathError};
pub use graph::{ClickAction, GraphModel, NodeShape, NodeStyle};
pub use links::{LinkRef, LinkResolver, ResolvedAction, UnsupportedReason, extract_links};
pub use render::{MountedDocument, RenderPhase, RenderPipeline, RequestId};
pub use state::{AppState, CurrentDocument, Notice, NoticeKind, StateEvent, TreeSelection};
pub use tree::{FileTree, TreeNode, build_tree};
