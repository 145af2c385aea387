// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

pub use handlers::{
    config_path, connect, describe_action, format_graph, format_hits, format_links, format_tree,
    load_config, read_content, render_document,
};
