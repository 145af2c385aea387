use serde::{Deserialize, Deserializer, Serialize};

/// One entry of the flat file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "isDir", default)]
    pub is_dir: bool,
}

impl FileRecord {
    pub fn file(path: impl Into<String>) -> Self {
        Self::new(path, false)
    }

    pub fn dir(path: impl Into<String>) -> Self {
        Self::new(path, true)
    }

    fn new(path: impl Into<String>, is_dir: bool) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self { path, name, is_dir }
    }
}

/// A wikilink extracted server-side from a document's source.
///
/// The backend serializes these without field tags, so both the capitalized
/// and the camel-case spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiLink {
    #[serde(alias = "Raw", default)]
    pub raw: String,
    #[serde(alias = "Target", default)]
    pub target: String,
    #[serde(alias = "Alias", default)]
    pub alias: String,
    #[serde(rename = "isDir", alias = "IsDir", default)]
    pub is_dir: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileContent {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
    /// Server-rendered HTML, present for markdown documents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub links: Vec<WikiLink>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphPayload {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<GraphNode>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backlinks {
    pub path: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub backlinks: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
}

/// Acknowledgement body returned by mutating routes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub status: Option<String>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
