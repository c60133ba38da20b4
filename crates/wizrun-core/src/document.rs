//! Wizard documents: a plain serde description of a graph.
//!
//! Items may carry an `id` (defaulting to their name) so connections can
//! address two items that invoke the same step:
//!
//! ```toml
//! name = "greet"
//!
//! [[items]]
//! id = "greeting"
//! name = "Greeting"
//! kind = "literal"
//! outputs = [{ name = "Text", type = "string", value = "hello" }]
//!
//! [[items]]
//! name = "Print Value"
//! inputs = [{ name = "Value", type = "string" }]
//!
//! [[connections]]
//! from = "greeting"
//! from_port = "Text"
//! to = "Print Value"
//! to_port = "Value"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WizardError};
use crate::graph::{Graph, Item, ItemKind, Port};
use crate::traits::GraphLoader;
use crate::types::{ExecutionMode, FILENAME_TYPE};
use crate::value::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WizardDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_batch")]
    pub batch: bool,
    #[serde(default)]
    pub items: Vec<ItemDocument>,
    #[serde(default)]
    pub connections: Vec<ConnectionDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: ItemKind,
    /// Overrides the document-level mode for this item.
    #[serde(default)]
    pub batch: Option<bool>,
    #[serde(default)]
    pub inputs: Vec<PortDocument>,
    #[serde(default)]
    pub outputs: Vec<PortDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub original_type: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDocument {
    pub from: String,
    pub from_port: String,
    pub to: String,
    pub to_port: String,
}

fn default_batch() -> bool {
    true
}

fn default_kind() -> ItemKind {
    ItemKind::Action
}

impl ItemDocument {
    fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

impl PortDocument {
    fn to_port(&self) -> Port {
        let mut port = Port::new(&self.name, &self.type_name);
        port.original_type = self.original_type.clone();
        port.value = self
            .value
            .clone()
            .map(|v| literal_for_type(port.effective_type(), v));
        port
    }
}

/// Wrap an authored value, turning strings on `Filename` ports into paths.
pub fn literal_for_type(type_name: &str, value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::String(s) if type_name == FILENAME_TYPE => Value::path(s),
        other => Value::Literal(other),
    }
}

impl WizardDocument {
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    pub fn from_json(content: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(content).map_err(|e| e.to_string())
    }

    /// Build the graph. `fallback_name` is used when the document has no name.
    pub fn into_graph(self, fallback_name: &str) -> std::result::Result<Graph, String> {
        let name = self.name.clone().unwrap_or_else(|| fallback_name.to_string());
        let mut graph = Graph::new(name).with_mode(ExecutionMode::from_batch_flag(self.batch));

        for doc in &self.items {
            let mut item = match doc.kind {
                ItemKind::Literal => {
                    let mut outputs = doc.outputs.iter().map(PortDocument::to_port);
                    let port = outputs
                        .next()
                        .ok_or_else(|| format!("literal item '{}' has no output port", doc.name))?;
                    let mut item = Item::literal(&doc.name, port);
                    item.outputs.extend(outputs);
                    item
                }
                ItemKind::Action => {
                    let mut item = Item::action(&doc.name);
                    item.inputs = doc.inputs.iter().map(PortDocument::to_port).collect();
                    item.outputs = doc.outputs.iter().map(PortDocument::to_port).collect();
                    item
                }
            };
            item.mode = ExecutionMode::from_batch_flag(doc.batch.unwrap_or(self.batch));
            graph.push(item);
        }

        let index_of = |id: &str| {
            self.items
                .iter()
                .position(|i| i.id() == id)
                .ok_or_else(|| format!("connection references unknown item '{}'", id))
        };
        for conn in &self.connections {
            let from = index_of(&conn.from)?;
            let to = index_of(&conn.to)?;
            graph
                .connect(from, &conn.from_port, to, &conn.to_port)
                .map_err(|e| e.to_string())?;
        }

        Ok(graph)
    }
}

/// Loads wizard documents from disk, TOML or JSON by extension.
pub struct FileGraphLoader {
    base_dir: PathBuf,
}

impl FileGraphLoader {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn resolve(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl GraphLoader for FileGraphLoader {
    fn load(&self, reference: &str) -> Result<Graph> {
        let path = self.resolve(reference);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| WizardError::graph_load(reference, e))?;

        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let document = if is_json {
            WizardDocument::from_json(&content)
        } else {
            WizardDocument::from_toml(&content)
        }
        .map_err(|e| WizardError::graph_load(reference, e))?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(reference);
        document
            .into_graph(stem)
            .map_err(|e| WizardError::graph_load(reference, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCALE: &str = r#"
name = "scale"

[[items]]
id = "factor"
name = "Factor"
kind = "literal"
outputs = [{ name = "Factor", type = "double", value = 2.5 }]

[[items]]
name = "Input"
kind = "literal"
outputs = [{ name = "Input File", type = "Filename", value = "/data/a.sio" }]

[[items]]
name = "Print Value"
batch = false
inputs = [{ name = "Value", type = "double" }]

[[connections]]
from = "factor"
from_port = "Factor"
to = "Print Value"
to_port = "Value"
"#;

    #[test]
    fn builds_graph_from_toml() {
        let graph = WizardDocument::from_toml(SCALE)
            .unwrap()
            .into_graph("fallback")
            .unwrap();

        assert_eq!(graph.name, "scale");
        assert_eq!(graph.len(), 3);
        let factor = graph.item(0).unwrap();
        assert!(factor.is_literal());
        assert_eq!(factor.outputs[0].value, Some(Value::literal(2.5)));
        assert_eq!(factor.outputs[0].connections.len(), 1);

        let input = graph.item(1).unwrap();
        assert_eq!(input.outputs[0].value, Some(Value::path("/data/a.sio")));

        let print = graph.item(2).unwrap();
        assert_eq!(print.kind, ItemKind::Action);
        assert_eq!(print.mode, ExecutionMode::Interactive);
    }

    #[test]
    fn unknown_connection_target_is_rejected() {
        let doc = r#"
[[items]]
name = "A"
outputs = [{ name = "x", type = "int" }]

[[connections]]
from = "A"
from_port = "x"
to = "B"
to_port = "y"
"#;
        let err = WizardDocument::from_toml(doc)
            .unwrap()
            .into_graph("bad")
            .unwrap_err();
        assert!(err.contains("unknown item 'B'"));
    }

    #[test]
    fn literal_without_output_is_rejected() {
        let doc = r#"
[[items]]
name = "Empty"
kind = "literal"
"#;
        let result = WizardDocument::from_toml(doc).unwrap().into_graph("bad");
        assert!(result.is_err());
    }

    #[test]
    fn loader_reads_relative_reference() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("scale.toml")).unwrap();
        file.write_all(SCALE.as_bytes()).unwrap();

        let loader = FileGraphLoader::new(dir.path());
        let graph = loader.load("scale.toml").unwrap();
        assert_eq!(graph.len(), 3);

        let err = loader.load("missing.toml").unwrap_err();
        assert!(matches!(err, WizardError::GraphLoad { .. }));
    }

    #[test]
    fn loader_reads_json_and_names_from_stem() {
        let dir = tempfile::tempdir().unwrap();
        let json = r#"{"items":[{"name":"Print Value","inputs":[{"name":"Value","type":"int"}]}]}"#;
        std::fs::write(dir.path().join("solo.json"), json).unwrap();

        let graph = FileGraphLoader::new(dir.path()).load("solo.json").unwrap();
        assert_eq!(graph.name, "solo");
        assert_eq!(graph.len(), 1);
    }
}
