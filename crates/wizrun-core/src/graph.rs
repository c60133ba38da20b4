use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WizardError};
use crate::types::ExecutionMode;
use crate::value::Value;

/// Address of an input port: item index and port index within that item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub item: usize,
    pub port: usize,
}

/// A typed, named slot on an item.
///
/// Output ports carry the list of input ports they feed.
#[derive(Debug, Clone)]
pub struct Port {
    pub name: String,
    pub type_name: String,
    /// Type before widening in the editor; only used for compatibility checks.
    pub original_type: Option<String>,
    pub value: Option<Value>,
    pub connections: Vec<PortRef>,
}

impl Port {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            original_type: None,
            value: None,
            connections: Vec::new(),
        }
    }

    pub fn with_original_type(mut self, original: impl Into<String>) -> Self {
        self.original_type = Some(original.into());
        self
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Type used when matching ports against each other or against arguments.
    pub fn effective_type(&self) -> &str {
        match self.original_type.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => &self.type_name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Holds a value bound before the run; no step is invoked.
    Literal,
    /// Invokes the step registered under the item's name.
    Action,
}

/// One node of a wizard.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
    pub mode: ExecutionMode,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Item {
    pub fn action(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Action,
            mode: ExecutionMode::Batch,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// A literal item exposing `port` as its single output.
    pub fn literal(name: impl Into<String>, port: Port) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Literal,
            mode: ExecutionMode::Batch,
            inputs: Vec::new(),
            outputs: vec![port],
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn with_output(mut self, port: Port) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn is_literal(&self) -> bool {
        self.kind == ItemKind::Literal
    }

    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Reset every input and output value to nil.
    pub fn clear_ports(&mut self) {
        for port in self.inputs.iter_mut().chain(self.outputs.iter_mut()) {
            port.value = None;
        }
    }
}

/// An ordered set of items wired together by typed ports.
///
/// Items are expected to be stored producers-first. The order is trusted,
/// not verified: an item listed before its producer reads whatever its input
/// ports hold at that point.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub name: String,
    pub mode: ExecutionMode,
    items: Vec<Item>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: ExecutionMode::Batch,
            items: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Append an item and return its index.
    pub fn push(&mut self, item: Item) -> usize {
        self.items.push(item);
        self.items.len() - 1
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&Item> {
        self.items.get(index)
    }

    pub fn item_mut(&mut self, index: usize) -> Option<&mut Item> {
        self.items.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_item(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|i| i.name == name)
    }

    /// Connect output `from_port` of item `from` to input `to_port` of item `to`.
    pub fn connect(&mut self, from: usize, from_port: &str, to: usize, to_port: &str) -> Result<()> {
        let port = self
            .items
            .get(to)
            .and_then(|item| item.inputs.iter().position(|p| p.name == to_port))
            .ok_or_else(|| {
                WizardError::InvalidConnection(format!("no input port '{}' on item #{}", to_port, to))
            })?;
        let output = self
            .items
            .get_mut(from)
            .and_then(|item| item.outputs.iter_mut().find(|p| p.name == from_port))
            .ok_or_else(|| {
                WizardError::InvalidConnection(format!(
                    "no output port '{}' on item #{}",
                    from_port, from
                ))
            })?;
        output.connections.push(PortRef { item: to, port });
        Ok(())
    }

    pub fn input_port(&self, at: PortRef) -> Option<&Port> {
        self.items.get(at.item).and_then(|i| i.inputs.get(at.port))
    }

    pub fn input_port_mut(&mut self, at: PortRef) -> Option<&mut Port> {
        self.items.get_mut(at.item).and_then(|i| i.inputs.get_mut(at.port))
    }

    /// Output port of a literal item matching `name` and `type_name`.
    pub fn literal_port_mut(&mut self, name: &str, type_name: &str) -> Option<&mut Port> {
        self.items
            .iter_mut()
            .filter(|i| i.is_literal())
            .flat_map(|i| i.outputs.iter_mut())
            .find(|p| p.name == name && p.effective_type() == type_name)
    }

    /// Clear the ports of every action item. Literal values are left bound.
    pub fn clear_action_ports(&mut self) {
        for item in self.items.iter_mut().filter(|i| !i.is_literal()) {
            item.clear_ports();
        }
    }

    /// Clear the ports of every item, literals included.
    pub fn clear_all_ports(&mut self) {
        for item in self.items.iter_mut() {
            item.clear_ports();
        }
    }
}

struct GraphCell {
    graph: Mutex<Graph>,
    destroyed: AtomicBool,
}

/// A graph shared between the executor and the rest of the process.
///
/// Any holder may `destroy` it; an executor working on it notices at its
/// next item boundary.
#[derive(Clone)]
pub struct SharedGraph {
    inner: Arc<GraphCell>,
}

impl SharedGraph {
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: Arc::new(GraphCell {
                graph: Mutex::new(graph),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Invalidate the graph and drop its items.
    pub fn destroy(&self) {
        self.inner.destroyed.store(true, Ordering::SeqCst);
        let mut graph = self.lock();
        graph.items.clear();
    }

    /// Run `f` against the graph, or return `None` once it has been destroyed.
    pub fn with<R>(&self, f: impl FnOnce(&Graph) -> R) -> Option<R> {
        if !self.is_valid() {
            return None;
        }
        let graph = self.lock();
        Some(f(&graph))
    }

    /// Mutable counterpart of [`SharedGraph::with`].
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
        if !self.is_valid() {
            return None;
        }
        let mut graph = self.lock();
        Some(f(&mut graph))
    }

    fn lock(&self) -> MutexGuard<'_, Graph> {
        self.inner
            .graph
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl From<Graph> for SharedGraph {
    fn from(graph: Graph) -> Self {
        SharedGraph::new(graph)
    }
}
