use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::traits::ProgressSink;

/// A reference to a live object produced by a step, tagged with the
/// concrete kind it was created as (e.g. `RasterElement`).
///
/// Compatibility between ports is decided from the kind alone; the payload
/// is only ever read back by the steps that understand it.
#[derive(Clone)]
pub struct Handle {
    kind: String,
    inner: Arc<dyn Any + Send + Sync>,
}

impl Handle {
    pub fn new<T: Any + Send + Sync>(kind: impl Into<String>, payload: T) -> Self {
        Self {
            kind: kind.into(),
            inner: Arc::new(payload),
        }
    }

    /// Concrete runtime kind of the referenced object.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").field("kind", &self.kind).finish()
    }
}

/// The value carried by a port or an argument.
#[derive(Clone)]
pub enum Value {
    /// Plain data (numbers, strings, lists) as authored in a wizard or batch file.
    Literal(serde_json::Value),
    /// A file system path.
    Path(PathBuf),
    /// A typed handle to a live object.
    Handle(Handle),
    /// A progress sink, either the run's own or one returned by a step.
    Progress(Arc<dyn ProgressSink>),
}

impl Value {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Value::Literal(value.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Value::Path(path.into())
    }

    /// Concrete kind of a typed handle; `None` for every other value.
    pub fn concrete_kind(&self) -> Option<&str> {
        match self {
            Value::Handle(h) => Some(h.kind()),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Literal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_literal().and_then(|v| v.as_i64())
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_literal().and_then(|v| v.as_f64())
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_literal().and_then(|v| v.as_str())
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            Value::Handle(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_progress(&self) -> Option<&Arc<dyn ProgressSink>> {
        match self {
            Value::Progress(p) => Some(p),
            _ => None,
        }
    }

    /// Short human readable rendering used in log lines.
    pub fn describe(&self) -> String {
        match self {
            Value::Literal(serde_json::Value::String(s)) => s.clone(),
            Value::Literal(v) => v.to_string(),
            Value::Path(p) => p.display().to_string(),
            Value::Handle(h) => format!("<{}>", h.kind()),
            Value::Progress(_) => "<progress>".to_string(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Value::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Value::Handle(h) => f.debug_tuple("Handle").field(h).finish(),
            Value::Progress(_) => f.write_str("Progress(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Literal(a), Value::Literal(b)) => a == b,
            (Value::Path(a), Value::Path(b)) => a == b,
            (Value::Handle(a), Value::Handle(b)) => a.ptr_eq(b),
            (Value::Progress(a), Value::Progress(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Raster {
        bands: usize,
    }

    #[test]
    fn handle_kind_and_downcast() {
        let handle = Handle::new("RasterElement", Raster { bands: 7 });
        let value = Value::Handle(handle.clone());

        assert_eq!(value.concrete_kind(), Some("RasterElement"));
        assert_eq!(handle.downcast_ref::<Raster>().map(|r| r.bands), Some(7));
        assert!(handle.downcast_ref::<String>().is_none());
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = Handle::new("View", ());
        let b = Handle::new("View", ());
        assert_eq!(Value::Handle(a.clone()), Value::Handle(a.clone()));
        assert_ne!(Value::Handle(a), Value::Handle(b));
    }

    #[test]
    fn literal_accessors() {
        assert_eq!(Value::literal(5).as_i64(), Some(5));
        assert_eq!(Value::literal(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::literal("cube").as_str(), Some("cube"));
        assert_eq!(Value::literal("cube").concrete_kind(), None);
        assert_eq!(Value::path("/tmp/a.sio").describe(), "/tmp/a.sio");
    }
}
