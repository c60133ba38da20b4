//! Port type compatibility.
//!
//! Each [`SubtypeRegistry`] describes one independent kind hierarchy
//! (elements, descriptors, views, ...) as a closure table mapping every kind
//! to the set of its ancestors. The [`TypeResolver`] consults them in a fixed
//! order to decide whether a produced value may flow into a consumer port.

use std::collections::{HashMap, HashSet};

use wizrun_core::config::RegistryConfig;
use wizrun_core::value::Value;

/// One kind hierarchy with a single root kind.
#[derive(Debug, Clone)]
pub struct SubtypeRegistry {
    name: String,
    root: String,
    ancestors: HashMap<String, HashSet<String>>,
}

impl SubtypeRegistry {
    /// Build a registry from direct parent declarations.
    ///
    /// The ancestor closure is computed once here. The root is always known
    /// even if no kind declares it.
    pub fn new<I, K, P>(name: impl Into<String>, root: impl Into<String>, parents: I) -> Self
    where
        I: IntoIterator<Item = (K, Vec<P>)>,
        K: Into<String>,
        P: Into<String>,
    {
        let root = root.into();
        let mut direct: HashMap<String, Vec<String>> = parents
            .into_iter()
            .map(|(k, ps)| (k.into(), ps.into_iter().map(Into::into).collect()))
            .collect();
        direct.entry(root.clone()).or_default();

        let ancestors = direct
            .keys()
            .map(|kind| (kind.clone(), closure_of(kind, &direct)))
            .collect();

        Self {
            name: name.into(),
            root,
            ancestors,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.root.clone(),
            config.kinds.iter().map(|(k, ps)| (k.clone(), ps.clone())),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.ancestors.contains_key(kind)
    }

    /// Whether `kind` is `ancestor` or one of its registered subtypes.
    pub fn is_kind_of(&self, kind: &str, ancestor: &str) -> bool {
        match self.ancestors.get(kind) {
            Some(set) => kind == ancestor || set.contains(ancestor),
            None => false,
        }
    }
}

fn closure_of(kind: &str, direct: &HashMap<String, Vec<String>>) -> HashSet<String> {
    let mut seen = HashSet::new();
    let mut stack: Vec<&str> = direct
        .get(kind)
        .map(|ps| ps.iter().map(String::as_str).collect())
        .unwrap_or_default();

    while let Some(parent) = stack.pop() {
        if parent == kind || !seen.insert(parent.to_string()) {
            continue;
        }
        if let Some(grand) = direct.get(parent) {
            stack.extend(grand.iter().map(String::as_str));
        }
    }
    seen
}

/// Why a connection was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    /// Declared types are identical.
    Exact,
    /// Accepted by the named registry.
    Registry(String),
}

/// Decides whether a produced value may flow into a connected consumer port.
#[derive(Debug, Clone)]
pub struct TypeResolver {
    registries: Vec<SubtypeRegistry>,
}

impl TypeResolver {
    /// A resolver without any registry; only exact type matches pass.
    pub fn exact_only() -> Self {
        Self {
            registries: Vec::new(),
        }
    }

    /// Resolver with the built-in element, descriptor, view and layer hierarchies.
    pub fn builtin() -> Self {
        Self {
            registries: builtin_registries(),
        }
    }

    /// Built-in registries followed by the configured ones.
    pub fn from_config(extra: &[RegistryConfig]) -> Self {
        let mut resolver = Self::builtin();
        for config in extra {
            resolver.push(SubtypeRegistry::from_config(config));
        }
        resolver
    }

    /// Append a registry; it is consulted after the existing ones.
    pub fn push(&mut self, registry: SubtypeRegistry) {
        self.registries.push(registry);
    }

    pub fn with_registry(mut self, registry: SubtypeRegistry) -> Self {
        self.push(registry);
        self
    }

    pub fn registries(&self) -> &[SubtypeRegistry] {
        &self.registries
    }

    /// Check a single connection.
    ///
    /// `producer` and `consumer` are the effective declared types of the two
    /// ports and `value` is what the producer currently holds. Each registry
    /// first compares the declared types; failing that, when the producer's
    /// type belongs to the registry's root, the live value's concrete kind is
    /// compared against the consumer type instead.
    pub fn check(&self, producer: &str, consumer: &str, value: Option<&Value>) -> Option<Compatibility> {
        if producer == consumer {
            return Some(Compatibility::Exact);
        }

        let live_kind = value.and_then(Value::concrete_kind);
        self.registries
            .iter()
            .find(|registry| {
                if registry.is_kind_of(producer, consumer) {
                    return true;
                }
                match live_kind {
                    Some(kind) if registry.is_kind_of(producer, registry.root()) => {
                        registry.is_kind_of(kind, consumer)
                    }
                    _ => false,
                }
            })
            .map(|registry| Compatibility::Registry(registry.name().to_string()))
    }

    pub fn is_compatible(&self, producer: &str, consumer: &str, value: Option<&Value>) -> bool {
        self.check(producer, consumer, value).is_some()
    }
}

impl Default for TypeResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

fn builtin_registries() -> Vec<SubtypeRegistry> {
    vec![
        SubtypeRegistry::new(
            "element",
            "DataElement",
            [
                ("RasterElement", vec!["DataElement"]),
                ("Signature", vec!["DataElement"]),
                ("SignatureSet", vec!["Signature"]),
                ("SignatureLibrary", vec!["SignatureSet"]),
                ("GraphicElement", vec!["DataElement"]),
                ("AoiElement", vec!["GraphicElement"]),
                ("AnnotationElement", vec!["GraphicElement"]),
                ("GcpList", vec!["DataElement"]),
                ("TiePointList", vec!["DataElement"]),
                ("DataElementGroup", vec!["DataElement"]),
            ],
        ),
        SubtypeRegistry::new(
            "data_descriptor",
            "DataDescriptor",
            [
                ("RasterDataDescriptor", vec!["DataDescriptor"]),
                ("SignatureDataDescriptor", vec!["DataDescriptor"]),
            ],
        ),
        SubtypeRegistry::new(
            "file_descriptor",
            "FileDescriptor",
            [
                ("RasterFileDescriptor", vec!["FileDescriptor"]),
                ("SignatureFileDescriptor", vec!["FileDescriptor"]),
            ],
        ),
        SubtypeRegistry::new(
            "view",
            "View",
            [
                ("PerspectiveView", vec!["View"]),
                ("OrthographicView", vec!["View"]),
                ("SpatialDataView", vec!["PerspectiveView"]),
                ("ProductView", vec!["PerspectiveView"]),
                ("PlotView", vec!["OrthographicView"]),
            ],
        ),
        SubtypeRegistry::new(
            "layer",
            "Layer",
            [
                ("RasterLayer", vec!["Layer"]),
                ("PseudocolorLayer", vec!["Layer"]),
                ("ThresholdLayer", vec!["Layer"]),
                ("GraphicLayer", vec!["Layer"]),
                ("AoiLayer", vec!["GraphicLayer"]),
                ("AnnotationLayer", vec!["GraphicLayer"]),
                ("LatLonLayer", vec!["Layer"]),
                ("TiePointLayer", vec!["Layer"]),
                ("GcpLayer", vec!["Layer"]),
            ],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use wizrun_core::value::Handle;

    #[test]
    fn closure_is_transitive() {
        let resolver = TypeResolver::builtin();
        let element = &resolver.registries()[0];
        assert!(element.is_kind_of("SignatureLibrary", "Signature"));
        assert!(element.is_kind_of("SignatureLibrary", "DataElement"));
        assert!(element.is_kind_of("DataElement", "DataElement"));
        assert!(!element.is_kind_of("Signature", "SignatureLibrary"));
        assert!(!element.is_kind_of("SpatialDataView", "View"));
    }

    #[test]
    fn cyclic_declarations_terminate() {
        let registry = SubtypeRegistry::new("odd", "A", [("B", vec!["C"]), ("C", vec!["B", "A"])]);
        assert!(registry.is_kind_of("B", "A"));
        assert!(registry.is_kind_of("C", "B"));
    }

    #[test]
    fn exact_match_needs_no_registry() {
        let resolver = TypeResolver::exact_only();
        assert_eq!(resolver.check("int", "int", None), Some(Compatibility::Exact));
        assert_eq!(resolver.check("int", "double", None), None);
    }

    #[test]
    fn declared_subtype_flows_to_supertype() {
        let resolver = TypeResolver::builtin();
        assert_eq!(
            resolver.check("RasterElement", "DataElement", None),
            Some(Compatibility::Registry("element".into()))
        );
        assert_eq!(
            resolver.check("SpatialDataView", "View", None),
            Some(Compatibility::Registry("view".into()))
        );
        assert_eq!(
            resolver.check("AoiLayer", "GraphicLayer", None),
            Some(Compatibility::Registry("layer".into()))
        );
        assert!(resolver.check("DataElement", "RasterElement", None).is_none());
    }

    #[test]
    fn widened_producer_uses_live_kind() {
        let resolver = TypeResolver::builtin();
        let raster = Value::Handle(Handle::new("RasterElement", ()));
        let signature = Value::Handle(Handle::new("Signature", ()));

        assert_eq!(
            resolver.check("DataElement", "RasterElement", Some(&raster)),
            Some(Compatibility::Registry("element".into()))
        );
        assert!(resolver.check("DataElement", "RasterElement", Some(&signature)).is_none());
        assert!(resolver.check("DataElement", "RasterElement", None).is_none());

        let descriptor = Value::Handle(Handle::new("RasterFileDescriptor", ()));
        assert_eq!(
            resolver.check("FileDescriptor", "RasterFileDescriptor", Some(&descriptor)),
            Some(Compatibility::Registry("file_descriptor".into()))
        );
    }

    #[test]
    fn live_kind_ignored_outside_the_root_hierarchy() {
        let resolver = TypeResolver::builtin();
        let raster = Value::Handle(Handle::new("RasterElement", ()));
        assert!(resolver.check("string", "RasterElement", Some(&raster)).is_none());
    }

    #[test]
    fn configured_registry_is_consulted_last() {
        let mut kinds = HashMap::new();
        kinds.insert("Spectrum".to_string(), vec!["Measurement".to_string()]);
        let resolver = TypeResolver::from_config(&[RegistryConfig {
            name: "lab".into(),
            root: "Measurement".into(),
            kinds,
        }]);

        assert_eq!(resolver.registries().len(), 6);
        assert_eq!(
            resolver.check("Spectrum", "Measurement", None),
            Some(Compatibility::Registry("lab".into()))
        );
    }
}
