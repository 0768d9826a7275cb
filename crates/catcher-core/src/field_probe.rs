#![forbid(unsafe_code)]

//! Best-effort key-existence probing for values of unknown concrete type.
//!
//! Before writing a dynamically named field on a value whose type the caller
//! does not control, ask a [`FieldProber`] whether the key plausibly exists.
//! The prober never touches the value itself. It looks the value's concrete
//! type up in a [`ProbeRegistry`] and runs the registered [`TypeDescriptor`]
//! through an ordered chain of [`ProbeLayer`]s:
//!
//! 1. [`SelectorLayer`]: an accessor named after the key.
//! 2. [`PropertyLayer`]: a declared property with the key's name.
//! 3. [`IvarLayer`]: a stored field, allowing the usual storage prefixes.
//!
//! The first layer that matches wins and later layers are not consulted.
//!
//! # Semantics
//!
//! `true` means a dynamic access is plausible and worth attempting; the
//! target may still reject it. `false` means the access would very likely
//! fail and should be skipped. A miss is an ordinary answer, not an error.
//!
//! Keys are matched case-sensitively. An empty key never matches, and a value
//! whose type was never registered probes `false` for every key.

use std::any::{Any, TypeId};
use std::collections::BTreeSet;
use std::fmt;

use ahash::AHashMap;

use crate::config::ProbeConfig;

/// Name of a dynamically accessed field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FieldKey(String);

impl FieldKey {
    /// Create a key from any string-like value.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the key is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<str> for FieldKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for FieldKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Introspectable surface of one concrete type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDescriptor {
    type_name: String,
    selectors: BTreeSet<String>,
    properties: BTreeSet<String>,
    ivars: BTreeSet<String>,
}

impl TypeDescriptor {
    /// Start an empty descriptor for the named type.
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    /// Start an empty descriptor named after `T`.
    #[must_use]
    pub fn of<T: ?Sized>() -> Self {
        Self::new(std::any::type_name::<T>())
    }

    /// Add an accessor name.
    #[must_use]
    pub fn selector(mut self, name: impl Into<String>) -> Self {
        self.selectors.insert(name.into());
        self
    }

    /// Add several accessor names.
    #[must_use]
    pub fn selectors<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.selectors.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a declared property name.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.insert(name.into());
        self
    }

    /// Add several declared property names.
    #[must_use]
    pub fn properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.properties.extend(names.into_iter().map(Into::into));
        self
    }

    /// Add a stored field name, exactly as stored.
    #[must_use]
    pub fn ivar(mut self, name: impl Into<String>) -> Self {
        self.ivars.insert(name.into());
        self
    }

    /// Add several stored field names.
    #[must_use]
    pub fn ivars<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.ivars.extend(names.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    #[must_use]
    pub fn has_selector(&self, name: &str) -> bool {
        self.selectors.contains(name)
    }

    #[must_use]
    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains(name)
    }

    #[must_use]
    pub fn has_ivar(&self, name: &str) -> bool {
        self.ivars.contains(name)
    }
}

/// A type that can describe its own introspectable surface.
pub trait Introspect: Any {
    fn type_descriptor() -> TypeDescriptor;
}

/// Which layer of the chain produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeLayerKind {
    Selector,
    Property,
    Ivar,
    /// A caller-supplied layer, identified by name.
    Custom(&'static str),
}

/// One capability check in the probe chain.
pub trait ProbeLayer {
    fn kind(&self) -> ProbeLayerKind;

    /// Does `descriptor` expose something that answers to `key`?
    fn matches(&self, descriptor: &TypeDescriptor, key: &str) -> bool;
}

/// `key` with its first character upper-cased, provided the key starts with
/// a lowercase ASCII letter. Keys that do not follow camel case get no
/// derived accessor names, so `"Name"` never reaches `getName`.
fn capitalized(key: &str) -> Option<String> {
    let mut chars = key.chars();
    let first = chars.next()?;
    if !first.is_ascii_lowercase() {
        return None;
    }
    Some(first.to_ascii_uppercase().to_string() + chars.as_str())
}

/// Matches accessors: `key`, and `getKey` / `isKey` when accessor
/// conventions are enabled.
#[derive(Debug, Clone)]
pub struct SelectorLayer {
    accessor_conventions: bool,
}

impl SelectorLayer {
    #[must_use]
    pub fn new(accessor_conventions: bool) -> Self {
        Self {
            accessor_conventions,
        }
    }
}

impl Default for SelectorLayer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProbeLayer for SelectorLayer {
    fn kind(&self) -> ProbeLayerKind {
        ProbeLayerKind::Selector
    }

    fn matches(&self, descriptor: &TypeDescriptor, key: &str) -> bool {
        if descriptor.has_selector(key) {
            return true;
        }
        if !self.accessor_conventions {
            return false;
        }
        match capitalized(key) {
            Some(cap) => {
                descriptor.has_selector(&format!("get{cap}"))
                    || descriptor.has_selector(&format!("is{cap}"))
            }
            None => false,
        }
    }
}

/// Matches declared properties by exact name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyLayer;

impl ProbeLayer for PropertyLayer {
    fn kind(&self) -> ProbeLayerKind {
        ProbeLayerKind::Property
    }

    fn matches(&self, descriptor: &TypeDescriptor, key: &str) -> bool {
        descriptor.has_property(key)
    }
}

/// Matches stored fields: `key`, `<prefix>key`, and the boolean storage
/// forms `isKey` / `<prefix>isKey`.
#[derive(Debug, Clone)]
pub struct IvarLayer {
    prefixes: Vec<String>,
}

impl IvarLayer {
    #[must_use]
    pub fn new<S: Into<String>>(prefixes: impl IntoIterator<Item = S>) -> Self {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for IvarLayer {
    fn default() -> Self {
        Self::new(["_"])
    }
}

impl ProbeLayer for IvarLayer {
    fn kind(&self) -> ProbeLayerKind {
        ProbeLayerKind::Ivar
    }

    fn matches(&self, descriptor: &TypeDescriptor, key: &str) -> bool {
        let boolean_form = capitalized(key).map(|cap| format!("is{cap}"));
        let bases = std::iter::once(key).chain(boolean_form.as_deref());
        for base in bases {
            if descriptor.has_ivar(base) {
                return true;
            }
            if self
                .prefixes
                .iter()
                .any(|prefix| descriptor.has_ivar(&format!("{prefix}{base}")))
            {
                return true;
            }
        }
        false
    }
}

/// Registered schemas, keyed by concrete type.
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    descriptors: AHashMap<TypeId, TypeDescriptor>,
}

impl ProbeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a self-describing type. Re-registering replaces the schema.
    pub fn register<T: Introspect>(&mut self) -> &mut Self {
        self.descriptors
            .insert(TypeId::of::<T>(), T::type_descriptor());
        self
    }

    /// Register an explicit schema for `T`.
    pub fn register_descriptor<T: Any>(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.descriptors.insert(TypeId::of::<T>(), descriptor);
        self
    }

    /// Schema for the concrete type behind `target`, if registered.
    ///
    /// `target` must be the value itself: a `Box<dyn Any>` passed by
    /// reference resolves to the box's type, not its contents.
    #[must_use]
    pub fn descriptor_for(&self, target: &dyn Any) -> Option<&TypeDescriptor> {
        self.descriptors.get(&target.type_id())
    }

    #[must_use]
    pub fn contains<T: Any>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// What a probe found and how far down the chain it went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    /// Layer that matched, or `None` on a miss.
    pub matched: Option<ProbeLayerKind>,
    /// Number of layers asked before the chain stopped.
    pub layers_consulted: usize,
}

impl ProbeOutcome {
    const MISS: Self = Self {
        matched: None,
        layers_consulted: 0,
    };

    #[must_use]
    pub fn is_match(&self) -> bool {
        self.matched.is_some()
    }
}

/// Ordered chain of probe layers over a registry of schemas.
pub struct FieldProber {
    registry: ProbeRegistry,
    layers: Vec<Box<dyn ProbeLayer>>,
}

impl fmt::Debug for FieldProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds: Vec<_> = self.layers.iter().map(|layer| layer.kind()).collect();
        f.debug_struct("FieldProber")
            .field("registered_types", &self.registry.len())
            .field("layers", &kinds)
            .finish()
    }
}

impl FieldProber {
    /// Prober with the default selector, property, ivar chain.
    #[must_use]
    pub fn new(registry: ProbeRegistry) -> Self {
        Self::from_config(registry, &ProbeConfig::default())
    }

    /// Prober whose built-in layers follow `config`.
    #[must_use]
    pub fn from_config(registry: ProbeRegistry, config: &ProbeConfig) -> Self {
        Self::with_layers(
            registry,
            vec![
                Box::new(SelectorLayer::new(config.accessor_conventions)),
                Box::new(PropertyLayer),
                Box::new(IvarLayer::new(config.ivar_prefixes.iter().cloned())),
            ],
        )
    }

    /// Prober with a caller-supplied chain, consulted in order.
    #[must_use]
    pub fn with_layers(registry: ProbeRegistry, layers: Vec<Box<dyn ProbeLayer>>) -> Self {
        Self { registry, layers }
    }

    #[must_use]
    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ProbeRegistry {
        &mut self.registry
    }

    /// Does `key` plausibly exist on `target`?
    #[must_use]
    pub fn probe(&self, target: &dyn Any, key: impl AsRef<str>) -> bool {
        self.probe_detailed(target, key).is_match()
    }

    /// Like [`probe`](Self::probe), reporting which layer matched.
    #[must_use]
    pub fn probe_detailed(&self, target: &dyn Any, key: impl AsRef<str>) -> ProbeOutcome {
        let key = key.as_ref();
        let Some(descriptor) = self.registry.descriptor_for(target) else {
            tracing::debug!(
                target: "catcher.probe",
                key = %key,
                "probe target type not registered"
            );
            return ProbeOutcome::MISS;
        };
        self.probe_descriptor(descriptor, key)
    }

    /// Run the chain directly against a schema.
    #[must_use]
    pub fn probe_descriptor(&self, descriptor: &TypeDescriptor, key: &str) -> ProbeOutcome {
        if key.is_empty() {
            return ProbeOutcome::MISS;
        }

        let mut outcome = ProbeOutcome::MISS;
        for layer in &self.layers {
            outcome.layers_consulted += 1;
            if layer.matches(descriptor, key) {
                outcome.matched = Some(layer.kind());
                break;
            }
        }

        tracing::debug!(
            target: "catcher.probe",
            type_name = %descriptor.type_name(),
            key = %key,
            matched = ?outcome.matched,
            layers_consulted = outcome.layers_consulted,
            "probe finished"
        );
        outcome
    }

    /// Run `access` only if `key` probes as present on `target`.
    ///
    /// Returns `None` without calling `access` on a miss.
    pub fn guarded<T: Any, R>(
        &self,
        target: &mut T,
        key: impl AsRef<str>,
        access: impl FnOnce(&mut T) -> R,
    ) -> Option<R> {
        if self.probe(&*target, key) {
            Some(access(target))
        } else {
            None
        }
    }
}

impl Default for FieldProber {
    fn default() -> Self {
        Self::new(ProbeRegistry::default())
    }
}
