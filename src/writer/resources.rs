//! Shared Resources dictionary registry.
//!
//! Tracks every font, image, graphics state, optional-content group and
//! imported resource by resource name → object reference. Each entry owns
//! exactly one object number, already written when it is registered.

use crate::object::{Dictionary, Object, ObjectRef};
use indexmap::IndexMap;

/// Resource categories of a Resources dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// `/Font`
    Font,
    /// `/XObject` (images and forms)
    XObject,
    /// `/ExtGState`
    ExtGState,
    /// `/Properties` (optional-content groups)
    Properties,
    /// `/ColorSpace`
    ColorSpace,
    /// `/Pattern`
    Pattern,
    /// `/Shading`
    Shading,
}

impl ResourceKind {
    /// All kinds, in Resources dictionary order.
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Font,
        ResourceKind::XObject,
        ResourceKind::ExtGState,
        ResourceKind::Properties,
        ResourceKind::ColorSpace,
        ResourceKind::Pattern,
        ResourceKind::Shading,
    ];

    /// Key of this category in a Resources dictionary.
    pub fn dict_key(self) -> &'static str {
        match self {
            ResourceKind::Font => "Font",
            ResourceKind::XObject => "XObject",
            ResourceKind::ExtGState => "ExtGState",
            ResourceKind::Properties => "Properties",
            ResourceKind::ColorSpace => "ColorSpace",
            ResourceKind::Pattern => "Pattern",
            ResourceKind::Shading => "Shading",
        }
    }

    /// Category for a Resources dictionary key.
    pub fn from_dict_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.dict_key() == key)
    }

    /// Prefix of generated resource names.
    pub fn prefix(self) -> &'static str {
        match self {
            ResourceKind::Font => "F",
            ResourceKind::XObject => "I",
            ResourceKind::ExtGState => "GS",
            ResourceKind::Properties => "OC",
            ResourceKind::ColorSpace => "CS",
            ResourceKind::Pattern => "P",
            ResourceKind::Shading => "Sh",
        }
    }
}

/// Resource name → object reference, per category.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    entries: IndexMap<ResourceKind, IndexMap<String, Object>>,
    counters: IndexMap<ResourceKind, u32>,
}

impl ResourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object under a generated name (`F1`, `I2`, ...).
    pub fn register(&mut self, kind: ResourceKind, r: ObjectRef) -> String {
        let name = loop {
            let counter = self.counters.entry(kind).or_insert(0);
            *counter += 1;
            let candidate = format!("{}{}", kind.prefix(), counter);
            if !self.contains(kind, &candidate) {
                break candidate;
            }
        };
        self.insert(kind, &name, Object::Reference(r));
        name
    }

    /// Register under `preferred`, or under `<prefix><object number>` when
    /// `preferred` is already taken by something else. Returns the name used.
    pub fn register_named(&mut self, kind: ResourceKind, preferred: &str, value: Object) -> String {
        match self.get(kind, preferred) {
            None => {
                self.insert(kind, preferred, value);
                return preferred.to_string();
            },
            Some(existing) if *existing == value => return preferred.to_string(),
            Some(_) => {},
        }

        let base = match value.as_reference() {
            Some(r) => format!("{}{}", kind.prefix(), r.id),
            None => format!("{}{}", preferred, kind.prefix()),
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while self.contains(kind, &name) {
            suffix += 1;
            name = format!("{}_{}", base, suffix);
        }
        log::debug!("Resource /{} renamed to /{} to avoid a collision", preferred, name);
        self.insert(kind, &name, value);
        name
    }

    fn insert(&mut self, kind: ResourceKind, name: &str, value: Object) {
        self.entries
            .entry(kind)
            .or_default()
            .insert(name.to_string(), value);
    }

    /// Whether a name is taken in a category.
    pub fn contains(&self, kind: ResourceKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    /// Value registered under a name.
    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<&Object> {
        self.entries.get(&kind).and_then(|m| m.get(name))
    }

    /// Entries of one category, in registration order.
    pub fn entries(&self, kind: ResourceKind) -> impl Iterator<Item = (&String, &Object)> {
        self.entries.get(&kind).into_iter().flat_map(|m| m.iter())
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|m| m.is_empty())
    }

    /// Build the shared Resources dictionary.
    pub fn to_dictionary(&self) -> Dictionary {
        let mut dict = Dictionary::new().with(
            "ProcSet",
            Object::Array(
                ["PDF", "Text", "ImageB", "ImageC", "ImageI"]
                    .into_iter()
                    .map(Object::name)
                    .collect(),
            ),
        );
        for kind in ResourceKind::ALL {
            let Some(entries) = self.entries.get(&kind).filter(|m| !m.is_empty()) else {
                continue;
            };
            let sub: Dictionary = entries
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            dict.insert(kind.dict_key(), sub);
        }
        dict
    }
}
