use crate::ir::Type;
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::{BTreeMap, HashMap},
    fmt,
};
use thiserror::Error;


pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("field '{path}' of type {ty} has no registered representation")]
    UnresolvedField { path: String, ty: Type },
    #[error("field '{path}' is registered as {tag:?}, which cannot hold a value of type {ty}")]
    IncompatibleRepresentation {
        path: String,
        ty: Type,
        tag: RepresentationTag,
    },
}

/// The scalar kinds that can be stored string-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScalarKind {
    Decimal,
    Char,
    Int32,
    Int64,
    Double,
}

/// How a field is stored on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RepresentationTag {
    /// The natural BSON form of a string, boolean, document or array.
    Native,
    /// A BSON number. Characters are code points and decimals Decimal128.
    NumericScalar,
    StringEncodedScalar(ScalarKind),
    MapAsDocument,
    MapAsArrayOfPairs,
    MapAsArrayOfEntryDocs,
}

/// The wire shape of a map-typed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapShape {
    Document,
    ArrayOfPairs,
    ArrayOfEntryDocs,
}

impl RepresentationTag {
    pub fn map_shape(self) -> Option<MapShape> {
        match self {
            RepresentationTag::MapAsDocument => Some(MapShape::Document),
            RepresentationTag::MapAsArrayOfPairs => Some(MapShape::ArrayOfPairs),
            RepresentationTag::MapAsArrayOfEntryDocs => Some(MapShape::ArrayOfEntryDocs),
            _ => None,
        }
    }

    pub fn is_string_encoded(self) -> bool {
        matches!(self, RepresentationTag::StringEncodedScalar(_))
    }

    /// The representation a value of `ty` gets when nothing else is known.
    /// `None` for types that admit several wire encodings.
    pub fn natural(ty: &Type) -> Option<Self> {
        match ty {
            Type::Int32 | Type::Int64 | Type::Double => Some(RepresentationTag::NumericScalar),
            Type::Decimal | Type::Char | Type::Dictionary(_, _) => None,
            Type::Null
            | Type::Boolean
            | Type::String
            | Type::Document
            | Type::Array(_)
            | Type::KeyValuePair(_, _)
            | Type::Grouping(_, _) => Some(RepresentationTag::Native),
        }
    }

    /// The representation of a value computed by the engine rather than read
    /// from storage: always the type's natural BSON form.
    pub fn computed(ty: &Type) -> Self {
        match ty {
            Type::Decimal | Type::Char => RepresentationTag::NumericScalar,
            Type::Dictionary(_, _) => RepresentationTag::MapAsDocument,
            t => RepresentationTag::natural(t).unwrap_or(RepresentationTag::Native),
        }
    }

    fn admits(self, ty: &Type) -> bool {
        match self {
            RepresentationTag::Native => RepresentationTag::natural(ty).is_some(),
            RepresentationTag::NumericScalar => ty.is_numeric() || *ty == Type::Char,
            RepresentationTag::StringEncodedScalar(_) => ty.is_numeric() || *ty == Type::Char,
            RepresentationTag::MapAsDocument
            | RepresentationTag::MapAsArrayOfPairs
            | RepresentationTag::MapAsArrayOfEntryDocs => {
                matches!(ty, Type::Dictionary(_, _))
            }
        }
    }
}

/// Reports the wire representation of a field. Implemented by the
/// serialization registry of the caller.
pub trait FieldRepresentationResolver: Send + Sync {
    fn resolve_representation(&self, path: &str, declared: &Type) -> Result<RepresentationTag>;
}

/// A resolver backed by an explicit map from dotted element path to tag.
/// Unregistered paths fall back to the natural representation of their type
/// unless the registry is strict.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepresentationRegistry {
    entries: BTreeMap<String, RepresentationTag>,
    #[serde(default)]
    strict: bool,
}

impl RepresentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that rejects every path it has no entry for.
    pub fn strict() -> Self {
        Self {
            entries: BTreeMap::new(),
            strict: true,
        }
    }

    pub fn with(mut self, path: &str, tag: RepresentationTag) -> Self {
        self.insert(path, tag);
        self
    }

    pub fn insert(&mut self, path: &str, tag: RepresentationTag) -> Option<RepresentationTag> {
        self.entries.insert(path.to_string(), tag)
    }

    pub fn get(&self, path: &str) -> Option<&RepresentationTag> {
        self.entries.get(path)
    }

    pub fn merge(&mut self, other: RepresentationRegistry) -> &mut Self {
        self.entries.extend(other.entries);
        self
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

impl FieldRepresentationResolver for RepresentationRegistry {
    fn resolve_representation(&self, path: &str, declared: &Type) -> Result<RepresentationTag> {
        let unresolved = || Error::UnresolvedField {
            path: path.to_string(),
            ty: declared.clone(),
        };
        match self.entries.get(path) {
            Some(tag) if tag.admits(declared) => Ok(*tag),
            Some(tag) => Err(Error::IncompatibleRepresentation {
                path: path.to_string(),
                ty: declared.clone(),
                tag: *tag,
            }),
            None if self.strict => Err(unresolved()),
            None => RepresentationTag::natural(declared).ok_or_else(unresolved),
        }
    }
}

/// Identifies a culture by its name, e.g. `en-US`. The invariant culture has
/// the empty name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CultureId(String);

impl CultureId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn invariant() -> Self {
        Self(String::new())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CultureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "(invariant)")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

pub trait CultureProvider: Send + Sync {
    fn current_culture(&self) -> CultureId;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedCulture(pub CultureId);

impl FixedCulture {
    pub fn new(name: &str) -> Self {
        Self(CultureId::new(name))
    }
}

impl CultureProvider for FixedCulture {
    fn current_culture(&self) -> CultureId {
        self.0.clone()
    }
}

/// Memoizes resolver answers for one compilation pass so each field is
/// resolved at most once.
pub(crate) struct ResolutionCache<'a> {
    resolver: &'a dyn FieldRepresentationResolver,
    resolved: RefCell<HashMap<(String, Type), RepresentationTag>>,
}

impl<'a> ResolutionCache<'a> {
    pub(crate) fn new(resolver: &'a dyn FieldRepresentationResolver) -> Self {
        Self {
            resolver,
            resolved: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn resolve(&self, path: &str, declared: &Type) -> Result<RepresentationTag> {
        let key = (path.to_string(), declared.clone());
        if let Some(tag) = self.resolved.borrow().get(&key) {
            return Ok(*tag);
        }
        let tag = self.resolver.resolve_representation(path, declared)?;
        self.resolved.borrow_mut().insert(key, tag);
        Ok(tag)
    }
}
