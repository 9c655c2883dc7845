//! Typed service keys.
//!
//! A [`Key`] is the sole lookup identity for services: a value type plus an
//! optional [`Qualifier`] tag that distinguishes several providers of the
//! same type.
//!
//! ```
//! use lodestar_service::key::Key;
//!
//! let plain = Key::of::<String>();
//! let tagged = Key::qualified::<String>("greeting");
//!
//! assert_ne!(plain, tagged);
//! assert_eq!(plain, Key::qualified::<String>(""));
//! assert_eq!(tagged.to_string(), "alloc::string::String@greeting");
//! ```

use core::any::TypeId;
use core::hash::{Hash, Hasher};
use std::borrow::Cow;

use crate::service::Service;

/// A tag distinguishing two providers of the same value type.
///
/// The empty tag is not a qualifier: constructing a [`Key`] with an empty
/// qualifier yields the unqualified key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier(Cow<'static, str>);

impl Qualifier {
    /// Creates a qualifier from a static or owned string.
    #[must_use]
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn normalize(self) -> Option<Self> {
        if self.0.is_empty() { None } else { Some(self) }
    }
}

impl From<&'static str> for Qualifier {
    fn from(tag: &'static str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for Qualifier {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

impl core::fmt::Display for Qualifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a provided value: its type and an optional qualifier.
///
/// Equality and hashing are structural over the type and the qualifier. The
/// type name is carried for diagnostics only.
#[derive(Clone)]
pub struct Key {
    type_id: TypeId,
    type_name: &'static str,
    qualifier: Option<Qualifier>,
}

impl Key {
    /// Creates the unqualified key for `T`.
    #[must_use]
    pub fn of<T: Service>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            qualifier: None,
        }
    }

    /// Creates a key for `T` qualified by `qualifier`.
    ///
    /// An empty qualifier produces the same key as [`Key::of`].
    #[must_use]
    pub fn qualified<T: Service>(qualifier: impl Into<Qualifier>) -> Self {
        Self::of::<T>().with_qualifier(qualifier)
    }

    /// Returns this key with its qualifier replaced.
    #[must_use]
    pub fn with_qualifier(mut self, qualifier: impl Into<Qualifier>) -> Self {
        self.qualifier = qualifier.into().normalize();
        self
    }

    /// Returns this key with its qualifier removed.
    #[must_use]
    pub fn without_qualifier(mut self) -> Self {
        self.qualifier = None;
        self
    }

    /// Returns the `TypeId` of the value type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the value type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the qualifier, if any.
    #[must_use]
    pub fn qualifier(&self) -> Option<&Qualifier> {
        self.qualifier.as_ref()
    }

    /// Returns `true` if this key carries a qualifier.
    #[must_use]
    pub fn is_qualified(&self) -> bool {
        self.qualifier.is_some()
    }

    /// Returns `true` if both keys name the same value type.
    #[must_use]
    pub fn same_type(&self, other: &Key) -> bool {
        self.type_id == other.type_id
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.qualifier == other.qualifier
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.qualifier.hash(state);
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{}@{qualifier}", self.type_name),
            None => f.write_str(self.type_name),
        }
    }
}

impl core::fmt::Debug for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Key({self})")
    }
}
