//! Interned `alias:local` names for properties, feature types and attributes.
//!
//! # Responsibility
//! - Validate XML-style qualified names before interning them.
//! - Keep one pool per name category so equality is a pointer comparison.
//!
//! # Invariants
//! - A `QualifiedName` is never empty: both parts come from live pool entries.
//! - Two names are equal iff both their alias and local-name handles are equal.

use crate::pool::string_pool::{PoolHandle, StringPool};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

static QUALIFIED_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_.\-]*):([A-Za-z_][A-Za-z0-9_.\-]*)$")
        .expect("valid qualified name regex")
});

/// Qualified name parse errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualifiedNameError {
    Empty,
    InvalidSyntax(String),
}

impl Display for QualifiedNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "qualified name must not be empty"),
            Self::InvalidSyntax(value) => {
                write!(f, "qualified name must look like `alias:local`, got `{value}`")
            }
        }
    }
}

impl Error for QualifiedNameError {}

/// Splits `text` into `(alias, local)` after validating its syntax.
///
/// The text is matched as given; surrounding whitespace is a syntax error.
pub fn split_qualified_name(text: &str) -> Result<(&str, &str), QualifiedNameError> {
    if text.is_empty() {
        return Err(QualifiedNameError::Empty);
    }
    let captures = QUALIFIED_NAME_RE
        .captures(text)
        .ok_or_else(|| QualifiedNameError::InvalidSyntax(text.to_string()))?;
    match (captures.get(1), captures.get(2)) {
        (Some(alias), Some(local)) => Ok((alias.as_str(), local.as_str())),
        _ => Err(QualifiedNameError::InvalidSyntax(text.to_string())),
    }
}

/// Namespace alias plus local name, both interned.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    alias: PoolHandle,
    local: PoolHandle,
}

impl QualifiedName {
    pub fn alias(&self) -> &str {
        self.alias.text().unwrap_or_default()
    }

    pub fn local_name(&self) -> &str {
        self.local.text().unwrap_or_default()
    }
}

impl Display for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.alias(), self.local_name())
    }
}

impl Debug for QualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "QualifiedName({self})")
    }
}

impl Serialize for QualifiedName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

macro_rules! qualified_name_kind {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(QualifiedName);

        impl $name {
            pub fn qualified_name(&self) -> &QualifiedName {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                Display::fmt(&self.0, f)
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

qualified_name_kind!(
    /// Name of a top-level property, e.g. `gpml:reconstructionPlateId`.
    PropertyName
);
qualified_name_kind!(
    /// Type tag of a feature, e.g. `gpml:Isochron`.
    FeatureType
);
qualified_name_kind!(
    /// Name of an XML-style attribute carried by a revision.
    AttributeName
);

/// The name pools shared by every aggregate of one model.
///
/// Aliases are shared across categories; local names are pooled per category.
#[derive(Debug)]
pub struct NamePools {
    aliases: StringPool,
    property_names: StringPool,
    feature_types: StringPool,
    attribute_names: StringPool,
}

impl NamePools {
    pub fn new() -> Self {
        Self {
            aliases: StringPool::new("namespace_aliases"),
            property_names: StringPool::new("property_names"),
            feature_types: StringPool::new("feature_types"),
            attribute_names: StringPool::new("attribute_names"),
        }
    }

    pub fn property_name(&self, text: &str) -> Result<PropertyName, QualifiedNameError> {
        self.intern(text, &self.property_names).map(PropertyName)
    }

    pub fn feature_type(&self, text: &str) -> Result<FeatureType, QualifiedNameError> {
        self.intern(text, &self.feature_types).map(FeatureType)
    }

    pub fn attribute_name(&self, text: &str) -> Result<AttributeName, QualifiedNameError> {
        self.intern(text, &self.attribute_names).map(AttributeName)
    }

    pub fn aliases(&self) -> &StringPool {
        &self.aliases
    }

    pub fn property_names(&self) -> &StringPool {
        &self.property_names
    }

    pub fn feature_types(&self) -> &StringPool {
        &self.feature_types
    }

    pub fn attribute_names(&self) -> &StringPool {
        &self.attribute_names
    }

    fn intern(&self, text: &str, locals: &StringPool) -> Result<QualifiedName, QualifiedNameError> {
        let (alias, local) = split_qualified_name(text)?;
        Ok(QualifiedName {
            alias: self.aliases.insert(alias),
            local: locals.insert(local),
        })
    }
}

impl Default for NamePools {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{split_qualified_name, NamePools, QualifiedNameError};

    #[test]
    fn split_accepts_alias_and_local_name() {
        assert_eq!(
            split_qualified_name("gpml:reconstructionPlateId").expect("valid name"),
            ("gpml", "reconstructionPlateId")
        );
    }

    #[test]
    fn split_rejects_missing_alias_and_blank_text() {
        assert_eq!(split_qualified_name("").unwrap_err(), QualifiedNameError::Empty);
        assert_eq!(
            split_qualified_name("  ").unwrap_err(),
            QualifiedNameError::InvalidSyntax("  ".to_string())
        );
        assert_eq!(
            split_qualified_name("name").unwrap_err(),
            QualifiedNameError::InvalidSyntax("name".to_string())
        );
        assert!(split_qualified_name("gml:1abc").is_err());
        assert!(split_qualified_name("a:b:c").is_err());
    }

    #[test]
    fn split_rejects_surrounding_whitespace() {
        assert_eq!(
            split_qualified_name(" gpml:x ").unwrap_err(),
            QualifiedNameError::InvalidSyntax(" gpml:x ".to_string())
        );
        assert!(split_qualified_name("gpml:x\n").is_err());
    }

    #[test]
    fn same_text_interns_to_equal_names() {
        let pools = NamePools::new();
        let first = pools.property_name("gml:name").expect("valid name");
        let second = pools.property_name("gml:name").expect("valid name");

        assert_eq!(first, second);
        assert_eq!(pools.property_names().size(), 1);
        assert_eq!(pools.aliases().size(), 1);
        assert_eq!(first.to_string(), "gml:name");
    }

    #[test]
    fn categories_do_not_share_local_names() {
        let pools = NamePools::new();
        let property = pools.property_name("gpml:Isochron").expect("valid name");
        let feature_type = pools.feature_type("gpml:Isochron").expect("valid name");

        assert_eq!(property.to_string(), feature_type.to_string());
        assert_eq!(pools.property_names().size(), 1);
        assert_eq!(pools.feature_types().size(), 1);
        assert_eq!(pools.aliases().size(), 1);
    }

    #[test]
    fn dropping_names_evicts_pool_entries() {
        let pools = NamePools::new();
        let name = pools.attribute_name("xlink:href").expect("valid name");
        assert!(pools.attribute_names().contains("href"));
        drop(name);
        assert!(!pools.attribute_names().contains("href"));
        assert!(pools.aliases().is_empty());
    }
}
