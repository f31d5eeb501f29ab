//! Entity selectors: a one-token query language.
//!
//! | Token     | Matches                                          |
//! |-----------|--------------------------------------------------|
//! | `*`       | every entity                                     |
//! | `@name`   | entities whose name is exactly `name`            |
//! | `#id`     | the entity with that UUID                        |
//! | `.text`   | entities whose type name contains `text`, any case |
//!
//! Anything else is rejected with [`Error::InvalidSelector`]. Parsing happens
//! once, up front, so an invalid selector fails before any entity is visited.

use std::fmt;

use uuid::Uuid;

use crate::ecs::entity::Entity;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Any,
    Name(String),
    Id(Uuid),
    /// Lowercased type-name substring.
    TypeContains(String),
    /// Well-formed but unable to match (`@` with no name, `#` with a bad id).
    Nothing,
}

impl Selector {
    pub fn parse(selector: &str) -> Result<Self> {
        if selector == "*" {
            return Ok(Selector::Any);
        }
        let mut chars = selector.chars();
        let first = chars.next();
        let rest = chars.as_str();
        match first {
            Some('@') if rest.is_empty() => Ok(Selector::Nothing),
            Some('@') => Ok(Selector::Name(rest.to_string())),
            // Only the hyphenated lowercase spelling names an id.
            Some('#') => Ok(Uuid::parse_str(rest)
                .ok()
                .filter(|id| id.to_string() == rest)
                .map_or(Selector::Nothing, Selector::Id)),
            Some('.') => Ok(Selector::TypeContains(rest.to_lowercase())),
            _ => Err(Error::InvalidSelector(selector.to_string())),
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        match self {
            Selector::Any => true,
            Selector::Name(name) => entity.name() == name,
            Selector::Id(id) => entity.id() == *id,
            Selector::TypeContains(needle) => entity.type_name().to_lowercase().contains(needle),
            Selector::Nothing => false,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Any => f.write_str("*"),
            Selector::Name(name) => write!(f, "@{name}"),
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::TypeContains(text) => write!(f, ".{text}"),
            Selector::Nothing => f.write_str("<nothing>"),
        }
    }
}

/// Lazy filter over a sequence of entities. See [`filter_entities`].
pub struct FilterEntities<I> {
    inner: I,
    selector: Selector,
}

impl<'a, I> Iterator for FilterEntities<I>
where
    I: Iterator<Item = &'a Entity>,
{
    type Item = &'a Entity;

    fn next(&mut self) -> Option<Self::Item> {
        let selector = &self.selector;
        self.inner.find(|entity| selector.matches(entity))
    }
}

/// Filter any sequence of entities by a selector string.
///
/// The selector is validated before the sequence is touched.
pub fn filter_entities<'a, I>(entities: I, selector: &str) -> Result<FilterEntities<I::IntoIter>>
where
    I: IntoIterator<Item = &'a Entity>,
{
    Ok(FilterEntities {
        inner: entities.into_iter(),
        selector: Selector::parse(selector)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(Selector::parse("*").unwrap(), Selector::Any);
        assert_eq!(Selector::parse("@bob").unwrap(), Selector::Name("bob".into()));
        assert_eq!(Selector::parse("@").unwrap(), Selector::Nothing);
        assert_eq!(
            Selector::parse(".ShIp").unwrap(),
            Selector::TypeContains("ship".into())
        );
        let id = Uuid::new_v4();
        assert_eq!(Selector::parse(&format!("#{id}")).unwrap(), Selector::Id(id));
        assert_eq!(Selector::parse("#not-an-id").unwrap(), Selector::Nothing);
    }

    #[test]
    fn id_must_be_spelled_exactly() {
        let id = Uuid::new_v4();
        let spellings = [
            id.to_string().to_uppercase(),
            id.simple().to_string(),
            id.braced().to_string(),
            id.urn().to_string(),
        ];
        for spelling in spellings {
            assert_eq!(
                Selector::parse(&format!("#{spelling}")).unwrap(),
                Selector::Nothing,
                "{spelling} should not name {id}"
            );
        }
    }

    #[test]
    fn invalid_selectors() {
        for bad in ["!foo", "", "name", "**"] {
            assert!(
                matches!(Selector::parse(bad), Err(Error::InvalidSelector(_))),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn filter_rejects_before_iterating() {
        let empty: Vec<&Entity> = Vec::new();
        assert!(filter_entities(empty.iter().copied(), "!foo").is_err());
        let empty: Vec<&Entity> = Vec::new();
        assert_eq!(filter_entities(empty, ".x").unwrap().count(), 0);
    }

    #[test]
    fn multibyte_prefix_is_invalid() {
        assert!(Selector::parse("ébc").is_err());
        assert_eq!(Selector::parse("@é").unwrap(), Selector::Name("é".into()));
    }
}
