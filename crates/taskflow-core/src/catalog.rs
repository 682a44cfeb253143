//! Groups and tags: small named, colored collections that tasks point into.
//!
//! Both share one store shape. Deleting an entry never touches tasks; their
//! references simply stop resolving.

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::store::{Outcome, resolve_id_prefix};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub color: String,
}

pub trait CatalogEntry: Clone {
    const KIND: &'static str;
    const SEED: [(&'static str, &'static str); 3];

    fn new(id: Uuid, name: String, color: String) -> Self;
    fn id(&self) -> Uuid;
    fn name(&self) -> &str;
    fn color(&self) -> &str;
}

impl CatalogEntry for Group {
    const KIND: &'static str = "group";
    const SEED: [(&'static str, &'static str); 3] = [
        ("Personal", "#6366f1"),
        ("Work", "#8b5cf6"),
        ("Health", "#10b981"),
    ];

    fn new(id: Uuid, name: String, color: String) -> Self {
        Self { id, name, color }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn color(&self) -> &str {
        &self.color
    }
}

impl CatalogEntry for Tag {
    const KIND: &'static str = "tag";
    const SEED: [(&'static str, &'static str); 3] = [
        ("Urgent", "#f43f5e"),
        ("Feature", "#6366f1"),
        ("Bug", "#f59e0b"),
    ];

    fn new(id: Uuid, name: String, color: String) -> Self {
        Self { id, name, color }
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn color(&self) -> &str {
        &self.color
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Catalog<T> {
    items: Vec<T>,
}

pub type GroupStore = Catalog<Group>;
pub type TagStore = Catalog<Tag>;

impl<T: CatalogEntry> Default for Catalog<T> {
    fn default() -> Self {
        Self::seeded()
    }
}

impl<T: CatalogEntry> Catalog<T> {
    /// The three first-run entries, each with a fresh id.
    pub fn seeded() -> Self {
        let items = T::SEED
            .iter()
            .map(|(name, color)| T::new(Uuid::new_v4(), name.to_string(), color.to_string()))
            .collect();
        Self { items }
    }

    pub fn empty() -> Self {
        Self { items: Vec::new() }
    }

    #[tracing::instrument(skip(self, name, color), fields(kind = T::KIND))]
    pub fn add(&mut self, name: String, color: String) -> Uuid {
        let id = Uuid::new_v4();
        self.items.push(T::new(id, name, color));
        debug!(%id, count = self.items.len(), "catalog entry added");
        id
    }

    /// Replaces the whole record with the same id.
    #[tracing::instrument(skip(self, entry), fields(kind = T::KIND, id = %entry.id()))]
    pub fn update(&mut self, entry: T) -> Outcome {
        match self.items.iter_mut().find(|item| item.id() == entry.id()) {
            Some(slot) => {
                *slot = entry;
                Outcome::Applied
            }
            None => {
                debug!("catalog entry not found; update ignored");
                Outcome::NotFound
            }
        }
    }

    #[tracing::instrument(skip(self), fields(kind = T::KIND))]
    pub fn delete(&mut self, id: Uuid) -> Outcome {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        if self.items.len() == before {
            debug!("catalog entry not found; delete ignored");
            Outcome::NotFound
        } else {
            Outcome::Applied
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Case-insensitive name lookup; the first match wins since names may repeat.
    pub fn find_by_name(&self, name: &str) -> Option<&T> {
        self.items
            .iter()
            .find(|item| item.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Name first, then an unambiguous id prefix.
    pub fn resolve(&self, token: &str) -> Option<&T> {
        self.find_by_name(token)
            .or_else(|| resolve_id_prefix(self.items.iter(), token, T::id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
