//! Deduplicated set of images to fetch, keyed by fully-qualified name

use std::collections::HashMap;

/// One image to pull and the encoded credential to pull it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub image: String,
    pub credential: String,
}

/// Result of [`WorkSet::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// Name already present with the same credential.
    Duplicate,
    /// Name already present with a different credential; the first one is kept.
    Conflict,
}

/// Images confirmed absent locally, in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkSet {
    items: Vec<WorkItem>,
    index: HashMap<String, usize>,
}

impl WorkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, image: impl Into<String>, credential: impl Into<String>) -> Insertion {
        let image = image.into();
        let credential = credential.into();

        if let Some(&pos) = self.index.get(&image) {
            return if self.items[pos].credential == credential {
                Insertion::Duplicate
            } else {
                Insertion::Conflict
            };
        }

        self.index.insert(image.clone(), self.items.len());
        self.items.push(WorkItem { image, credential });
        Insertion::Added
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, image: &str) -> bool {
        self.index.contains_key(image)
    }

    pub fn credential(&self, image: &str) -> Option<&str> {
        self.index
            .get(image)
            .map(|&pos| self.items[pos].credential.as_str())
    }

    pub fn images(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.image.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkItem> {
        self.items.iter()
    }
}

impl IntoIterator for WorkSet {
    type Item = WorkItem;
    type IntoIter = std::vec::IntoIter<WorkItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
