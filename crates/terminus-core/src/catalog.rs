//! The fixed catalog of claimable items.

use crate::error::CatalogError;
use std::collections::HashSet;
use std::sync::Arc;

/// Built-in catalog: Paris metro stations.
const PARIS_METRO: &str = include_str!("../data/paris-metro.txt");

/// Immutable, ordered set of claimable item names.
///
/// Built once at startup and shared read-only for the life of the process.
#[derive(Debug, Clone)]
pub struct Catalog {
    items: Vec<Arc<str>>,
    index: HashSet<Arc<str>>,
}

impl Catalog {
    /// Build a catalog from names in the given order.
    ///
    /// Names are trimmed, blank names skipped, and later duplicates dropped.
    pub fn new<I, S>(names: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut items = Vec::new();
        let mut index = HashSet::new();

        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            let name: Arc<str> = Arc::from(name);
            if index.insert(Arc::clone(&name)) {
                items.push(name);
            } else {
                tracing::warn!("Dropping duplicate catalog entry: {}", name);
            }
        }

        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        Ok(Self { items, index })
    }

    /// Parse the line format: one item per line, `#` starts a comment line.
    pub fn parse(text: &str) -> Result<Self, CatalogError> {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.starts_with('#')),
        )
    }

    /// The built-in Paris metro catalog.
    pub fn paris_metro() -> Result<Self, CatalogError> {
        Self::parse(PARIS_METRO)
    }

    /// Membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains(name)
    }

    /// Canonical shared handle for a catalog name.
    pub fn get(&self, name: &str) -> Option<Arc<str>> {
        self.index.get(name).cloned()
    }

    /// All items in catalog order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<str>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
