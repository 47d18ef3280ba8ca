//! CRUD over the configured data sources
//!
//! Operates on an already-loaded [`super::AppConfig`]; nothing here persists.
//! Callers save through the store after a successful mutation.

use uuid::Uuid;

use super::S3DataSource;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("data source '{0}' already exists")]
    DuplicateName(String),
    #[error("data source '{0}' not found")]
    NotFound(String),
    #[error("invalid data source name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}

/// Names double as driver section names and as mount path components.
fn validate_name(name: &str) -> Result<(), CatalogError> {
    let invalid = |reason| {
        Err(CatalogError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("name must not be empty");
    }
    if name.chars().any(char::is_whitespace) {
        return invalid("name must not contain whitespace");
    }
    if name.starts_with('.') {
        return invalid("name must not start with '.'");
    }
    if name.contains(['/', '\\', ':', '[', ']']) {
        return invalid("name must not contain '/', '\\', ':', '[' or ']'");
    }
    if name.chars().any(char::is_control) {
        return invalid("name must not contain control characters");
    }
    Ok(())
}

/// Read-only view over an ordered list of data sources
#[derive(Debug, Clone, Copy)]
pub struct DataSourceView<'a> {
    sources: &'a [S3DataSource],
}

impl<'a> DataSourceView<'a> {
    pub(crate) fn new(sources: &'a [S3DataSource]) -> Self {
        Self { sources }
    }

    pub fn get(&self, name: &str) -> Option<&'a S3DataSource> {
        self.sources.iter().find(|ds| ds.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn list(&self) -> &'a [S3DataSource] {
        self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Mutable catalog. Insertion order is preserved and no two entries share a
/// name after any sequence of operations.
#[derive(Debug)]
pub struct DataSourceCatalog<'a> {
    sources: &'a mut Vec<S3DataSource>,
}

impl<'a> DataSourceCatalog<'a> {
    pub(crate) fn new(sources: &'a mut Vec<S3DataSource>) -> Self {
        Self { sources }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|ds| ds.name == name)
    }

    pub fn view(&self) -> DataSourceView<'_> {
        DataSourceView::new(&self.sources[..])
    }

    /// Append a data source. Assigns a fresh id when `ds.id` is empty.
    pub fn add(&mut self, mut ds: S3DataSource) -> Result<&S3DataSource, CatalogError> {
        validate_name(&ds.name)?;
        if self.position(&ds.name).is_some() {
            return Err(CatalogError::DuplicateName(ds.name));
        }
        if ds.id.is_empty() {
            ds.id = Uuid::new_v4().to_string();
        }

        self.sources.push(ds);
        let idx = self.sources.len() - 1;
        Ok(&self.sources[idx])
    }

    pub fn remove(&mut self, name: &str) -> Result<S3DataSource, CatalogError> {
        let idx = self
            .position(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        Ok(self.sources.remove(idx))
    }

    /// Replace the entry called `name` in place, keeping its position.
    ///
    /// `ds.name` may differ from `name` (rename), but not collide with another
    /// entry. The existing id is kept when `ds.id` is empty.
    pub fn update(
        &mut self,
        name: &str,
        mut ds: S3DataSource,
    ) -> Result<&S3DataSource, CatalogError> {
        let idx = self
            .position(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;

        validate_name(&ds.name)?;
        if ds.name != name && self.position(&ds.name).is_some() {
            return Err(CatalogError::DuplicateName(ds.name));
        }
        if ds.id.is_empty() {
            ds.id = self.sources[idx].id.clone();
        }

        self.sources[idx] = ds;
        Ok(&self.sources[idx])
    }
}
