use std::collections::HashMap;

/// An ordered, append-only list of column names with a name lookup.
///
/// Indices handed out are stable: columns are never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `name` and returns its index. Duplicate names are kept as
    /// separate columns; the lookup points at the first.
    pub fn push(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        let position = self.names.len();
        self.index.entry(name.clone()).or_insert(position);
        self.names.push(name);
        position
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
