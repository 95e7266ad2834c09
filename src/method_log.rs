//! Ordered record of the processing applied to a diagnostic

/// Separator between rendered entries
pub const METHOD_SEPARATOR: &str = "; ;";

/// Human-readable trace of processing steps
///
/// Purely informational: nothing reads it back to make numeric decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodLog {
    entries: Vec<String>,
}

impl MethodLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<String>) {
        self.entries.push(entry.into());
    }

    /// Append every entry of `other`, keeping its order
    pub fn append(&mut self, other: MethodLog) {
        self.entries.extend(other.entries);
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Numbered single-line rendering, e.g. `"(1) a; ;(2) b"`
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| format!("({}) {e}", i + 1))
            .collect::<Vec<_>>()
            .join(METHOD_SEPARATOR)
    }
}

impl From<Vec<String>> for MethodLog {
    fn from(entries: Vec<String>) -> Self {
        Self { entries }
    }
}
