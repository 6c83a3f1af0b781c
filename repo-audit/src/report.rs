/// Append-only log of report fragments for a single run.
///
/// Fragments keep their append order; the final report is their plain
/// concatenation.
#[derive(Debug, Default)]
pub struct Report {
    fragments: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, fragment: impl Into<String>) {
        self.fragments.push(fragment.into());
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Text of the report so far, without consuming it.
    pub fn contents(&self) -> String {
        self.fragments.concat()
    }

    pub fn render(self) -> String {
        self.fragments.concat()
    }
}
