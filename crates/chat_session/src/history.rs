use chat_provider::{Content, Role};

/// Ordered, append-only conversation log owned by one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    entries: Vec<Content>,
}

impl ConversationHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_entries(entries: Vec<Content>) -> Self {
        Self { entries }
    }

    pub fn push(&mut self, content: Content) {
        self.entries.push(content);
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Content::from_text(text, Role::User));
    }

    pub fn push_model(&mut self, text: impl Into<String>) {
        self.push(Content::from_text(text, Role::Model));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[Content] {
        &self.entries
    }

    #[must_use]
    pub fn last(&self) -> Option<&Content> {
        self.entries.last()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<Content> {
        self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
