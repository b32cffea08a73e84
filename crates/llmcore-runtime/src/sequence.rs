//! Token id sequences.

/// An ordered run of token ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    ids: Vec<u32>,
}

impl TokenSequence {
    pub fn new(ids: Vec<u32>) -> Self {
        Self { ids }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.ids.last().copied()
    }

    pub fn push(&mut self, id: u32) {
        self.ids.push(id);
    }

    /// Drop ids from the right until at most `max_len` remain.
    pub fn truncate_tail(&mut self, max_len: usize) {
        self.ids.truncate(max_len);
    }

    /// Drop the oldest ids until at most `max_len` remain.
    pub fn keep_most_recent(&mut self, max_len: usize) {
        if self.ids.len() > max_len {
            let excess = self.ids.len() - max_len;
            self.ids.drain(..excess);
        }
    }

    pub fn into_ids(self) -> Vec<u32> {
        self.ids
    }
}

impl From<Vec<u32>> for TokenSequence {
    fn from(ids: Vec<u32>) -> Self {
        Self::new(ids)
    }
}
