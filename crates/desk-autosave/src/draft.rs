//! Editable draft of one entity

/// Latest user intent and last durably saved value of an entity
///
/// `current` always holds the freshest edit; `committed` only advances on
/// a confirmed commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditableDraft<T> {
    current: T,
    committed: T,
}

impl<T: Clone + PartialEq> EditableDraft<T> {
    /// Open a draft whose baseline is `value`
    #[inline]
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            current: value.clone(),
            committed: value,
        }
    }

    /// Latest edited value
    #[inline]
    #[must_use]
    pub fn current(&self) -> &T {
        &self.current
    }

    /// Last value known to be saved
    #[inline]
    #[must_use]
    pub fn committed(&self) -> &T {
        &self.committed
    }

    /// Replace the edited value
    #[inline]
    pub fn set_current(&mut self, value: T) {
        self.current = value;
    }

    /// Record a confirmed commit of `value`
    #[inline]
    pub fn mark_committed(&mut self, value: T) {
        self.committed = value;
    }

    /// Whether `value` differs from the saved baseline
    #[inline]
    #[must_use]
    pub fn differs_from_committed(&self, value: &T) -> bool {
        *value != self.committed
    }

    /// Whether the latest edit is unsaved
    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.differs_from_committed(&self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_draft_is_clean() {
        let draft = EditableDraft::new(vec![1, 2]);
        assert!(!draft.is_dirty());
        assert_eq!(draft.current(), draft.committed());
    }

    #[test]
    fn committed_only_moves_on_confirmation() {
        let mut draft = EditableDraft::new("a".to_string());
        draft.set_current("ab".to_string());

        assert!(draft.is_dirty());
        assert_eq!(draft.committed(), "a");

        draft.mark_committed("ab".to_string());
        assert!(!draft.is_dirty());
    }

    #[test]
    fn reverted_edit_is_not_a_change() {
        let mut draft = EditableDraft::new(("name", 3));
        draft.set_current(("name", 4));
        draft.set_current(("name", 3));
        assert!(!draft.is_dirty());
    }
}
