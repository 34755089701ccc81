// 🔒 Edit Session - Lock / edit / save lifecycle over one document
// Exactly one session exists per open document. It owns the document,
// gates every registry mutation on the session state, tracks dirtiness
// by structural comparison against a baseline snapshot, and exposes the
// navigation-guard contract the host must run before leaving an edit.

use crate::document::{Document, DocumentKey};
use crate::registry::SchemaError;
use crate::store::DocumentStore;
use anyhow::{Context, Result};
use std::fmt;

// ============================================================================
// STATES & ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Read-only, the default
    Locked,
    /// Mutations allowed, dirtiness tracked
    Editing,
    /// Figures finalized; supersedes Locked/Editing and requires an
    /// explicit unlock confirmation to leave
    EstimateLocked,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Locked => "locked",
            SessionState::Editing => "editing",
            SessionState::EstimateLocked => "estimate-locked",
        }
    }
}

/// Non-fatal session rejections
///
/// A mutation attempted in the wrong state reports one of these instead
/// of panicking, so the host can surface a consistent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Mutation attempted while not in Editing
    NotEditable,
    /// The estimate lock is active; mutations and beginEdit are refused
    EstimateLockActive,
    /// Transition requested from a state that does not allow it
    InvalidTransition {
        from: SessionState,
        action: &'static str,
    },
    /// The baseline snapshot failed to parse; the edit is kept open
    SnapshotUnreadable,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NotEditable => write!(f, "Session is not editable"),
            SessionError::EstimateLockActive => {
                write!(f, "Estimate is locked; unlock it before editing")
            }
            SessionError::InvalidTransition { from, action } => {
                write!(f, "Cannot {} while {}", action, from.as_str())
            }
            SessionError::SnapshotUnreadable => {
                write!(f, "Unsaved-changes snapshot could not be restored")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Either gate failure or registry rejection, from `mutate`
#[derive(Debug, Clone, PartialEq)]
pub enum EditError {
    Session(SessionError),
    Schema(SchemaError),
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::Session(e) => write!(f, "{}", e),
            EditError::Schema(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for EditError {}

// ============================================================================
// NAVIGATION GUARD
// ============================================================================

/// The three-way choice presented when leaving a dirty edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationChoice {
    /// Stay; navigation is refused
    KeepEditing,
    /// Throw away unsaved changes and leave
    Discard,
    /// Persist first; leave only if the save succeeds
    SaveAndLeave,
}

/// Marker returned by `unlock_estimate`
///
/// Unlocking has a side effect outside this core: the owning entity's
/// approval status must be reverted. This core only signals that the
/// downstream change is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "the owning entity's approval status must be reverted"]
pub struct EstimateUnlock {
    pub approval_reset_required: bool,
}

// ============================================================================
// EDIT SESSION
// ============================================================================

/// Lock/dirty/save state layered over one document
pub struct EditSession {
    state: SessionState,
    document: Document,
    /// Serialized snapshot of the last loaded or saved state
    baseline_json: String,
    baseline_fingerprint: String,
    /// Reason of the last rejected operation; host reads and clears
    last_rejection: Option<String>,
}

impl EditSession {
    /// Start a session over a document, Locked, with a clean baseline
    pub fn new(document: Document) -> Self {
        let baseline_json = document.canonical_json();
        let baseline_fingerprint = document.fingerprint();
        EditSession {
            state: SessionState::Locked,
            document,
            baseline_json,
            baseline_fingerprint,
            last_rejection: None,
        }
    }

    /// Load (or default) the document for a key and open a session on it
    pub fn open(store: &dyn DocumentStore, key: &DocumentKey) -> Result<Self> {
        let document = store
            .load(key)
            .with_context(|| format!("Failed to load document for '{}'", key.entity_id))?;
        Ok(EditSession::new(document))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reading is always allowed, in any state
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Unsaved changes? Structural comparison against the baseline,
    /// not per-mutation tracking.
    pub fn is_dirty(&self) -> bool {
        self.document.fingerprint() != self.baseline_fingerprint
    }

    /// Reason of the most recently rejected operation, cleared on read
    pub fn take_last_rejection(&mut self) -> Option<String> {
        self.last_rejection.take()
    }

    // ------------------------------------------------------------------------
    // Mutation gate
    // ------------------------------------------------------------------------

    /// Run one registry operation if and only if the session is Editing
    ///
    /// Any rejection (wrong state or schema error) is recorded as the
    /// last-rejection reason and returned; the document is unchanged.
    pub fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut Document) -> Result<T, SchemaError>,
    ) -> Result<T, EditError> {
        let gate = match self.state {
            SessionState::Editing => Ok(()),
            SessionState::EstimateLocked => Err(SessionError::EstimateLockActive),
            SessionState::Locked => Err(SessionError::NotEditable),
        };
        if let Err(e) = gate {
            self.last_rejection = Some(e.to_string());
            return Err(EditError::Session(e));
        }

        match op(&mut self.document) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.last_rejection = Some(e.to_string());
                Err(EditError::Schema(e))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    /// Locked → Editing. Refused while the estimate lock is active.
    pub fn begin_edit(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::EstimateLocked => {
                self.last_rejection = Some(SessionError::EstimateLockActive.to_string());
                Err(SessionError::EstimateLockActive)
            }
            _ => {
                self.state = SessionState::Editing;
                Ok(())
            }
        }
    }

    /// Editing → Locked, persisting through the store
    ///
    /// Stamps `last_modified`, saves, then refreshes the baseline and
    /// clears dirtiness. On store failure the session stays Editing and
    /// dirty; the baseline is untouched.
    pub fn save(&mut self, store: &dyn DocumentStore, key: &DocumentKey) -> Result<()> {
        if self.state != SessionState::Editing {
            let e = SessionError::InvalidTransition {
                from: self.state,
                action: "save",
            };
            self.last_rejection = Some(e.to_string());
            return Err(e.into());
        }

        self.document.last_modified = chrono::Utc::now();
        store
            .save(key, &self.document)
            .with_context(|| format!("Failed to save document for '{}'", key.entity_id))?;

        self.baseline_json = self.document.canonical_json();
        self.baseline_fingerprint = self.document.fingerprint();
        self.state = SessionState::Locked;
        Ok(())
    }

    /// Editing → Locked, restoring the document from the baseline
    pub fn discard(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Editing {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "discard",
            });
        }
        // The baseline was produced by canonical_json, so this only
        // fails if the snapshot was corrupted; the session then stays
        // Editing rather than silently keeping the mutated document
        let document = Document::from_json(&self.baseline_json)
            .map_err(|_| SessionError::SnapshotUnreadable)?;
        self.document = document;
        self.state = SessionState::Locked;
        Ok(())
    }

    /// Locked → EstimateLocked
    ///
    /// Call only after the host obtained explicit user confirmation;
    /// leaving this state requires the separate unlock confirmation.
    pub fn lock_estimate(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Locked {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "lock the estimate",
            });
        }
        self.state = SessionState::EstimateLocked;
        Ok(())
    }

    /// EstimateLocked → Editing, after the second explicit confirmation
    pub fn unlock_estimate(&mut self) -> Result<EstimateUnlock, SessionError> {
        if self.state != SessionState::EstimateLocked {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                action: "unlock the estimate",
            });
        }
        self.state = SessionState::Editing;
        Ok(EstimateUnlock {
            approval_reset_required: true,
        })
    }

    // ------------------------------------------------------------------------
    // Navigation guard
    // ------------------------------------------------------------------------

    /// Run before any action that would abandon the current edit
    ///
    /// Resolves `true` when navigation may proceed. Clean sessions pass
    /// straight through. Dirty ones suspend on `decide`, which may block
    /// indefinitely while the host asks the user; the outcome maps to:
    /// keep editing (`false`), discard (revert + `true`), or
    /// save-and-leave (`true` only if the save succeeds - a failed save
    /// keeps the session Editing and returns the error).
    pub fn check_before_navigate(
        &mut self,
        store: &dyn DocumentStore,
        key: &DocumentKey,
        decide: impl FnOnce() -> NavigationChoice,
    ) -> Result<bool> {
        if self.state != SessionState::Editing || !self.is_dirty() {
            return Ok(true);
        }

        match decide() {
            NavigationChoice::KeepEditing => Ok(false),
            NavigationChoice::Discard => {
                self.discard()?;
                Ok(true)
            }
            NavigationChoice::SaveAndLeave => {
                self.save(store, key)?;
                Ok(true)
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentSide;
    use crate::store::MemoryStore;
    use anyhow::anyhow;

    /// Store whose saves always fail, for the persistence-error paths
    struct FailingStore;

    impl DocumentStore for FailingStore {
        fn load(&self, key: &DocumentKey) -> Result<Document> {
            Ok(Document::default_template(key.side))
        }
        fn save(&self, _key: &DocumentKey, _document: &Document) -> Result<()> {
            Err(anyhow!("backing store unavailable"))
        }
    }

    fn fresh_session() -> (EditSession, DocumentKey) {
        let key = DocumentKey::new("project-1", DocumentSide::Revenue);
        let session = EditSession::new(Document::default_template(DocumentSide::Revenue));
        (session, key)
    }

    fn first_category_id(session: &EditSession) -> String {
        session.document().categories[0].id.clone()
    }

    #[test]
    fn test_locked_by_default_and_mutations_rejected() {
        let (mut session, _) = fresh_session();
        assert_eq!(session.state(), SessionState::Locked);

        let result = session.mutate(|doc| Ok(doc.add_category("Extras")));
        assert!(matches!(
            result,
            Err(EditError::Session(SessionError::NotEditable))
        ));
        assert!(session.take_last_rejection().is_some());
        assert!(session.take_last_rejection().is_none()); // cleared on read
    }

    #[test]
    fn test_edit_mutate_and_dirty_tracking() {
        let (mut session, _) = fresh_session();
        session.begin_edit().unwrap();
        assert!(!session.is_dirty());

        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();
        assert!(session.is_dirty());
    }

    #[test]
    fn test_save_clears_dirty_and_locks() {
        let (mut session, key) = fresh_session();
        let store = MemoryStore::new();

        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        session.save(&store, &key).unwrap();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(!session.is_dirty());

        // Round-trip: what was saved is what we hold
        let reloaded = store.load(&key).unwrap();
        assert_eq!(reloaded, *session.document());
    }

    #[test]
    fn test_failed_save_keeps_editing_and_dirty() {
        let (mut session, key) = fresh_session();
        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        assert!(session.save(&FailingStore, &key).is_err());
        assert_eq!(session.state(), SessionState::Editing);
        assert!(session.is_dirty());
    }

    #[test]
    fn test_discard_restores_baseline_exactly() {
        let (mut session, _) = fresh_session();
        let baseline = session.document().clone();

        session.begin_edit().unwrap();
        let cat_id = first_category_id(&session);
        session.mutate(|doc| doc.add_item(&cat_id)).unwrap();
        session
            .mutate(|doc| doc.rename_category(&cat_id, "Mangled"))
            .unwrap();
        assert!(session.is_dirty());

        session.discard().unwrap();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(!session.is_dirty());
        assert_eq!(*session.document(), baseline);
    }

    #[test]
    fn test_discard_with_corrupt_snapshot_keeps_editing() {
        let (mut session, _) = fresh_session();
        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();
        let mutated = session.document().clone();

        session.baseline_json = "not a document".to_string();

        let err = session.discard().unwrap_err();
        assert_eq!(err, SessionError::SnapshotUnreadable);
        // The edit stays open and nothing was silently dropped
        assert_eq!(session.state(), SessionState::Editing);
        assert_eq!(*session.document(), mutated);
    }

    #[test]
    fn test_estimate_lock_blocks_everything() {
        let (mut session, _) = fresh_session();
        let before = session.document().canonical_json();

        session.lock_estimate().unwrap();
        assert_eq!(session.state(), SessionState::EstimateLocked);

        assert!(matches!(
            session.begin_edit(),
            Err(SessionError::EstimateLockActive)
        ));
        let result = session.mutate(|doc| Ok(doc.add_category("Extras")));
        assert!(matches!(
            result,
            Err(EditError::Session(SessionError::EstimateLockActive))
        ));
        // Document byte-for-byte unchanged
        assert_eq!(session.document().canonical_json(), before);
    }

    #[test]
    fn test_unlock_requires_estimate_lock_and_flags_downstream() {
        let (mut session, _) = fresh_session();
        assert!(session.unlock_estimate().is_err());

        session.lock_estimate().unwrap();
        let unlock = session.unlock_estimate().unwrap();
        assert!(unlock.approval_reset_required);
        assert_eq!(session.state(), SessionState::Editing);
    }

    #[test]
    fn test_guard_passes_through_when_clean() {
        let (mut session, key) = fresh_session();
        let store = MemoryStore::new();

        // Never consulted when clean
        let ok = session
            .check_before_navigate(&store, &key, || panic!("must not prompt"))
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_guard_keep_editing() {
        let (mut session, key) = fresh_session();
        let store = MemoryStore::new();
        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        let ok = session
            .check_before_navigate(&store, &key, || NavigationChoice::KeepEditing)
            .unwrap();
        assert!(!ok);
        assert_eq!(session.state(), SessionState::Editing);
        assert!(session.is_dirty());
    }

    #[test]
    fn test_guard_discard_reverts_and_unblocks() {
        let (mut session, key) = fresh_session();
        let store = MemoryStore::new();
        let baseline = session.document().clone();

        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        let ok = session
            .check_before_navigate(&store, &key, || NavigationChoice::Discard)
            .unwrap();
        assert!(ok);
        assert_eq!(session.state(), SessionState::Locked);
        assert_eq!(*session.document(), baseline);
    }

    #[test]
    fn test_guard_save_and_leave() {
        let (mut session, key) = fresh_session();
        let store = MemoryStore::new();
        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        let ok = session
            .check_before_navigate(&store, &key, || NavigationChoice::SaveAndLeave)
            .unwrap();
        assert!(ok);
        assert_eq!(session.state(), SessionState::Locked);
        assert_eq!(store.load(&key).unwrap(), *session.document());
    }

    #[test]
    fn test_guard_save_failure_keeps_caller_blocked() {
        let (mut session, key) = fresh_session();
        session.begin_edit().unwrap();
        session.mutate(|doc| Ok(doc.add_category("Extras"))).unwrap();

        let result =
            session.check_before_navigate(&FailingStore, &key, || NavigationChoice::SaveAndLeave);
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Editing);
        assert!(session.is_dirty());
    }

    #[test]
    fn test_open_resets_baseline_from_store() {
        let store = MemoryStore::new();
        let key = DocumentKey::new("project-2", DocumentSide::Cost);

        let session = EditSession::open(&store, &key).unwrap();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(!session.is_dirty());
        // Empty store yields the default template for the side
        assert!(!session.document().categories.is_empty());
    }
}
