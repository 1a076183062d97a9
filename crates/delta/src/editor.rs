//! The tree-edit protocol.
//!
//! A *drive* opens the root at some base revision, then adds, opens, and
//! mutates a tree of directory and file handles before closing them
//! bottom-up. Exactly one of [`Editor::close_edit`] or [`Editor::abort_edit`]
//! ends the drive.
//!
//! Handles are associated types owned by the driver: a handle passed to a
//! `close_*` call is consumed, so a closed handle cannot be touched again,
//! and a file operation cannot be handed a directory handle. Every operation
//! below a directory happens between its open and its close.

use async_trait::async_trait;
use subdav_types::{Md5, Revision};

use crate::error::DeltaError;
use crate::window::DeltaWindow;

/// Receives the window stream opened by [`Editor::apply_textdelta`].
///
/// The stream must be complete (`close` called) before the owning file
/// handle is closed.
#[async_trait]
pub trait WindowSink: Send {
    async fn window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError>;

    async fn close(&mut self) -> Result<(), DeltaError>;
}

/// The tree transformation callback surface.
///
/// Drivers guarantee: `open_root` precedes everything else, directories
/// close bottom-up exactly once, a replaced path arrives as `delete_entry`
/// followed by an add, and `apply_textdelta` happens at most once per opened
/// file with its window stream finished before `close_file`. Editors treat
/// violations as [`DeltaError::EditOrder`] rather than silent corruption.
///
/// Revision arguments carry the base the driver believes it holds;
/// [`Revision::INVALID`] means "HEAD" or "no particular base".
#[async_trait]
pub trait Editor: Send {
    type Dir: Send;
    type File: Send;
    type Sink: WindowSink + 'static;

    /// Announce the revision the finished tree will represent. Called at
    /// most once, before `open_root`.
    async fn set_target_revision(&mut self, revision: Revision) -> Result<(), DeltaError>;

    async fn open_root(&mut self, base_revision: Revision) -> Result<Self::Dir, DeltaError>;

    /// Remove a child of `parent`. `revision` is the base the driver thinks
    /// it has, so the receiver can detect out-of-date deletes.
    async fn delete_entry(
        &mut self,
        path: &str,
        revision: Revision,
        parent: &mut Self::Dir,
    ) -> Result<(), DeltaError>;

    /// Create a directory, optionally as a full history-preserving copy of
    /// `copyfrom` = (path, revision).
    async fn add_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<Self::Dir, DeltaError>;

    async fn open_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        base_revision: Revision,
    ) -> Result<Self::Dir, DeltaError>;

    /// Set (`Some`) or delete (`None`) a property on an open directory.
    async fn change_dir_prop(
        &mut self,
        dir: &mut Self::Dir,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError>;

    async fn close_directory(&mut self, dir: Self::Dir) -> Result<(), DeltaError>;

    /// Advisory: the child exists but the server chose not to send it
    /// (authorization).
    async fn absent_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
    ) -> Result<(), DeltaError>;

    async fn add_file(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<Self::File, DeltaError>;

    async fn open_file(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        base_revision: Revision,
    ) -> Result<Self::File, DeltaError>;

    async fn absent_file(&mut self, path: &str, parent: &mut Self::Dir)
        -> Result<(), DeltaError>;

    /// Open the window stream describing the file's new content relative to
    /// the receiver's base text. `base_checksum` pins which base the delta
    /// was computed against.
    async fn apply_textdelta(
        &mut self,
        file: &mut Self::File,
        base_checksum: Option<Md5>,
    ) -> Result<Self::Sink, DeltaError>;

    async fn change_file_prop(
        &mut self,
        file: &mut Self::File,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError>;

    /// Finalize a file. When `text_checksum` is present it is the MD5 of the
    /// complete new content and must match what the receiver computed.
    async fn close_file(
        &mut self,
        file: Self::File,
        text_checksum: Option<Md5>,
    ) -> Result<(), DeltaError>;

    /// Finalize the drive. After a successful return the edit is complete
    /// and no further operation may be issued.
    async fn close_edit(&mut self) -> Result<(), DeltaError>;

    /// Discard buffered state. Idempotent with respect to already-closed
    /// children; calling it after `close_edit` is a driver bug the editor
    /// reports.
    async fn abort_edit(&mut self) -> Result<(), DeltaError>;
}
