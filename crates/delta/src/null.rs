//! The do-nothing editor.

use async_trait::async_trait;

use subdav_types::{Md5, Revision};

use crate::editor::{Editor, WindowSink};
use crate::error::DeltaError;
use crate::window::DeltaWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveState {
    Open,
    Closed,
    Aborted,
}

/// An editor that accepts every operation and does nothing.
///
/// Useful as the terminal element of an editor composition and as the
/// smallest receiver that still enforces the drive lifecycle: operations
/// after `close_edit` fail, `abort_edit` is idempotent, and aborting a
/// closed edit is reported as a driver bug.
pub struct NullEditor {
    state: DriveState,
}

impl NullEditor {
    pub fn new() -> NullEditor {
        NullEditor {
            state: DriveState::Open,
        }
    }

    fn check_open(&self) -> Result<(), DeltaError> {
        match self.state {
            DriveState::Open => Ok(()),
            DriveState::Closed => Err(DeltaError::EditOrder(
                "operation after close_edit".to_string(),
            )),
            DriveState::Aborted => Err(DeltaError::EditOrder(
                "operation after abort_edit".to_string(),
            )),
        }
    }
}

impl Default for NullEditor {
    fn default() -> Self {
        NullEditor::new()
    }
}

/// Discards every window.
pub struct NullSink;

#[async_trait]
impl WindowSink for NullSink {
    async fn window(&mut self, _window: &DeltaWindow) -> Result<(), DeltaError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DeltaError> {
        Ok(())
    }
}

#[async_trait]
impl Editor for NullEditor {
    type Dir = ();
    type File = ();
    type Sink = NullSink;

    async fn set_target_revision(&mut self, _revision: Revision) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn open_root(&mut self, _base_revision: Revision) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn delete_entry(
        &mut self,
        _path: &str,
        _revision: Revision,
        _parent: &mut (),
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn add_directory(
        &mut self,
        _path: &str,
        _parent: &mut (),
        _copyfrom: Option<(&str, Revision)>,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn open_directory(
        &mut self,
        _path: &str,
        _parent: &mut (),
        _base_revision: Revision,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn change_dir_prop(
        &mut self,
        _dir: &mut (),
        _name: &str,
        _value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn close_directory(&mut self, _dir: ()) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn absent_directory(&mut self, _path: &str, _parent: &mut ()) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn add_file(
        &mut self,
        _path: &str,
        _parent: &mut (),
        _copyfrom: Option<(&str, Revision)>,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn open_file(
        &mut self,
        _path: &str,
        _parent: &mut (),
        _base_revision: Revision,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn absent_file(&mut self, _path: &str, _parent: &mut ()) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn apply_textdelta(
        &mut self,
        _file: &mut (),
        _base_checksum: Option<Md5>,
    ) -> Result<NullSink, DeltaError> {
        self.check_open()?;
        Ok(NullSink)
    }

    async fn change_file_prop(
        &mut self,
        _file: &mut (),
        _name: &str,
        _value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn close_file(&mut self, _file: (), _text_checksum: Option<Md5>) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn close_edit(&mut self) -> Result<(), DeltaError> {
        self.check_open()?;
        self.state = DriveState::Closed;
        Ok(())
    }

    async fn abort_edit(&mut self) -> Result<(), DeltaError> {
        match self.state {
            DriveState::Closed => Err(DeltaError::EditOrder(
                "abort_edit after close_edit".to_string(),
            )),
            _ => {
                self.state = DriveState::Aborted;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_drive() {
        let mut ed = NullEditor::new();
        ed.set_target_revision(Revision::new(6)).await.unwrap();
        let mut root = ed.open_root(Revision::new(5)).await.unwrap();
        let mut file = ed.add_file("hello.txt", &mut root, None).await.unwrap();
        let mut sink = ed.apply_textdelta(&mut file, None).await.unwrap();
        sink.close().await.unwrap();
        ed.close_file(file, None).await.unwrap();
        ed.close_directory(root).await.unwrap();
        ed.close_edit().await.unwrap();
    }

    #[tokio::test]
    async fn test_no_operation_after_close_edit() {
        let mut ed = NullEditor::new();
        let root = ed.open_root(Revision::INVALID).await.unwrap();
        ed.close_directory(root).await.unwrap();
        ed.close_edit().await.unwrap();
        assert!(matches!(
            ed.open_root(Revision::INVALID).await,
            Err(DeltaError::EditOrder(_))
        ));
    }

    #[tokio::test]
    async fn test_abort_is_idempotent_but_not_after_close() {
        let mut ed = NullEditor::new();
        ed.abort_edit().await.unwrap();
        ed.abort_edit().await.unwrap();

        let mut ed = NullEditor::new();
        ed.close_edit().await.unwrap();
        assert!(matches!(
            ed.abort_edit().await,
            Err(DeltaError::EditOrder(_))
        ));
    }
}
