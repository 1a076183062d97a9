//! A logging decorator for editors.

use async_trait::async_trait;

use subdav_types::{Md5, Revision};
use tracing::{debug, info, trace};

use crate::editor::{Editor, WindowSink};
use crate::error::DeltaError;
use crate::window::DeltaWindow;

/// Wraps a downstream editor and narrates each operation before delegating.
///
/// Semantics are untouched; the wrapper only adds one log line per call and
/// a trace event per delta window, so a drive can be watched without
/// instrumenting the real receiver.
pub struct TraceEditor<E> {
    inner: E,
}

/// Handle wrapper carrying the path for later log lines.
pub struct Traced<H> {
    inner: H,
    path: String,
}

impl<E> TraceEditor<E> {
    pub fn new(inner: E) -> TraceEditor<E> {
        TraceEditor { inner }
    }

    pub fn into_inner(self) -> E {
        self.inner
    }
}

pub struct TraceSink<S> {
    inner: S,
    path: String,
    windows: u64,
}

#[async_trait]
impl<S: WindowSink> WindowSink for TraceSink<S> {
    async fn window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError> {
        self.windows += 1;
        trace!(path = %self.path, bytes = window.target_len, "transmitting file data");
        self.inner.window(window).await
    }

    async fn close(&mut self) -> Result<(), DeltaError> {
        debug!(path = %self.path, windows = self.windows, "file data transmitted");
        self.inner.close().await
    }
}

#[async_trait]
impl<E: Editor> Editor for TraceEditor<E> {
    type Dir = Traced<E::Dir>;
    type File = Traced<E::File>;
    type Sink = TraceSink<E::Sink>;

    async fn set_target_revision(&mut self, revision: Revision) -> Result<(), DeltaError> {
        debug!(%revision, "target revision");
        self.inner.set_target_revision(revision).await
    }

    async fn open_root(&mut self, base_revision: Revision) -> Result<Self::Dir, DeltaError> {
        debug!(base = %base_revision, "opening root");
        let inner = self.inner.open_root(base_revision).await?;
        Ok(Traced {
            inner,
            path: String::new(),
        })
    }

    async fn delete_entry(
        &mut self,
        path: &str,
        revision: Revision,
        parent: &mut Self::Dir,
    ) -> Result<(), DeltaError> {
        info!("Deleting   {path}");
        self.inner.delete_entry(path, revision, &mut parent.inner).await
    }

    async fn add_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<Self::Dir, DeltaError> {
        match copyfrom {
            Some((from, rev)) => info!("Adding     {path} (copied from {from}@{rev})"),
            None => info!("Adding     {path}"),
        }
        let inner = self.inner.add_directory(path, &mut parent.inner, copyfrom).await?;
        Ok(Traced {
            inner,
            path: path.to_string(),
        })
    }

    async fn open_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        base_revision: Revision,
    ) -> Result<Self::Dir, DeltaError> {
        debug!(path, base = %base_revision, "opening directory");
        let inner = self
            .inner
            .open_directory(path, &mut parent.inner, base_revision)
            .await?;
        Ok(Traced {
            inner,
            path: path.to_string(),
        })
    }

    async fn change_dir_prop(
        &mut self,
        dir: &mut Self::Dir,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        debug!(path = %dir.path, name, deleted = value.is_none(), "directory property");
        self.inner.change_dir_prop(&mut dir.inner, name, value).await
    }

    async fn close_directory(&mut self, dir: Self::Dir) -> Result<(), DeltaError> {
        debug!(path = %dir.path, "closing directory");
        self.inner.close_directory(dir.inner).await
    }

    async fn absent_directory(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
    ) -> Result<(), DeltaError> {
        info!("Skipping   {path} (absent)");
        self.inner.absent_directory(path, &mut parent.inner).await
    }

    async fn add_file(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<Self::File, DeltaError> {
        match copyfrom {
            Some((from, rev)) => info!("Adding     {path} (copied from {from}@{rev})"),
            None => info!("Adding     {path}"),
        }
        let inner = self.inner.add_file(path, &mut parent.inner, copyfrom).await?;
        Ok(Traced {
            inner,
            path: path.to_string(),
        })
    }

    async fn open_file(
        &mut self,
        path: &str,
        parent: &mut Self::Dir,
        base_revision: Revision,
    ) -> Result<Self::File, DeltaError> {
        info!("Updating   {path}");
        let inner = self
            .inner
            .open_file(path, &mut parent.inner, base_revision)
            .await?;
        Ok(Traced {
            inner,
            path: path.to_string(),
        })
    }

    async fn absent_file(&mut self, path: &str, parent: &mut Self::Dir) -> Result<(), DeltaError> {
        info!("Skipping   {path} (absent)");
        self.inner.absent_file(path, &mut parent.inner).await
    }

    async fn apply_textdelta(
        &mut self,
        file: &mut Self::File,
        base_checksum: Option<Md5>,
    ) -> Result<Self::Sink, DeltaError> {
        info!("Transmitting file data for {}", file.path);
        let inner = self
            .inner
            .apply_textdelta(&mut file.inner, base_checksum)
            .await?;
        Ok(TraceSink {
            inner,
            path: file.path.clone(),
            windows: 0,
        })
    }

    async fn change_file_prop(
        &mut self,
        file: &mut Self::File,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        debug!(path = %file.path, name, deleted = value.is_none(), "file property");
        self.inner.change_file_prop(&mut file.inner, name, value).await
    }

    async fn close_file(
        &mut self,
        file: Self::File,
        text_checksum: Option<Md5>,
    ) -> Result<(), DeltaError> {
        debug!(path = %file.path, "closing file");
        self.inner.close_file(file.inner, text_checksum).await
    }

    async fn close_edit(&mut self) -> Result<(), DeltaError> {
        info!("Edit complete");
        self.inner.close_edit().await
    }

    async fn abort_edit(&mut self) -> Result<(), DeltaError> {
        info!("Edit aborted");
        self.inner.abort_edit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::NullEditor;
    use crate::window::fulltext_windows;

    #[tokio::test]
    async fn test_trace_preserves_semantics() {
        let mut ed = TraceEditor::new(NullEditor::new());
        ed.set_target_revision(Revision::new(2)).await.unwrap();
        let mut root = ed.open_root(Revision::new(1)).await.unwrap();
        let mut dir = ed.add_directory("sub", &mut root, None).await.unwrap();
        let mut file = ed
            .add_file("sub/a.txt", &mut dir, Some(("trunk/a.txt", Revision::new(1))))
            .await
            .unwrap();
        let mut sink = ed.apply_textdelta(&mut file, None).await.unwrap();
        for w in fulltext_windows(b"payload") {
            sink.window(&w).await.unwrap();
        }
        sink.close().await.unwrap();
        ed.close_file(file, Some(Md5::digest(b"payload"))).await.unwrap();
        ed.close_directory(dir).await.unwrap();
        ed.close_directory(root).await.unwrap();
        ed.close_edit().await.unwrap();

        // lifecycle violations still surface through the wrapper
        assert!(matches!(
            ed.abort_edit().await,
            Err(DeltaError::EditOrder(_))
        ));
    }
}
