//! Building and transmitting the working copy's state report.
//!
//! The caller describes what it holds through a [`Reporter`]; entries are
//! appended to a temp file as they arrive so arbitrarily large working
//! copies never buffer the report in memory. `finish_report` sends the file
//! as a REPORT against the VCC and replays the response into the editor.

use std::io::Write;

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use subdav_delta::Editor;
use subdav_types::Revision;

use crate::error::RaError;
use crate::session::{RequestBody, Session};
use crate::update::{drive_report_response, DriveOptions};
use crate::xml::{escape_attr, escape_cdata};

const REPORT_HEAD: &str = concat!(
    r#"<S:update-report send-all="true" xmlns:S="svn:">"#,
    "\n"
);
const REPORT_TAIL: &str = "</S:update-report>\n";

/// What kind of drive the report asks the server for.
struct ReportKind {
    target_revision: Revision,
    target: String,
    dst_path: Option<String>,
    recurse: bool,
    ignore_ancestry: bool,
    resource_walk: bool,
    fetch_content: bool,
    is_switch: bool,
}

/// Accumulates per-path state statements and runs the exchange.
pub struct Reporter<'s, E: Editor> {
    session: &'s Session,
    editor: E,
    body: NamedTempFile,
    options: DriveOptions,
}

impl<'s, E: Editor> Reporter<'s, E> {
    fn create(session: &'s Session, editor: E, kind: ReportKind) -> Result<Reporter<'s, E>, RaError> {
        let mut body = match session.working_copy().tmp_dir() {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        body.write_all(REPORT_HEAD.as_bytes())?;
        write!(
            body,
            "<S:src-path>{}</S:src-path>\n",
            escape_cdata(session.url().as_str())
        )?;
        if let Some(rev) = kind.target_revision.number() {
            write!(body, "<S:target-revision>{}</S:target-revision>\n", rev)?;
        }
        if !kind.target.is_empty() {
            write!(
                body,
                "<S:update-target>{}</S:update-target>\n",
                escape_cdata(&kind.target)
            )?;
        }
        if let Some(dst) = &kind.dst_path {
            write!(body, "<S:dst-path>{}</S:dst-path>\n", escape_cdata(dst))?;
        }
        if !kind.recurse {
            body.write_all(b"<S:recursive>no</S:recursive>\n")?;
        }
        if kind.ignore_ancestry {
            body.write_all(b"<S:ignore-ancestry>yes</S:ignore-ancestry>\n")?;
        }
        if kind.resource_walk {
            body.write_all(b"<S:resource-walk>yes</S:resource-walk>\n")?;
        }
        Ok(Reporter {
            session,
            editor,
            body,
            options: DriveOptions {
                target: kind.target,
                is_switch: kind.is_switch,
                fetch_content: kind.fetch_content,
            },
        })
    }

    /// "I have `path` at `revision`." `start_empty` marks a directory whose
    /// contents should be transmitted from scratch.
    pub fn set_path(
        &mut self,
        path: &str,
        revision: Revision,
        start_empty: bool,
    ) -> Result<(), RaError> {
        let rev = revision
            .number()
            .ok_or_else(|| RaError::BadFilename("report entries need a concrete revision".into()))?;
        if start_empty {
            write!(
                self.body,
                "<S:entry rev=\"{}\" start-empty=\"true\">{}</S:entry>\n",
                rev,
                escape_cdata(path)
            )?;
        } else {
            write!(
                self.body,
                "<S:entry rev=\"{}\">{}</S:entry>\n",
                rev,
                escape_cdata(path)
            )?;
        }
        Ok(())
    }

    /// "`path` is switched to `url` at `revision`."
    pub async fn link_path(
        &mut self,
        path: &str,
        url: &str,
        revision: Revision,
        start_empty: bool,
    ) -> Result<(), RaError> {
        let rev = revision
            .number()
            .ok_or_else(|| RaError::BadFilename("report entries need a concrete revision".into()))?;
        // The server wants the link as a path inside the revision's
        // baseline, not as a public URL.
        let info = self
            .session
            .get_baseline_info(url, revision, false)
            .await?;
        if start_empty {
            write!(
                self.body,
                "<S:entry rev=\"{}\" linkpath=\"/{}\" start-empty=\"true\">{}</S:entry>\n",
                rev,
                escape_attr(&info.bc_relative),
                escape_cdata(path)
            )?;
        } else {
            write!(
                self.body,
                "<S:entry rev=\"{}\" linkpath=\"/{}\">{}</S:entry>\n",
                rev,
                escape_attr(&info.bc_relative),
                escape_cdata(path)
            )?;
        }
        Ok(())
    }

    /// "I do not have `path`."
    pub fn delete_path(&mut self, path: &str) -> Result<(), RaError> {
        write!(self.body, "<S:missing>{}</S:missing>\n", escape_cdata(path))?;
        Ok(())
    }

    /// Transmit the report and drive the editor from the response. Returns
    /// the editor when the drive completed.
    #[instrument(level = "debug", skip(self))]
    pub async fn finish_report(mut self) -> Result<E, RaError> {
        self.body.write_all(REPORT_TAIL.as_bytes())?;
        self.body.flush()?;

        // The REPORT goes to the VCC, not to the session URL.
        let vcc = match self.session.cached_vcc() {
            Some(vcc) => vcc,
            None => {
                self.session
                    .get_starting_props(self.session.root_path())
                    .await?;
                self.session.cached_vcc().ok_or_else(|| {
                    RaError::IncompleteData("no version-controlled-configuration found".into())
                })?
            }
        };

        let body = RequestBody::File {
            content_type: "text/xml",
            path: self.body.path().to_path_buf(),
        };
        debug!(vcc = %vcc, "dispatching update REPORT");
        let resp = self
            .session
            .dispatch("REPORT", &vcc, Some(&body), &[], &[], false)
            .await?;
        let text = resp.body_str()?;
        drive_report_response(self.session, &mut self.editor, text, &self.options).await?;
        Ok(self.editor)
    }

    /// Drop the report without transmitting it. The edit is aborted.
    pub async fn abort_report(mut self) -> Result<(), RaError> {
        self.editor.abort_edit().await.map_err(RaError::from)?;
        Ok(())
    }
}

impl Session {
    /// Report-and-update: bring the editor's tree to `revision` (HEAD when
    /// invalid).
    pub fn do_update<E: Editor>(
        &self,
        editor: E,
        revision: Revision,
        target: &str,
        recurse: bool,
    ) -> Result<Reporter<'_, E>, RaError> {
        Reporter::create(
            self,
            editor,
            ReportKind {
                target_revision: revision,
                target: target.to_string(),
                dst_path: None,
                recurse,
                ignore_ancestry: false,
                resource_walk: false,
                fetch_content: true,
                is_switch: false,
            },
        )
    }

    /// Like update, but without content: the editor only learns what would
    /// change.
    pub fn do_status<E: Editor>(
        &self,
        editor: E,
        revision: Revision,
        target: &str,
        recurse: bool,
    ) -> Result<Reporter<'_, E>, RaError> {
        Reporter::create(
            self,
            editor,
            ReportKind {
                target_revision: revision,
                target: target.to_string(),
                dst_path: None,
                recurse,
                ignore_ancestry: false,
                resource_walk: false,
                fetch_content: false,
                is_switch: false,
            },
        )
    }

    /// Rewire the working copy onto `switch_url` at `revision`.
    pub fn do_switch<E: Editor>(
        &self,
        editor: E,
        revision: Revision,
        target: &str,
        switch_url: &str,
        recurse: bool,
    ) -> Result<Reporter<'_, E>, RaError> {
        Reporter::create(
            self,
            editor,
            ReportKind {
                target_revision: revision,
                target: target.to_string(),
                dst_path: Some(switch_url.to_string()),
                recurse,
                ignore_ancestry: true,
                resource_walk: true,
                fetch_content: true,
                is_switch: true,
            },
        )
    }

    /// Diff drive against `versus_url` at `revision`.
    pub fn do_diff<E: Editor>(
        &self,
        editor: E,
        revision: Revision,
        target: &str,
        versus_url: &str,
        recurse: bool,
        ignore_ancestry: bool,
    ) -> Result<Reporter<'_, E>, RaError> {
        Reporter::create(
            self,
            editor,
            ReportKind {
                target_revision: revision,
                target: target.to_string(),
                dst_path: Some(versus_url.to_string()),
                recurse,
                ignore_ancestry,
                resource_walk: false,
                fetch_content: true,
                is_switch: false,
            },
        )
    }
}
