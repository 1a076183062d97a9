//! The commit driver: an editor whose operations become WebDAV methods
//! against a server-side activity.
//!
//! Lifecycle of one commit: MKACTIVITY a fresh UUID under the activity
//! collection, CHECKOUT the current baseline and PROPPATCH the log message
//! onto it, then map each editor call onto the working resources produced by
//! further CHECKOUTs (MKCOL, COPY, DELETE, PUT, PROPPATCH). `close_edit`
//! MERGEs the activity and reads the new revision out of the response;
//! the activity is deleted on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use subdav_delta::svndiff::SVNDIFF_MIME_TYPE;
use subdav_delta::{DeltaError, DeltaWindow, Editor, SvndiffWriter, WindowSink};
use subdav_types::{path as repo_path, props as client_props, Md5, Revision};

use crate::error::RaError;
use crate::session::{
    RequestBody, Session, CAPABILITIES, DEPTH_HEADER, DESTINATION_HEADER, SVN_BASE_FULLTEXT_MD5_HEADER,
    SVN_OPTIONS_HEADER, SVN_RESULT_FULLTEXT_MD5_HEADER, SVN_VERSION_NAME_HEADER,
};
use crate::xml::{self, escape_cdata, NS_DAV};

/// What the server told us about the committed revision.
#[derive(Debug, Clone)]
pub struct CommitInfo {
    pub revision: Revision,
    pub date: Option<DateTime<Utc>>,
    pub author: Option<String>,
}

/// Invoked once with the outcome of a successful commit.
pub type CommitCallback = Box<dyn FnOnce(&CommitInfo) + Send + Sync>;

/// The three URLs a committable resource may carry.
///
/// `url` is the public path-keyed one; `vsn_url` the immutable version
/// resource (cached in the working copy between sessions); `wr_url` the
/// mutable working resource living inside the activity, present only after
/// a CHECKOUT.
#[derive(Debug, Clone)]
struct Resource {
    revision: Revision,
    url: String,
    vsn_url: Option<String>,
    wr_url: Option<String>,
    local_path: String,
}

impl Resource {
    fn working_url(&self) -> Result<&str, RaError> {
        self.wr_url.as_deref().ok_or_else(|| {
            RaError::IncompleteData(format!(
                "no working resource for '{}'",
                self.local_path
            ))
        })
    }
}

struct PutStage {
    body: NamedTempFile,
    base_checksum: Option<Md5>,
}

type SharedPut = Arc<Mutex<Option<PutStage>>>;

/// Directory handle of a commit drive.
pub struct CommitDir {
    rsrc: Resource,
    created: bool,
    prop_set: Vec<(String, Vec<u8>)>,
    prop_delete: Vec<String>,
}

/// File handle of a commit drive.
pub struct CommitFile {
    rsrc: Resource,
    prop_set: Vec<(String, Vec<u8>)>,
    prop_delete: Vec<String>,
    put: SharedPut,
    delta_applied: bool,
}

/// Window sink staging the svndiff PUT body into a temp file.
pub struct CommitTextSink {
    writer: Option<SvndiffWriter<NamedTempFile>>,
    stage: SharedPut,
    base_checksum: Option<Md5>,
}

#[async_trait]
impl WindowSink for CommitTextSink {
    async fn window(&mut self, window: &DeltaWindow) -> Result<(), DeltaError> {
        match self.writer.as_mut() {
            Some(w) => w.write_window(window),
            None => Err(DeltaError::EditOrder(
                "window after the delta stream was closed".to_string(),
            )),
        }
    }

    async fn close(&mut self) -> Result<(), DeltaError> {
        let writer = self.writer.take().ok_or_else(|| {
            DeltaError::EditOrder("delta stream closed twice".to_string())
        })?;
        let body = writer.into_inner()?;
        *self.stage.lock().unwrap() = Some(PutStage {
            body,
            base_checksum: self.base_checksum,
        });
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriveState {
    Open,
    Closed,
    Aborted,
}

/// The editor a caller drives to commit.
pub struct CommitEditor<'s> {
    session: &'s Session,
    activity_url: String,
    log_message: String,
    /// Paths actually touched by this drive; the value records whether the
    /// whole subtree was (a copied directory registers recursively).
    valid_targets: HashMap<String, bool>,
    state: DriveState,
    commit_info: Option<CommitInfo>,
    callback: Option<CommitCallback>,
    disable_merge_response: bool,
}

impl Session {
    /// Create an activity, attach the log message, and hand back the editor
    /// for the caller to drive.
    #[instrument(level = "debug", skip(self, log_message, callback))]
    pub async fn get_commit_editor(
        &self,
        log_message: &str,
        callback: Option<CommitCallback>,
    ) -> Result<CommitEditor<'_>, RaError> {
        let activity_url = self.create_activity().await?;
        let mut editor = CommitEditor {
            session: self,
            activity_url,
            log_message: log_message.to_string(),
            valid_targets: HashMap::new(),
            state: DriveState::Open,
            commit_info: None,
            callback,
            disable_merge_response: !self.working_copy().stores_wc_props(),
        };
        if let Err(err) = editor.apply_log_message().await {
            // The activity exists by now; do not leak it.
            return Err(editor.teardown_after(err).await);
        }
        Ok(editor)
    }

    /// Where new activities may be created, preferring the cached value.
    async fn get_activity_collection(&self, force: bool) -> Result<String, RaError> {
        if !force {
            if let Some(cached) = self
                .working_copy()
                .get_wc_prop("", client_props::LP_ACTIVITY_URL)
                .await?
            {
                if let Ok(url) = String::from_utf8(cached) {
                    return Ok(url);
                }
            }
        }
        let body = RequestBody::Xml(
            r#"<?xml version="1.0" encoding="utf-8"?><D:options xmlns:D="DAV:"><D:activity-collection-set/></D:options>"#
                .to_string(),
        );
        let mut headers: Vec<(&str, String)> = Vec::new();
        for capability in CAPABILITIES {
            headers.push(("DAV", capability.to_string()));
        }
        let resp = self
            .dispatch("OPTIONS", self.root_path(), Some(&body), &headers, &[], false)
            .await?;
        let text = resp.body_str()?;
        let doc = xml::parse(text)?;
        let root = doc.root_element();
        let collection = xml::child(root, NS_DAV, "activity-collection-set")
            .and_then(|set| xml::child_text(set, NS_DAV, "href"))
            .map(|href| href.trim().to_string())
            .ok_or_else(|| {
                RaError::UnsupportedFeature("activity-collection-set discovery".to_string())
            })?;
        self.working_copy()
            .push_wc_prop(
                "",
                client_props::LP_ACTIVITY_URL,
                Some(collection.as_bytes()),
            )
            .await?;
        Ok(collection)
    }

    async fn create_activity(&self) -> Result<String, RaError> {
        let uuid = Uuid::new_v4().to_string();
        let collection = self.get_activity_collection(false).await?;
        let url = repo_path::url_join(&collection, &uuid);
        let resp = self
            .dispatch("MKACTIVITY", &url, None, &[], &[201, 404], false)
            .await?;
        if resp.status != 404 {
            debug!(activity = %url, "created activity");
            return Ok(url);
        }
        // The cached activity collection went stale; re-discover and retry.
        let collection = self.get_activity_collection(true).await?;
        let url = repo_path::url_join(&collection, &uuid);
        self.dispatch("MKACTIVITY", &url, None, &[], &[201], false)
            .await?;
        debug!(activity = %url, "created activity after collection refresh");
        Ok(url)
    }
}

impl CommitEditor<'_> {
    /// The outcome of the drive, available after `close_edit`.
    pub fn commit_info(&self) -> Option<&CommitInfo> {
        self.commit_info.as_ref()
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

    fn add_valid_target(&mut self, path: &str, recursive: bool) {
        self.valid_targets.insert(path.to_string(), recursive);
    }

    fn is_valid_target(&self, path: &str) -> bool {
        if self.valid_targets.contains_key(path) {
            return true;
        }
        self.valid_targets.iter().any(|(target, recursive)| {
            *recursive && repo_path::skip_ancestor(target, path).is_some()
        })
    }

    /// CHECKOUT the baseline the VCC points at and PROPPATCH the log
    /// message onto its working resource; the server treats the baseline
    /// mutation as the revision-property write.
    async fn apply_log_message(&mut self) -> Result<(), RaError> {
        let session = self.session;
        let vcc = match session.cached_vcc() {
            Some(v) => v,
            None => {
                let v = session
                    .get_one_prop(
                        session.root_path(),
                        None,
                        NS_DAV,
                        "version-controlled-configuration",
                    )
                    .await?;
                session.store_vcc(&v);
                v
            }
        };
        let baseline = session.get_one_prop(&vcc, None, NS_DAV, "checked-in").await?;
        let mut baseline_rsrc = Resource {
            revision: Revision::INVALID,
            url: baseline.clone(),
            vsn_url: Some(baseline),
            wr_url: None,
            local_path: String::new(),
        };
        self.checkout_resource(&mut baseline_rsrc, false).await?;
        let wr = baseline_rsrc.working_url()?.to_string();
        session
            .proppatch(
                &wr,
                &[(
                    client_props::PROP_LOG.to_string(),
                    self.log_message.clone().into_bytes(),
                )],
                &[],
            )
            .await
    }

    /// Resolve the version-resource URL for `rsrc`, preferring the working
    /// copy's cache unless `force` demands the server's answer.
    async fn get_version_url(&self, rsrc: &mut Resource, force: bool) -> Result<(), RaError> {
        let session = self.session;
        if !force {
            if let Some(cached) = session
                .working_copy()
                .get_wc_prop(&rsrc.local_path, client_props::LP_VERSION_URL)
                .await?
            {
                if let Ok(url) = String::from_utf8(cached) {
                    rsrc.vsn_url = Some(url);
                    return Ok(());
                }
            }
        }
        let query_url = if rsrc.revision.is_valid() {
            let info = session
                .get_baseline_info(&rsrc.url, rsrc.revision, false)
                .await?;
            repo_path::url_join(&info.bc_url, &info.bc_relative)
        } else {
            rsrc.url.clone()
        };
        let vsn = session
            .get_one_prop(&query_url, None, NS_DAV, "checked-in")
            .await
            .map_err(|e| e.context("could not fetch the version resource URL"))?;
        session
            .working_copy()
            .push_wc_prop(
                &rsrc.local_path,
                client_props::LP_VERSION_URL,
                Some(vsn.as_bytes()),
            )
            .await?;
        rsrc.vsn_url = Some(vsn);
        Ok(())
    }

    async fn do_checkout(
        &self,
        vsn_url: &str,
        allow_404: bool,
    ) -> Result<(u16, Option<String>), RaError> {
        let body = RequestBody::Xml(format!(
            r#"<?xml version="1.0" encoding="utf-8"?><D:checkout xmlns:D="DAV:"><D:activity-set><D:href>{}</D:href></D:activity-set></D:checkout>"#,
            escape_cdata(&self.activity_url)
        ));
        let ok: &[u16] = if allow_404 { &[201, 404] } else { &[201] };
        let resp = self
            .session
            .dispatch("CHECKOUT", vsn_url, Some(&body), &[], ok, false)
            .await?;
        let location = resp
            .headers
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok((resp.status, location))
    }

    /// Produce a working resource for `rsrc` inside the activity. A 404
    /// means the cached version URL went stale: re-fetch it from the server
    /// and try once more.
    async fn checkout_resource(
        &self,
        rsrc: &mut Resource,
        allow_404: bool,
    ) -> Result<(), RaError> {
        if rsrc.wr_url.is_some() {
            return Ok(());
        }
        let vsn_url = rsrc.vsn_url.clone().ok_or_else(|| {
            RaError::IncompleteData(format!(
                "no version resource URL for '{}'",
                rsrc.local_path
            ))
        })?;
        let result = self.do_checkout(&vsn_url, allow_404).await;
        let (code, mut location) = match result {
            Ok(v) => v,
            Err(err) => return Err(self.out_of_date_context(err, &rsrc.local_path)),
        };
        if allow_404 && code == 404 {
            self.get_version_url(rsrc, true).await?;
            let fresh = rsrc.vsn_url.clone().ok_or_else(|| {
                RaError::IncompleteData(format!(
                    "no version resource URL for '{}'",
                    rsrc.local_path
                ))
            })?;
            match self.do_checkout(&fresh, false).await {
                Ok((_, l)) => location = l,
                Err(err) => return Err(self.out_of_date_context(err, &rsrc.local_path)),
            }
        }
        let location = location.ok_or_else(|| RaError::RequestFailed {
            context: format!("CHECKOUT of '{}'", vsn_url),
            status: None,
            message: "the CHECKOUT response did not contain a Location header".to_string(),
        })?;
        // Only the path portion matters; the working URL is session-local.
        let path = match url::Url::parse(&location) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => location,
        };
        rsrc.wr_url = Some(path);
        Ok(())
    }

    fn out_of_date_context(&self, err: RaError, local_path: &str) -> RaError {
        if err.kind() == "out-of-date" {
            err.context(format!(
                "your file or directory '{}' is probably out-of-date",
                local_path
            ))
        } else {
            err
        }
    }

    /// Build the child resource record under `parent`, deriving the working
    /// URL for brand-new nodes (copy structure is preserved below a checked
    /// out parent) and resolving the version URL for existing ones.
    async fn add_child(
        &self,
        parent: &Resource,
        name: &str,
        created: bool,
        revision: Revision,
    ) -> Result<Resource, RaError> {
        let mut rsrc = Resource {
            revision,
            url: repo_path::url_join(&parent.url, name),
            vsn_url: None,
            wr_url: None,
            local_path: repo_path::join(&parent.local_path, name),
        };
        if created || parent.vsn_url.is_none() {
            let parent_wr = parent.wr_url.as_ref().ok_or_else(|| {
                RaError::IncompleteData(format!(
                    "parent of '{}' has no working resource",
                    rsrc.local_path
                ))
            })?;
            rsrc.wr_url = Some(repo_path::url_join(parent_wr, name));
        } else {
            self.get_version_url(&mut rsrc, false).await?;
        }
        Ok(rsrc)
    }

    /// COPY a (path, revision) source onto a working resource.
    async fn copy_from(
        &self,
        copyfrom_path: &str,
        copyfrom_rev: Revision,
        dest_wr_url: &str,
        depth_infinity: bool,
        context_path: &str,
    ) -> Result<(), RaError> {
        let info = self
            .session
            .get_baseline_info(copyfrom_path, copyfrom_rev, false)
            .await?;
        let source = repo_path::url_join(&info.bc_url, &info.bc_relative);
        let destination = self.session.absolute_url(dest_wr_url)?.to_string();
        let headers = vec![
            (DESTINATION_HEADER, destination),
            (DEPTH_HEADER, if depth_infinity { "infinity" } else { "0" }.to_string()),
            ("Overwrite", "T".to_string()),
        ];
        self.session
            .dispatch("COPY", &source, None, &headers, &[201, 204], false)
            .await
            .map_err(|e| {
                self.out_of_date_context(e, context_path)
                    .context(format!("COPY of '{}'", context_path))
            })?;
        Ok(())
    }

    async fn proppatch_close(
        &self,
        rsrc: &Resource,
        set: &[(String, Vec<u8>)],
        delete: &[String],
    ) -> Result<(), RaError> {
        if set.is_empty() && delete.is_empty() {
            return Ok(());
        }
        let wr = rsrc.wr_url.as_ref().ok_or_else(|| {
            RaError::IncompleteData(format!(
                "property change on '{}' without a checkout",
                rsrc.local_path
            ))
        })?;
        self.session.proppatch(wr, set, delete).await
    }

    async fn delete_activity(&self) -> Result<(), RaError> {
        self.session
            .dispatch("DELETE", &self.activity_url, None, &[], &[204, 404], false)
            .await?;
        Ok(())
    }

    /// Tear the activity down after `original` failed; never let the
    /// cleanup outcome mask the original failure.
    async fn teardown_after(&self, original: RaError) -> RaError {
        match self.delete_activity().await {
            Ok(()) => original,
            Err(cleanup) => RaError::CommitCleanup {
                original: Box::new(original),
                cleanup: Box::new(cleanup),
            },
        }
    }

    /// MERGE the activity and parse the committed revision (plus the new
    /// version URLs of the touched paths) out of the response.
    async fn merge_activity(&mut self) -> Result<CommitInfo, RaError> {
        let body = RequestBody::Xml(format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<D:merge xmlns:D="DAV:"><D:source><D:href>{}</D:href></D:source>"#,
                r#"<D:no-auto-merge/><D:no-checkout/><D:prop>"#,
                r#"<D:checked-in/><D:version-name/><D:resourcetype/>"#,
                r#"<D:creationdate/><D:creator-displayname/>"#,
                r#"</D:prop></D:merge>"#
            ),
            escape_cdata(&self.activity_url)
        ));
        let mut headers: Vec<(&str, String)> = Vec::new();
        if self.disable_merge_response {
            headers.push((SVN_OPTIONS_HEADER, "no-merge-response".to_string()));
        }
        let resp = self
            .session
            .dispatch("MERGE", self.session.root_path(), Some(&body), &headers, &[], false)
            .await?;
        let parsed = parse_merge_response(resp.body_str()?)?;

        for updated in &parsed.resources {
            let Some(rel) = repo_path::skip_ancestor(self.session.root_path(), &updated.path)
            else {
                continue;
            };
            if !self.is_valid_target(rel) {
                debug!(path = rel, "merge response names an untouched path, ignoring");
                continue;
            }
            if let Some(vsn_url) = &updated.vsn_url {
                self.session
                    .working_copy()
                    .push_wc_prop(rel, client_props::LP_VERSION_URL, Some(vsn_url.as_bytes()))
                    .await?;
            }
        }
        Ok(parsed.info)
    }
}

#[derive(Debug)]
struct MergedResource {
    path: String,
    vsn_url: Option<String>,
}

#[derive(Debug)]
struct MergeOutcome {
    info: CommitInfo,
    resources: Vec<MergedResource>,
}

/// Pull the baseline's revision/date/author and the per-resource version
/// URLs out of a MERGE response.
fn parse_merge_response(body: &str) -> Result<MergeOutcome, RaError> {
    let doc = xml::parse(body)?;
    let root = doc.root_element();
    if !xml::is_elem(root, NS_DAV, "merge-response") {
        return Err(RaError::UnexpectedElement(root.tag_name().name().to_string()));
    }
    let updated = xml::child(root, NS_DAV, "updated-set").ok_or_else(|| {
        RaError::IncompleteData("merge response without an updated-set".to_string())
    })?;

    let mut info: Option<CommitInfo> = None;
    let mut resources = Vec::new();
    for response in updated
        .children()
        .filter(|n| xml::is_elem(*n, NS_DAV, "response"))
    {
        let href = xml::child_text(response, NS_DAV, "href")
            .map(|h| h.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| {
                RaError::IncompleteData("merge response entry without href".to_string())
            })?;
        let Some(prop) = xml::child(response, NS_DAV, "propstat")
            .and_then(|ps| xml::child(ps, NS_DAV, "prop"))
        else {
            continue;
        };

        let is_baseline = xml::child(prop, NS_DAV, "resourcetype")
            .map(|rt| xml::child(rt, NS_DAV, "baseline").is_some())
            .unwrap_or(false);
        if is_baseline {
            let revision = xml::child_text(prop, NS_DAV, "version-name")
                .and_then(|v| Revision::parse(&v))
                .ok_or_else(|| {
                    RaError::IncompleteData(
                        "merge response baseline carries no version-name".to_string(),
                    )
                })?;
            let date = xml::child_text(prop, NS_DAV, "creationdate").and_then(|d| {
                DateTime::parse_from_rfc3339(d.trim())
                    .ok()
                    .map(|d| d.with_timezone(&Utc))
            });
            let author = xml::child_text(prop, NS_DAV, "creator-displayname")
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());
            info = Some(CommitInfo {
                revision,
                date,
                author,
            });
        } else {
            let vsn_url = xml::child(prop, NS_DAV, "checked-in")
                .and_then(|ci| xml::child_text(ci, NS_DAV, "href"))
                .map(|h| h.trim().to_string());
            resources.push(MergedResource {
                path: href,
                vsn_url,
            });
        }
    }
    let info = info.ok_or_else(|| {
        RaError::IncompleteData("merge response carries no baseline".to_string())
    })?;
    Ok(MergeOutcome { info, resources })
}

#[async_trait]
impl Editor for CommitEditor<'_> {
    type Dir = CommitDir;
    type File = CommitFile;
    type Sink = CommitTextSink;

    async fn set_target_revision(&mut self, _revision: Revision) -> Result<(), DeltaError> {
        // Commits do not have a target revision; the server assigns one.
        self.check_open()
    }

    async fn open_root(&mut self, _base_revision: Revision) -> Result<CommitDir, DeltaError> {
        self.check_open()?;
        // The root is pinned to HEAD regardless of the caller's base: child
        // adds/deletes are legal against an out-of-date directory, and each
        // mutation carries its own base pin for conflict detection.
        let mut rsrc = Resource {
            revision: Revision::INVALID,
            url: self.session.root_path().to_string(),
            vsn_url: None,
            wr_url: None,
            local_path: String::new(),
        };
        self.get_version_url(&mut rsrc, false)
            .await
            .map_err(DeltaError::from)?;
        Ok(CommitDir {
            rsrc,
            created: false,
            prop_set: Vec::new(),
            prop_delete: Vec::new(),
        })
    }

    async fn delete_entry(
        &mut self,
        path: &str,
        revision: Revision,
        parent: &mut CommitDir,
    ) -> Result<(), DeltaError> {
        self.check_open()?;
        let name = repo_path::basename(path);
        self.checkout_resource(&mut parent.rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        let child_url = repo_path::url_join(parent.rsrc.working_url()?, name);

        let mut headers: Vec<(&str, String)> = Vec::new();
        if let Some(rev) = revision.number() {
            headers.push((SVN_VERSION_NAME_HEADER, rev.to_string()));
        }
        // Deleting something already gone only passes when the caller opted
        // into idempotent-merge semantics.
        let ok: &[u16] = if self.session.config().idempotent_delete {
            &[204, 404]
        } else {
            &[204]
        };
        let result = self
            .session
            .dispatch("DELETE", &child_url, None, &headers, ok, false)
            .await;
        if let Err(err) = result {
            return Err(self.out_of_date_context(err, path).into());
        }
        self.add_valid_target(path, false);
        info!(path, "deleted");
        Ok(())
    }

    async fn add_directory(
        &mut self,
        path: &str,
        parent: &mut CommitDir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<CommitDir, DeltaError> {
        self.check_open()?;
        let name = repo_path::basename(path);
        self.checkout_resource(&mut parent.rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        let rsrc = self
            .add_child(&parent.rsrc, name, true, Revision::INVALID)
            .await
            .map_err(DeltaError::from)?;
        let wr = rsrc.working_url()?.to_string();

        match copyfrom {
            None => {
                self.session
                    .dispatch("MKCOL", &wr, None, &[], &[201], false)
                    .await
                    .map_err(DeltaError::from)?;
            }
            Some((from, rev)) => {
                self.copy_from(from, rev, &wr, true, path)
                    .await
                    .map_err(DeltaError::from)?;
            }
        }
        // A copied directory brings its whole subtree along.
        self.add_valid_target(path, copyfrom.is_some());
        Ok(CommitDir {
            rsrc,
            created: true,
            prop_set: Vec::new(),
            prop_delete: Vec::new(),
        })
    }

    async fn open_directory(
        &mut self,
        path: &str,
        parent: &mut CommitDir,
        base_revision: Revision,
    ) -> Result<CommitDir, DeltaError> {
        self.check_open()?;
        let name = repo_path::basename(path);
        // Opening just means "a change happens somewhere below"; the
        // CHECKOUT is deferred until a real mutation arrives.
        let rsrc = self
            .add_child(&parent.rsrc, name, false, base_revision)
            .await
            .map_err(DeltaError::from)?;
        Ok(CommitDir {
            rsrc,
            created: false,
            prop_set: Vec::new(),
            prop_delete: Vec::new(),
        })
    }

    async fn change_dir_prop(
        &mut self,
        dir: &mut CommitDir,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        self.check_open()?;
        match value {
            Some(v) => dir.prop_set.push((name.to_string(), v.to_vec())),
            None => dir.prop_delete.push(name.to_string()),
        }
        // Checkout now; the PROPPATCH itself waits for close_directory.
        self.checkout_resource(&mut dir.rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        let local = dir.rsrc.local_path.clone();
        self.add_valid_target(&local, false);
        Ok(())
    }

    async fn close_directory(&mut self, dir: CommitDir) -> Result<(), DeltaError> {
        self.check_open()?;
        self.proppatch_close(&dir.rsrc, &dir.prop_set, &dir.prop_delete)
            .await
            .map_err(DeltaError::from)?;
        Ok(())
    }

    async fn absent_directory(
        &mut self,
        _path: &str,
        _parent: &mut CommitDir,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn add_file(
        &mut self,
        path: &str,
        parent: &mut CommitDir,
        copyfrom: Option<(&str, Revision)>,
    ) -> Result<CommitFile, DeltaError> {
        self.check_open()?;
        let name = repo_path::basename(path);
        self.checkout_resource(&mut parent.rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        let rsrc = self
            .add_child(&parent.rsrc, name, true, Revision::INVALID)
            .await
            .map_err(DeltaError::from)?;

        // Adding over an existing file is only legal as the second half of a
        // replace, which will have recorded the path during its delete.
        if !parent.created && !self.valid_targets.contains_key(path) {
            match self.session.get_starting_props(&rsrc.url).await {
                Ok(_) => {
                    return Err(DeltaError::from(RaError::AlreadyExists(
                        rsrc.url.clone(),
                    )))
                }
                Err(err)
                    if err.kind() == "path-not-found" || err.kind() == "request-failed" => {}
                Err(err) => return Err(DeltaError::from(err)),
            }
        }

        if let Some((from, rev)) = copyfrom {
            let wr = rsrc.working_url()?.to_string();
            self.copy_from(from, rev, &wr, false, path)
                .await
                .map_err(DeltaError::from)?;
        }
        // The PUT body waits for apply_textdelta; nothing to send yet.
        self.add_valid_target(path, false);
        Ok(CommitFile {
            rsrc,
            prop_set: Vec::new(),
            prop_delete: Vec::new(),
            put: Arc::new(Mutex::new(None)),
            delta_applied: false,
        })
    }

    async fn open_file(
        &mut self,
        path: &str,
        parent: &mut CommitDir,
        base_revision: Revision,
    ) -> Result<CommitFile, DeltaError> {
        self.check_open()?;
        let name = repo_path::basename(path);
        let mut rsrc = self
            .add_child(&parent.rsrc, name, false, base_revision)
            .await
            .map_err(DeltaError::from)?;
        // Check out right away; the content PUT comes much later.
        self.checkout_resource(&mut rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        Ok(CommitFile {
            rsrc,
            prop_set: Vec::new(),
            prop_delete: Vec::new(),
            put: Arc::new(Mutex::new(None)),
            delta_applied: false,
        })
    }

    async fn absent_file(
        &mut self,
        _path: &str,
        _parent: &mut CommitDir,
    ) -> Result<(), DeltaError> {
        self.check_open()
    }

    async fn apply_textdelta(
        &mut self,
        file: &mut CommitFile,
        base_checksum: Option<Md5>,
    ) -> Result<CommitTextSink, DeltaError> {
        self.check_open()?;
        if file.delta_applied {
            return Err(DeltaError::EditOrder(
                "apply_textdelta called twice for one file".to_string(),
            ));
        }
        file.delta_applied = true;
        let tmp = match self.session.working_copy().tmp_dir() {
            Some(dir) => NamedTempFile::new_in(dir),
            None => NamedTempFile::new(),
        }
        .map_err(DeltaError::Io)?;
        let local = file.rsrc.local_path.clone();
        self.add_valid_target(&local, false);
        Ok(CommitTextSink {
            writer: Some(SvndiffWriter::new(tmp)),
            stage: file.put.clone(),
            base_checksum,
        })
    }

    async fn change_file_prop(
        &mut self,
        file: &mut CommitFile,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), DeltaError> {
        self.check_open()?;
        match value {
            Some(v) => file.prop_set.push((name.to_string(), v.to_vec())),
            None => file.prop_delete.push(name.to_string()),
        }
        self.checkout_resource(&mut file.rsrc, true)
            .await
            .map_err(DeltaError::from)?;
        let local = file.rsrc.local_path.clone();
        self.add_valid_target(&local, false);
        Ok(())
    }

    async fn close_file(
        &mut self,
        file: CommitFile,
        text_checksum: Option<Md5>,
    ) -> Result<(), DeltaError> {
        self.check_open()?;
        let staged = file.put.lock().unwrap().take();
        if let Some(stage) = staged {
            let wr = file.rsrc.wr_url.clone().ok_or_else(|| {
                DeltaError::EditOrder(format!(
                    "file '{}' has content but no working resource",
                    file.rsrc.local_path
                ))
            })?;
            let mut headers: Vec<(&str, String)> = Vec::new();
            if let Some(base) = &stage.base_checksum {
                headers.push((SVN_BASE_FULLTEXT_MD5_HEADER, base.to_hex()));
            }
            if let Some(result) = &text_checksum {
                headers.push((SVN_RESULT_FULLTEXT_MD5_HEADER, result.to_hex()));
            }
            let body = RequestBody::File {
                content_type: SVNDIFF_MIME_TYPE,
                path: stage.body.path().to_path_buf(),
            };
            self.session
                .dispatch("PUT", &wr, Some(&body), &headers, &[201, 204], false)
                .await
                .map_err(DeltaError::from)?;
            // `stage.body` drops here, unlinking the temp file.
        }
        self.proppatch_close(&file.rsrc, &file.prop_set, &file.prop_delete)
            .await
            .map_err(DeltaError::from)?;
        Ok(())
    }

    async fn close_edit(&mut self) -> Result<(), DeltaError> {
        self.check_open()?;
        let merged = match self.merge_activity().await {
            Ok(info) => info,
            Err(err) => {
                let err = self.teardown_after(err).await;
                return Err(err.into());
            }
        };
        self.delete_activity().await.map_err(DeltaError::from)?;
        info!(revision = %merged.revision, "commit merged");
        self.state = DriveState::Closed;
        if let Some(callback) = self.callback.take() {
            callback(&merged);
        }
        self.commit_info = Some(merged);
        Ok(())
    }

    async fn abort_edit(&mut self) -> Result<(), DeltaError> {
        match self.state {
            DriveState::Closed => {
                return Err(DeltaError::EditOrder(
                    "abort_edit after close_edit".to_string(),
                ))
            }
            DriveState::Aborted => return Ok(()),
            DriveState::Open => {}
        }
        self.state = DriveState::Aborted;
        self.delete_activity().await.map_err(DeltaError::from)?;
        Ok(())
    }
}
