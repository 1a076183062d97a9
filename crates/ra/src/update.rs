//! Driving an editor from an `update-report` response.
//!
//! The response is one XML document whose element tree mirrors the edit:
//! directory elements nest, file elements carry inline base64 svndiff
//! (`send-all` mode) or `fetch-file` directives (legacy mode), and property
//! elements ride inside both. The walk below visits open/close edges in
//! document order and issues the corresponding editor call for each, which
//! keeps editor callbacks strictly sequential and non-re-entrant.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use roxmltree::Node;
use tracing::{debug, warn};

use subdav_delta::svndiff::read::decode as decode_svndiff;
use subdav_delta::svndiff::SVNDIFF_MIME_TYPE;
use subdav_delta::{fulltext_windows, Editor, SvndiffDecoder, WindowSink};
use subdav_types::{path as repo_path, props as client_props, Md5, Revision};

use crate::error::RaError;
use crate::props::{self, Depth, PROP_CHECKED_IN};
use crate::session::{Session, SVN_DELTA_BASE_HEADER};
use crate::xml::{self, NS_DAV, NS_SVN, NS_SVN_DAV};

/// How a report response should be interpreted.
#[derive(Debug, Clone)]
pub struct DriveOptions {
    /// The operation's named target ("" when the whole tree is the target).
    /// When the report was anchored above the real target, bookkeeping for
    /// the anchor directory itself is suppressed.
    pub target: String,
    /// Switch drive: cached version URLs are invalidated up front.
    pub is_switch: bool,
    /// Whether file content and concrete property values matter (false for
    /// status-style drives).
    pub fetch_content: bool,
}

/// Parse an `update-report` response body and replay it against `editor`.
///
/// On any failure the edit is aborted before the error surfaces; on success
/// the editor is guaranteed to have seen `close_edit`, otherwise this fails
/// with `incomplete-edit`.
pub async fn drive_report_response<E: Editor>(
    session: &Session,
    editor: &mut E,
    body: &str,
    options: &DriveOptions,
) -> Result<(), RaError> {
    let mut driver = UpdateDriver {
        session,
        editor,
        options,
        receiving_all: false,
        dirs: Vec::new(),
        file: None,
        current_wcprop_path: None,
        edit_closed: false,
        root_seen: false,
    };
    match driver.run(body).await {
        Ok(()) => {
            if !driver.edit_closed {
                return Err(RaError::IncompleteEdit);
            }
            Ok(())
        }
        Err(err) => {
            if !driver.edit_closed {
                if let Err(abort_err) = driver.editor.abort_edit().await {
                    warn!(error = %abort_err, "abort_edit failed after parse error");
                }
            }
            Err(err)
        }
    }
}

enum Edge<'a, 'input> {
    Open(Node<'a, 'input>),
    Close(Node<'a, 'input>),
}

/// Open/close edges over the element tree in document order, without
/// recursing on the document's nesting depth.
fn edge_walk<'a, 'input>(root: Node<'a, 'input>) -> Vec<Edge<'a, 'input>> {
    let mut out = Vec::new();
    let mut stack = vec![(root, false)];
    while let Some((node, closing)) = stack.pop() {
        if closing {
            out.push(Edge::Close(node));
            continue;
        }
        out.push(Edge::Open(node));
        stack.push((node, true));
        let children: Vec<_> = node.children().filter(|c| c.is_element()).collect();
        for child in children.into_iter().rev() {
            stack.push((child, false));
        }
    }
    out
}

struct DirState<D> {
    handle: D,
    path: String,
    vsn_url: Option<String>,
    fetch_props: bool,
    /// Depth-1 prefetch of children's properties, keyed by version URL.
    children: Option<HashMap<String, HashMap<String, String>>>,
}

fn top_dir<D>(dirs: &mut [DirState<D>]) -> Result<&mut DirState<D>, RaError> {
    dirs.last_mut()
        .ok_or_else(|| RaError::UnexpectedElement("element outside any directory".to_string()))
}

struct FileState<F> {
    handle: F,
    path: String,
    fetch_props: bool,
    href: Option<String>,
    result_checksum: Option<Md5>,
    saw_textdelta: bool,
}

struct UpdateDriver<'a, E: Editor> {
    session: &'a Session,
    editor: &'a mut E,
    options: &'a DriveOptions,
    receiving_all: bool,
    dirs: Vec<DirState<E::Dir>>,
    file: Option<FileState<E::File>>,
    current_wcprop_path: Option<String>,
    edit_closed: bool,
    root_seen: bool,
}

impl<E: Editor> UpdateDriver<'_, E> {
    async fn run(&mut self, body: &str) -> Result<(), RaError> {
        let doc = xml::parse(body)?;
        let root = doc.root_element();
        if !xml::is_elem(root, NS_SVN, "update-report") {
            return Err(RaError::UnexpectedElement(root.tag_name().name().to_string()));
        }
        for edge in edge_walk(root) {
            self.session.check_cancel()?;
            match edge {
                Edge::Open(node) => self.handle_open(node).await?,
                Edge::Close(node) => self.handle_close(node).await?,
            }
        }
        Ok(())
    }

    fn attr(node: Node<'_, '_>, name: &str) -> Result<String, RaError> {
        node.attribute(name).map(str::to_string).ok_or_else(|| {
            RaError::MalformedXml(format!(
                "element '{}' is missing its '{}' attribute",
                node.tag_name().name(),
                name
            ))
        })
    }

    fn rev_attr(node: Node<'_, '_>, name: &str) -> Result<Revision, RaError> {
        let raw = Self::attr(node, name)?;
        Revision::parse(&raw).ok_or_else(|| {
            RaError::MalformedXml(format!("'{}' is not a revision number", raw))
        })
    }

    fn copyfrom_of(node: Node<'_, '_>) -> Result<Option<(String, Revision)>, RaError> {
        match node.attribute("copyfrom-path") {
            Some(path) => {
                let rev = Self::rev_attr(node, "copyfrom-rev")?;
                Ok(Some((path.to_string(), rev)))
            }
            None => Ok(None),
        }
    }

    /// Whether bookkeeping for the directory on top of the stack must be
    /// suppressed because the report was anchored above the real target.
    fn suppress_anchor(&self, depth: usize) -> bool {
        depth == 1 && !self.options.target.is_empty()
    }

    async fn handle_open(&mut self, node: Node<'_, '_>) -> Result<(), RaError> {
        let ns = node.tag_name().namespace().unwrap_or("");
        let name = node.tag_name().name();
        match (ns, name) {
            (NS_SVN, "update-report") => {
                self.receiving_all = node.attribute("send-all") == Some("true");
                debug!(send_all = self.receiving_all, "parsing update report");
            }
            (NS_SVN, "target-revision") => {
                let rev = Self::rev_attr(node, "rev")?;
                self.editor
                    .set_target_revision(rev)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "open-directory") => {
                let base = Self::rev_attr(node, "rev")?;
                if self.dirs.is_empty() {
                    if self.root_seen {
                        return Err(RaError::UnexpectedElement(
                            "second root open-directory".to_string(),
                        ));
                    }
                    self.root_seen = true;
                    if self.options.is_switch {
                        // Stale version URLs must not survive a failed switch.
                        self.session
                            .working_copy()
                            .invalidate_wc_props(&self.options.target, client_props::LP_VERSION_URL)
                            .await?;
                    }
                    let handle = self.editor.open_root(base).await.map_err(RaError::from)?;
                    self.dirs.push(DirState {
                        handle,
                        path: String::new(),
                        vsn_url: None,
                        fetch_props: false,
                        children: None,
                    });
                } else {
                    let child_name = Self::attr(node, "name")?;
                    let parent = top_dir(&mut self.dirs)?;
                    let path = repo_path::join(&parent.path, &child_name);
                    let handle = self
                        .editor
                        .open_directory(&path, &mut parent.handle, base)
                        .await
                        .map_err(RaError::from)?;
                    self.dirs.push(DirState {
                        handle,
                        path,
                        vsn_url: None,
                        fetch_props: false,
                        children: None,
                    });
                }
            }
            (NS_SVN, "add-directory") => {
                let child_name = Self::attr(node, "name")?;
                let copyfrom = Self::copyfrom_of(node)?;
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                let cf = copyfrom.as_ref().map(|(p, r)| (p.as_str(), *r));
                let handle = self
                    .editor
                    .add_directory(&path, &mut parent.handle, cf)
                    .await
                    .map_err(RaError::from)?;
                // In legacy responses properties are implied by addition and
                // fetched at close; a bc-url lets us warm the cache for the
                // whole directory with one depth-1 PROPFIND.
                let children = if !self.receiving_all && self.options.fetch_content {
                    match node.attribute("bc-url") {
                        Some(bc_url) => Some(self.prefetch_children(bc_url).await?),
                        None => None,
                    }
                } else {
                    None
                };
                self.dirs.push(DirState {
                    handle,
                    path,
                    vsn_url: None,
                    fetch_props: true,
                    children,
                });
            }
            (NS_SVN, "absent-directory") => {
                let child_name = Self::attr(node, "name")?;
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                self.editor
                    .absent_directory(&path, &mut parent.handle)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "absent-file") => {
                let child_name = Self::attr(node, "name")?;
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                self.editor
                    .absent_file(&path, &mut parent.handle)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "open-file") => {
                let base = Self::rev_attr(node, "rev")?;
                let child_name = Self::attr(node, "name")?;
                if self.file.is_some() {
                    return Err(RaError::UnexpectedElement("nested file element".to_string()));
                }
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                let handle = self
                    .editor
                    .open_file(&path, &mut parent.handle, base)
                    .await
                    .map_err(RaError::from)?;
                self.file = Some(FileState {
                    handle,
                    path,
                    fetch_props: false,
                    href: None,
                    result_checksum: None,
                    saw_textdelta: false,
                });
            }
            (NS_SVN, "add-file") => {
                let child_name = Self::attr(node, "name")?;
                let copyfrom = Self::copyfrom_of(node)?;
                if self.file.is_some() {
                    return Err(RaError::UnexpectedElement("nested file element".to_string()));
                }
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                let cf = copyfrom.as_ref().map(|(p, r)| (p.as_str(), *r));
                let handle = self
                    .editor
                    .add_file(&path, &mut parent.handle, cf)
                    .await
                    .map_err(RaError::from)?;
                self.file = Some(FileState {
                    handle,
                    path,
                    fetch_props: true,
                    href: None,
                    result_checksum: None,
                    saw_textdelta: false,
                });
            }
            (NS_SVN, "delete-entry") => {
                let child_name = Self::attr(node, "name")?;
                if self.file.is_some() {
                    return Err(RaError::UnexpectedElement(
                        "delete-entry inside a file".to_string(),
                    ));
                }
                let parent = top_dir(&mut self.dirs)?;
                let path = repo_path::join(&parent.path, &child_name);
                self.editor
                    .delete_entry(&path, Revision::INVALID, &mut parent.handle)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "txdelta") => {
                self.apply_inline_textdelta(node).await?;
            }
            (NS_SVN, "remove-prop") => {
                let prop = Self::attr(node, "name")?;
                self.change_prop(&prop, None).await?;
            }
            (NS_SVN, "fetch-props") => {
                if !self.options.fetch_content {
                    // Status drives only need to know that properties
                    // changed, not what they became.
                    let marker = format!("{}BOGOSITY", client_props::SVN_PROP_PREFIX);
                    self.change_prop(&marker, None).await?;
                } else if let Some(file) = &mut self.file {
                    file.fetch_props = true;
                } else {
                    top_dir(&mut self.dirs)?.fetch_props = true;
                }
            }
            (NS_SVN, "fetch-file") => {
                let base_checksum = node
                    .attribute("base-checksum")
                    .and_then(|s| Md5::from_hex(s).ok());
                // Inline deltas take precedence; only non-send-all servers
                // make us come back for the contents.
                if !self.receiving_all {
                    self.fetch_file(base_checksum, true).await?;
                }
            }
            (NS_SVN, "resource") => {
                self.current_wcprop_path = Some(Self::attr(node, "path")?);
            }
            (NS_DAV, "checked-in") => {
                if let Some(href) = xml::child_text(node, NS_DAV, "href") {
                    self.record_version_url(href.trim()).await?;
                }
            }
            _ => {} // foreign or handled-at-close elements
        }
        Ok(())
    }

    async fn handle_close(&mut self, node: Node<'_, '_>) -> Result<(), RaError> {
        let ns = node.tag_name().namespace().unwrap_or("");
        let name = node.tag_name().name();
        match (ns, name) {
            (NS_SVN, "update-report") => {
                if !self.dirs.is_empty() || self.file.is_some() {
                    return Err(RaError::IncompleteData(
                        "report ended with open handles".to_string(),
                    ));
                }
                self.editor.close_edit().await.map_err(RaError::from)?;
                self.edit_closed = true;
            }
            (NS_SVN, "open-directory") | (NS_SVN, "add-directory") => {
                let depth = self.dirs.len();
                if !self.suppress_anchor(depth) {
                    self.add_dir_props().await?;
                }
                let dir = self.dirs.pop().ok_or_else(|| {
                    RaError::UnexpectedElement("directory close without open".to_string())
                })?;
                self.editor
                    .close_directory(dir.handle)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "open-file") | (NS_SVN, "add-file") => {
                // Legacy added files are fetched at close so the href inside
                // the element has been seen.
                let added = name == "add-file";
                if added && !self.receiving_all {
                    let already = self
                        .file
                        .as_ref()
                        .map(|f| f.saw_textdelta)
                        .unwrap_or(false);
                    if !already {
                        self.fetch_file(None, false).await?;
                    }
                }
                self.add_file_props().await?;
                let file = self.file.take().ok_or_else(|| {
                    RaError::UnexpectedElement("file close without open".to_string())
                })?;
                self.editor
                    .close_file(file.handle, file.result_checksum)
                    .await
                    .map_err(RaError::from)?;
            }
            (NS_SVN, "set-prop") => {
                let prop = Self::attr(node, "name")?;
                let raw = xml::collect_text(node);
                let value = match node.attribute("encoding") {
                    None => raw.into_bytes(),
                    Some("base64") => {
                        let cleaned: String =
                            raw.chars().filter(|c| !c.is_whitespace()).collect();
                        B64.decode(cleaned.as_bytes()).map_err(|e| {
                            RaError::MalformedXml(format!("bad base64 property value: {e}"))
                        })?
                    }
                    Some(other) => {
                        return Err(RaError::MalformedXml(format!(
                            "unknown property encoding '{}'",
                            other
                        )))
                    }
                };
                self.change_prop(&prop, Some(&value)).await?;
            }
            (NS_SVN, "resource") => {
                self.current_wcprop_path = None;
            }
            (NS_DAV, "version-name")
            | (NS_DAV, "creationdate")
            | (NS_DAV, "creator-displayname") => {
                let key = format!("{}{}", NS_DAV, name);
                self.record_entry_prop(&key, &xml::collect_text(node)).await?;
            }
            (NS_SVN_DAV, "repository-uuid") => {
                let key = format!("{}{}", NS_SVN_DAV, name);
                self.record_entry_prop(&key, &xml::collect_text(node)).await?;
            }
            (NS_SVN_DAV, "md5-checksum") => {
                if let Some(file) = &mut self.file {
                    let text = xml::collect_text(node);
                    file.result_checksum = Some(Md5::from_hex(text.trim()).map_err(|_| {
                        RaError::MalformedXml("bad md5-checksum value".to_string())
                    })?);
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn apply_inline_textdelta(&mut self, node: Node<'_, '_>) -> Result<(), RaError> {
        let base_checksum = node
            .attribute("base-checksum")
            .and_then(|s| Md5::from_hex(s).ok());
        let file = self.file.as_mut().ok_or_else(|| {
            RaError::UnexpectedElement("txdelta outside a file element".to_string())
        })?;
        if file.saw_textdelta {
            return Err(RaError::UnexpectedElement(
                "second txdelta for one file".to_string(),
            ));
        }
        file.saw_textdelta = true;
        if !self.options.fetch_content {
            return Ok(());
        }
        let mut sink = self
            .editor
            .apply_textdelta(&mut file.handle, base_checksum)
            .await
            .map_err(RaError::from)?;

        // The cdata is base64 text; feed the decoder in bounded chunks so a
        // multi-megabyte file never needs its decoded delta in one piece.
        let raw = xml::collect_text(node);
        let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let mut decoder = SvndiffDecoder::new();
        for chunk in cleaned.as_bytes().chunks(8192) {
            let bytes = B64
                .decode(chunk)
                .map_err(|e| RaError::MalformedXml(format!("bad base64 in txdelta: {e}")))?;
            for window in decoder.push(&bytes).map_err(RaError::Delta)? {
                sink.window(&window).await.map_err(RaError::from)?;
            }
        }
        decoder.finish().map_err(RaError::Delta)?;
        sink.close().await.map_err(RaError::from)?;
        Ok(())
    }

    /// Legacy content fetch: a separate GET of the node's version resource,
    /// answered either with a full text or with an svndiff against the base
    /// we advertise.
    async fn fetch_file(
        &mut self,
        base_checksum: Option<Md5>,
        use_base: bool,
    ) -> Result<(), RaError> {
        if !self.options.fetch_content {
            return Ok(());
        }
        let (href, path) = {
            let file = self.file.as_ref().ok_or_else(|| {
                RaError::UnexpectedElement("fetch-file outside a file element".to_string())
            })?;
            let href = file.href.clone().ok_or_else(|| {
                RaError::IncompleteData("fetch-file without a version URL".to_string())
            })?;
            (href, file.path.clone())
        };

        let mut headers: Vec<(&str, String)> = Vec::new();
        if use_base {
            if let Some(base) = self
                .session
                .working_copy()
                .get_wc_prop(&path, client_props::LP_VERSION_URL)
                .await?
            {
                if let Ok(value) = String::from_utf8(base) {
                    headers.push((SVN_DELTA_BASE_HEADER, value));
                }
            }
        }

        // The secondary connection keeps this GET from interleaving with the
        // REPORT exchange on the primary.
        let resp = self
            .session
            .dispatch("GET", &href, None, &headers, &[226], true)
            .await?;
        let is_svndiff = resp
            .headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with(SVNDIFF_MIME_TYPE))
            .unwrap_or(false);

        let windows = if is_svndiff {
            decode_svndiff(&resp.body).map_err(RaError::Delta)?
        } else {
            fulltext_windows(&resp.body)
        };

        let Some(file) = self.file.as_mut() else {
            return Err(RaError::UnexpectedElement(
                "fetch-file outside a file element".to_string(),
            ));
        };
        file.saw_textdelta = true;
        let mut sink = self
            .editor
            .apply_textdelta(&mut file.handle, base_checksum)
            .await
            .map_err(RaError::from)?;
        for window in &windows {
            sink.window(window).await.map_err(RaError::from)?;
        }
        sink.close().await.map_err(RaError::from)?;
        Ok(())
    }

    async fn prefetch_children(
        &mut self,
        bc_url: &str,
    ) -> Result<HashMap<String, HashMap<String, String>>, RaError> {
        let resources = self
            .session
            .get_props(bc_url, Depth::One, None, None, true)
            .await?;
        let mut by_version_url = HashMap::new();
        for rsrc in resources.into_values() {
            if let Some(vc_url) = rsrc.prop(PROP_CHECKED_IN) {
                by_version_url.insert(vc_url.to_string(), rsrc.props.clone());
            }
        }
        debug!(count = by_version_url.len(), "prefetched child properties");
        Ok(by_version_url)
    }

    /// A `checked-in` href names the version resource of whatever node we
    /// are inside.
    async fn record_version_url(&mut self, href: &str) -> Result<(), RaError> {
        if let Some(path) = &self.current_wcprop_path {
            // Resource-walk entries bypass the editor entirely.
            self.session
                .working_copy()
                .set_wc_prop(path, client_props::LP_VERSION_URL, Some(href.as_bytes()))
                .await?;
            return Ok(());
        }
        if let Some(file) = &mut self.file {
            file.href = Some(href.to_string());
            self.editor
                .change_file_prop(
                    &mut file.handle,
                    client_props::LP_VERSION_URL,
                    Some(href.as_bytes()),
                )
                .await
                .map_err(RaError::from)?;
            return Ok(());
        }
        let depth = self.dirs.len();
        if depth == 0 {
            return Ok(());
        }
        if self.suppress_anchor(depth) {
            return Ok(());
        }
        if let Some(dir) = self.dirs.last_mut() {
            dir.vsn_url = Some(href.to_string());
            self.editor
                .change_dir_prop(
                    &mut dir.handle,
                    client_props::LP_VERSION_URL,
                    Some(href.as_bytes()),
                )
                .await
                .map_err(RaError::from)?;
        }
        Ok(())
    }

    /// DAV live properties inside the report become entry properties.
    async fn record_entry_prop(&mut self, key: &str, value: &str) -> Result<(), RaError> {
        let Some(name) = props::entry_prop_name(key) else {
            return Ok(());
        };
        let value = value.trim().to_string();
        if let Some(file) = &mut self.file {
            self.editor
                .change_file_prop(&mut file.handle, name, Some(value.as_bytes()))
                .await
                .map_err(RaError::from)?;
            return Ok(());
        }
        let depth = self.dirs.len();
        if depth == 0 || self.suppress_anchor(depth) {
            return Ok(());
        }
        if let Some(dir) = self.dirs.last_mut() {
            self.editor
                .change_dir_prop(&mut dir.handle, name, Some(value.as_bytes()))
                .await
                .map_err(RaError::from)?;
        }
        Ok(())
    }

    async fn change_prop(&mut self, name: &str, value: Option<&[u8]>) -> Result<(), RaError> {
        if let Some(file) = &mut self.file {
            self.editor
                .change_file_prop(&mut file.handle, name, value)
                .await
                .map_err(RaError::from)?;
        } else {
            let dir = top_dir(&mut self.dirs)?;
            self.editor
                .change_dir_prop(&mut dir.handle, name, value)
                .await
                .map_err(RaError::from)?;
        }
        Ok(())
    }

    /// Legacy property fill-in for the file being closed.
    async fn add_file_props(&mut self) -> Result<(), RaError> {
        if self.receiving_all || !self.options.fetch_content {
            return Ok(());
        }
        let (href, wanted) = match self.file.as_ref() {
            Some(f) if f.fetch_props => match &f.href {
                Some(href) => (href.clone(), true),
                None => (String::new(), false),
            },
            _ => (String::new(), false),
        };
        if !wanted {
            return Ok(());
        }
        // A depth-1 prefetch on the parent may already hold these.
        let cached = self
            .dirs
            .last()
            .and_then(|d| d.children.as_ref())
            .and_then(|c| c.get(&href).cloned());
        let props_map = match cached {
            Some(map) => map,
            None => {
                self.session
                    .get_props_resource(&href, None, None, true)
                    .await?
                    .props
            }
        };
        if let Some(file) = self.file.as_mut() {
            for (key, value) in &props_map {
                if let Some(name) = props::client_prop_name(key) {
                    self.editor
                        .change_file_prop(&mut file.handle, &name, Some(value.as_bytes()))
                        .await
                        .map_err(RaError::from)?;
                }
            }
        }
        Ok(())
    }

    /// Legacy property fill-in for the directory being closed.
    async fn add_dir_props(&mut self) -> Result<(), RaError> {
        if self.receiving_all || !self.options.fetch_content {
            return Ok(());
        }
        let (vsn_url, wanted) = match self.dirs.last() {
            Some(d) if d.fetch_props => match &d.vsn_url {
                Some(url) => (url.clone(), true),
                None => (String::new(), false),
            },
            _ => (String::new(), false),
        };
        if !wanted {
            return Ok(());
        }
        let cached = self
            .dirs
            .last()
            .and_then(|d| d.children.as_ref())
            .and_then(|c| c.get(&vsn_url).cloned());
        let props_map = match cached {
            Some(map) => map,
            None => {
                self.session
                    .get_props_resource(&vsn_url, None, None, true)
                    .await?
                    .props
            }
        };
        if let Some(dir) = self.dirs.last_mut() {
            for (key, value) in &props_map {
                if let Some(name) = props::client_prop_name(key) {
                    self.editor
                        .change_dir_prop(&mut dir.handle, &name, Some(value.as_bytes()))
                        .await
                        .map_err(RaError::from)?;
                }
            }
        }
        Ok(())
    }
}
