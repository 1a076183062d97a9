//! PROPFIND/PROPPATCH plumbing and the baseline walk.
//!
//! DeltaV reaches a revision through two hops: the public URL names a
//! version-controlled resource whose `DAV:version-controlled-configuration`
//! points at the VCC; the VCC's checked-in version (or a `Label:`-selected
//! one) is the *baseline* for a revision, and the baseline's
//! `DAV:baseline-collection` is the root of that revision's tree.

use std::collections::HashMap;

use subdav_types::{props as client_props, NodeKind, Revision};
use tracing::debug;

use crate::error::RaError;
use crate::session::{DavResponse, RequestBody, Session, DEPTH_HEADER, LABEL_HEADER};
use crate::xml::{self, NS_CUSTOM_PROP, NS_DAV, NS_SVN_DAV, NS_SVN_PROP};

pub const PROP_CHECKED_IN: &str = "DAV:checked-in";
pub const PROP_VCC: &str = "DAV:version-controlled-configuration";
pub const PROP_BASELINE_COLLECTION: &str = "DAV:baseline-collection";
pub const PROP_VERSION_NAME: &str = "DAV:version-name";
pub const PROP_CREATIONDATE: &str = "DAV:creationdate";
pub const PROP_CREATOR_DISPLAYNAME: &str = "DAV:creator-displayname";
pub const PROP_GETCONTENTLENGTH: &str = "DAV:getcontentlength";
pub const PROP_BASELINE_RELPATH: &str =
    "http://subversion.tigris.org/xmlns/dav/baseline-relative-path";
pub const PROP_MD5_CHECKSUM: &str = "http://subversion.tigris.org/xmlns/dav/md5-checksum";
pub const PROP_REPOSITORY_UUID: &str = "http://subversion.tigris.org/xmlns/dav/repository-uuid";

/// PROPFIND depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    Zero,
    One,
    Infinity,
}

impl Depth {
    fn header_value(self) -> &'static str {
        match self {
            Depth::Zero => "0",
            Depth::One => "1",
            Depth::Infinity => "infinity",
        }
    }
}

/// One resource out of a PROPFIND multistatus: its URL, whether it is a
/// collection, and its properties keyed by `namespace + local-name`.
#[derive(Debug, Clone, Default)]
pub struct DavResource {
    pub url: String,
    pub is_collection: bool,
    pub props: HashMap<String, String>,
}

impl DavResource {
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(|s| s.as_str())
    }

    fn require(&self, key: &str) -> Result<&str, RaError> {
        self.prop(key).ok_or_else(|| {
            RaError::IncompleteData(format!("property '{}' missing on '{}'", key, self.url))
        })
    }
}

/// Where a (url, revision) pair lives inside the baseline space.
#[derive(Debug, Clone)]
pub struct BaselineInfo {
    /// Root collection of the revision's tree.
    pub bc_url: String,
    /// Path of the requested resource below `bc_url`.
    pub bc_relative: String,
    /// The actual revision the baseline represents (resolves HEAD).
    pub revision: Revision,
    /// Node kind at the target, when the caller asked for it.
    pub kind: Option<NodeKind>,
}

const STARTING_PROPS: &[(&str, &str)] = &[
    (NS_DAV, "version-controlled-configuration"),
    (NS_DAV, "resourcetype"),
    (NS_SVN_DAV, "baseline-relative-path"),
    (NS_SVN_DAV, "repository-uuid"),
];

const BASELINE_PROPS: &[(&str, &str)] = &[
    (NS_DAV, "baseline-collection"),
    (NS_DAV, "version-name"),
];

impl Session {
    /// PROPFIND: fetch properties of `url` (and children, per `depth`),
    /// keyed by resource URL. `label` selects a baseline by revision.
    pub async fn get_props(
        &self,
        url: &str,
        depth: Depth,
        label: Option<Revision>,
        which: Option<&[(&str, &str)]>,
        use_aux: bool,
    ) -> Result<HashMap<String, DavResource>, RaError> {
        let body = propfind_body(which);
        let mut headers: Vec<(&str, String)> =
            vec![(DEPTH_HEADER, depth.header_value().to_string())];
        if let Some(rev) = label {
            let n = rev.number().ok_or_else(|| {
                RaError::BadFilename("label PROPFIND needs a concrete revision".to_string())
            })?;
            headers.push((LABEL_HEADER, n.to_string()));
        }
        let resp = self
            .dispatch(
                "PROPFIND",
                url,
                Some(&RequestBody::Xml(body)),
                &headers,
                &[],
                use_aux,
            )
            .await?;
        parse_multistatus(&resp)
    }

    /// PROPFIND on exactly one resource.
    pub async fn get_props_resource(
        &self,
        url: &str,
        label: Option<Revision>,
        which: Option<&[(&str, &str)]>,
        use_aux: bool,
    ) -> Result<DavResource, RaError> {
        let mut resources = self.get_props(url, Depth::Zero, label, which, use_aux).await?;
        let key = url.trim_end_matches('/').to_string();
        if let Some(r) = resources.remove(&key) {
            return Ok(r);
        }
        // Some servers answer with a rewritten href; with depth 0 the single
        // entry is the one we asked about.
        let mut values: Vec<DavResource> = resources.into_values().collect();
        match (values.pop(), values.is_empty()) {
            (Some(only), true) => Ok(only),
            (None, _) => Err(RaError::IncompleteData(format!(
                "PROPFIND of '{}' returned no resources",
                url
            ))),
            (Some(_), false) => Err(RaError::UnexpectedElement(format!(
                "PROPFIND of '{}' returned several resources for depth 0",
                url
            ))),
        }
    }

    /// Fetch one property of one resource.
    pub async fn get_one_prop(
        &self,
        url: &str,
        label: Option<Revision>,
        ns: &str,
        name: &str,
    ) -> Result<String, RaError> {
        let which = [(ns, name)];
        let rsrc = self
            .get_props_resource(url, label, Some(&which), false)
            .await?;
        rsrc.require(&format!("{}{}", ns, name)).map(str::to_string)
    }

    /// The discovery PROPFIND issued while opening a path: VCC, resource
    /// type, baseline-relative path, repository UUID.
    pub async fn get_starting_props(&self, url: &str) -> Result<DavResource, RaError> {
        let rsrc = self
            .get_props_resource(url, None, Some(STARTING_PROPS), false)
            .await?;
        if let Some(uuid) = rsrc.prop(PROP_REPOSITORY_UUID) {
            self.store_repos_uuid(uuid);
        }
        Ok(rsrc)
    }

    /// Walk from `url` to the baseline of `revision`.
    ///
    /// If the URL is gone from HEAD, parent directories are tried one at a
    /// time and the chopped suffix is re-attached to the relative path, so a
    /// deleted path can still be addressed inside an old revision. Running
    /// out of components is `bad-url`.
    pub async fn get_baseline_props(
        &self,
        url: &str,
        revision: Revision,
        which: &[(&str, &str)],
    ) -> Result<(String, DavResource), RaError> {
        let absolute = self.absolute_url(url)?;
        let mut path = absolute.path().trim_end_matches('/').to_string();
        let mut lopped = String::new();

        let rsrc = loop {
            if path.is_empty() {
                return Err(RaError::BadUrl(format!(
                    "no part of path '{}' was found in repository HEAD",
                    absolute.path()
                )));
            }
            match self.get_starting_props(&path).await {
                Ok(rsrc) => break rsrc,
                Err(err) if err.kind() == "path-not-found" || err.kind() == "request-failed" => {
                    let name = subdav_types::path::basename(&path).to_string();
                    let parent = subdav_types::path::dirname(&path).to_string();
                    if parent.len() == path.len() {
                        return Err(err.context("the path was not part of a repository"));
                    }
                    debug!(chopped = %name, "walking up for starting props");
                    lopped = subdav_types::path::join(&name, &lopped);
                    path = parent;
                }
                Err(err) => return Err(err),
            }
        };

        let vcc = rsrc.require(PROP_VCC)?.to_string();
        self.store_vcc(&vcc);
        let relative = rsrc.require(PROP_BASELINE_RELPATH)?.to_string();
        let bc_relative = subdav_types::path::join(&relative, &lopped);

        let baseline = if revision.is_valid() {
            // A Label header aims the PROPFIND at that revision's baseline.
            self.get_props_resource(&vcc, Some(revision), Some(which), false)
                .await?
        } else {
            // HEAD: follow the VCC's checked-in version to the baseline.
            let baseline_url = self
                .get_one_prop(&vcc, None, NS_DAV, "checked-in")
                .await
                .map_err(|e| e.context("fetching the latest baseline from the VCC"))?;
            self.get_props_resource(&baseline_url, None, Some(which), false)
                .await?
        };
        Ok((bc_relative, baseline))
    }

    /// Resolve a (url, revision) pair to its baseline collection, relative
    /// path, and actual revision; optionally learn the node kind.
    pub async fn get_baseline_info(
        &self,
        url: &str,
        revision: Revision,
        want_kind: bool,
    ) -> Result<BaselineInfo, RaError> {
        let (bc_relative, baseline) = self
            .get_baseline_props(url, revision, BASELINE_PROPS)
            .await?;
        let bc_url = baseline.require(PROP_BASELINE_COLLECTION)?.to_string();
        let actual = Revision::parse(baseline.require(PROP_VERSION_NAME)?).ok_or_else(|| {
            RaError::MalformedXml("baseline version-name is not a revision".to_string())
        })?;

        let kind = if want_kind {
            let full = subdav_types::path::url_join(&bc_url, &bc_relative);
            let rsrc = self
                .get_props_resource(&full, None, Some(STARTING_PROPS), false)
                .await?;
            Some(if rsrc.is_collection {
                NodeKind::Dir
            } else {
                NodeKind::File
            })
        } else {
            None
        };

        Ok(BaselineInfo {
            bc_url,
            bc_relative,
            revision: actual,
            kind,
        })
    }

    /// PROPPATCH a working or baseline resource with one batch of property
    /// sets and removes.
    pub(crate) async fn proppatch(
        &self,
        url: &str,
        set: &[(String, Vec<u8>)],
        remove: &[String],
    ) -> Result<(), RaError> {
        if set.is_empty() && remove.is_empty() {
            return Ok(());
        }
        let body = proppatch_body(set, remove);
        self.dispatch(
            "PROPPATCH",
            url,
            Some(&RequestBody::Xml(body)),
            &[],
            &[],
            false,
        )
        .await
        .map_err(|e| e.context(format!("applying property changes to '{}'", url)))?;
        Ok(())
    }
}

fn propfind_body(which: Option<&[(&str, &str)]>) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    body.push_str(r#"<D:propfind xmlns:D="DAV:">"#);
    match which {
        None => body.push_str("<D:allprop/>"),
        Some(props) => {
            body.push_str("<D:prop>");
            for (i, (ns, name)) in props.iter().enumerate() {
                body.push_str(&format!(r#"<p{i}:{name} xmlns:p{i}="{ns}"/>"#));
            }
            body.push_str("</D:prop>");
        }
    }
    body.push_str("</D:propfind>");
    body
}

fn proppatch_body(set: &[(String, Vec<u8>)], remove: &[String]) -> String {
    use base64::engine::general_purpose::STANDARD as B64;
    use base64::Engine as _;

    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    body.push_str(&format!(
        r#"<D:propertyupdate xmlns:D="DAV:" xmlns:V="{}" xmlns:S="{}" xmlns:C="{}">"#,
        NS_SVN_DAV, NS_SVN_PROP, NS_CUSTOM_PROP
    ));
    if !set.is_empty() {
        body.push_str("<D:set><D:prop>");
        for (name, value) in set {
            let (prefix, local) = wire_prop_name(name);
            match std::str::from_utf8(value) {
                Ok(text) if xml::is_xml_safe(value) => {
                    body.push_str(&format!(
                        "<{prefix}:{local}>{}</{prefix}:{local}>",
                        xml::escape_cdata(text)
                    ));
                }
                _ => {
                    body.push_str(&format!(
                        r#"<{prefix}:{local} V:encoding="base64">{}</{prefix}:{local}>"#,
                        B64.encode(value)
                    ));
                }
            }
        }
        body.push_str("</D:prop></D:set>");
    }
    if !remove.is_empty() {
        body.push_str("<D:remove><D:prop>");
        for name in remove {
            let (prefix, local) = wire_prop_name(name);
            body.push_str(&format!("<{prefix}:{local}/>"));
        }
        body.push_str("</D:prop></D:remove>");
    }
    body.push_str("</D:propertyupdate>");
    body
}

/// Client property name to (namespace prefix, local name) on the wire.
fn wire_prop_name(name: &str) -> (&'static str, &str) {
    match name.strip_prefix(client_props::SVN_PROP_PREFIX) {
        Some(rest) => ("S", rest),
        None => ("C", name),
    }
}

/// Map a wire property key (`namespace + local-name`) to the client-side
/// property name, when one exists.
pub(crate) fn client_prop_name(key: &str) -> Option<String> {
    if let Some(rest) = key.strip_prefix(NS_CUSTOM_PROP) {
        return Some(rest.to_string());
    }
    if let Some(rest) = key.strip_prefix(NS_SVN_PROP) {
        return Some(format!("{}{}", client_props::SVN_PROP_PREFIX, rest));
    }
    entry_prop_name(key).map(str::to_string)
}

/// The DAV "live" properties that become reserved entry properties.
pub(crate) fn entry_prop_name(key: &str) -> Option<&'static str> {
    match key {
        PROP_VERSION_NAME => Some(client_props::ENTRY_COMMITTED_REV),
        PROP_CREATIONDATE => Some(client_props::ENTRY_COMMITTED_DATE),
        PROP_CREATOR_DISPLAYNAME => Some(client_props::ENTRY_LAST_AUTHOR),
        PROP_REPOSITORY_UUID => Some(client_props::ENTRY_UUID),
        _ => None,
    }
}

fn parse_multistatus(resp: &DavResponse) -> Result<HashMap<String, DavResource>, RaError> {
    let body = resp.body_str()?;
    let doc = xml::parse(body)?;
    let root = doc.root_element();
    if !xml::is_elem(root, NS_DAV, "multistatus") {
        return Err(RaError::UnexpectedElement(root.tag_name().name().to_string()));
    }

    let mut out = HashMap::new();
    for response in root.children().filter(|n| xml::is_elem(*n, NS_DAV, "response")) {
        let href = xml::child_text(response, NS_DAV, "href").ok_or_else(|| {
            RaError::IncompleteData("multistatus response without href".to_string())
        })?;
        let url = href.trim().trim_end_matches('/').to_string();
        let mut rsrc = DavResource {
            url: url.clone(),
            ..DavResource::default()
        };

        for propstat in response
            .children()
            .filter(|n| xml::is_elem(*n, NS_DAV, "propstat"))
        {
            let ok = xml::child_text(propstat, NS_DAV, "status")
                .map(|s| s.contains(" 200 "))
                .unwrap_or(false);
            if !ok {
                continue;
            }
            let Some(prop) = xml::child(propstat, NS_DAV, "prop") else {
                continue;
            };
            for p in prop.children().filter(|n| n.is_element()) {
                let ns = p.tag_name().namespace().unwrap_or("");
                let name = p.tag_name().name();
                if ns == NS_DAV && name == "resourcetype" {
                    if xml::child(p, NS_DAV, "collection").is_some() {
                        rsrc.is_collection = true;
                    }
                    continue;
                }
                // Href-valued properties store the target URL.
                let value = match xml::child(p, NS_DAV, "href") {
                    Some(href) => xml::collect_text(href).trim().to_string(),
                    None => xml::collect_text(p),
                };
                rsrc.props.insert(format!("{}{}", ns, name), value);
            }
        }
        out.insert(url, rsrc);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> DavResponse {
        DavResponse {
            status: 207,
            headers: reqwest::header::HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_parse_multistatus() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<D:multistatus xmlns:D="DAV:" xmlns:lp1="DAV:" xmlns:lp2="http://subversion.tigris.org/xmlns/dav/">
<D:response>
<D:href>/repo/trunk/</D:href>
<D:propstat><D:prop>
<lp1:version-controlled-configuration><D:href>/repo/!svn/vcc/default</D:href></lp1:version-controlled-configuration>
<lp1:resourcetype><D:collection/></lp1:resourcetype>
<lp2:baseline-relative-path>trunk</lp2:baseline-relative-path>
<lp2:repository-uuid>13f79535-47bb-0310-9956-ffa450edef68</lp2:repository-uuid>
</D:prop>
<D:status>HTTP/1.1 200 OK</D:status>
</D:propstat>
</D:response>
</D:multistatus>"#;
        let parsed = parse_multistatus(&response(body)).unwrap();
        let rsrc = parsed.get("/repo/trunk").unwrap();
        assert!(rsrc.is_collection);
        assert_eq!(rsrc.prop(PROP_VCC), Some("/repo/!svn/vcc/default"));
        assert_eq!(rsrc.prop(PROP_BASELINE_RELPATH), Some("trunk"));
        assert_eq!(
            rsrc.prop(PROP_REPOSITORY_UUID),
            Some("13f79535-47bb-0310-9956-ffa450edef68")
        );
    }

    #[test]
    fn test_parse_multistatus_skips_failed_propstat() {
        let body = r#"<D:multistatus xmlns:D="DAV:">
<D:response>
<D:href>/repo/x</D:href>
<D:propstat><D:prop><D:checked-in/></D:prop>
<D:status>HTTP/1.1 404 Not Found</D:status></D:propstat>
</D:response>
</D:multistatus>"#;
        let parsed = parse_multistatus(&response(body)).unwrap();
        assert!(parsed.get("/repo/x").unwrap().props.is_empty());
    }

    #[test]
    fn test_parse_rejects_wrong_root() {
        let err = parse_multistatus(&response("<wrong/>")).unwrap_err();
        assert_eq!(err.kind(), "unexpected-element");
    }

    #[test]
    fn test_propfind_bodies() {
        assert!(propfind_body(None).contains("<D:allprop/>"));
        let body = propfind_body(Some(&[(NS_DAV, "checked-in")]));
        assert!(body.contains(r#"<p0:checked-in xmlns:p0="DAV:"/>"#));
    }

    #[test]
    fn test_proppatch_body_encodings() {
        let set = vec![
            ("svn:log".to_string(), b"plain message".to_vec()),
            ("user-prop".to_string(), vec![0u8, 1, 2]),
        ];
        let remove = vec!["svn:ignore".to_string()];
        let body = proppatch_body(&set, &remove);
        assert!(body.contains("<S:log>plain message</S:log>"));
        assert!(body.contains(r#"<C:user-prop V:encoding="base64">"#));
        assert!(body.contains("<D:remove><D:prop><S:ignore/></D:prop></D:remove>"));
    }

    #[test]
    fn test_wire_name_translation() {
        assert_eq!(
            client_prop_name("http://subversion.tigris.org/xmlns/svn/eol-style").as_deref(),
            Some("svn:eol-style")
        );
        assert_eq!(
            client_prop_name("http://subversion.tigris.org/xmlns/custom/review-status").as_deref(),
            Some("review-status")
        );
        assert_eq!(
            client_prop_name(PROP_CREATOR_DISPLAYNAME).as_deref(),
            Some("svn:entry:last-author")
        );
        assert_eq!(client_prop_name("DAV:getetag"), None);
    }
}
