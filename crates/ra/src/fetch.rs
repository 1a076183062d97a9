//! Direct repository reads: single files, directory listings, revision
//! lookups and revision properties.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::instrument;

use subdav_types::{path as repo_path, props as client_props, Md5, NodeKind, Revision};

use crate::error::RaError;
use crate::props::{
    self, Depth, PROP_CREATIONDATE, PROP_CREATOR_DISPLAYNAME, PROP_GETCONTENTLENGTH,
    PROP_MD5_CHECKSUM, PROP_VERSION_NAME,
};
use crate::session::{RequestBody, Session};
use crate::xml::{self, NS_CUSTOM_PROP, NS_DAV, NS_SVN, NS_SVN_PROP};

/// Metadata attached to a fetched file.
#[derive(Debug, Clone)]
pub struct FileFetch {
    /// The revision the content represents.
    pub revision: Revision,
    /// Translated properties, when they were requested.
    pub props: HashMap<String, Vec<u8>>,
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
    pub size: Option<u64>,
    pub created_rev: Option<Revision>,
    pub last_author: Option<String>,
    pub date: Option<String>,
}

impl Session {
    /// The revision HEAD currently names.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_latest_revnum(&self) -> Result<Revision, RaError> {
        let info = self
            .get_baseline_info(self.root_path(), Revision::INVALID, false)
            .await?;
        Ok(info.revision)
    }

    /// The youngest revision at or before `time`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_dated_revision(&self, time: DateTime<Utc>) -> Result<Revision, RaError> {
        let vcc = self.require_vcc().await?;
        let body = RequestBody::Xml(format!(
            r#"<?xml version="1.0" encoding="utf-8"?><S:dated-rev-report xmlns:S="{}" xmlns:D="DAV:"><D:creationdate>{}</D:creationdate></S:dated-rev-report>"#,
            NS_SVN,
            time.to_rfc3339_opts(SecondsFormat::Micros, true)
        ));
        let resp = self
            .dispatch("REPORT", &vcc, Some(&body), &[], &[], false)
            .await?;
        let text = resp.body_str()?;
        let doc = xml::parse(text)?;
        doc.root_element()
            .descendants()
            .find(|n| xml::is_elem(*n, NS_DAV, "version-name"))
            .and_then(|n| Revision::parse(&xml::collect_text(n)))
            .ok_or_else(|| {
                RaError::IncompleteData("dated-rev report carries no version-name".to_string())
            })
    }

    /// All revision properties of `revision`.
    pub async fn rev_proplist(
        &self,
        revision: Revision,
    ) -> Result<HashMap<String, Vec<u8>>, RaError> {
        let vcc = self.require_vcc().await?;
        let rsrc = self
            .get_props_resource(&vcc, Some(revision), None, false)
            .await?;
        let mut out = HashMap::new();
        for (key, value) in &rsrc.props {
            if let Some(name) = rev_prop_name(key) {
                out.insert(name, value.clone().into_bytes());
            }
        }
        Ok(out)
    }

    /// One revision property.
    pub async fn rev_prop(
        &self,
        revision: Revision,
        name: &str,
    ) -> Result<Option<Vec<u8>>, RaError> {
        Ok(self.rev_proplist(revision).await?.remove(name))
    }

    /// Write (or delete) a revision property. Baselines are mutable only
    /// when the server operator enabled revision-property changes.
    #[instrument(level = "debug", skip(self, value))]
    pub async fn change_rev_prop(
        &self,
        revision: Revision,
        name: &str,
        value: Option<&[u8]>,
    ) -> Result<(), RaError> {
        let (_, baseline) = self
            .get_baseline_props(self.root_path(), revision, &[(NS_DAV, "version-name")])
            .await?;
        let (set, remove) = match value {
            Some(v) => (vec![(name.to_string(), v.to_vec())], Vec::new()),
            None => (Vec::new(), vec![name.to_string()]),
        };
        self.proppatch(&baseline.url, &set, &remove)
            .await
            .map_err(|e| e.context(format!("changing property '{}' of r{}", name, revision)))
    }

    /// Fetch one file's content (and optionally its properties) at a
    /// revision, writing the bytes through `out`.
    #[instrument(level = "debug", skip(self, out))]
    pub async fn get_file<W: std::io::Write + Send>(
        &self,
        path: &str,
        revision: Revision,
        out: &mut W,
        want_props: bool,
    ) -> Result<FileFetch, RaError> {
        let public = repo_path::url_join(self.root_path(), path);
        let (url, actual_rev) = if revision.is_valid() {
            let info = self.get_baseline_info(&public, revision, false).await?;
            (
                repo_path::url_join(&info.bc_url, &info.bc_relative),
                info.revision,
            )
        } else {
            (public, Revision::INVALID)
        };

        let resp = self.dispatch("GET", &url, None, &[], &[], false).await?;
        out.write_all(&resp.body)?;

        let mut props = HashMap::new();
        if want_props {
            let rsrc = self.get_props_resource(&url, None, None, false).await?;
            // The server's recorded checksum guards the transfer.
            if let Some(hex) = rsrc.prop(PROP_MD5_CHECKSUM) {
                let expected = Md5::from_hex(hex)
                    .map_err(|_| RaError::MalformedXml("bad md5-checksum property".to_string()))?;
                let actual = Md5::digest(&resp.body);
                if !expected.matches(&actual) {
                    return Err(RaError::Delta(
                        subdav_delta::DeltaError::ChecksumMismatch {
                            expected: expected.to_hex(),
                            actual: actual.to_hex(),
                        },
                    ));
                }
            }
            for (key, value) in &rsrc.props {
                if let Some(name) = props::client_prop_name(key) {
                    props.insert(name, value.clone().into_bytes());
                }
            }
        }
        Ok(FileFetch {
            revision: actual_rev,
            props,
        })
    }

    /// List a directory at a revision.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_dir(&self, path: &str, revision: Revision) -> Result<Vec<DirEntry>, RaError> {
        let public = repo_path::url_join(self.root_path(), path);
        let url = if revision.is_valid() {
            let info = self.get_baseline_info(&public, revision, false).await?;
            repo_path::url_join(&info.bc_url, &info.bc_relative)
        } else {
            public
        };

        let resources = self.get_props(&url, Depth::One, None, None, false).await?;
        let base = url.trim_end_matches('/');
        let mut entries = Vec::new();
        for (href, rsrc) in &resources {
            // Skip the collection itself; only children are entries.
            let rel = match repo_path::skip_ancestor(base, href) {
                Some(rel) if !rel.is_empty() => rel,
                _ => continue,
            };
            entries.push(DirEntry {
                name: repo_path::basename(rel).to_string(),
                kind: if rsrc.is_collection {
                    NodeKind::Dir
                } else {
                    NodeKind::File
                },
                size: rsrc
                    .prop(PROP_GETCONTENTLENGTH)
                    .and_then(|v| v.trim().parse().ok()),
                created_rev: rsrc.prop(PROP_VERSION_NAME).and_then(Revision::parse),
                last_author: rsrc.prop(PROP_CREATOR_DISPLAYNAME).map(str::to_string),
                date: rsrc.prop(PROP_CREATIONDATE).map(str::to_string),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// What kind of node `path` is at `revision`; `None` for gone/absent
    /// paths rather than an error.
    #[instrument(level = "debug", skip(self))]
    pub async fn check_path(
        &self,
        path: &str,
        revision: Revision,
    ) -> Result<NodeKind, RaError> {
        let public = repo_path::url_join(self.root_path(), path);
        match self.get_baseline_info(&public, revision, true).await {
            Ok(info) => Ok(info.kind.unwrap_or(NodeKind::Unknown)),
            Err(err) if err.kind() == "path-not-found" || err.kind() == "bad-url" => {
                Ok(NodeKind::None)
            }
            Err(err) => Err(err),
        }
    }

    pub(crate) async fn require_vcc(&self) -> Result<String, RaError> {
        if let Some(vcc) = self.cached_vcc() {
            return Ok(vcc);
        }
        self.get_starting_props(self.root_path()).await?;
        self.cached_vcc().ok_or_else(|| {
            RaError::IncompleteData(
                "no version-controlled-configuration on the session root".to_string(),
            )
        })
    }
}

/// Revision-property translation: live DAV properties become `svn:author`
/// and `svn:date`; the svn and custom namespaces carry the rest.
fn rev_prop_name(key: &str) -> Option<String> {
    if key == PROP_CREATIONDATE {
        return Some(client_props::PROP_DATE.to_string());
    }
    if key == PROP_CREATOR_DISPLAYNAME {
        return Some(client_props::PROP_AUTHOR.to_string());
    }
    if let Some(rest) = key.strip_prefix(NS_SVN_PROP) {
        return Some(format!("{}{}", client_props::SVN_PROP_PREFIX, rest));
    }
    if let Some(rest) = key.strip_prefix(NS_CUSTOM_PROP) {
        return Some(rest.to_string());
    }
    None
}
