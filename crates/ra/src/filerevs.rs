//! The file-revs report: the full change history of one file.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use tracing::instrument;

use subdav_delta::svndiff::read::decode as decode_svndiff;
use subdav_delta::DeltaWindow;
use subdav_types::Revision;

use crate::error::RaError;
use crate::session::{RequestBody, Session};
use crate::xml::{self, escape_cdata, NS_SVN};

/// One interesting revision of a file: where it lived, the revision
/// properties, the property diffs against the previous interesting
/// revision, and the content delta (absent when the content is unchanged).
#[derive(Debug, Clone)]
pub struct FileRev {
    pub path: String,
    pub revision: Revision,
    pub rev_props: HashMap<String, Vec<u8>>,
    pub prop_diffs: Vec<(String, Option<Vec<u8>>)>,
    pub delta: Option<Vec<DeltaWindow>>,
}

impl Session {
    /// Fetch the interesting revisions of `path` between `start` and `end`.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_file_revs(
        &self,
        path: &str,
        start: Revision,
        end: Revision,
    ) -> Result<Vec<FileRev>, RaError> {
        let mut body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><S:file-revs-report xmlns:S="{}">"#,
            NS_SVN
        );
        if let Some(rev) = start.number() {
            body.push_str(&format!("<S:start-revision>{}</S:start-revision>", rev));
        }
        if let Some(rev) = end.number() {
            body.push_str(&format!("<S:end-revision>{}</S:end-revision>", rev));
        }
        body.push_str(&format!("<S:path>{}</S:path>", escape_cdata(path)));
        body.push_str("</S:file-revs-report>");

        let resp = self
            .dispatch(
                "REPORT",
                self.root_path(),
                Some(&RequestBody::Xml(body)),
                &[],
                &[],
                false,
            )
            .await
            .map_err(|e| match e.kind() {
                "unsupported-feature" => {
                    RaError::UnsupportedFeature("the get-file-revs REPORT".to_string())
                }
                _ => e,
            })?;

        let text = resp.body_str()?;
        let revs = parse_file_revs(text)?;
        if revs.is_empty() {
            return Err(RaError::IncompleteData(
                "the file-revs report did not contain any revisions".to_string(),
            ));
        }
        Ok(revs)
    }
}

fn parse_file_revs(body: &str) -> Result<Vec<FileRev>, RaError> {
    let doc = xml::parse(body)?;
    let root = doc.root_element();
    if !xml::is_elem(root, NS_SVN, "file-revs-report") {
        return Err(RaError::UnexpectedElement(root.tag_name().name().to_string()));
    }

    let mut out = Vec::new();
    for node in root
        .children()
        .filter(|n| xml::is_elem(*n, NS_SVN, "file-rev"))
    {
        let path = node
            .attribute("path")
            .ok_or_else(|| RaError::MalformedXml("file-rev without a path".to_string()))?
            .to_string();
        let revision = node
            .attribute("rev")
            .and_then(Revision::parse)
            .ok_or_else(|| RaError::MalformedXml("file-rev without a revision".to_string()))?;

        let mut rev_props = HashMap::new();
        let mut prop_diffs = Vec::new();
        let mut delta = None;
        for child in node.children().filter(|n| n.is_element()) {
            if !matches!(child.tag_name().namespace(), Some(NS_SVN)) {
                continue;
            }
            match child.tag_name().name() {
                "rev-prop" => {
                    let (name, value) = named_value(child)?;
                    rev_props.insert(name, value);
                }
                "set-prop" => {
                    let (name, value) = named_value(child)?;
                    prop_diffs.push((name, Some(value)));
                }
                "remove-prop" => {
                    let name = child
                        .attribute("name")
                        .ok_or_else(|| {
                            RaError::MalformedXml("remove-prop without a name".to_string())
                        })?
                        .to_string();
                    prop_diffs.push((name, None));
                }
                "txdelta" => {
                    if delta.is_some() {
                        // The delta is defined to be the last element.
                        return Err(RaError::UnexpectedElement(
                            "second txdelta in one file-rev".to_string(),
                        ));
                    }
                    let raw = xml::collect_text(child);
                    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                    let bytes = B64.decode(cleaned.as_bytes()).map_err(|e| {
                        RaError::MalformedXml(format!("bad base64 in txdelta: {e}"))
                    })?;
                    delta = Some(decode_svndiff(&bytes).map_err(RaError::Delta)?);
                }
                _ => {}
            }
        }
        out.push(FileRev {
            path,
            revision,
            rev_props,
            prop_diffs,
            delta,
        });
    }
    Ok(out)
}

fn named_value(node: roxmltree::Node<'_, '_>) -> Result<(String, Vec<u8>), RaError> {
    let name = node
        .attribute("name")
        .ok_or_else(|| RaError::MalformedXml("property element without a name".to_string()))?
        .to_string();
    let raw = xml::collect_text(node);
    let value = match node.attribute("encoding") {
        None => raw.into_bytes(),
        Some("base64") => {
            let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            B64.decode(cleaned.as_bytes())
                .map_err(|e| RaError::MalformedXml(format!("bad base64 property value: {e}")))?
        }
        Some(other) => {
            return Err(RaError::MalformedXml(format!(
                "unknown property encoding '{}'",
                other
            )))
        }
    };
    Ok((name, value))
}
