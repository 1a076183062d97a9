//! The log report: revision history for a set of paths.

use chrono::{DateTime, Utc};
use tracing::instrument;

use subdav_types::{path as repo_path, Revision};

use crate::error::RaError;
use crate::session::{RequestBody, Session};
use crate::xml::{self, escape_cdata, NS_DAV, NS_SVN};

/// How a changed path entered the revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Deleted,
    Modified,
    Replaced,
}

/// One path touched by a revision.
#[derive(Debug, Clone)]
pub struct ChangedPath {
    pub action: ChangeAction,
    pub path: String,
    /// Copy source, for added/replaced paths with history.
    pub copyfrom: Option<(String, Revision)>,
}

/// One revision out of a log drive.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub revision: Revision,
    pub author: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub changed_paths: Vec<ChangedPath>,
}

impl Session {
    /// Fetch log entries for `paths` (session-relative; empty means the
    /// session root) across `start..end`, newest-or-oldest first exactly as
    /// the server orders the range.
    #[instrument(level = "debug", skip(self, paths))]
    pub async fn get_log(
        &self,
        paths: &[&str],
        start: Revision,
        end: Revision,
        limit: Option<u32>,
        discover_changed_paths: bool,
        strict_node_history: bool,
    ) -> Result<Vec<LogEntry>, RaError> {
        let mut body = format!(
            r#"<?xml version="1.0" encoding="utf-8"?><S:log-report xmlns:S="{}">"#,
            NS_SVN
        );
        if let Some(rev) = start.number() {
            body.push_str(&format!("<S:start-revision>{}</S:start-revision>", rev));
        }
        if let Some(rev) = end.number() {
            body.push_str(&format!("<S:end-revision>{}</S:end-revision>", rev));
        }
        if let Some(n) = limit {
            body.push_str(&format!("<S:limit>{}</S:limit>", n));
        }
        if discover_changed_paths {
            body.push_str("<S:discover-changed-paths/>");
        }
        if strict_node_history {
            body.push_str("<S:strict-node-history/>");
        }
        for path in paths {
            body.push_str(&format!("<S:path>{}</S:path>", escape_cdata(path)));
        }
        body.push_str("</S:log-report>");

        // The session URL may be gone from HEAD, so the REPORT is aimed at
        // a baseline-collection URL built from the younger end of the range.
        let use_rev = match (start.number(), end.number()) {
            (Some(a), Some(b)) => Revision::new(a.max(b)),
            (Some(a), None) => Revision::new(a),
            (None, Some(b)) => Revision::new(b),
            (None, None) => Revision::INVALID,
        };
        let info = self
            .get_baseline_info(self.root_path(), use_rev, false)
            .await?;
        let target = repo_path::url_join(&info.bc_url, &info.bc_relative);

        let resp = self
            .dispatch(
                "REPORT",
                &target,
                Some(&RequestBody::Xml(body)),
                &[],
                &[],
                false,
            )
            .await?;
        parse_log_report(resp.body_str()?)
    }
}

fn parse_log_report(body: &str) -> Result<Vec<LogEntry>, RaError> {
    let doc = xml::parse(body)?;
    let root = doc.root_element();
    if !xml::is_elem(root, NS_SVN, "log-report") {
        return Err(RaError::UnexpectedElement(root.tag_name().name().to_string()));
    }

    let mut out = Vec::new();
    for item in root
        .children()
        .filter(|n| xml::is_elem(*n, NS_SVN, "log-item"))
    {
        let revision = xml::child_text(item, NS_DAV, "version-name")
            .and_then(|v| Revision::parse(&v))
            .ok_or_else(|| {
                RaError::MalformedXml("log-item without a version-name".to_string())
            })?;
        let author = xml::child_text(item, NS_DAV, "creator-displayname")
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        let date = xml::child_text(item, NS_SVN, "date").and_then(|d| {
            DateTime::parse_from_rfc3339(d.trim())
                .ok()
                .map(|d| d.with_timezone(&Utc))
        });
        let message = xml::child_text(item, NS_DAV, "comment");

        let mut changed_paths = Vec::new();
        for child in item.children().filter(|n| n.is_element()) {
            if child.tag_name().namespace() != Some(NS_SVN) {
                continue;
            }
            let action = match child.tag_name().name() {
                "added-path" => ChangeAction::Added,
                "deleted-path" => ChangeAction::Deleted,
                "modified-path" => ChangeAction::Modified,
                "replaced-path" => ChangeAction::Replaced,
                _ => continue,
            };
            let copyfrom = match (
                child.attribute("copyfrom-path"),
                child.attribute("copyfrom-rev").and_then(Revision::parse),
            ) {
                (Some(path), Some(rev)) => Some((path.to_string(), rev)),
                _ => None,
            };
            changed_paths.push(ChangedPath {
                action,
                path: xml::collect_text(child),
                copyfrom,
            });
        }
        out.push(LogEntry {
            revision,
            author,
            date,
            message,
            changed_paths,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_report() {
        let body = r#"<?xml version="1.0" encoding="utf-8"?>
<S:log-report xmlns:S="svn:" xmlns:D="DAV:">
<S:log-item>
<D:version-name>12</D:version-name>
<D:creator-displayname>alice</D:creator-displayname>
<S:date>2026-07-30T10:00:00.000000Z</S:date>
<D:comment>Branch the feature work</D:comment>
<S:added-path copyfrom-path="/trunk" copyfrom-rev="11">/branches/feature</S:added-path>
<S:modified-path>/trunk/README</S:modified-path>
</S:log-item>
<S:log-item>
<D:version-name>11</D:version-name>
<D:comment></D:comment>
<S:deleted-path>/trunk/old.c</S:deleted-path>
<S:replaced-path>/trunk/gen.c</S:replaced-path>
</S:log-item>
</S:log-report>"#;

        let entries = parse_log_report(body).unwrap();
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.revision, Revision::new(12));
        assert_eq!(first.author.as_deref(), Some("alice"));
        assert!(first.date.is_some());
        assert_eq!(first.message.as_deref(), Some("Branch the feature work"));
        assert_eq!(first.changed_paths.len(), 2);
        assert_eq!(first.changed_paths[0].action, ChangeAction::Added);
        assert_eq!(first.changed_paths[0].path, "/branches/feature");
        assert_eq!(
            first.changed_paths[0].copyfrom,
            Some(("/trunk".to_string(), Revision::new(11)))
        );
        assert_eq!(first.changed_paths[1].action, ChangeAction::Modified);

        let second = &entries[1];
        assert_eq!(second.author, None);
        assert_eq!(second.message.as_deref(), Some(""));
        assert_eq!(second.changed_paths[0].action, ChangeAction::Deleted);
        assert_eq!(second.changed_paths[1].action, ChangeAction::Replaced);
    }

    #[test]
    fn test_parse_rejects_wrong_root() {
        assert!(parse_log_report("<S:other xmlns:S=\"svn:\"/>").is_err());
    }

    #[test]
    fn test_log_item_requires_revision() {
        let body = r#"<S:log-report xmlns:S="svn:"><S:log-item/></S:log-report>"#;
        assert!(parse_log_report(body).is_err());
    }
}
