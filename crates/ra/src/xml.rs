//! XML plumbing: namespaces, escaping, lookup helpers, and the `<D:error>`
//! body parser.

use roxmltree::Node;

use crate::error::RaError;

/// Namespace of the Subversion report elements.
pub const NS_SVN: &str = "svn:";

/// The DAV namespace.
pub const NS_DAV: &str = "DAV:";

/// Wire namespace of regular `svn:` properties.
pub const NS_SVN_PROP: &str = "http://subversion.tigris.org/xmlns/svn/";

/// Wire namespace of user-defined properties.
pub const NS_CUSTOM_PROP: &str = "http://subversion.tigris.org/xmlns/custom/";

/// Wire namespace of the transport's own properties.
pub const NS_SVN_DAV: &str = "http://subversion.tigris.org/xmlns/dav/";

/// Namespace of the Apache error payload.
pub const NS_APACHE_DAV: &str = "http://apache.org/dav/xmlns";

/// Escape character data.
pub fn escape_cdata(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape an attribute value.
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Whether a property value can travel as raw cdata, or needs base64.
pub fn is_xml_safe(value: &[u8]) -> bool {
    if std::str::from_utf8(value).is_err() {
        return false;
    }
    value
        .iter()
        .all(|&b| b >= 0x20 || b == b'\t' || b == b'\n' || b == b'\r')
}

/// Whether `node` is an element with the given expanded name.
pub fn is_elem(node: Node<'_, '_>, ns: &str, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(ns)
}

/// First child element with the given expanded name.
pub fn child<'a, 'i>(node: Node<'a, 'i>, ns: &str, name: &str) -> Option<Node<'a, 'i>> {
    node.children().find(|c| is_elem(*c, ns, name))
}

/// Concatenated text of the first matching child element.
pub fn child_text(node: Node<'_, '_>, ns: &str, name: &str) -> Option<String> {
    child(node, ns, name).map(|c| collect_text(c))
}

/// All text directly inside an element.
pub fn collect_text(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    for c in node.children() {
        if let Some(t) = c.text() {
            out.push_str(t);
        }
    }
    out
}

/// Parse a document, mapping parse failures to `malformed-xml`.
pub fn parse(body: &str) -> Result<roxmltree::Document<'_>, RaError> {
    roxmltree::Document::parse(body).map_err(|e| RaError::MalformedXml(e.to_string()))
}

/// Extract the Subversion error payload out of a non-2xx response body:
/// `<D:error><m:human-readable errcode="N">text</m:human-readable></D:error>`.
///
/// Returns `(errcode, message)` when the body carries one.
pub fn parse_server_error(body: &[u8]) -> Option<(Option<u64>, String)> {
    let text = std::str::from_utf8(body).ok()?;
    let doc = roxmltree::Document::parse(text).ok()?;
    let root = doc.root_element();
    if !is_elem(root, NS_DAV, "error") {
        return None;
    }
    let human = root.descendants().find(|n| {
        n.is_element()
            && n.tag_name().name() == "human-readable"
            && n.tag_name().namespace() == Some(NS_APACHE_DAV)
    })?;
    let errcode = human.attribute("errcode").and_then(|v| v.parse::<u64>().ok());
    let message = collect_text(human).trim().to_string();
    Some((errcode, message))
}
