//! Reserved client-side property names.
//!
//! The working copy stores two families of reserved properties on behalf of
//! the remote layer: transport bookkeeping under `svn:wc:ra_dav:` and entry
//! metadata under `svn:entry:`.

/// Prefix of every regular versioned `svn:` property.
pub const SVN_PROP_PREFIX: &str = "svn:";

/// Prefix of working-copy bookkeeping properties.
pub const WC_PROP_PREFIX: &str = "svn:wc:";

/// Namespace of the DAV transport's working-copy properties.
pub const LP_NAMESPACE: &str = "svn:wc:ra_dav:";

/// The cached activity-collection URL, stored at the working-copy root.
pub const LP_ACTIVITY_URL: &str = "svn:wc:ra_dav:activity-url";

/// The cached version-resource URL of a path.
pub const LP_VERSION_URL: &str = "svn:wc:ra_dav:version-url";

/// Entry property: revision of the last commit touching the node.
pub const ENTRY_COMMITTED_REV: &str = "svn:entry:committed-rev";

/// Entry property: date of the last commit touching the node.
pub const ENTRY_COMMITTED_DATE: &str = "svn:entry:committed-date";

/// Entry property: author of the last commit touching the node.
pub const ENTRY_LAST_AUTHOR: &str = "svn:entry:last-author";

/// Entry property: repository UUID.
pub const ENTRY_UUID: &str = "svn:entry:uuid";

/// The revision log message property.
pub const PROP_LOG: &str = "svn:log";

/// The revision author property.
pub const PROP_AUTHOR: &str = "svn:author";

/// The revision date property.
pub const PROP_DATE: &str = "svn:date";
