//! WebDAV/DeltaV remote-repository adapter.
//!
//! This crate turns editor drives into WebDAV exchanges and WebDAV
//! responses back into editor drives: REPORT-based updates, activity-based
//! commits, baseline discovery, property plumbing, and direct repository
//! reads, all over one authenticated HTTP session.

pub mod auth;
pub mod commit;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filerevs;
pub mod log;
pub mod props;
pub mod report;
pub mod session;
pub mod update;
pub mod wc;
mod xml;

pub use auth::{AuthProvider, Credentials, NoAuth, StaticAuth};
pub use commit::{CommitCallback, CommitEditor, CommitInfo};
pub use config::SessionConfig;
pub use error::RaError;
pub use fetch::{DirEntry, FileFetch};
pub use filerevs::FileRev;
pub use log::{ChangeAction, ChangedPath, LogEntry};
pub use props::{BaselineInfo, DavResource, Depth};
pub use report::Reporter;
pub use session::Session;
pub use update::{drive_report_response, DriveOptions};
pub use wc::{NullWorkingCopy, WorkingCopy};
