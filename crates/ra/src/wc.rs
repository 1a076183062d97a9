//! The working-copy capability this layer consumes.
//!
//! The on-disk working copy is someone else's problem; the remote layer only
//! needs a small property store keyed by repository-relative path. Version
//! resource URLs and the activity collection are cached through it between
//! sessions (see the `svn:wc:ra_dav:` names in `subdav_types::props`), and
//! entry metadata flows back after updates and commits.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::RaError;

#[async_trait]
pub trait WorkingCopy: Send + Sync {
    /// Read a cached bookkeeping property.
    async fn get_wc_prop(&self, _path: &str, _name: &str) -> Result<Option<Vec<u8>>, RaError> {
        Ok(None)
    }

    /// Stage a bookkeeping property write as part of the current drive; the
    /// working copy applies it when the drive commits its results.
    async fn push_wc_prop(
        &self,
        _path: &str,
        _name: &str,
        _value: Option<&[u8]>,
    ) -> Result<(), RaError> {
        Ok(())
    }

    /// Write a bookkeeping property immediately, outside any drive.
    async fn set_wc_prop(
        &self,
        _path: &str,
        _name: &str,
        _value: Option<&[u8]>,
    ) -> Result<(), RaError> {
        Ok(())
    }

    /// Drop a named property from a whole subtree. Used before switches so a
    /// half-completed switch cannot leave stale version-URL pointers.
    async fn invalidate_wc_props(&self, _path: &str, _name: &str) -> Result<(), RaError> {
        Ok(())
    }

    /// Directory for request-body staging, when the working copy wants temp
    /// files kept in its own administrative area.
    fn tmp_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Whether pushed properties actually land anywhere. When they don't,
    /// the commit driver tells the server to skip the merge-response
    /// resource listing entirely.
    fn stores_wc_props(&self) -> bool {
        true
    }
}

/// A working copy that remembers nothing.
pub struct NullWorkingCopy;

#[async_trait]
impl WorkingCopy for NullWorkingCopy {
    fn stores_wc_props(&self) -> bool {
        false
    }
}
