//! Repository revision numbers.

use serde::{Deserialize, Serialize};

/// A repository revision number.
///
/// Revisions are non-negative and monotonically increasing; revision 0 is the
/// empty initial tree. The distinguished [`Revision::INVALID`] sentinel means
/// "HEAD" or "no particular revision" depending on context, mirroring how the
/// protocol omits the number entirely in those cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// The "no revision" sentinel.
    pub const INVALID: Revision = Revision(-1);

    /// The empty initial tree.
    pub const ZERO: Revision = Revision(0);

    pub fn new(number: u64) -> Revision {
        Revision(number as i64)
    }

    pub fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// The revision number, or `None` for the invalid sentinel.
    pub fn number(self) -> Option<u64> {
        if self.is_valid() {
            Some(self.0 as u64)
        } else {
            None
        }
    }

    /// Parse a decimal revision string as sent on the wire.
    pub fn parse(s: &str) -> Option<Revision> {
        s.trim().parse::<u64>().ok().map(Revision::new)
    }
}

impl From<u64> for Revision {
    fn from(number: u64) -> Revision {
        Revision::new(number)
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            f.write_str("HEAD")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel() {
        assert!(!Revision::INVALID.is_valid());
        assert_eq!(Revision::INVALID.number(), None);
        assert!(Revision::ZERO.is_valid());
        assert_eq!(Revision::new(42).number(), Some(42));
    }

    #[test]
    fn test_parse() {
        assert_eq!(Revision::parse("7"), Some(Revision::new(7)));
        assert_eq!(Revision::parse(" 12 "), Some(Revision::new(12)));
        assert_eq!(Revision::parse("-1"), None);
        assert_eq!(Revision::parse("abc"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Revision::new(5).to_string(), "5");
        assert_eq!(Revision::INVALID.to_string(), "HEAD");
    }
}
