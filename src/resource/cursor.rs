//! Pagination cursor

use std::fmt;

/// Opaque continuation token for a paged listing.
///
/// A cursor is in one of three shapes: the start of a listing (no token, not
/// exhausted), mid-listing (token present) or exhausted (no token, no more
/// pages). An exhausted cursor never carries a token.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Cursor {
    token: Option<String>,
    exhausted: bool,
}

impl Cursor {
    /// Cursor for the first call of a listing
    pub fn start() -> Self {
        Self::default()
    }

    /// Cursor signalling that no further pages exist
    pub fn exhausted() -> Self {
        Self {
            token: None,
            exhausted: true,
        }
    }

    /// Normalise what a provider returned after a page.
    ///
    /// A missing or blank token, or an explicit "no more results" marker,
    /// both mean the listing is over.
    pub fn from_response(token: Option<String>, no_more_results: bool) -> Self {
        match token {
            Some(t) if !no_more_results && !t.trim().is_empty() => Self {
                token: Some(t),
                exhausted: false,
            },
            _ => Self::exhausted(),
        }
    }

    /// Cursor continuing from `token`
    pub fn next(token: impl Into<String>) -> Self {
        Self::from_response(Some(token.into()), false)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn is_start(&self) -> bool {
        !self.exhausted && self.token.is_none()
    }
}

// Tokens can embed keys from the listed collection, keep them out of logs
impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exhausted {
            f.write_str("Cursor(exhausted)")
        } else if let Some(token) = &self.token {
            write!(f, "Cursor({} byte token)", token.len())
        } else {
            f.write_str("Cursor(start)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_cursor() {
        let c = Cursor::start();
        assert!(c.is_start());
        assert!(!c.is_exhausted());
        assert_eq!(c.token(), None);
    }

    #[test]
    fn test_missing_token_means_exhausted() {
        assert!(Cursor::from_response(None, false).is_exhausted());
    }

    #[test]
    fn test_blank_token_means_exhausted() {
        assert!(Cursor::next("").is_exhausted());
        assert!(Cursor::next("   ").is_exhausted());
    }

    #[test]
    fn test_explicit_marker_wins_over_token() {
        let c = Cursor::from_response(Some("abc".into()), true);
        assert!(c.is_exhausted());
        assert_eq!(c.token(), None);
    }

    #[test]
    fn test_token_is_kept() {
        let c = Cursor::next("page-2");
        assert_eq!(c.token(), Some("page-2"));
        assert!(!c.is_start());
        assert!(!c.is_exhausted());
    }

    #[test]
    fn test_debug_hides_token() {
        let rendered = format!("{:?}", Cursor::next("secret-key"));
        assert!(!rendered.contains("secret"));
    }
}
