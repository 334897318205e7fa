//! Artifact paths: the `/`-joined addresses that permission grants anchor to
//! and execution stacks produce.
//!
//! A path is an ordered sequence of non-empty segments. Two tokens are
//! reserved for grant patterns: [`MATCH_MANY`] (`*`) matches any number of
//! consecutive segments, including zero, and [`MATCH_ONE`] (`?`) matches
//! exactly one segment. Segment comparison is case-sensitive.
//!
//! # Examples
//!
//! ```
//! use pathguard::path::ArtifactPath;
//!
//! let path: ArtifactPath = "/accounting/invoice/edit".parse().unwrap();
//! assert_eq!(path.segments().len(), 3);
//! assert_eq!(path.to_string(), "/accounting/invoice/edit");
//!
//! assert_eq!(ArtifactPath::root().to_string(), "/");
//! ```

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pattern token matching zero or more consecutive segments.
pub const MATCH_MANY: &str = "*";

/// Pattern token matching exactly one segment.
pub const MATCH_ONE: &str = "?";

/// An ordered, possibly empty, sequence of path segments.
///
/// The empty path is the address of an empty artifact stack and renders as
/// `/`. Grant patterns parsed from storage must carry at least one segment;
/// [`ArtifactPath::from_str`] enforces that grammar.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactPath {
    segments: Vec<String>,
}

impl ArtifactPath {
    /// The empty path (`/`).
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from pre-split segments, rejecting empty ones.
    pub fn new<I, S>(segments: I) -> Result<Self, PathParseError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathParseError::EmptySegment {
                raw: format!("/{}", segments.join("/")),
            });
        }
        Ok(Self { segments })
    }

    /// The raw segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment. Used by the artifact stack when rendering its
    /// current address; segment validity is the caller's concern here.
    pub(crate) fn push_segment(&mut self, segment: impl Into<String>) {
        self.segments.push(segment.into());
    }
}

impl fmt::Display for ArtifactPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ArtifactPath {
    type Err = PathParseError;

    /// Parse the storage grammar `"/" segment ("/" segment)*`.
    ///
    /// A bare `/` is rejected: grant rows must anchor somewhere. The empty
    /// path exists only as the address of an empty stack and is constructed
    /// through [`ArtifactPath::root`].
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(PathParseError::MissingLeadingSlash { raw: raw.into() });
        };
        if rest.is_empty() {
            return Err(PathParseError::NoSegments { raw: raw.into() });
        }
        let segments: Vec<String> = rest.split('/').map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathParseError::EmptySegment { raw: raw.into() });
        }
        Ok(Self { segments })
    }
}

/// Rejections of the artifact-path grammar.
#[derive(Clone, Debug, Error, Diagnostic, PartialEq, Eq)]
pub enum PathParseError {
    #[error("artifact path `{raw}` does not start with `/`")]
    #[diagnostic(
        code(pathguard::path::missing_leading_slash),
        help("artifact paths are absolute: `/segment/segment`")
    )]
    MissingLeadingSlash { raw: String },

    #[error("artifact path `{raw}` has no segments")]
    #[diagnostic(
        code(pathguard::path::no_segments),
        help("grant paths must anchor to at least one segment")
    )]
    NoSegments { raw: String },

    #[error("artifact path `{raw}` contains an empty segment")]
    #[diagnostic(code(pathguard::path::empty_segment))]
    EmptySegment { raw: String },
}
