// ABOUTME: Parsed container image references (registry/repo:tag@digest).
// ABOUTME: Normalizes Docker Hub shorthand so repo digests can be matched.

use std::fmt;
use thiserror::Error;

const DEFAULT_REGISTRY: &str = "docker.io";
const LEGACY_REGISTRY: &str = "index.docker.io";
const OFFICIAL_NAMESPACE: &str = "library";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// An image reference as written by users or reported by the runtime.
///
/// `Display` reproduces the reference in its written form; `repository()`
/// gives the canonical `registry/namespace/name` used to match repo digests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    name: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || "/:.-_@".contains(*c)))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((rest, digest)) if digest.contains(':') => (rest, Some(digest.to_string())),
            Some(_) => return Err(ParseImageRefError::InvalidFormat(input.to_string())),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; earlier colons belong
        // to a registry port.
        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (path, tag) = match rest[last_slash..].split_once(':') {
            Some((_, tag)) if tag.is_empty() => {
                return Err(ParseImageRefError::InvalidFormat(input.to_string()));
            }
            Some((name, tag)) => (&rest[..last_slash + name.len()], Some(tag.to_string())),
            None => (rest, None),
        };

        let (registry, name) = match path.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), remainder)
            }
            _ => (None, path),
        };

        if name.is_empty() || name.split('/').any(str::is_empty) {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        Ok(Self {
            registry,
            name: name.to_string(),
            tag,
            digest,
        })
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Registry and name as written, without tag or digest.
    pub fn pull_name(&self) -> String {
        match self.registry.as_deref() {
            Some(registry) => format!("{registry}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Tag used when pulling: the explicit tag, or `latest` when neither tag nor digest is set.
    pub fn effective_tag(&self) -> Option<&str> {
        match (&self.tag, &self.digest) {
            (Some(tag), _) => Some(tag),
            (None, None) => Some("latest"),
            (None, Some(_)) => None,
        }
    }

    /// A reference pinned to a content digest can never move upstream.
    pub fn is_pinned(&self) -> bool {
        self.digest.is_some()
    }

    /// Canonical repository, e.g. `nginx` becomes `docker.io/library/nginx`.
    pub fn repository(&self) -> String {
        let registry = match self.registry.as_deref() {
            None | Some(LEGACY_REGISTRY) => DEFAULT_REGISTRY,
            Some(other) => other,
        };
        if registry == DEFAULT_REGISTRY && !self.name.contains('/') {
            format!("{registry}/{OFFICIAL_NAMESPACE}/{}", self.name)
        } else {
            format!("{registry}/{}", self.name)
        }
    }

    /// Whether two references point at the same repository, ignoring tag and digest.
    pub fn same_repository(&self, other: &ImageRef) -> bool {
        self.repository() == other.repository()
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{registry}/")?;
        }
        f.write_str(&self.name)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
