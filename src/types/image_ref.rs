// ABOUTME: Container image reference parsing and validation.
// ABOUTME: Keeps the literal reference and derives registry-qualified transient tags.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference {reference:?}: {found:?}")]
    InvalidChar { reference: String, found: char },

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),

    #[error("digest references cannot be re-tagged on the remote host, use a tag: {0}")]
    Digest(String),
}

/// A validated `name[:tag]` reference.
///
/// The literal text is kept as given: identity, display, and the remote
/// re-tag all use it, so `myapp` and `myapp:latest` are distinct requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct ImageRef {
    literal: String,
    registry: Option<String>,
    name: String,
    tag: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }

        // Whitespace is rejected rather than trimmed: it only shows up when
        // an argument list was split incorrectly upstream.
        for c in input.chars() {
            if !c.is_ascii_alphanumeric()
                && c != '/'
                && c != ':'
                && c != '.'
                && c != '-'
                && c != '_'
                && c != '@'
            {
                return Err(ParseImageRefError::InvalidChar {
                    reference: input.to_string(),
                    found: c,
                });
            }
        }

        if input.contains('@') {
            return Err(ParseImageRefError::Digest(input.to_string()));
        }

        // Split off tag if present
        let (without_tag, tag) = match input.rsplit_once(':') {
            // A colon followed by a slash belongs to a registry port
            Some((before, after)) if !after.contains('/') => {
                if after.is_empty() {
                    return Err(ParseImageRefError::InvalidFormat(input.to_string()));
                }
                (before, Some(after.to_string()))
            }
            _ => (input, None),
        };

        let (registry, name) = Self::parse_registry_and_name(without_tag)?;

        if name.is_empty()
            || name.starts_with('/')
            || name.ends_with('/')
            || name.contains("//")
        {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        Ok(Self {
            literal: input.to_string(),
            registry,
            name,
            tag,
        })
    }

    fn parse_registry_and_name(
        input: &str,
    ) -> Result<(Option<String>, String), ParseImageRefError> {
        // A registry is present if the first component contains a dot or colon,
        // or is "localhost"
        match input.split_once('/') {
            None => Ok((None, input.to_string())),
            Some((first, rest)) => {
                if first.is_empty() {
                    return Err(ParseImageRefError::InvalidFormat(input.to_string()));
                }
                if first.contains('.') || first.contains(':') || first == "localhost" {
                    Ok((Some(first.to_string()), rest.to_string()))
                } else {
                    Ok((None, input.to_string()))
                }
            }
        }
    }

    /// `docker.io/library/registry:2`, the stock distribution registry.
    pub fn distribution_registry() -> Self {
        Self {
            literal: "docker.io/library/registry:2".to_string(),
            registry: Some("docker.io".to_string()),
            name: "library/registry".to_string(),
            tag: Some("2".to_string()),
        }
    }

    /// The reference exactly as the user wrote it.
    pub fn as_str(&self) -> &str {
        &self.literal
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The explicit tag, if one was written.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// The tag the runtime resolves this reference to.
    pub fn tag_or_latest(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }

    /// Everything before the tag: `registry/name` or just `name`.
    pub fn repository(&self) -> String {
        match &self.registry {
            Some(registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    /// The transient reference routed through a registry at `address`
    /// (`host:port`), e.g. `localhost:5000/myapp:latest`.
    pub fn qualified(&self, address: &str) -> ImageRef {
        ImageRef {
            literal: format!("{}/{}", address, self.literal),
            registry: Some(address.to_string()),
            name: self.repository(),
            tag: self.tag.clone(),
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.literal)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ImageRef {
    type Error = ParseImageRefError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}
