// ABOUTME: Parsing of the image references handed to the upgrader.
// ABOUTME: Distinguishes literal image ids from repo[:tag][@digest] names.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// A named image reference: `[registry/]name[:tag][@digest]`.
///
/// Unlike a pull reference, the tag is left unset when absent so the
/// original spelling survives; `qualified()` supplies `:latest`.
#[derive(Debug, Clone, PartialEq, Eq)]
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

        for c in input.chars() {
            if !c.is_ascii_alphanumeric()
                && c != '/'
                && c != ':'
                && c != '.'
                && c != '-'
                && c != '_'
                && c != '@'
            {
                return Err(ParseImageRefError::InvalidChar(c));
            }
        }

        let (without_digest, digest) = match input.split_once('@') {
            Some((before, after)) if !after.is_empty() => (before, Some(after.to_string())),
            Some(_) => return Err(ParseImageRefError::InvalidFormat(input.to_string())),
            None => (input, None),
        };

        // A colon followed by a slash belongs to a registry port, not a tag.
        let (without_tag, tag) = match without_digest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => {
                if after.is_empty() {
                    return Err(ParseImageRefError::InvalidFormat(input.to_string()));
                }
                (before, Some(after.to_string()))
            }
            _ => (without_digest, None),
        };

        let (registry, name) = Self::parse_registry_and_name(without_tag)?;

        Ok(Self {
            registry,
            name,
            tag,
            digest,
        })
    }

    fn parse_registry_and_name(
        input: &str,
    ) -> Result<(Option<String>, String), ParseImageRefError> {
        if input.is_empty() || input.starts_with('/') || input.ends_with('/') {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        // A registry is present if the first component contains a dot or colon,
        // or is "localhost"
        match input.split_once('/') {
            None => Ok((None, input.to_string())),
            Some((first, rest)) => {
                if first.contains('.') || first.contains(':') || first == "localhost" {
                    Ok((Some(first.to_string()), rest.to_string()))
                } else {
                    Ok((None, input.to_string()))
                }
            }
        }
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

    /// Repository part without tag or digest, e.g. `ghcr.io/org/app`.
    pub fn repository(&self) -> String {
        match self.registry {
            Some(ref registry) => format!("{}/{}", registry, self.name),
            None => self.name.clone(),
        }
    }

    /// The tag-qualified form: `:latest` is appended when neither a tag nor
    /// a digest was given.
    pub fn qualified(&self) -> String {
        if self.tag.is_none() && self.digest.is_none() {
            format!("{}:latest", self)
        } else {
            self.to_string()
        }
    }

    /// Whether both references name the same tag once registry defaults
    /// are filled in.
    ///
    /// Docker lists tags the way they were written (`debian:12`); Podman
    /// lists them fully qualified (`docker.io/library/debian:12`) and files
    /// local builds under `localhost/`. Digests take no part in tag identity.
    pub fn same_tag(&self, other: &ImageRef) -> bool {
        if self.tag.as_deref().unwrap_or("latest") != other.tag.as_deref().unwrap_or("latest") {
            return false;
        }
        if self.canonical_repository() == other.canonical_repository() {
            return true;
        }
        // A short name also matches Podman's spelling of a local image.
        match (self.registry.as_deref(), other.registry.as_deref()) {
            (None, Some("localhost")) | (Some("localhost"), None) => self.name == other.name,
            _ => false,
        }
    }

    fn canonical_repository(&self) -> (&str, String) {
        let registry = match self.registry.as_deref() {
            None | Some("index.docker.io") => "docker.io",
            Some(registry) => registry,
        };
        let name = if registry == "docker.io" && !self.name.contains('/') {
            format!("library/{}", self.name)
        } else {
            self.name.clone()
        };
        (registry, name)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        write!(f, "{}", self.name)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

/// One image reference as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    /// A literal image id (`sha256:<hex>` or a bare hex prefix).
    Id(String),
    /// A repository reference, possibly tagged.
    Named(ImageRef),
}

impl TargetRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if looks_like_image_id(input) {
            return Ok(TargetRef::Id(input.to_string()));
        }
        ImageRef::parse(input).map(TargetRef::Named)
    }

    /// The string handed to the runtime's image inspect call.
    pub fn inspect_key(&self) -> String {
        match self {
            TargetRef::Id(id) => id.clone(),
            TargetRef::Named(image) => image.qualified(),
        }
    }

    /// The tag this reference contributes when the image lists it.
    ///
    /// Ids and digest references never name a tag.
    pub fn qualified_tag(&self) -> Option<String> {
        match self {
            TargetRef::Id(_) => None,
            TargetRef::Named(image) if image.digest().is_some() => None,
            TargetRef::Named(image) => Some(image.qualified()),
        }
    }

    /// Entries of an image's tag list that this reference names, in the
    /// runtime's own spelling.
    pub fn matching_tags<'a>(&self, listed: &'a [String]) -> Vec<&'a str> {
        let TargetRef::Named(image) = self else {
            return Vec::new();
        };
        if image.digest().is_some() {
            return Vec::new();
        }
        listed
            .iter()
            .filter(|tag| ImageRef::parse(tag).is_ok_and(|stored| image.same_tag(&stored)))
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetRef::Id(id) => write!(f, "{}", id),
            TargetRef::Named(image) => write!(f, "{}", image),
        }
    }
}

impl std::str::FromStr for TargetRef {
    type Err = ParseImageRefError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetRef::parse(s)
    }
}

/// `sha256:<64 hex>` or 12 to 64 lowercase hex characters.
fn looks_like_image_id(input: &str) -> bool {
    let is_hex = |s: &str| s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    match input.strip_prefix("sha256:") {
        Some(rest) => rest.len() == 64 && is_hex(rest),
        None => (12..=64).contains(&input.len()) && is_hex(input),
    }
}
