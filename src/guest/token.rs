// ABOUTME: Status token reported by the in-container upgrade program.
// ABOUTME: Decodes the raw side-channel bytes into a closed set of upgrade paths.

use std::fmt;

/// Which upgrade path the guest took.
///
/// Decoding is total: anything the guest did not report, or reported in a
/// form we do not know, lands in `Unknown` with the raw text kept for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusToken {
    /// An image-provided upgrade hook ran instead of the package manager.
    Legacy,
    Debian,
    Alpine,
    Redhat,
    /// The guest recognised no distribution.
    Unsupported,
    /// Empty, undecodable, or unrecognised report.
    Unknown(String),
}

impl StatusToken {
    /// Decode the bytes read from the status channel.
    ///
    /// Only the first line counts; surrounding whitespace is ignored.
    pub fn decode(raw: &[u8]) -> Self {
        let Ok(text) = std::str::from_utf8(raw) else {
            return StatusToken::Unknown(String::from_utf8_lossy(raw).trim().to_string());
        };
        let first = text.lines().next().unwrap_or("").trim();
        match first {
            "legacy" => StatusToken::Legacy,
            "debian" => StatusToken::Debian,
            "alpine" => StatusToken::Alpine,
            "redhat" => StatusToken::Redhat,
            "unsupported" => StatusToken::Unsupported,
            other => StatusToken::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StatusToken::Legacy => "legacy",
            StatusToken::Debian => "debian",
            StatusToken::Alpine => "alpine",
            StatusToken::Redhat => "redhat",
            StatusToken::Unsupported => "unsupported",
            StatusToken::Unknown(_) => "unknown",
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, StatusToken::Unsupported)
    }
}

impl fmt::Display for StatusToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusToken::Unknown(raw) if !raw.is_empty() => write!(f, "unknown ({})", raw),
            other => write!(f, "{}", other.as_str()),
        }
    }
}
