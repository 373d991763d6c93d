use unicode_segmentation::UnicodeSegmentation;

/// A user-facing name for email greetings: trimmed, non-empty, and at most 256
/// graphemes.
///
/// Must be instantiated with `DisplayName::parse` (or `resolve`, which falls
/// back to `DisplayName::FALLBACK`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    /// Used when no source has a name for the user
    pub const FALLBACK: &'static str = "Investigador/a";

    const MAX_GRAPHEMES: usize = 256;

    pub fn parse(name: String) -> Result<Self, String> {
        let trimmed = name.trim();
        let empty = trimmed.is_empty();
        let too_long = trimmed.graphemes(true).count() > Self::MAX_GRAPHEMES;
        match !empty && !too_long {
            true => Ok(Self(trimmed.to_string())),
            false => Err(format!("Invalid name: {name:?}")),
        }
    }

    pub fn fallback() -> Self { Self(Self::FALLBACK.to_string()) }

    /// Evaluate `candidates` in order until one parses; otherwise
    /// `DisplayName::FALLBACK`.
    pub fn resolve<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = Option<String>>,
    {
        candidates
            .into_iter()
            .flatten()
            .find_map(|c| Self::parse(c).ok())
            .unwrap_or_else(Self::fallback)
    }
}

impl AsRef<str> for DisplayName {
    fn as_ref(&self) -> &str { &self.0 }
}
