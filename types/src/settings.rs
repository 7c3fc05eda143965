//! Resolved configuration types shared across crates.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! `proposald-config`. The config loader resolves them into these types at
//! the parse boundary.

use serde::Deserialize;

pub const MIME_TEXT_UTF8: &str = "text/plain; charset=utf-8";
pub const MIME_PNG: &str = "image/png";
pub const DEFAULT_MAX_FILES: usize = 16;
pub const DEFAULT_MAX_FILE_SIZE: usize = 512 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentPolicyError {
    #[error("allowed_mime must list at least one MIME type")]
    NoMimeTypes,
    #[error("max_files must be greater than zero")]
    ZeroMaxFiles,
    #[error("max_file_size must be greater than zero")]
    ZeroMaxFileSize,
}

#[derive(Deserialize)]
struct RawContentPolicy {
    allowed_mime: Vec<String>,
    max_files: usize,
    max_file_size: usize,
}

/// Validated limits applied to every submitted file set.
///
/// Invariant: at least one MIME type is allowed and both limits are non-zero.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawContentPolicy")]
pub struct ContentPolicy {
    allowed_mime: Vec<String>,
    max_files: usize,
    max_file_size: usize,
}

impl TryFrom<RawContentPolicy> for ContentPolicy {
    type Error = ContentPolicyError;

    fn try_from(raw: RawContentPolicy) -> Result<Self, Self::Error> {
        Self::new(raw.allowed_mime, raw.max_files, raw.max_file_size)
    }
}

impl ContentPolicy {
    pub fn new(
        allowed_mime: Vec<String>,
        max_files: usize,
        max_file_size: usize,
    ) -> Result<Self, ContentPolicyError> {
        let allowed_mime: Vec<String> = allowed_mime
            .into_iter()
            .map(|mime| mime.trim().to_string())
            .filter(|mime| !mime.is_empty())
            .collect();
        if allowed_mime.is_empty() {
            return Err(ContentPolicyError::NoMimeTypes);
        }
        if max_files == 0 {
            return Err(ContentPolicyError::ZeroMaxFiles);
        }
        if max_file_size == 0 {
            return Err(ContentPolicyError::ZeroMaxFileSize);
        }
        Ok(Self {
            allowed_mime,
            max_files,
            max_file_size,
        })
    }

    #[must_use]
    pub fn allows_mime(&self, mime: &str) -> bool {
        self.allowed_mime.iter().any(|allowed| allowed == mime)
    }

    #[must_use]
    pub fn allowed_mime(&self) -> &[String] {
        &self.allowed_mime
    }

    #[must_use]
    pub fn max_files(&self) -> usize {
        self.max_files
    }

    #[must_use]
    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }
}

impl Default for ContentPolicy {
    fn default() -> Self {
        Self {
            allowed_mime: vec![MIME_TEXT_UTF8.to_string(), MIME_PNG.to_string()],
            max_files: DEFAULT_MAX_FILES,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allows_text_and_png() {
        let policy = ContentPolicy::default();
        assert!(policy.allows_mime(MIME_TEXT_UTF8));
        assert!(policy.allows_mime(MIME_PNG));
        assert!(!policy.allows_mime("application/pdf"));
    }

    #[test]
    fn new_rejects_degenerate_limits() {
        assert_eq!(
            ContentPolicy::new(vec![" ".to_string()], 1, 1),
            Err(ContentPolicyError::NoMimeTypes)
        );
        assert_eq!(
            ContentPolicy::new(vec![MIME_PNG.to_string()], 0, 1),
            Err(ContentPolicyError::ZeroMaxFiles)
        );
        assert_eq!(
            ContentPolicy::new(vec![MIME_PNG.to_string()], 1, 0),
            Err(ContentPolicyError::ZeroMaxFileSize)
        );
    }

    #[test]
    fn deserialize_validates() {
        let err = serde_json::from_str::<ContentPolicy>(
            r#"{"allowed_mime": [], "max_files": 4, "max_file_size": 10}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("allowed_mime"));
    }
}
