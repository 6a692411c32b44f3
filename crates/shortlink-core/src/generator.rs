//! Artifact generation seam

use async_trait::async_trait;
use std::path::Path;

/// Produces the artifact for a resolution target and writes it to `path`.
///
/// The artifact cache treats generation as opaque: it only needs the file to
/// exist at `path` once `generate` returns `Ok`.
#[async_trait]
pub trait ArtifactGenerator: Send + Sync {
    async fn generate(&self, content: &str, path: &Path) -> std::io::Result<()>;

    /// File extension for generated artifacts, without the leading dot
    fn extension(&self) -> &str {
        "png"
    }

    fn content_type(&self) -> &str {
        "image/png"
    }
}
