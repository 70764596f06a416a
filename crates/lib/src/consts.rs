//! Protocol constants shared by the server and the agent.

/// Prefix every API route is mounted under.
pub const API_PREFIX: &str = "/api/v1";

/// Media type of the manifest response body.
pub const MANIFEST_MEDIA_TYPE: &str = "application/vnd.margo.manifest.v1+json";

/// Media type of a bundle archive.
pub const BUNDLE_MEDIA_TYPE: &str = "application/vnd.margo.bundle.v1+tar+gzip";

/// Content type of a deployment descriptor.
pub const DESCRIPTOR_CONTENT_TYPE: &str = "application/yaml";

/// Cache policy for content-addressed (immutable) resources.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// File extensions recognized as deployment descriptors inside a bundle.
pub const DESCRIPTOR_EXTENSIONS: &[&str] = &["yaml", "yml"];

/// Version of the implicit manifest of a device that has none stored yet.
pub const INITIAL_MANIFEST_VERSION: u64 = 1;
