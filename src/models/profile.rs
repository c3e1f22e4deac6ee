//! Connection profile handed over by the credential vault.

use std::fmt;

pub const DEFAULT_REGION: &str = "eu-central-1";

/// Decrypted connection settings for an S3-compatible endpoint.
///
/// How the profile was stored is not this crate's concern; it is trusted as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Custom endpoint URL; `None` targets AWS itself.
    pub endpoint: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
}

impl fmt::Debug for ConnectionProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionProfile")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .finish()
    }
}
