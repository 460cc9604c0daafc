use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Predefined object ACL applied when uploading to the bucket.
///
/// Names follow the Cloud Storage `predefinedAcl` values. `PublicRead` is the
/// default policy when none is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AclPolicy {
    AuthenticatedRead,
    BucketOwnerFullControl,
    BucketOwnerRead,
    Private,
    ProjectPrivate,
    #[default]
    PublicRead,
}

impl AclPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclPolicy::AuthenticatedRead => "authenticatedRead",
            AclPolicy::BucketOwnerFullControl => "bucketOwnerFullControl",
            AclPolicy::BucketOwnerRead => "bucketOwnerRead",
            AclPolicy::Private => "private",
            AclPolicy::ProjectPrivate => "projectPrivate",
            AclPolicy::PublicRead => "publicRead",
        }
    }

    /// Canned ACL name understood by the XML API `x-goog-acl` header.
    pub fn xml_name(&self) -> &'static str {
        match self {
            AclPolicy::AuthenticatedRead => "authenticated-read",
            AclPolicy::BucketOwnerFullControl => "bucket-owner-full-control",
            AclPolicy::BucketOwnerRead => "bucket-owner-read",
            AclPolicy::Private => "private",
            AclPolicy::ProjectPrivate => "project-private",
            AclPolicy::PublicRead => "public-read",
        }
    }
}

impl FromStr for AclPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "authenticatedread" => Ok(AclPolicy::AuthenticatedRead),
            "bucketownerfullcontrol" => Ok(AclPolicy::BucketOwnerFullControl),
            "bucketownerread" => Ok(AclPolicy::BucketOwnerRead),
            "private" => Ok(AclPolicy::Private),
            "projectprivate" => Ok(AclPolicy::ProjectPrivate),
            "publicread" => Ok(AclPolicy::PublicRead),
            _ => Err(anyhow::anyhow!("Invalid ACL policy: {}", s)),
        }
    }
}

impl Display for AclPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}
