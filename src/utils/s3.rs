use s3::{Bucket, Region};
use s3::creds::Credentials;
use tokio::io::AsyncRead;
use tracing::{info, error};

/// Largest expiry accepted for SigV4 pre-signed URLs (7 days)
pub const MAX_PRESIGN_EXPIRY_SECS: u32 = 604_800;

/// Canned ACL that lets anyone holding the object URL read it
pub const PUBLIC_READ_ACL: &str = "public-read";

/// S3 storage configuration
#[derive(Debug, Clone)]
#[napi(object)]
pub struct S3Config {
    /// AWS access key ID
    pub access_key: String,
    /// AWS secret access key
    pub secret_key: String,
    /// S3 endpoint (e.g., "http://localhost:9000" for MinIO)
    pub endpoint: Option<String>,
    /// Region name (default: "us-east-1")
    pub region: Option<String>,
    /// Share objects through expiring pre-signed links instead of a public-read ACL,
    /// for buckets that block ACLs (default: false)
    pub presigned_links: Option<bool>,
    /// Lifetime of pre-signed links in seconds (default and maximum: 604800)
    pub link_expiry_secs: Option<u32>,
}

impl S3Config {
    pub fn presigned_links(&self) -> bool {
        self.presigned_links.unwrap_or(false)
    }

    pub fn link_expiry(&self) -> u32 {
        self.link_expiry_secs
            .unwrap_or(MAX_PRESIGN_EXPIRY_SECS)
            .clamp(1, MAX_PRESIGN_EXPIRY_SECS)
    }
}

/// Build an S3 bucket handle for one container
pub fn build_s3_bucket(
    config: &S3Config,
    bucket: &str,
) -> Result<Bucket, Box<dyn std::error::Error + Send + Sync>> {
    let endpoint = config.endpoint.clone().unwrap_or_else(|| "http://localhost:7070".to_string());
    let region = Region::Custom {
        region: config.region.clone().unwrap_or_else(|| "us-east-1".to_owned()),
        endpoint,
    };
    let credentials = Credentials::new(
        Some(&config.access_key),
        Some(&config.secret_key),
        None,
        None,
        None,
    )?;

    Ok(*Bucket::new(bucket, region, credentials)?.with_path_style())
}

/// Send `x-amz-acl: public-read` with every object write of this bucket handle
pub fn with_public_read_acl(bucket: &mut Bucket) {
    bucket.add_header("x-amz-acl", PUBLIC_READ_ACL);
}

/// Check S3 connectivity
pub async fn check_s3_connectivity(bucket: &Bucket) -> bool {
    match bucket.exists().await {
        Ok(true) => {
            info!("S3 connectivity check succeeded for bucket: {}", bucket.name());
            true
        },
        Ok(false) => {
            error!("S3 bucket does not exist: {}", bucket.name());
            false
        },
        Err(e) => {
            error!("S3 connectivity check failed for bucket: {}: {}", bucket.name(), e);
            false
        }
    }
}

/// Stream an object to S3 (multipart for large payloads)
pub async fn s3_put_object_stream<R>(
    bucket: &Bucket,
    path: &str,
    reader: &mut R,
    content_type: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    R: AsyncRead + Unpin + Send,
{
    bucket
        .put_object_stream_with_content_type(reader, path, content_type)
        .await?;
    info!("Uploaded S3 object '{}' to bucket {}", path, bucket.name());
    Ok(())
}

/// Pre-signed GET link for an object
pub async fn s3_presign_get(
    bucket: &Bucket,
    path: &str,
    expiry_secs: u32,
) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
    let url = bucket.presign_get(path, expiry_secs, None).await?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            region: None,
            presigned_links: None,
            link_expiry_secs: None,
        }
    }

    #[test]
    fn test_link_expiry_is_clamped() {
        let mut cfg = config();
        assert_eq!(cfg.link_expiry(), MAX_PRESIGN_EXPIRY_SECS);
        cfg.link_expiry_secs = Some(3600);
        assert_eq!(cfg.link_expiry(), 3600);
        cfg.link_expiry_secs = Some(10_000_000);
        assert_eq!(cfg.link_expiry(), MAX_PRESIGN_EXPIRY_SECS);
    }

    #[test]
    fn test_public_read_acl_header() {
        let mut bucket = build_s3_bucket(&config(), "oct-exams").unwrap();
        assert!(bucket.extra_headers().get("x-amz-acl").is_none());
        with_public_read_acl(&mut bucket);
        assert_eq!(bucket.extra_headers().get("x-amz-acl").unwrap(), "public-read");
    }

    #[test]
    fn test_build_s3_bucket_uses_path_style() {
        let bucket = build_s3_bucket(&config(), "oct-exams").unwrap();
        assert_eq!(bucket.name(), "oct-exams");
        assert!(bucket.url().starts_with("http://localhost:9000/oct-exams"));
    }
}
