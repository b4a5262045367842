use async_trait::async_trait;
use s3::Bucket;
use snafu::prelude::*;
use tracing::{debug, info};

use super::{
    validate_name, ByteStream, ContainerSnafu, GrantPublicSnafu, ObjectStore, StorageError,
    StoredObjectRef, UploadSnafu,
};
use crate::utils::{
    build_s3_bucket, check_s3_connectivity, s3_presign_get, s3_put_object_stream, with_public_read_acl,
    S3Config,
};

/// S3-compatible object store. Containers are buckets, object keys are the names.
///
/// Objects are written with the `public-read` canned ACL, so the plain object URL
/// is the durable link. With `presigned_links` the ACL is omitted and the grant
/// returns an expiring pre-signed GET link instead.
pub struct S3ObjectStore {
    config: S3Config,
}

impl S3ObjectStore {
    pub fn new(config: S3Config) -> Self {
        Self { config }
    }

    fn bucket(&self, container: &str) -> Result<Bucket, StorageError> {
        build_s3_bucket(&self.config, container).context(ContainerSnafu { container })
    }

    fn upload_bucket(&self, container: &str) -> Result<Bucket, StorageError> {
        let mut bucket = self.bucket(container)?;
        if !self.config.presigned_links() {
            with_public_read_acl(&mut bucket);
        }
        Ok(bucket)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        mime_type: &str,
        container: &str,
    ) -> Result<StoredObjectRef, StorageError> {
        validate_name(name)?;
        let bucket = self.upload_bucket(container)?;
        let mut stream = stream;

        debug!("Streaming '{}' ({}) to bucket {}", name, mime_type, container);
        s3_put_object_stream(&bucket, name, &mut stream, mime_type)
            .await
            .context(UploadSnafu { container, name })?;

        Ok(StoredObjectRef {
            object_id: format!("{}/{}", container, name),
            container: container.to_string(),
            name: name.to_string(),
            public_url: format!("{}/{}", bucket.url(), name),
        })
    }

    async fn grant_public(&self, object: &StoredObjectRef) -> Result<String, StorageError> {
        if !self.config.presigned_links() {
            // the public-read ACL was stored with the object
            debug!("{} is public-read at {}", object.object_id, object.public_url);
            return Ok(object.public_url.clone());
        }

        let bucket = self.bucket(&object.container)?;
        let link = s3_presign_get(&bucket, &object.name, self.config.link_expiry())
            .await
            .context(GrantPublicSnafu { object_id: object.object_id.clone() })?;
        info!(
            "Granted link access to {} for {} seconds",
            object.object_id,
            self.config.link_expiry()
        );
        Ok(link)
    }

    async fn check_container(&self, container: &str) -> Result<(), StorageError> {
        let bucket = self.bucket(container)?;
        if check_s3_connectivity(&bucket).await {
            Ok(())
        } else {
            Err(StorageError::Container {
                container: container.to_string(),
                source: format!("bucket {} is not reachable", container).into(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(presigned_links: Option<bool>) -> S3ObjectStore {
        S3ObjectStore::new(S3Config {
            access_key: "minio".to_string(),
            secret_key: "minio123".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            region: None,
            presigned_links,
            link_expiry_secs: Some(3600),
        })
    }

    fn object() -> StoredObjectRef {
        StoredObjectRef {
            object_id: "oct-exams/Maria_Silva20240301OCT.png".to_string(),
            container: "oct-exams".to_string(),
            name: "Maria_Silva20240301OCT.png".to_string(),
            public_url: "http://localhost:9000/oct-exams/Maria_Silva20240301OCT.png".to_string(),
        }
    }

    #[test]
    fn test_uploads_carry_public_read_acl_by_default() {
        let bucket = store(None).upload_bucket("oct-exams").unwrap();
        assert_eq!(bucket.extra_headers().get("x-amz-acl").unwrap(), "public-read");

        let bucket = store(Some(true)).upload_bucket("oct-exams").unwrap();
        assert!(bucket.extra_headers().get("x-amz-acl").is_none());
    }

    #[tokio::test]
    async fn test_grant_public_returns_durable_object_url() {
        let link = store(None).grant_public(&object()).await.unwrap();
        assert_eq!(link, "http://localhost:9000/oct-exams/Maria_Silva20240301OCT.png");
        assert!(!link.contains("X-Amz-Expires"));
    }

    #[tokio::test]
    async fn test_grant_public_presigns_when_configured() {
        let link = store(Some(true)).grant_public(&object()).await.unwrap();
        assert!(link.starts_with("http://localhost:9000/oct-exams/Maria_Silva20240301OCT.png?"));
        assert!(link.contains("X-Amz-Expires=3600"));
    }

    #[tokio::test]
    async fn test_upload_rejects_path_names() {
        let err = store(None)
            .upload(super::super::byte_stream(vec![1]), "../x.png", "image/png", "oct-exams")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName { .. }));
    }
}
