use std::path::PathBuf;

use async_trait::async_trait;
use snafu::prelude::*;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{validate_name, ByteStream, IoSnafu, ObjectStore, StorageError, StoredObjectRef};

/// Local filesystem store. Containers are sub-directories of `root_dir`;
/// links point at the `/files` route of the intake web server.
pub struct FilesystemObjectStore {
    root_dir: PathBuf,
    public_base_url: String,
}

impl FilesystemObjectStore {
    pub fn new(root_dir: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root_dir: root_dir.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    fn object_path(&self, container: &str, name: &str) -> PathBuf {
        self.root_dir.join(container).join(name)
    }

    fn view_url(&self, container: &str, name: &str) -> String {
        format!(
            "{}/files/{}/{}",
            self.public_base_url,
            urlencoding::encode(container),
            urlencoding::encode(name)
        )
    }
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn upload(
        &self,
        stream: ByteStream,
        name: &str,
        mime_type: &str,
        container: &str,
    ) -> Result<StoredObjectRef, StorageError> {
        validate_name(container)?;
        validate_name(name)?;

        let dir = self.root_dir.join(container);
        tokio::fs::create_dir_all(&dir)
            .await
            .context(IoSnafu { path: dir.display().to_string() })?;

        let path = self.object_path(container, name);
        let path_str = path.display().to_string();
        let mut file = tokio::fs::File::create(&path)
            .await
            .context(IoSnafu { path: path_str.clone() })?;
        let mut stream = stream;
        let written = tokio::io::copy(&mut stream, &mut file)
            .await
            .context(IoSnafu { path: path_str.clone() })?;
        file.flush().await.context(IoSnafu { path: path_str.clone() })?;

        debug!("Wrote {} bytes ({}) to {}", written, mime_type, path_str);

        Ok(StoredObjectRef {
            object_id: format!("{}/{}", container, name),
            container: container.to_string(),
            name: name.to_string(),
            public_url: self.view_url(container, name),
        })
    }

    async fn grant_public(&self, object: &StoredObjectRef) -> Result<String, StorageError> {
        let path = self.object_path(&object.container, &object.name);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
                .await
                .context(IoSnafu { path: path.display().to_string() })?;
        }
        #[cfg(not(unix))]
        {
            tokio::fs::metadata(&path)
                .await
                .context(IoSnafu { path: path.display().to_string() })?;
        }

        info!("Object {} is readable at {}", object.object_id, object.public_url);
        Ok(object.public_url.clone())
    }

    async fn check_container(&self, container: &str) -> Result<(), StorageError> {
        validate_name(container)?;
        let dir = self.root_dir.join(container);
        tokio::fs::create_dir_all(&dir)
            .await
            .context(IoSnafu { path: dir.display().to_string() })
    }
}
