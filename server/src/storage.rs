use std::path::PathBuf;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use livesync_shared::session_format::{decode_session_file, encode_session_file, SessionFileData};

use crate::error::StorageError;

/// Where session records and their retained event logs live between runs.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn load_session(&self, session_id: &str) -> Result<SessionFileData, StorageError>;
    async fn save_session(&self, session_id: &str, data: &SessionFileData)
        -> Result<(), StorageError>;
}

pub struct FileStorage {
    session_dir: PathBuf,
}

impl FileStorage {
    pub fn new(session_dir: PathBuf) -> Self {
        Self { session_dir }
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.session_dir.join(format!("{session_id}.bin"))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn load_session(&self, session_id: &str) -> Result<SessionFileData, StorageError> {
        let payload = match tokio::fs::read(self.path_for(session_id)).await {
            Ok(payload) => payload,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(session_id.to_string()));
            }
            Err(error) => return Err(error.into()),
        };
        Ok(decode_session_file(&payload)?)
    }

    async fn save_session(
        &self,
        session_id: &str,
        data: &SessionFileData,
    ) -> Result<(), StorageError> {
        tokio::fs::write(self.path_for(session_id), encode_session_file(data)).await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub prefix: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl S3StorageConfig {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: None,
            region: None,
            endpoint_url: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

pub struct S3Storage {
    bucket: String,
    prefix: String,
    client: Client,
}

impl S3Storage {
    pub async fn new(config: S3StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let (Some(access_key_id), Some(secret_access_key)) = (
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        ) {
            let creds = Credentials::new(access_key_id, secret_access_key, None, None, "static");
            loader = loader.credentials_provider(creds);
        }
        if let Some(region) = config.region.clone() {
            loader = loader.region(aws_config::Region::new(region));
        }
        let shared = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint_url) = config.endpoint_url.as_ref() {
            builder = builder.endpoint_url(endpoint_url);
        }
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }
        let client = Client::from_conf(builder.build());
        let prefix = config
            .prefix
            .unwrap_or_default()
            .trim_matches('/')
            .to_string();
        Self {
            bucket: config.bucket,
            prefix,
            client,
        }
    }

    fn object_key(&self, session_id: &str) -> String {
        object_key(&self.prefix, session_id)
    }
}

fn object_key(prefix: &str, session_id: &str) -> String {
    if prefix.is_empty() {
        format!("{session_id}.bin")
    } else {
        format!("{prefix}/{session_id}.bin")
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn load_session(&self, session_id: &str) -> Result<SessionFileData, StorageError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(session_id))
            .send()
            .await;
        let output = match response {
            Ok(output) => output,
            Err(error) => {
                if let Some(service_error) = error.as_service_error() {
                    if service_error.is_no_such_key() {
                        return Err(StorageError::NotFound(session_id.to_string()));
                    }
                }
                return Err(StorageError::Backend(format!(
                    "failed to load session {session_id} from s3: {error:?}"
                )));
            }
        };
        let bytes = output.body.collect().await.map_err(|error| {
            StorageError::Backend(format!(
                "failed to read session {session_id} from s3 response: {error:?}"
            ))
        })?;
        Ok(decode_session_file(&bytes.into_bytes())?)
    }

    async fn save_session(
        &self,
        session_id: &str,
        data: &SessionFileData,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from(encode_session_file(data));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(session_id))
            .body(body)
            .send()
            .await
            .map_err(|error| {
                StorageError::Backend(format!(
                    "failed to save session {session_id} to s3: {error:?}"
                ))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livesync_shared::SessionRecord;

    fn data() -> SessionFileData {
        SessionFileData::from_parts(
            &SessionRecord {
                id: "abc".into(),
                url: "https://example.com".into(),
                host_id: "host".into(),
                active: true,
            },
            &[],
        )
    }

    #[tokio::test]
    async fn test_file_storage_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        storage.save_session("abc", &data()).await.unwrap();
        let loaded = storage.load_session("abc").await.unwrap();
        assert_eq!(loaded, data());
    }

    #[tokio::test]
    async fn test_file_storage_missing_session() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let result = storage.load_session("nope").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("bad.bin"), b"garbage").await.unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        let result = storage.load_session("bad").await;
        assert!(matches!(result, Err(StorageError::Decode(_))));
    }

    #[test]
    fn test_object_key_prefix() {
        assert_eq!(object_key("", "s1"), "s1.bin");
        assert_eq!(object_key("boards", "s1"), "boards/s1.bin");
    }
}
