use async_trait::async_trait;
use log::{debug, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

pub const JPG_EXTENSION: &str = "jpg";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("非法文件名: {0}")]
    InvalidName(String),

    #[error("文件读写失败: {0}")]
    Io(#[from] std::io::Error),
}

pub fn profile_image_file_name(username: &str) -> String {
    format!("{}.{}", username, JPG_EXTENSION)
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// 保存头像，返回文件名
    async fn save(&self, username: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    async fn load(&self, username: &str, file_name: &str) -> Result<Option<Vec<u8>>, StorageError>;
}

/// 头像存放在 `<root>/<username>/<username>.jpg`
pub struct FsImageStore {
    root: PathBuf,
}

impl FsImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn checked(segment: &str) -> Result<&str, StorageError> {
        let invalid = segment.is_empty()
            || segment == "."
            || segment == ".."
            || segment.contains(['/', '\\', '\0']);
        if invalid {
            return Err(StorageError::InvalidName(segment.to_string()));
        }
        Ok(segment)
    }

    fn user_folder(&self, username: &str) -> Result<PathBuf, StorageError> {
        Ok(self.root.join(Self::checked(username)?))
    }
}

#[async_trait]
impl ImageStore for FsImageStore {
    async fn save(&self, username: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let folder = self.user_folder(username)?;
        if tokio::fs::metadata(&folder).await.is_err() {
            tokio::fs::create_dir_all(&folder).await?;
            info!("创建目录: {}", folder.display());
        }

        let file_name = profile_image_file_name(username);
        let path = folder.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        info!("头像已保存: {}", path.display());
        Ok(file_name)
    }

    async fn load(&self, username: &str, file_name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.user_folder(username)?.join(Self::checked(file_name)?);
        debug!("读取头像: {}", path.display());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
