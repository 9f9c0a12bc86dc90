//! FileContainer - ファイルシステム上のドキュメントコンテナ
//!
//! `<root>/<database>/<container>/` にドキュメント 1 件 = JSON ファイル 1 つで保存します。
//! ファイル名はパーティションキーを hex エンコードしたもの
//! （クライアント由来のトークンでパスを組み立てないため）。
//! hex にするとファイル名の上限（255 バイト）を超えるキーは、
//! `~` + SHA-256 の hex にする。`~` は hex に現れないので両者は衝突しない。
//!
//! # 原子性
//! - `create`: 一時ファイルに書いてから hard link で配置する。
//!   link は既存パスに対して `AlreadyExists` で失敗するので create-if-absent になる
//! - `upsert`: 一時ファイルに書いてから rename で置き換える

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use ulid::Ulid;

use crate::domain::StoreError;
use crate::ports::DocumentContainer;

const DOCUMENT_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".tmp-";
const DIGEST_PREFIX: char = '~';

// hex (2 倍) + ".json" が 255 バイトに収まる長さ
const MAX_HEX_KEY_BYTES: usize = 120;

pub struct FileContainer {
    dir: PathBuf,
}

impl FileContainer {
    /// ディレクトリを（なければ作って）開く
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{DOCUMENT_EXTENSION}", encode_key(key)))
    }

    /// 一時ファイルに書いて fsync し、そのパスを返す
    async fn write_temp(&self, document: &serde_json::Value) -> Result<PathBuf, StoreError> {
        let bytes = serde_json::to_vec(document)?;
        let path = self.dir.join(format!("{TEMP_PREFIX}{}", Ulid::new()));

        let mut file = tokio::fs::File::create(&path).await?;
        let written = write_and_sync(&mut file, &bytes).await;
        drop(file);
        discard_on_error(&path, written).await?;
        Ok(path)
    }
}

async fn write_and_sync(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

/// 失敗したら書きかけのファイルを消してからエラーを返す
async fn discard_on_error(path: &Path, result: std::io::Result<()>) -> Result<(), StoreError> {
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(path).await;
        return Err(e.into());
    }
    Ok(())
}

fn encode_key(key: &str) -> String {
    if key.len() <= MAX_HEX_KEY_BYTES {
        return hex::encode(key);
    }
    let digest = Sha256::digest(key.as_bytes());
    format!("{DIGEST_PREFIX}{}", hex::encode(digest))
}

fn is_document(path: &Path) -> bool {
    let is_temp = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(TEMP_PREFIX));
    !is_temp && path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
}

/// 読めなかった（途中で消された）ファイルは None
async fn read_document(path: &Path) -> Result<Option<serde_json::Value>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl DocumentContainer for FileContainer {
    async fn read(&self, key: &str) -> Result<Option<serde_json::Value>, StoreError> {
        read_document(&self.document_path(key)).await
    }

    async fn query_all(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_document(&path) {
                continue;
            }
            if let Some(document) = read_document(&path).await? {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    async fn create(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError> {
        let temp = self.write_temp(&document).await?;
        let linked = tokio::fs::hard_link(&temp, self.document_path(key)).await;
        let _ = tokio::fs::remove_file(&temp).await;

        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::Conflict(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn upsert(&self, key: &str, document: serde_json::Value) -> Result<(), StoreError> {
        let temp = self.write_temp(&document).await?;
        if let Err(e) = tokio::fs::rename(&temp, self.document_path(key)).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        match tokio::fs::remove_file(self.document_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
