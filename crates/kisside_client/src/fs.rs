use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use kisside_remote::{local_code, Rpc, RpcError};

/// File metadata as the server reports it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub dir: bool,
    pub size: u64,
    pub mtime: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub dir: bool,
    pub size: u64,
    pub mtime: i64,
}

/// A file read: its text and, when the server includes it, fresh metadata.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileContents {
    pub contents: String,
    #[serde(default)]
    pub stat: Option<FileStat>,
}

/// Filesystem surface of the kisside service. Every method sends the auth
/// token as the first parameter, the way the server expects it.
#[derive(Clone)]
pub struct FsService {
    rpc: Rpc,
    authtoken: String,
}

impl FsService {
    pub(crate) fn new(rpc: Rpc, authtoken: impl Into<String>) -> Self {
        Self {
            rpc,
            authtoken: authtoken.into(),
        }
    }

    pub async fn stat(&self, path: &str) -> Result<FileStat, RpcError> {
        let result = self
            .rpc
            .call("stat", vec![json!(self.authtoken), json!(path)])
            .await?;
        deserialize_result("stat", result)
    }

    pub async fn listdir(&self, path: &str) -> Result<Vec<DirEntry>, RpcError> {
        let result = self
            .rpc
            .call("listdir", vec![json!(self.authtoken), json!(path)])
            .await?;
        deserialize_result("listdir", result)
    }

    pub async fn mkdir(&self, path: &str) -> Result<(), RpcError> {
        self.rpc
            .call("mkdir", vec![json!(self.authtoken), json!(path)])
            .await?;
        Ok(())
    }

    pub async fn rmdir(&self, path: &str) -> Result<(), RpcError> {
        self.rpc
            .call("rmdir", vec![json!(self.authtoken), json!(path)])
            .await?;
        Ok(())
    }

    pub async fn rename(&self, from: &str, to: &str) -> Result<(), RpcError> {
        self.rpc
            .call("rename", vec![json!(self.authtoken), json!(from), json!(to)])
            .await?;
        Ok(())
    }

    pub async fn unlink(&self, path: &str) -> Result<(), RpcError> {
        self.rpc
            .call("unlink", vec![json!(self.authtoken), json!(path)])
            .await?;
        Ok(())
    }

    pub async fn read(&self, path: &str) -> Result<FileContents, RpcError> {
        let result = self
            .rpc
            .call("read", vec![json!(self.authtoken), json!(path)])
            .await?;
        deserialize_result("read", result)
    }

    /// Write the full contents of a file. Returns the stat of the file as
    /// it exists after the write.
    pub async fn write(&self, path: &str, contents: &str) -> Result<FileStat, RpcError> {
        let result = self
            .rpc
            .call(
                "write",
                vec![json!(self.authtoken), json!(path), json!(contents)],
            )
            .await?;
        deserialize_result("write", result)
    }

    pub async fn copy(&self, from: &str, to: &str) -> Result<(), RpcError> {
        self.rpc
            .call("copy", vec![json!(self.authtoken), json!(from), json!(to)])
            .await?;
        Ok(())
    }
}

pub(crate) fn deserialize_result<T: serde::de::DeserializeOwned>(
    method: &str,
    result: Value,
) -> Result<T, RpcError> {
    serde_json::from_value(result.clone()).map_err(|error| {
        RpcError::local(
            local_code::NO_DATA,
            format!("{method} returned an unexpected result: {error}; result: {result}"),
        )
    })
}
