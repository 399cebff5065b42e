use super::client::{ListQuery, XoClient};
use super::error::{Result, XoError};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backup jobs live in this REST collection; runs and deletions go through it too.
pub const BACKUP_COLLECTION: &str = "backup-jobs";

pub const DEFAULT_BACKUP_FIELDS: &[&str] = &["name", "mode", "type", "id"];

/// Job type listed when the caller asks for none.
pub const DEFAULT_BACKUP_TYPE: &str = "backup";

pub const BACKUP_TYPES: &[&str] = &["backup", "metadataBackup", "call"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    Full,
    Delta,
}

impl BackupMode {
    pub const NAMES: &'static [&'static str] = &["full", "delta"];

    pub fn as_str(self) -> &'static str {
        match self {
            BackupMode::Full => "full",
            BackupMode::Delta => "delta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[serde(rename = "none")]
    Off,
    Native,
    Zstd,
}

impl Compression {
    pub const NAMES: &'static [&'static str] = &["none", "native", "zstd"];
}

#[derive(Debug, Clone, Serialize)]
pub struct NewBackup {
    pub vm: String,
    pub mode: BackupMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<u64>,
}

/// Identifier and state of a triggered backup run. Progress is not polled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackupJob {
    pub job_id: String,
    pub status: String,
}

impl BackupJob {
    fn from_response(body: Value) -> Result<Self> {
        match body {
            // a task href such as /rest/v0/tasks/0lr4zljbe
            Value::String(task) if !task.is_empty() => Ok(Self {
                job_id: task,
                status: "pending".to_string(),
            }),
            Value::Object(map) => {
                let job_id = ["id", "jobId", "taskId", "href"]
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str))
                    .ok_or_else(|| {
                        XoError::Malformed("backup response carries no job identifier".into())
                    })?;
                let status = map
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("pending");
                Ok(Self {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                })
            }
            other => Err(XoError::Malformed(format!(
                "unexpected backup response: {}",
                other
            ))),
        }
    }
}

impl XoClient {
    pub async fn list_backups(&self, query: &ListQuery) -> Result<Vec<Value>> {
        self.list(BACKUP_COLLECTION, query).await
    }

    pub async fn create_backup(&self, backup: &NewBackup) -> Result<BackupJob> {
        let url = self.endpoint(&[BACKUP_COLLECTION])?;
        let body = serde_json::to_value(backup)?;
        let res: Value = self.request(Method::POST, url, Some(&body)).await?;
        BackupJob::from_response(res)
    }

    pub async fn delete_backup(&self, id: &str) -> Result<()> {
        let url = self.endpoint(&[BACKUP_COLLECTION, id])?;
        let _: Value = self.request(Method::DELETE, url, None).await?;
        Ok(())
    }
}
