use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

use crate::datetime::zulu_string_to_local;
use crate::interval::DateTimeInterval;

/// Clockifyに登録済みのtime entryの期間。
///
/// 計測中のtime entryは`end`が`None`となる。
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RemoteTimeInterval {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

/// Clockifyに登録済みのtime entry。
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockifyTimeEntry {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty")]
    pub tag_ids: Vec<String>,
    pub time_interval: RemoteTimeInterval,
    pub workspace_id: String,
    pub user_id: String,
}

impl ClockifyTimeEntry {
    /// 開始日時をLocalタイムゾーンで返す。
    pub fn local_start(&self) -> Result<NaiveDateTime> {
        zulu_string_to_local(&self.time_interval.start)
            .with_context(|| format!("Invalid start of time entry {}", self.id))
    }

    /// 期間をLocalタイムゾーンで返す。計測中の場合は開始日時のみの区間とする。
    pub fn local_interval(&self) -> Result<DateTimeInterval> {
        let start = self.local_start()?;
        let end = match &self.time_interval.end {
            Some(end) => zulu_string_to_local(end)
                .with_context(|| format!("Invalid end of time entry {}", self.id))?,
            None => start,
        };

        DateTimeInterval::new(start, end)
            .with_context(|| format!("Invalid interval of time entry {}", self.id))
    }
}

/// Clockifyに新しく登録するtime entry。
///
/// `workspace_id`はURLのパスに、`user_id`は認証済みのユーザーに対応するため送信しない。
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewTimeEntry {
    pub description: String,
    pub project_id: String,
    pub task_id: Option<String>,
    pub tag_ids: Vec<String>,
    pub start: String,
    pub end: String,
    #[serde(skip)]
    pub workspace_id: String,
    #[serde(skip)]
    pub user_id: String,
}

impl NewTimeEntry {
    /// 登録済みのtime entryと同じ内容かを返す。
    ///
    /// workspace、ユーザー、プロジェクト、タスク、タグ、開始、終了、説明が全て一致する場合に同じとする。
    /// 日時は文字列として比較する。
    pub fn matches(&self, remote: &ClockifyTimeEntry) -> bool {
        self.workspace_id == remote.workspace_id
            && self.user_id == remote.user_id
            && remote.project_id.as_deref() == Some(self.project_id.as_str())
            && self.task_id == remote.task_id
            && self.tag_ids == remote.tag_ids
            && self.start == remote.time_interval.start
            && remote.time_interval.end.as_deref() == Some(self.end.as_str())
            && remote.description.as_deref() == Some(self.description.as_str())
    }
}

/// `null`を空の配列としてデシリアライズする。
fn deserialize_null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
