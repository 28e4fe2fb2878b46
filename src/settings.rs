use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::debug;
use serde::Deserialize;

use crate::datetime::deserialize_user_time;

/// 設定ファイルのデフォルトのファイル名。ホームディレクトリ直下に置く。
const CONFIG_FILE_NAME: &str = ".clockify.cfg";

/// 設定ファイルのtokenを上書きするための環境変数。
const TOKEN_ENV: &str = "CLOCKIFY_API_TOKEN";

/// 祝日や休暇のtime entryを作成する時に利用するテンプレート。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct TaskSettings {
    pub project: String,
    #[serde(default)]
    pub task: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TaskSettings {
    /// プロジェクト名とタスク名がこのテンプレートと一致するかを返す。
    pub fn matches(&self, project: &str, task: Option<&str>) -> bool {
        self.project == project && self.task.as_deref() == task
    }
}

/// 1日の勤務時間帯。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(try_from = "RawDaySettings")]
pub struct DaySettings {
    pub start_at: NaiveTime,
    pub end_at: NaiveTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDaySettings {
    #[serde(deserialize_with = "deserialize_user_time")]
    start_at: NaiveTime,
    #[serde(deserialize_with = "deserialize_user_time")]
    end_at: NaiveTime,
}

impl TryFrom<RawDaySettings> for DaySettings {
    type Error = anyhow::Error;

    fn try_from(raw: RawDaySettings) -> Result<Self> {
        Self::new(raw.start_at, raw.end_at)
    }
}

impl DaySettings {
    /// 新しい`DaySettings`を返す。
    ///
    /// 開始時刻が終了時刻より前でない場合はエラーを返す。
    pub fn new(start_at: NaiveTime, end_at: NaiveTime) -> Result<Self> {
        if start_at >= end_at {
            bail!(
                "The day must start ({}) before it ends ({})",
                start_at,
                end_at
            );
        }

        Ok(Self { start_at, end_at })
    }

    /// 1日の勤務時間を秒で返す。
    pub fn working_seconds(&self) -> i64 {
        (self.end_at - self.start_at).num_seconds()
    }

    /// 勤務時間のちょうど半分の時刻を返す。半休の境界として利用する。
    pub fn half_day_time(&self) -> NaiveTime {
        self.start_at + Duration::seconds(self.working_seconds() / 2)
    }

    /// 指定された日の勤務開始日時を返す。
    pub fn start_of(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.start_at)
    }

    /// 指定された日の勤務終了日時を返す。
    pub fn end_of(&self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.end_at)
    }
}

/// ユーザー設定。
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub token: String,
    pub public_holiday: TaskSettings,
    pub personal_holiday: TaskSettings,
    pub day: DaySettings,
}

impl UserSettings {
    /// 設定ファイルを読み込む。
    ///
    /// パスが指定されていない場合はホームディレクトリの`.clockify.cfg`を読み込む。
    /// 環境変数`CLOCKIFY_API_TOKEN`が設定されている場合は、そのtokenを優先する。
    ///
    /// # Arguments
    ///
    /// * `path` - 設定ファイルのパス
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path()?,
        };
        debug!("Loading user settings from {}", path.display());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Missing config file {}", path.display()))?;
        let settings = Self::from_json(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        Ok(settings.with_token_override(env::var(TOKEN_ENV).ok()))
    }

    /// JSON文字列から設定を読み込む。
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to deserialize user settings")
    }

    /// tokenが指定されている場合は設定ファイルのtokenを置き換える。
    fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|token| !token.is_empty()) {
            self.token = token;
        }
        self
    }
}

/// デフォルトの設定ファイルのパスを返す。
fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Cannot determine the home directory")?;

    Ok(home.join(CONFIG_FILE_NAME))
}
