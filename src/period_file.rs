use std::{fs, path::Path};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;

use crate::datetime::deserialize_user_dates;
use crate::interval::{DateInterval, DateTimeInterval};

/// 休暇。複数日にまたがってもよい。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PersonalHoliday {
    pub interval: DateTimeInterval,
}

/// 日時を指定したタスク。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Task {
    pub project: String,
    #[serde(default)]
    pub task: Option<String>,
    pub interval: DateTimeInterval,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 勤務時間帯の空いている時間を埋めるタスク。日単位で指定する。
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DefaultTask {
    pub project: String,
    #[serde(default)]
    pub task: Option<String>,
    pub interval: DateInterval,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// time entryを作成する期間と、その期間の祝日、休暇、タスクの定義。
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PeriodFile {
    pub period: DateInterval,
    #[serde(default, deserialize_with = "deserialize_user_dates")]
    pub public_holidays: Vec<NaiveDate>,
    #[serde(default)]
    pub personal_holidays: Vec<PersonalHoliday>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub default_tasks: Vec<DefaultTask>,
}

impl PeriodFile {
    /// ファイルから期間の定義を読み込む。
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read period file {}", path.display()))?;
        let period_file = Self::from_json(&content)
            .with_context(|| format!("Invalid period file {}", path.display()))?;
        debug!(
            "Period {}: {} public holiday(s), {} personal holiday(s), {} task(s), {} default task(s)",
            period_file.period,
            period_file.public_holidays.len(),
            period_file.personal_holidays.len(),
            period_file.tasks.len(),
            period_file.default_tasks.len()
        );

        Ok(period_file)
    }

    /// JSON文字列から期間の定義を読み込む。
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to deserialize period file")
    }
}
