use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, Weekday};
use log::{debug, info};

use crate::clockify::{ClockifyRepository, ClockifyUser};
use crate::datetime::local_to_zulu_string;
use crate::interval::{
    find_missing_intervals, split_date_interval, split_datetime_interval, DateInterval,
    DateTimeInterval,
};
use crate::period_file::{DefaultTask, PeriodFile, Task};
use crate::resolver::Resolver;
use crate::settings::{TaskSettings, UserSettings};
use crate::time_entry::NewTimeEntry;

/// 説明が指定されていないtime entryに設定する説明。
const DEFAULT_DESCRIPTION: &str = "TASK";

/// 月曜日から金曜日までを勤務日とする。
pub fn is_working_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 期間の定義から生成したtime entry。
///
/// Clockifyに登録するための内容も解決済みで保持する。
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedEntry {
    project: String,
    task: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    interval: DateTimeInterval,
    payload: NewTimeEntry,
}

impl GeneratedEntry {
    pub fn new(
        project: String,
        task: Option<String>,
        description: Option<String>,
        tags: Vec<String>,
        interval: DateTimeInterval,
        payload: NewTimeEntry,
    ) -> Self {
        Self {
            project,
            task,
            description,
            tags,
            interval,
            payload,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn interval(&self) -> &DateTimeInterval {
        &self.interval
    }

    /// Clockifyに登録する内容。
    pub fn payload(&self) -> &NewTimeEntry {
        &self.payload
    }

    pub fn duration_seconds(&self) -> i64 {
        self.interval.duration_seconds()
    }

    /// テンプレートのプロジェクトとタスクから作成されたtime entryかを返す。
    pub fn is_created_from(&self, settings: &TaskSettings) -> bool {
        settings.matches(&self.project, self.task())
    }
}

/// 1日分の生成したtime entry。
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedDay {
    date: NaiveDate,
    entries: Vec<GeneratedEntry>,
}

impl GeneratedDay {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            entries: vec![],
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn entries(&self) -> &[GeneratedEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<GeneratedEntry> {
        self.entries
    }

    /// time entryを追加する。
    ///
    /// 新しいtime entryの終了以降に始まるもののうち最も早く始まるものの直前に挿入し、
    /// 該当するものがなければ末尾に追加する。重なりは検査しない。
    pub fn add_entry(&mut self, entry: GeneratedEntry) {
        let end = entry.interval.to();
        let closest = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, existing)| existing.interval.from() >= end)
            .min_by_key(|(_, existing)| existing.interval.from())
            .map(|(index, _)| index);

        match closest {
            Some(index) => self.entries.insert(index, entry),
            None => self.entries.push(entry),
        }
    }

    /// その日のtime entryの合計時間を秒で返す。
    pub fn duration_seconds(&self) -> i64 {
        self.entries.iter().map(GeneratedEntry::duration_seconds).sum()
    }

    pub fn is_working_day(&self) -> bool {
        is_working_day(self.date)
    }

    fn intervals(&self) -> Vec<DateTimeInterval> {
        self.entries.iter().map(|entry| entry.interval).collect()
    }
}

/// 期間全体の生成したtime entry。期間の全ての日をちょうど1つずつ持つ。
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedPeriod {
    period: DateInterval,
    days: BTreeMap<NaiveDate, GeneratedDay>,
}

impl GeneratedPeriod {
    /// 期間の全ての日について空の`GeneratedDay`を持つ`GeneratedPeriod`を返す。
    pub fn new(period: DateInterval) -> Self {
        let days = period
            .days()
            .map(|date| (date, GeneratedDay::new(date)))
            .collect();

        Self { period, days }
    }

    pub fn period(&self) -> &DateInterval {
        &self.period
    }

    pub fn day(&self, date: NaiveDate) -> Option<&GeneratedDay> {
        self.days.get(&date)
    }

    /// 日付の昇順に全ての日を返す。
    pub fn days(&self) -> impl Iterator<Item = &GeneratedDay> {
        self.days.values()
    }

    pub fn into_days(self) -> impl Iterator<Item = GeneratedDay> {
        self.days.into_values()
    }

    /// 指定された日を返す。期間外の日付の場合はエラーを返す。
    fn day_mut(&mut self, date: NaiveDate) -> Result<&mut GeneratedDay> {
        self.ensure_in_period(date)?;
        self.days
            .get_mut(&date)
            .with_context(|| format!("Missing day {}", date))
    }

    fn existing_day(&self, date: NaiveDate) -> Result<&GeneratedDay> {
        self.ensure_in_period(date)?;
        self.day(date)
            .with_context(|| format!("Missing day {}", date))
    }

    fn ensure_in_period(&self, date: NaiveDate) -> Result<()> {
        if !self.period.contains(date) {
            bail!("The date {} is not included in {}", date, self.period);
        }

        Ok(())
    }

    /// time entryを開始日の`GeneratedDay`に追加する。期間外の場合はエラーを返す。
    pub fn add_entry(&mut self, entry: GeneratedEntry) -> Result<()> {
        let date = entry.interval.from().date();
        self.day_mut(date)?.add_entry(entry);

        Ok(())
    }
}

/// time entryを作成する元となるプロジェクト、タスク、説明、タグ。
struct EntrySource<'s> {
    project: &'s str,
    task: Option<&'s str>,
    description: Option<&'s str>,
    tags: &'s [String],
}

impl<'s> From<&'s TaskSettings> for EntrySource<'s> {
    fn from(settings: &'s TaskSettings) -> Self {
        Self {
            project: &settings.project,
            task: settings.task.as_deref(),
            description: settings.description.as_deref(),
            tags: &settings.tags,
        }
    }
}

impl<'s> From<&'s Task> for EntrySource<'s> {
    fn from(task: &'s Task) -> Self {
        Self {
            project: &task.project,
            task: task.task.as_deref(),
            description: task.description.as_deref(),
            tags: &task.tags,
        }
    }
}

impl<'s> From<&'s DefaultTask> for EntrySource<'s> {
    fn from(task: &'s DefaultTask) -> Self {
        Self {
            project: &task.project,
            task: task.task.as_deref(),
            description: task.description.as_deref(),
            tags: &task.tags,
        }
    }
}

/// 期間の定義から1日ごとのtime entryを生成する。
///
/// 祝日、休暇、日時指定のタスク、空き時間を埋めるタスクの順に処理する。
/// 後の処理はそれまでに生成したtime entryを参照するため、この順序は変えられない。
pub struct Generator<'a, R: ClockifyRepository> {
    resolver: Resolver<'a, R>,
    settings: &'a UserSettings,
}

impl<'a, R: ClockifyRepository> Generator<'a, R> {
    /// 新しい`Generator`を返す。
    ///
    /// # Arguments
    ///
    /// * `clockify` - プロジェクト、タスク、タグのIDを解決するためのリポジトリ
    /// * `settings` - ユーザー設定
    pub fn new(clockify: &'a R, settings: &'a UserSettings) -> Self {
        Self {
            resolver: Resolver::new(clockify),
            settings,
        }
    }

    /// 期間の定義からtime entryを生成する。
    ///
    /// プロジェクト、タスク、タグの解決に失敗した場合や、期間外の日付が含まれる場合はエラーを返す。
    pub async fn generate(&self, period_file: &PeriodFile) -> Result<GeneratedPeriod> {
        let user = self.resolver.user().await?;
        let mut period = GeneratedPeriod::new(period_file.period);

        self.generate_public_holidays(&user, period_file, &mut period)
            .await
            .context("Failed to generate public holidays")?;
        self.generate_personal_holidays(&user, period_file, &mut period)
            .await
            .context("Failed to generate personal holidays")?;
        self.generate_tasks(&user, period_file, &mut period)
            .await
            .context("Failed to generate tasks")?;
        self.generate_default_tasks(&user, period_file, &mut period)
            .await
            .context("Failed to generate default tasks")?;

        let count: usize = period.days().map(|day| day.entries().len()).sum();
        info!("Generated {} time entries for {}", count, period.period());

        Ok(period)
    }

    /// 祝日は他のtime entryの有無に関わらず勤務時間帯全体のtime entryを作成する。
    async fn generate_public_holidays(
        &self,
        user: &ClockifyUser,
        period_file: &PeriodFile,
        period: &mut GeneratedPeriod,
    ) -> Result<()> {
        let source = EntrySource::from(&self.settings.public_holiday);

        for public_holiday in &period_file.public_holidays {
            period.existing_day(*public_holiday)?;
            let interval = DateTimeInterval::working_window(*public_holiday, &self.settings.day);
            let entry = self.create_entry(user, &source, interval).await?;
            period.add_entry(entry)?;
        }

        Ok(())
    }

    /// 休暇はtime entryがまだない日にだけ作成する。
    async fn generate_personal_holidays(
        &self,
        user: &ClockifyUser,
        period_file: &PeriodFile,
        period: &mut GeneratedPeriod,
    ) -> Result<()> {
        let source = EntrySource::from(&self.settings.personal_holiday);

        for personal_holiday in &period_file.personal_holidays {
            for interval in split_datetime_interval(&personal_holiday.interval, &self.settings.day)?
            {
                let date = interval.from().date();
                if period.existing_day(date)?.duration_seconds() != 0 {
                    debug!("Skip personal holiday on {}, the day is already filled", date);
                    continue;
                }

                let entry = self.create_entry(user, &source, interval).await?;
                period.add_entry(entry)?;
            }
        }

        Ok(())
    }

    /// 日時指定のタスクは既存のtime entryに関わらず作成する。
    async fn generate_tasks(
        &self,
        user: &ClockifyUser,
        period_file: &PeriodFile,
        period: &mut GeneratedPeriod,
    ) -> Result<()> {
        for task in &period_file.tasks {
            let source = EntrySource::from(task);
            for interval in split_datetime_interval(&task.interval, &self.settings.day)? {
                period.existing_day(interval.from().date())?;
                let entry = self.create_entry(user, &source, interval).await?;
                period.add_entry(entry)?;
            }
        }

        Ok(())
    }

    /// 勤務日の勤務時間帯のうち、time entryのない時間を埋める。
    async fn generate_default_tasks(
        &self,
        user: &ClockifyUser,
        period_file: &PeriodFile,
        period: &mut GeneratedPeriod,
    ) -> Result<()> {
        let day_settings = &self.settings.day;

        for default_task in &period_file.default_tasks {
            let source = EntrySource::from(default_task);
            for window in split_date_interval(&default_task.interval, day_settings) {
                let day = period.existing_day(window.from().date())?;
                if !day.is_working_day() || day.duration_seconds() >= day_settings.working_seconds()
                {
                    continue;
                }

                let missing = find_missing_intervals(day.date(), &day.intervals(), day_settings);
                for interval in missing {
                    let entry = self.create_entry(user, &source, interval).await?;
                    period.add_entry(entry)?;
                }
            }
        }

        Ok(())
    }

    /// プロジェクト、タスク、タグのIDを解決してtime entryを作成する。
    async fn create_entry(
        &self,
        user: &ClockifyUser,
        source: &EntrySource<'_>,
        interval: DateTimeInterval,
    ) -> Result<GeneratedEntry> {
        let workspace_id = &user.default_workspace;
        let project_id = self.resolver.project_id(workspace_id, source.project).await?;
        let task_id = self
            .resolver
            .task_id(workspace_id, &project_id, source.task)
            .await?;
        let tag_ids = self.resolver.tag_ids(workspace_id, source.tags).await?;

        let payload = NewTimeEntry {
            description: source
                .description
                .unwrap_or(DEFAULT_DESCRIPTION)
                .to_string(),
            project_id,
            task_id,
            tag_ids,
            start: local_to_zulu_string(&interval.from())?,
            end: local_to_zulu_string(&interval.to())?,
            workspace_id: workspace_id.clone(),
            user_id: user.id.clone(),
        };
        debug!("Generated {} {} {}", source.project, interval, payload.description);

        Ok(GeneratedEntry::new(
            source.project.to_string(),
            source.task.map(str::to_string),
            source.description.map(str::to_string),
            source.tags.to_vec(),
            interval,
            payload,
        ))
    }
}
