use std::io::Write;

use anyhow::{Context, Result};
use chrono::{Datelike, Weekday};
use serde::Serialize;

use crate::checker::{seconds_to_hours, CheckReport};
use crate::clockify::{ClockifyProject, ClockifyTag, ClockifyTask, ClockifyUser, ClockifyWorkspace};
use crate::diff::{DayDiff, DiffStatus, EntryDiff, PeriodDiff};
use crate::resolver::{EntryNames, RemoteNames};
use crate::settings::{TaskSettings, UserSettings};
use crate::time_entry::ClockifyTimeEntry;

/// 一覧に`ID: 名前`の1行で表示できる値。
pub trait Listable {
    fn list_id(&self) -> &str;

    fn list_label(&self) -> Result<String>;
}

/// Consoleに結果を表示するためのtrait。
pub trait ConsolePresenter {
    /// 差分と検査結果を表示する。
    ///
    /// # Arguments
    ///
    /// * `diff` - 表示する差分
    /// * `report` - 差分の検査結果
    /// * `names` - 削除対象のtime entryのプロジェクト、タスク、タグの名前
    fn show_plan(
        &mut self,
        diff: &PeriodDiff,
        report: &CheckReport,
        names: &RemoteNames,
    ) -> Result<()>;

    /// IDと名前の一覧を1行ずつ表示する。JSONの出力が有効な場合はJSONで表示する。
    fn show_items<T: Listable + Serialize>(&mut self, items: &[T]) -> Result<()>;
}

/// 差分をテキストで表示する。
pub struct ConsoleReport<'a, W: Write> {
    writer: &'a mut W,
    settings: &'a UserSettings,
    json: bool,
}

impl<'a, W: Write> ConsoleReport<'a, W> {
    /// 新しい`ConsoleReport`を返す。
    pub fn new(writer: &'a mut W, settings: &'a UserSettings) -> Self {
        Self {
            writer,
            settings,
            json: false,
        }
    }

    /// 一覧をJSONで表示するかを設定する。
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn write_day(&mut self, day: &DayDiff, report: &CheckReport, names: &RemoteNames) -> Result<()> {
        let date = day.date();
        writeln!(self.writer, "{} {}", date.format("%A"), date)?;

        let mut entries = day
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| Ok((entry.interval()?, index, entry)))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("Failed to sort time entries of {}", date))?;
        entries.sort_by_key(|(interval, _, entry)| (interval.from(), entry.status()));

        for (interval, index, entry) in entries {
            let flag = if report.is_entry_error(date, index) {
                " * ERROR"
            } else if report.is_entry_warning(date, index) {
                " * WARNING"
            } else {
                ""
            };
            writeln!(
                self.writer,
                "\t[{}]\t{}: {}{}",
                status_label(entry.status()),
                describe(entry, names),
                interval,
                flag
            )?;
        }

        let flag = if report.is_day_duration_error(date) {
            " * ERROR"
        } else if report.is_day_duration_warning(date) {
            " * WARNING"
        } else {
            ""
        };
        writeln!(
            self.writer,
            "\n\tDuration in hour(s): {:?}{}\n\n",
            seconds_to_hours(day.duration_seconds()),
            flag
        )?;

        if date.weekday() == Weekday::Sun {
            writeln!(self.writer, "============\n= NEW WEEK =\n============\n\n")?;
        }

        Ok(())
    }

    fn write_report(&mut self, report: &CheckReport) -> Result<()> {
        if report.errors.is_empty() && report.warnings.is_empty() && report.info.is_empty() {
            return Ok(());
        }

        writeln!(self.writer, "==========\n= REPORT =\n==========\n")?;
        for error in &report.errors {
            writeln!(self.writer, "[ERROR]\t\t{}", error)?;
        }
        for warning in &report.warnings {
            writeln!(self.writer, "[WARNING]\t{}", warning)?;
        }
        for info in &report.info {
            writeln!(self.writer, "[INFO]\t\t{}", info)?;
        }
        writeln!(self.writer)?;

        Ok(())
    }

    fn write_summary(&mut self, diff: &PeriodDiff, report: &CheckReport) -> Result<()> {
        writeln!(self.writer, "===========\n= SUMMARY =\n===========\n")?;
        writeln!(
            self.writer,
            "Up-to-date with Clockify: {}",
            yes_no(diff.is_up_to_date())
        )?;
        writeln!(
            self.writer,
            "Duration issue(s): {}",
            yes_no(report.has_duration_errors() || report.has_duration_warnings())
        )?;
        writeln!(
            self.writer,
            "Number public holidays in day(s): {:?}",
            self.holiday_days(diff, &self.settings.public_holiday)
        )?;
        writeln!(
            self.writer,
            "Number personal holidays in day(s): {:?}",
            self.holiday_days(diff, &self.settings.personal_holiday)
        )?;

        Ok(())
    }

    /// テンプレートから作成されたtime entryの合計時間を日数で返す。
    fn holiday_days(&self, diff: &PeriodDiff, template: &TaskSettings) -> f64 {
        let seconds: i64 = diff
            .days()
            .flat_map(DayDiff::entries)
            .filter_map(EntryDiff::generated)
            .filter(|generated| generated.is_created_from(template))
            .map(|generated| generated.duration_seconds())
            .sum();

        seconds as f64 / self.settings.day.working_seconds() as f64
    }
}

impl<'a, W: Write> ConsolePresenter for ConsoleReport<'a, W> {
    fn show_plan(
        &mut self,
        diff: &PeriodDiff,
        report: &CheckReport,
        names: &RemoteNames,
    ) -> Result<()> {
        for day in diff.days() {
            self.write_day(day, report, names)
                .with_context(|| format!("Failed to write the day {}", day.date()))?;
        }
        self.write_report(report)
            .context("Failed to write the check report")?;
        self.write_summary(diff, report)
            .context("Failed to write the summary")?;

        Ok(())
    }

    fn show_items<T: Listable + Serialize>(&mut self, items: &[T]) -> Result<()> {
        if self.json {
            let json = serde_json::to_string_pretty(items).context("Failed to serialize items")?;
            writeln!(self.writer, "{}", json).context("Failed to write items")?;
            return Ok(());
        }

        for item in items {
            writeln!(self.writer, "{}: {}", item.list_id(), item.list_label()?)
                .with_context(|| format!("Failed to write item: {}", item.list_id()))?;
        }

        Ok(())
    }
}

impl Listable for ClockifyUser {
    fn list_id(&self) -> &str {
        &self.id
    }

    fn list_label(&self) -> Result<String> {
        Ok(format!("{} (workspace {})", self.email, self.default_workspace))
    }
}

impl Listable for ClockifyWorkspace {
    fn list_id(&self) -> &str {
        &self.id
    }

    fn list_label(&self) -> Result<String> {
        Ok(self.name.clone())
    }
}

impl Listable for ClockifyProject {
    fn list_id(&self) -> &str {
        &self.id
    }

    fn list_label(&self) -> Result<String> {
        Ok(self.name.clone())
    }
}

impl Listable for ClockifyTask {
    fn list_id(&self) -> &str {
        &self.id
    }

    fn list_label(&self) -> Result<String> {
        Ok(self.name.clone())
    }
}

impl Listable for ClockifyTag {
    fn list_id(&self) -> &str {
        &self.id
    }

    fn list_label(&self) -> Result<String> {
        Ok(self.name.clone())
    }
}

impl Listable for ClockifyTimeEntry {
    fn list_id(&self) -> &str {
        &self.id
    }

    /// Localタイムゾーンの期間と説明。
    fn list_label(&self) -> Result<String> {
        let label = format!(
            "{} {}",
            self.local_interval()?,
            self.description.as_deref().unwrap_or_default()
        );

        Ok(label.trim_end().to_string())
    }
}

fn status_label(status: DiffStatus) -> &'static str {
    match status {
        DiffStatus::Keep => "KEEP",
        DiffStatus::Add => "ADD",
        DiffStatus::Delete => "DEL",
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

/// time entryをプロジェクト、タスク、説明、タグで表す。
///
/// 登録済みのみのtime entryは`names`から名前を引き、見つからない場合はIDで表す。
fn describe(entry: &EntryDiff, names: &RemoteNames) -> String {
    match (entry.generated(), entry.remote()) {
        (Some(generated), _) => format!(
            "{} - {} \"{}\" [{}]",
            generated.project(),
            generated.task().unwrap_or("-"),
            generated.description().unwrap_or_default(),
            generated.tags().join(", ")
        ),
        (None, Some(remote)) => {
            let names = names.get(&remote.id).cloned().unwrap_or_else(|| EntryNames {
                project: remote.project_id.clone(),
                task: remote.task_id.clone(),
                tags: remote.tag_ids.clone(),
            });
            format!(
                "{} - {} \"{}\" [{}] ({})",
                names.project.as_deref().unwrap_or("-"),
                names.task.as_deref().unwrap_or("-"),
                remote.description.as_deref().unwrap_or_default(),
                names.tags.join(", "),
                remote.id
            )
        }
        (None, None) => String::new(),
    }
}
