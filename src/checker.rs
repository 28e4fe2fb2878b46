use std::collections::BTreeSet;

use chrono::NaiveDate;
use log::{debug, warn};

use crate::diff::{DayDiff, DiffStatus, PeriodDiff};
use crate::settings::UserSettings;

/// 秒を時間に変換する。
pub fn seconds_to_hours(seconds: i64) -> f64 {
    seconds as f64 / 3600.0
}

/// 検査の設定。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckOption {
    /// 勤務時間に満たない日をエラーではなく警告とする。
    pub partial: bool,
}

/// 差分の検査結果。
///
/// time entryは日付と`DayDiff`内の位置で識別する。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CheckReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
    days_duration_errors: BTreeSet<NaiveDate>,
    days_duration_warnings: BTreeSet<NaiveDate>,
    entry_errors: BTreeSet<(NaiveDate, usize)>,
    entry_warnings: BTreeSet<(NaiveDate, usize)>,
}

impl CheckReport {
    /// エラーがなければ差分を反映できる。警告は反映を妨げない。
    pub fn can_apply(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_duration_errors(&self) -> bool {
        !self.days_duration_errors.is_empty()
    }

    pub fn has_duration_warnings(&self) -> bool {
        !self.days_duration_warnings.is_empty()
    }

    pub fn is_day_duration_error(&self, date: NaiveDate) -> bool {
        self.days_duration_errors.contains(&date)
    }

    pub fn is_day_duration_warning(&self, date: NaiveDate) -> bool {
        self.days_duration_warnings.contains(&date)
    }

    pub fn is_entry_error(&self, date: NaiveDate, index: usize) -> bool {
        self.entry_errors.contains(&(date, index))
    }

    pub fn is_entry_warning(&self, date: NaiveDate, index: usize) -> bool {
        self.entry_warnings.contains(&(date, index))
    }

    fn add_error(&mut self, message: String) {
        debug!("{}", message);
        self.errors.push(message);
    }

    fn add_warning(&mut self, message: String) {
        debug!("{}", message);
        self.warnings.push(message);
    }
}

/// 差分が業務上の規則を満たしているかを検査する。
///
/// 規則違反は例外にせず、全てを`CheckReport`に集める。
pub struct Checker<'a> {
    settings: &'a UserSettings,
    option: CheckOption,
}

impl<'a> Checker<'a> {
    pub fn new(settings: &'a UserSettings, option: CheckOption) -> Self {
        Self { settings, option }
    }

    /// 差分を検査して結果を返す。
    ///
    /// # Arguments
    ///
    /// * `diff` - 検査する差分
    pub fn generate_report(&self, diff: &PeriodDiff) -> CheckReport {
        let mut report = CheckReport::default();

        for day in diff.days() {
            self.check_duration(day, &mut report);
            self.check_personal_holidays(day, &mut report);
            self.check_no_overlap(day, &mut report);
        }
        report.info.push(format!(
            "{} time entry(ies) to keep, {} to add, {} to delete.",
            diff.count(DiffStatus::Keep),
            diff.count(DiffStatus::Add),
            diff.count(DiffStatus::Delete)
        ));

        if !report.can_apply() {
            warn!("The check found {} error(s)", report.errors.len());
        }

        report
    }

    fn check_duration(&self, day: &DayDiff, report: &mut CheckReport) {
        let date = day.date();
        let duration = day.duration_seconds();
        let expected = self.settings.day.working_seconds();
        let hours = seconds_to_hours(duration);

        if day.is_working_day() {
            if duration < expected {
                let message = format!("The day {} has only {:?} hour(s).", date, hours);
                if self.option.partial {
                    report.days_duration_warnings.insert(date);
                    report.add_warning(message);
                } else {
                    report.days_duration_errors.insert(date);
                    report.add_error(message);
                }
            } else if duration > expected {
                report.days_duration_warnings.insert(date);
                report.add_warning(format!(
                    "The day {} has exceeding time: {:?} hour(s).",
                    date, hours
                ));
            }
        } else if duration > 0 {
            report.days_duration_warnings.insert(date);
            for (index, entry) in day.entries().iter().enumerate() {
                if entry.generated().is_some() {
                    report.entry_warnings.insert((date, index));
                }
            }
            report.add_warning(format!(
                "The day {} is not a working day, but has {:?} hour(s).",
                date, hours
            ));
        }
    }

    /// 休暇は勤務開始か半日で始まり、勤務終了か半日で終わらなければならない。
    fn check_personal_holidays(&self, day: &DayDiff, report: &mut CheckReport) {
        let day_settings = &self.settings.day;
        let half = day_settings.half_day_time();

        for (index, entry) in day.entries().iter().enumerate() {
            let Some(generated) = entry.generated() else {
                continue;
            };
            if !generated.is_created_from(&self.settings.personal_holiday) {
                continue;
            }

            let interval = generated.interval();
            let start = interval.from().time();
            if start != day_settings.start_at && start != half {
                report.entry_errors.insert((day.date(), index));
                report.add_error(format!(
                    "The holiday {} must start at the beginning of the day ({}), or at half of the day ({}).",
                    interval, day_settings.start_at, half
                ));
            }

            let end = interval.to().time();
            if end != day_settings.end_at && end != half {
                report.entry_errors.insert((day.date(), index));
                report.add_error(format!(
                    "The holiday {} must end at the end of the day ({}), or at half of the day ({}).",
                    interval, day_settings.end_at, half
                ));
            }
        }
    }

    /// 同じ日のtime entryが互いに重なっていないかを検査する。削除対象は対象外。
    fn check_no_overlap(&self, day: &DayDiff, report: &mut CheckReport) {
        let entries = day.entries();

        for i in 0..entries.len() {
            let Some(first) = entries[i].generated() else {
                continue;
            };
            for j in 0..i {
                let Some(second) = entries[j].generated() else {
                    continue;
                };
                if first.interval().overlaps(second.interval()) {
                    report.entry_errors.insert((day.date(), i));
                    report.entry_errors.insert((day.date(), j));
                    report.add_error(format!(
                        "The added time entry {} overlaps with the time entry: {}",
                        first.interval(),
                        second.interval()
                    ));
                }
            }
        }
    }
}
