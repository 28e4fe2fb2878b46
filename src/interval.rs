use std::fmt;

use anyhow::{bail, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::datetime::{deserialize_user_date, deserialize_user_datetime};
use crate::settings::DaySettings;

/// 開始日と終了日を含む日付の区間。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawDateInterval")]
pub struct DateInterval {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateInterval {
    /// 新しい`DateInterval`を返す。
    ///
    /// 開始日が終了日より後の場合はエラーを返す。
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            bail!(
                "The starting date {} cannot be after the end date {}",
                from,
                to
            );
        }

        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// 指定された日付が区間に含まれるかを返す。
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// 区間に含まれる日付を昇順に返す。
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let to = self.to;
        self.from.iter_days().take_while(move |date| *date <= to)
    }
}

impl fmt::Display for DateInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.from, self.to)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateInterval {
    #[serde(deserialize_with = "deserialize_user_date")]
    from_date: NaiveDate,
    #[serde(deserialize_with = "deserialize_user_date")]
    to_date: NaiveDate,
}

impl TryFrom<RawDateInterval> for DateInterval {
    type Error = anyhow::Error;

    fn try_from(raw: RawDateInterval) -> Result<Self> {
        Self::new(raw.from_date, raw.to_date)
    }
}

/// Localタイムゾーンの日時の区間。
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "RawDateTimeInterval")]
pub struct DateTimeInterval {
    from: NaiveDateTime,
    to: NaiveDateTime,
}

impl DateTimeInterval {
    /// 新しい`DateTimeInterval`を返す。
    ///
    /// 開始日時が終了日時より後の場合はエラーを返す。
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Result<Self> {
        if from > to {
            bail!(
                "The starting date {} cannot be after the end date {}",
                from,
                to
            );
        }

        Ok(Self { from, to })
    }

    /// 指定された日の勤務時間帯全体を表す区間を返す。
    pub fn working_window(date: NaiveDate, day: &DaySettings) -> Self {
        // DaySettingsは開始時刻が終了時刻より前であることを保証している
        Self {
            from: day.start_of(date),
            to: day.end_of(date),
        }
    }

    pub fn from(&self) -> NaiveDateTime {
        self.from
    }

    pub fn to(&self) -> NaiveDateTime {
        self.to
    }

    /// 区間の長さを秒で返す。
    pub fn duration_seconds(&self) -> i64 {
        (self.to - self.from).num_seconds()
    }

    /// 一方の区間がもう一方の区間に完全に含まれる場合に重なりありとする。
    ///
    /// 一部だけが交差する区間は重なりとみなさない。
    pub fn overlaps(&self, other: &DateTimeInterval) -> bool {
        (self.from >= other.from && self.to <= other.to)
            || (other.from >= self.from && other.to <= self.to)
    }
}

impl fmt::Display for DateTimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} => {}]",
            self.from.format("%Y-%m-%d, %H:%M:%S"),
            self.to.format("%Y-%m-%d, %H:%M:%S")
        )
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDateTimeInterval {
    #[serde(deserialize_with = "deserialize_user_datetime")]
    from_date: NaiveDateTime,
    #[serde(deserialize_with = "deserialize_user_datetime")]
    to_date: NaiveDateTime,
}

impl TryFrom<RawDateTimeInterval> for DateTimeInterval {
    type Error = anyhow::Error;

    fn try_from(raw: RawDateTimeInterval) -> Result<Self> {
        Self::new(raw.from_date, raw.to_date)
    }
}

/// 複数日にまたがる日時の区間を1日ごとの区間に分割する。
///
/// 同じ日に収まる区間はそのまま返す。
/// 複数日にまたがる場合、初日は開始日時から勤務終了時刻まで、
/// 間の日は勤務時間帯全体、最終日は勤務開始時刻から終了日時までとする。
///
/// 初日の開始が勤務終了より後、あるいは最終日の終了が勤務開始より前の場合はエラーを返す。
pub fn split_datetime_interval(
    interval: &DateTimeInterval,
    day: &DaySettings,
) -> Result<Vec<DateTimeInterval>> {
    let first_date = interval.from.date();
    let last_date = interval.to.date();

    if first_date == last_date {
        return Ok(vec![*interval]);
    }

    let mut split = vec![DateTimeInterval::new(interval.from, day.end_of(first_date))?];
    split.extend(
        first_date
            .iter_days()
            .skip(1)
            .take_while(|date| *date < last_date)
            .map(|date| DateTimeInterval::working_window(date, day)),
    );
    split.push(DateTimeInterval::new(day.start_of(last_date), interval.to)?);

    Ok(split)
}

/// 日付の区間を、各日の勤務時間帯全体を表す区間に分割する。
pub fn split_date_interval(interval: &DateInterval, day: &DaySettings) -> Vec<DateTimeInterval> {
    interval
        .days()
        .map(|date| DateTimeInterval::working_window(date, day))
        .collect()
}

/// 勤務時間帯のうち、どの区間にも含まれていない部分を返す。
///
/// 勤務開始時刻からカーソルを進め、カーソル以降で最も早く始まる区間を探す。
/// その区間がカーソルより後に始まる場合は隙間として記録し、カーソルを区間の終了まで進める。
/// 勤務終了以降に始まる区間もカーソルの次の区間として扱うため、隙間は勤務終了を越えることがある。
/// カーソル位置の長さ0の区間は無視する。
///
/// # Arguments
///
/// * `date` - 対象の日
/// * `intervals` - その日に既に存在する区間(順不同)
/// * `day` - 勤務時間帯
pub fn find_missing_intervals(
    date: NaiveDate,
    intervals: &[DateTimeInterval],
    day: &DaySettings,
) -> Vec<DateTimeInterval> {
    let window_end = day.end_of(date);
    let mut cursor = day.start_of(date);
    let mut missing = Vec::new();

    while cursor < window_end {
        let closest = intervals
            .iter()
            .filter(|interval| interval.from >= cursor && interval.to > cursor)
            .min_by_key(|interval| interval.from);

        match closest {
            Some(closest) => {
                if closest.from > cursor {
                    missing.push(DateTimeInterval {
                        from: cursor,
                        to: closest.from,
                    });
                }
                cursor = closest.to;
            }
            None => {
                missing.push(DateTimeInterval {
                    from: cursor,
                    to: window_end,
                });
                cursor = window_end;
            }
        }
    }

    missing
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
    use rstest::rstest;

    use super::{
        find_missing_intervals, split_date_interval, split_datetime_interval, DateInterval,
        DateTimeInterval,
    };
    use crate::settings::DaySettings;

    /// 開始が終了より後の区間は作成できないことを確認する。
    #[test]
    fn test_new_rejects_reversed_interval() {
        assert!(DateTimeInterval::new(at(2, 10, 0), at(2, 9, 0)).is_err());
        assert!(DateInterval::new(date(3), date(2)).is_err());
        assert!(DateTimeInterval::new(at(2, 9, 0), at(2, 9, 0)).is_ok());
    }

    /// JSONからのデシリアライズ時にも区間の検証が行われることを確認する。
    #[rstest]
    #[case::valid(
        r#"{"fromDate": "2024-01-02 09:00:00", "toDate": "2024-01-02 12:00:00"}"#,
        true
    )]
    #[case::reversed(
        r#"{"fromDate": "2024-01-02 12:00:00", "toDate": "2024-01-02 09:00:00"}"#,
        false
    )]
    #[case::bad_format(r#"{"fromDate": "2024-01-02T09:00", "toDate": "2024-01-02 12:00:00"}"#, false)]
    fn test_deserialize_datetime_interval(#[case] json: &str, #[case] valid: bool) {
        let result = serde_json::from_str::<DateTimeInterval>(json);

        assert_eq!(result.is_ok(), valid);
    }

    /// 区間に含まれる日付が列挙されることを確認する。
    #[test]
    fn test_date_interval_days() {
        let interval = DateInterval::new(date(30), date(32)).unwrap();

        assert_eq!(interval.days().collect::<Vec<_>>(), vec![date(30), date(31), date(32)]);
        assert!(interval.contains(date(31)));
        assert!(!interval.contains(date(29)));
        assert!(!interval.contains(date(33)));
    }

    /// 重なりの判定は包含関係のみで行うことを確認する。
    #[rstest]
    #[case::contained((9, 0, 12, 0), (10, 0, 11, 0), true)]
    #[case::containing((10, 0, 11, 0), (9, 0, 12, 0), true)]
    #[case::same((9, 0, 12, 0), (9, 0, 12, 0), true)]
    #[case::touching((9, 0, 11, 0), (11, 0, 13, 0), false)]
    #[case::partial((9, 0, 10, 30), (10, 0, 11, 0), false)]
    #[case::disjoint((9, 0, 10, 0), (14, 0, 15, 0), false)]
    fn test_overlaps(
        #[case] first: (u32, u32, u32, u32),
        #[case] second: (u32, u32, u32, u32),
        #[case] expected: bool,
    ) {
        let first = span(2, first);
        let second = span(2, second);

        assert_eq!(first.overlaps(&second), expected);
    }

    /// 同じ日に収まる区間は分割されないことを確認する。
    #[test]
    fn test_split_datetime_interval_same_day() {
        let interval = span(2, (7, 30, 19, 0));

        let split = split_datetime_interval(&interval, &day_settings()).unwrap();

        assert_eq!(split, vec![interval]);
    }

    /// 3日にまたがる区間は勤務時間帯で区切られた3つの区間になることを確認する。
    #[test]
    fn test_split_datetime_interval_three_days() {
        let interval = DateTimeInterval::new(at(2, 13, 0), at(4, 12, 0)).unwrap();

        let split = split_datetime_interval(&interval, &day_settings()).unwrap();

        assert_eq!(
            split,
            vec![
                span(2, (13, 0, 17, 0)),
                span(3, (9, 0, 17, 0)),
                span(4, (9, 0, 12, 0)),
            ]
        );
    }

    /// 月をまたぐ区間も日付で分割されることを確認する。
    #[test]
    fn test_split_datetime_interval_across_month() {
        let interval = DateTimeInterval::new(at(31, 9, 0), at(32, 17, 0)).unwrap();

        let split = split_datetime_interval(&interval, &day_settings()).unwrap();

        assert_eq!(split, vec![span(31, (9, 0, 17, 0)), span(32, (9, 0, 17, 0))]);
    }

    /// 勤務終了後に始まる複数日の区間はエラーとなることを確認する。
    #[test]
    fn test_split_datetime_interval_starting_after_day_end() {
        let interval = DateTimeInterval::new(at(2, 18, 0), at(3, 12, 0)).unwrap();

        assert!(split_datetime_interval(&interval, &day_settings()).is_err());
    }

    /// 日付の区間は初日と最終日を含めて勤務時間帯全体に分割されることを確認する。
    #[rstest]
    #[case::single_day(2, 2, 1)]
    #[case::three_days(2, 4, 3)]
    fn test_split_date_interval(#[case] from: u32, #[case] to: u32, #[case] expected_len: usize) {
        let interval = DateInterval::new(date(from), date(to)).unwrap();

        let split = split_date_interval(&interval, &day_settings());

        assert_eq!(split.len(), expected_len);
        for (offset, interval) in split.iter().enumerate() {
            assert_eq!(*interval, span(from + offset as u32, (9, 0, 17, 0)));
        }
    }

    /// 隙間の検出を確認する。
    #[rstest]
    #[case::empty(vec![], vec![(9, 0, 17, 0)])]
    #[case::covered(vec![(9, 0, 17, 0)], vec![])]
    #[case::covered_by_pieces(vec![(13, 0, 17, 0), (9, 0, 13, 0)], vec![])]
    #[case::morning_only(vec![(9, 0, 13, 0)], vec![(13, 0, 17, 0)])]
    #[case::middle(vec![(11, 0, 12, 0)], vec![(9, 0, 11, 0), (12, 0, 17, 0)])]
    #[case::unordered(
        vec![(15, 0, 16, 0), (10, 0, 11, 0)],
        vec![(9, 0, 10, 0), (11, 0, 15, 0), (16, 0, 17, 0)],
    )]
    #[case::after_window(vec![(17, 30, 18, 30)], vec![(9, 0, 17, 30)])]
    #[case::after_window_with_morning(vec![(9, 0, 12, 0), (18, 0, 19, 0)], vec![(12, 0, 18, 0)])]
    #[case::overflowing_end(vec![(16, 0, 18, 0)], vec![(9, 0, 16, 0)])]
    #[case::zero_length(vec![(12, 0, 12, 0)], vec![(9, 0, 12, 0), (12, 0, 17, 0)])]
    fn test_find_missing_intervals(
        #[case] existing: Vec<(u32, u32, u32, u32)>,
        #[case] expected: Vec<(u32, u32, u32, u32)>,
    ) {
        let existing: Vec<DateTimeInterval> = existing.into_iter().map(|s| span(2, s)).collect();
        let expected: Vec<DateTimeInterval> = expected.into_iter().map(|s| span(2, s)).collect();

        let missing = find_missing_intervals(date(2), &existing, &day_settings());

        assert_eq!(missing, expected);
    }

    fn day_settings() -> DaySettings {
        DaySettings::new(
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )
        .unwrap()
    }

    /// 2024年1月の日付を返す。32日以降は2月として扱う。
    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day as i64 - 1)
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        date(day).and_hms_opt(hour, minute, 0).unwrap()
    }

    /// 同じ日の(開始時, 開始分, 終了時, 終了分)から区間を作成する。
    fn span(day: u32, (from_h, from_m, to_h, to_m): (u32, u32, u32, u32)) -> DateTimeInterval {
        DateTimeInterval::new(at(day, from_h, from_m), at(day, to_h, to_m)).unwrap()
    }
}
