use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use log::{debug, info};

use crate::clockify::ClockifyRepository;
use crate::datetime::local_to_utc;
use crate::generator::{is_working_day, GeneratedDay, GeneratedEntry, GeneratedPeriod};
use crate::interval::{DateInterval, DateTimeInterval};
use crate::time_entry::ClockifyTimeEntry;

/// time entryに対して行う操作。並び順は表示の順序として利用する。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiffStatus {
    Keep,
    Delete,
    Add,
}

/// 生成したtime entryと登録済みのtime entryの対応。
#[derive(Clone, Debug, PartialEq)]
pub enum EntryDiff {
    /// 同じ内容が既に登録されている。
    Keep {
        generated: GeneratedEntry,
        remote: ClockifyTimeEntry,
    },
    /// まだ登録されていない。
    Add(GeneratedEntry),
    /// 登録されているが生成したtime entryにはない。
    Delete(ClockifyTimeEntry),
}

impl EntryDiff {
    pub fn status(&self) -> DiffStatus {
        match self {
            EntryDiff::Keep { .. } => DiffStatus::Keep,
            EntryDiff::Add(_) => DiffStatus::Add,
            EntryDiff::Delete(_) => DiffStatus::Delete,
        }
    }

    pub fn generated(&self) -> Option<&GeneratedEntry> {
        match self {
            EntryDiff::Keep { generated, .. } | EntryDiff::Add(generated) => Some(generated),
            EntryDiff::Delete(_) => None,
        }
    }

    pub fn remote(&self) -> Option<&ClockifyTimeEntry> {
        match self {
            EntryDiff::Keep { remote, .. } | EntryDiff::Delete(remote) => Some(remote),
            EntryDiff::Add(_) => None,
        }
    }

    /// 区間をLocalタイムゾーンで返す。登録済みの場合は登録されている区間を優先する。
    pub fn interval(&self) -> Result<DateTimeInterval> {
        match self {
            EntryDiff::Keep { remote, .. } | EntryDiff::Delete(remote) => remote.local_interval(),
            EntryDiff::Add(generated) => Ok(*generated.interval()),
        }
    }
}

/// 1日分の差分。
#[derive(Clone, Debug, PartialEq)]
pub struct DayDiff {
    date: NaiveDate,
    entries: Vec<EntryDiff>,
}

impl DayDiff {
    /// 生成したtime entryを全て追加対象とする`DayDiff`を返す。
    pub fn new(day: GeneratedDay) -> Self {
        Self {
            date: day.date(),
            entries: day.into_entries().into_iter().map(EntryDiff::Add).collect(),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn entries(&self) -> &[EntryDiff] {
        &self.entries
    }

    pub fn is_working_day(&self) -> bool {
        is_working_day(self.date)
    }

    /// 生成したtime entryの合計時間を秒で返す。削除対象は含まない。
    pub fn duration_seconds(&self) -> i64 {
        self.entries
            .iter()
            .filter_map(EntryDiff::generated)
            .map(GeneratedEntry::duration_seconds)
            .sum()
    }

    /// 登録済みのtime entryを対応付ける。
    ///
    /// まだ対応付けられていない生成済みのtime entryのうち、並び順で最初に内容が一致したものと対応付ける。
    /// 一致するものがなければ削除対象として末尾に追加する。
    fn add_remote_entry(&mut self, remote: ClockifyTimeEntry) {
        let position = self.entries.iter().position(|diff| {
            matches!(diff, EntryDiff::Add(generated) if generated.payload().matches(&remote))
        });

        match position {
            Some(index) => {
                let diff = &mut self.entries[index];
                if let EntryDiff::Add(generated) = diff {
                    debug!("Keep time entry {}", remote.id);
                    *diff = EntryDiff::Keep {
                        generated: generated.clone(),
                        remote,
                    };
                }
            }
            None => {
                debug!("Delete time entry {}", remote.id);
                self.entries.push(EntryDiff::Delete(remote));
            }
        }
    }
}

/// 期間全体の差分。
#[derive(Clone, Debug, PartialEq)]
pub struct PeriodDiff {
    period: DateInterval,
    days: BTreeMap<NaiveDate, DayDiff>,
}

impl PeriodDiff {
    /// 生成したtime entryを全て追加対象とする`PeriodDiff`を返す。
    pub fn new(generated: GeneratedPeriod) -> Self {
        let period = *generated.period();
        let days = generated
            .into_days()
            .map(|day| (day.date(), DayDiff::new(day)))
            .collect();

        Self { period, days }
    }

    pub fn period(&self) -> &DateInterval {
        &self.period
    }

    /// 日付の昇順に全ての日を返す。
    pub fn days(&self) -> impl Iterator<Item = &DayDiff> {
        self.days.values()
    }

    /// 登録済みのtime entryを開始日の`DayDiff`に対応付ける。
    ///
    /// 開始日が期間外の場合はエラーを返す。
    pub fn add_remote_entry(&mut self, remote: ClockifyTimeEntry) -> Result<()> {
        let date = remote.local_start()?.date();
        let day = self.days.get_mut(&date).with_context(|| {
            format!(
                "Cannot add time entry {}, there is no matching day",
                remote.id
            )
        })?;
        day.add_remote_entry(remote);

        Ok(())
    }

    /// 指定された操作の件数を返す。
    pub fn count(&self, status: DiffStatus) -> usize {
        self.days()
            .flat_map(DayDiff::entries)
            .filter(|diff| diff.status() == status)
            .count()
    }

    /// 追加も削除もない場合に`true`を返す。
    pub fn is_up_to_date(&self) -> bool {
        self.count(DiffStatus::Add) == 0 && self.count(DiffStatus::Delete) == 0
    }
}

/// 反映の結果。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub added: usize,
    pub deleted: usize,
}

/// 生成したtime entryとClockifyに登録済みのtime entryの差分を計算し、反映する。
pub struct DiffComputer<'a, R: ClockifyRepository> {
    clockify: &'a R,
}

impl<'a, R: ClockifyRepository> DiffComputer<'a, R> {
    pub fn new(clockify: &'a R) -> Self {
        Self { clockify }
    }

    /// 期間に登録済みのtime entryを取得し、差分を計算する。
    ///
    /// # Arguments
    ///
    /// * `generated` - 生成したtime entry
    pub async fn compute(&self, generated: GeneratedPeriod) -> Result<PeriodDiff> {
        let mut diff = PeriodDiff::new(generated);

        let existing = self.find_existing_entries(diff.period()).await?;
        for remote in existing {
            diff.add_remote_entry(remote)?;
        }
        info!(
            "Diff computed: {} to keep, {} to add, {} to delete",
            diff.count(DiffStatus::Keep),
            diff.count(DiffStatus::Add),
            diff.count(DiffStatus::Delete)
        );

        Ok(diff)
    }

    /// 差分をClockifyに反映する。
    ///
    /// 途中で失敗した場合、それまでの登録と削除は取り消さない。
    pub async fn apply(&self, diff: &PeriodDiff) -> Result<ApplySummary> {
        let mut summary = ApplySummary::default();

        for day in diff.days() {
            for entry in day.entries() {
                match entry {
                    EntryDiff::Add(generated) => {
                        let created = self
                            .clockify
                            .create_time_entry(generated.payload())
                            .await
                            .with_context(|| {
                                format!("Failed to add time entry {}", generated.interval())
                            })?;
                        info!("Added time entry {} on {}", created.id, day.date());
                        summary.added += 1;
                    }
                    EntryDiff::Delete(remote) => {
                        self.clockify
                            .delete_time_entry(&remote.workspace_id, &remote.id)
                            .await
                            .with_context(|| format!("Failed to delete time entry {}", remote.id))?;
                        info!("Deleted time entry {} on {}", remote.id, day.date());
                        summary.deleted += 1;
                    }
                    EntryDiff::Keep { .. } => {}
                }
            }
        }

        Ok(summary)
    }

    /// 期間の最初の日の00:00:00から最後の日の23:59:59までのtime entryを取得する。
    async fn find_existing_entries(&self, period: &DateInterval) -> Result<Vec<ClockifyTimeEntry>> {
        let user = self
            .clockify
            .read_user()
            .await
            .context("Failed to retrieve the current user")?;
        let start = local_to_utc(&period.from().and_time(NaiveTime::MIN))?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).context("Invalid end of day")?;
        let end = local_to_utc(&period.to().and_time(end_of_day))?;

        self.clockify
            .read_time_entries(&user.default_workspace, &user.id, &start, &end)
            .await
            .context("Failed to retrieve time entries")
    }
}

#[cfg(test)]
mod tests {
    use mockall::predicate::eq;

    use super::{ApplySummary, DayDiff, DiffComputer, DiffStatus, EntryDiff, PeriodDiff};
    use crate::clockify::{ClockifyUser, MockClockifyRepository};
    use crate::datetime::local_to_utc;
    use crate::fixtures::{
        at, date, diff_day, generated_entry, remote_entry_for, span, unrelated_remote_entry,
        USER_ID, WORKSPACE_ID,
    };
    use crate::generator::{GeneratedDay, GeneratedEntry, GeneratedPeriod};
    use crate::interval::DateInterval;

    /// 登録済みのtime entryがない場合は全て追加対象となることを確認する。
    #[test]
    fn test_new_marks_everything_as_add() {
        let diff = PeriodDiff::new(period_with(&[
            generated_entry("Work", None, span(2, (9, 0), (12, 0))),
            generated_entry("Work", None, span(3, (9, 0), (12, 0))),
        ]));

        assert_eq!(diff.count(DiffStatus::Add), 2);
        assert_eq!(diff.days().count(), 3);
        assert!(!diff.is_up_to_date());
    }

    /// 内容が一致する登録済みのtime entryは維持対象になることを確認する。
    #[test]
    fn test_matching_remote_entry_is_kept() {
        let entry = generated_entry("Work", None, span(2, (9, 0), (12, 0)));
        let mut diff = PeriodDiff::new(period_with(&[entry.clone()]));

        diff.add_remote_entry(remote_entry_for(&entry, "e1")).unwrap();

        let day = diff_day(&diff, 2);
        assert_eq!(day.entries().len(), 1);
        assert_eq!(day.entries()[0].status(), DiffStatus::Keep);
        assert_eq!(day.entries()[0].remote().unwrap().id, "e1");
        assert!(diff.is_up_to_date());
    }

    /// 一致しない登録済みのtime entryは削除対象として末尾に追加されることを確認する。
    #[test]
    fn test_unmatched_remote_entry_is_deleted() {
        let entry = generated_entry("Work", None, span(2, (9, 0), (12, 0)));
        let mut diff = PeriodDiff::new(period_with(&[entry]));

        diff.add_remote_entry(unrelated_remote_entry("e9", span(2, (9, 0), (12, 0))))
            .unwrap();

        let statuses: Vec<DiffStatus> = diff_day(&diff, 2)
            .entries()
            .iter()
            .map(EntryDiff::status)
            .collect();
        assert_eq!(statuses, vec![DiffStatus::Add, DiffStatus::Delete]);
        assert_eq!(diff_day(&diff, 2).duration_seconds(), 3 * 3600);
    }

    /// 同じ内容の生成済みtime entryが複数ある場合、1件の登録済みtime entryは最初の1件にだけ対応付くことを確認する。
    #[test]
    fn test_each_remote_entry_matches_at_most_one_generated_entry() {
        let entry = generated_entry("Work", None, span(2, (9, 0), (12, 0)));
        let mut day = DayDiff::new(day_with(2, &[entry.clone(), entry.clone()]));

        day.add_remote_entry(remote_entry_for(&entry, "e1"));
        let after_first: Vec<DiffStatus> = day.entries().iter().map(EntryDiff::status).collect();
        day.add_remote_entry(remote_entry_for(&entry, "e2"));
        day.add_remote_entry(remote_entry_for(&entry, "e3"));

        assert_eq!(after_first, vec![DiffStatus::Keep, DiffStatus::Add]);
        let remote_ids: Vec<&str> = day
            .entries()
            .iter()
            .map(|diff| diff.remote().unwrap().id.as_str())
            .collect();
        assert_eq!(remote_ids, vec!["e1", "e2", "e3"]);
        assert_eq!(day.entries()[2].status(), DiffStatus::Delete);
    }

    /// 期間外の登録済みtime entryはエラーとなることを確認する。
    #[test]
    fn test_remote_entry_outside_period_is_rejected() {
        let mut diff = PeriodDiff::new(period_with(&[]));

        let result = diff.add_remote_entry(unrelated_remote_entry("e9", span(10, (9, 0), (10, 0))));

        assert!(result.unwrap_err().to_string().contains("e9"));
    }

    /// 差分の計算で期間全体のtime entryを1回だけ取得することを確認する。
    #[tokio::test]
    async fn test_compute_fetches_period_once() {
        let entry = generated_entry("Work", None, span(2, (9, 0), (17, 0)));
        let remote = remote_entry_for(&entry, "e1");
        let start = local_to_utc(&at(1, 0, 0)).unwrap();
        let end = local_to_utc(&date(3).and_hms_opt(23, 59, 59).unwrap()).unwrap();
        let mut clockify = mock_user();
        clockify
            .expect_read_time_entries()
            .with(eq(WORKSPACE_ID), eq(USER_ID), eq(start), eq(end))
            .times(1)
            .returning(move |_, _, _, _| Ok(vec![remote.clone()]));

        let diff = DiffComputer::new(&clockify)
            .compute(period_with(&[entry]))
            .await
            .unwrap();

        assert_eq!(diff.count(DiffStatus::Keep), 1);
        assert!(diff.is_up_to_date());
    }

    /// 反映済みのtime entryが生成とは逆の順序で返っても、再計算で全て維持対象になることを確認する。
    #[tokio::test]
    async fn test_compute_after_apply_keeps_everything() {
        let morning = generated_entry("Work", None, span(2, (9, 0), (13, 0)));
        let afternoon = generated_entry("Work", Some("Dev"), span(2, (13, 0), (17, 0)));
        let remote = vec![
            remote_entry_for(&afternoon, "e2"),
            remote_entry_for(&morning, "e1"),
        ];
        let mut clockify = mock_user();
        clockify
            .expect_read_time_entries()
            .times(1)
            .returning(move |_, _, _, _| Ok(remote.clone()));

        let diff = DiffComputer::new(&clockify)
            .compute(period_with(&[morning, afternoon]))
            .await
            .unwrap();

        assert_eq!(diff.count(DiffStatus::Keep), 2);
        assert_eq!(diff.count(DiffStatus::Add), 0);
        assert_eq!(diff.count(DiffStatus::Delete), 0);
        let remote_ids: Vec<&str> = diff_day(&diff, 2)
            .entries()
            .iter()
            .map(|entry| entry.remote().unwrap().id.as_str())
            .collect();
        assert_eq!(remote_ids, vec!["e1", "e2"]);
    }

    /// 反映では追加と削除だけを行い、維持対象には何もしないことを確認する。
    #[tokio::test]
    async fn test_apply_adds_and_deletes() {
        let kept = generated_entry("Work", None, span(2, (9, 0), (12, 0)));
        let added = generated_entry("Work", Some("Dev"), span(2, (12, 0), (17, 0)));
        let mut diff = PeriodDiff::new(period_with(&[kept.clone(), added.clone()]));
        diff.add_remote_entry(remote_entry_for(&kept, "kept")).unwrap();
        diff.add_remote_entry(unrelated_remote_entry("stale", span(3, (9, 0), (17, 0))))
            .unwrap();
        let mut clockify = MockClockifyRepository::new();
        let expected_payload = added.payload().clone();
        let created = remote_entry_for(&added, "created");
        clockify
            .expect_create_time_entry()
            .withf(move |entry| *entry == expected_payload)
            .times(1)
            .returning(move |_| Ok(created.clone()));
        clockify
            .expect_delete_time_entry()
            .with(eq(WORKSPACE_ID), eq("stale"))
            .times(1)
            .returning(|_, _| Ok(()));

        let summary = DiffComputer::new(&clockify).apply(&diff).await.unwrap();

        assert_eq!(
            summary,
            ApplySummary {
                added: 1,
                deleted: 1
            }
        );
    }

    /// 反映の途中で失敗した場合はエラーとなり、以降の操作を行わないことを確認する。
    #[tokio::test]
    async fn test_apply_stops_at_first_failure() {
        let diff = PeriodDiff::new(period_with(&[
            generated_entry("Work", None, span(2, (9, 0), (12, 0))),
            generated_entry("Work", None, span(3, (9, 0), (12, 0))),
        ]));
        let mut clockify = MockClockifyRepository::new();
        clockify
            .expect_create_time_entry()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("Error while adding a time entry. status code: 400.")));

        let result = DiffComputer::new(&clockify).apply(&diff).await;

        let error = format!("{:#}", result.unwrap_err());
        assert!(error.contains("status code: 400"), "{}", error);
    }

    /// 2024-01-01から2024-01-03までの期間に生成済みのtime entryを追加する。
    fn period_with(entries: &[GeneratedEntry]) -> GeneratedPeriod {
        let mut period = GeneratedPeriod::new(DateInterval::new(date(1), date(3)).unwrap());
        for entry in entries {
            period.add_entry(entry.clone()).unwrap();
        }
        period
    }

    fn day_with(day: u32, entries: &[GeneratedEntry]) -> GeneratedDay {
        let mut generated = GeneratedDay::new(date(day));
        for entry in entries {
            generated.add_entry(entry.clone());
        }
        generated
    }

    fn mock_user() -> MockClockifyRepository {
        let mut clockify = MockClockifyRepository::new();
        clockify.expect_read_user().returning(|| {
            Ok(ClockifyUser {
                id: USER_ID.to_string(),
                email: "me@example.com".to_string(),
                default_workspace: WORKSPACE_ID.to_string(),
            })
        });
        clockify
    }
}
