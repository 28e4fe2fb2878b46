//! テストで共通して利用するデータ。

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::clockify::{
    ClockifyProject, ClockifyTag, ClockifyTask, ClockifyUser, MockClockifyRepository,
};
use crate::datetime::local_to_zulu_string;
use crate::diff::{DayDiff, PeriodDiff};
use crate::generator::GeneratedEntry;
use crate::interval::DateTimeInterval;
use crate::settings::{DaySettings, TaskSettings, UserSettings};
use crate::time_entry::{ClockifyTimeEntry, NewTimeEntry, RemoteTimeInterval};

pub const WORKSPACE_ID: &str = "w1";
pub const USER_ID: &str = "u1";

/// 09:00から17:00までの勤務時間帯。
pub fn day_settings() -> DaySettings {
    DaySettings::new(time(9, 0), time(17, 0)).unwrap()
}

pub fn user_settings() -> UserSettings {
    UserSettings {
        token: "secret".to_string(),
        public_holiday: TaskSettings {
            project: "Holidays".to_string(),
            task: Some("Public".to_string()),
            description: Some("Public holiday".to_string()),
            tags: vec![],
        },
        personal_holiday: TaskSettings {
            project: "Holidays".to_string(),
            task: Some("Personal".to_string()),
            description: None,
            tags: vec!["off".to_string()],
        },
        day: day_settings(),
    }
}

pub fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

/// 2024年1月の日付を返す。2024-01-01は月曜日。
pub fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

pub fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(day).and_hms_opt(hour, minute, 0).unwrap()
}

/// 同じ日の開始時刻と終了時刻から区間を作成する。
pub fn span(day: u32, from: (u32, u32), to: (u32, u32)) -> DateTimeInterval {
    DateTimeInterval::new(at(day, from.0, from.1), at(day, to.0, to.1)).unwrap()
}

/// 差分から2024年1月の指定された日を返す。
pub fn diff_day(diff: &PeriodDiff, day: u32) -> &DayDiff {
    diff.days()
        .find(|day_diff| day_diff.date() == date(day))
        .unwrap()
}

/// プロジェクトとタスクを指定して生成済みのtime entryを作成する。
pub fn generated_entry(project: &str, task: Option<&str>, interval: DateTimeInterval) -> GeneratedEntry {
    let payload = NewTimeEntry {
        description: "TASK".to_string(),
        project_id: format!("id-{}", project),
        task_id: task.map(|task| format!("id-{}", task)),
        tag_ids: vec![],
        start: local_to_zulu_string(&interval.from()).unwrap(),
        end: local_to_zulu_string(&interval.to()).unwrap(),
        workspace_id: WORKSPACE_ID.to_string(),
        user_id: USER_ID.to_string(),
    };

    GeneratedEntry::new(
        project.to_string(),
        task.map(str::to_string),
        Some("TASK".to_string()),
        vec![],
        interval,
        payload,
    )
}

/// 生成済みのtime entryと同じ内容の登録済みtime entryを作成する。
pub fn remote_entry_for(entry: &GeneratedEntry, id: &str) -> ClockifyTimeEntry {
    let payload = entry.payload();

    ClockifyTimeEntry {
        id: id.to_string(),
        description: Some(payload.description.clone()),
        project_id: Some(payload.project_id.clone()),
        task_id: payload.task_id.clone(),
        tag_ids: payload.tag_ids.clone(),
        time_interval: RemoteTimeInterval {
            start: payload.start.clone(),
            end: Some(payload.end.clone()),
        },
        workspace_id: payload.workspace_id.clone(),
        user_id: payload.user_id.clone(),
    }
}

/// どの生成済みtime entryとも一致しない登録済みtime entryを作成する。
pub fn unrelated_remote_entry(id: &str, interval: DateTimeInterval) -> ClockifyTimeEntry {
    ClockifyTimeEntry {
        id: id.to_string(),
        description: Some("manual".to_string()),
        project_id: Some("id-Other".to_string()),
        task_id: None,
        tag_ids: vec![],
        time_interval: RemoteTimeInterval {
            start: local_to_zulu_string(&interval.from()).unwrap(),
            end: Some(local_to_zulu_string(&interval.to()).unwrap()),
        },
        workspace_id: WORKSPACE_ID.to_string(),
        user_id: USER_ID.to_string(),
    }
}

/// ユーザー、プロジェクト、タスク、タグを返すモックを作成する。
///
/// プロジェクトは`Work`と`Holidays`、`Holidays`のタスクは`Public`と`Personal`、タグは`off`と`meeting`。
pub fn mock_lookups() -> MockClockifyRepository {
    let mut clockify = MockClockifyRepository::new();
    clockify.expect_read_user().returning(|| {
        Ok(ClockifyUser {
            id: USER_ID.to_string(),
            email: "me@example.com".to_string(),
            default_workspace: WORKSPACE_ID.to_string(),
        })
    });
    clockify.expect_read_projects().returning(|_| {
        Ok(vec![
            ClockifyProject {
                id: "id-Work".to_string(),
                name: "Work".to_string(),
                archived: false,
            },
            ClockifyProject {
                id: "id-Holidays".to_string(),
                name: "Holidays".to_string(),
                archived: false,
            },
        ])
    });
    clockify.expect_read_tasks().returning(|_, project_id| {
        let names: &[&str] = if project_id == "id-Holidays" {
            &["Public", "Personal"]
        } else {
            &["Dev"]
        };
        Ok(names
            .iter()
            .map(|name| ClockifyTask {
                id: format!("id-{}", name),
                name: name.to_string(),
                project_id: project_id.to_string(),
            })
            .collect())
    });
    clockify.expect_read_tags().returning(|_| {
        Ok(vec![
            ClockifyTag {
                id: "id-off".to_string(),
                name: "off".to_string(),
            },
            ClockifyTag {
                id: "id-meeting".to_string(),
                name: "meeting".to_string(),
            },
        ])
    });

    clockify
}
