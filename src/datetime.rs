use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer};

/// 設定ファイルで利用する日付の書式。
pub const USER_DATE_FORMAT: &str = "%Y-%m-%d";
/// 設定ファイルで利用する時刻の書式。
pub const USER_TIME_FORMAT: &str = "%H:%M:%S";
/// 設定ファイルで利用する日時の書式。
pub const USER_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `YYYY-MM-DD`形式の日付をパースする。
pub fn parse_user_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, USER_DATE_FORMAT)
        .with_context(|| format!("Cannot parse date: {}", s))
}

/// `HH:MM:SS`形式の時刻をパースする。
pub fn parse_user_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, USER_TIME_FORMAT)
        .with_context(|| format!("Cannot parse time: {}", s))
}

/// `YYYY-MM-DD HH:MM:SS`形式の日時をパースする。
pub fn parse_user_datetime(s: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, USER_DATETIME_FORMAT)
        .with_context(|| format!("Cannot parse datetime: {}", s))
}

/// Localタイムゾーンの日時をUTCに変換する。
///
/// 夏時間の切り替えなどでLocalの日時が一意に決まらない場合はエラーを返す。
pub fn local_to_utc(datetime: &NaiveDateTime) -> Result<DateTime<Utc>> {
    let local = Local
        .from_local_datetime(datetime)
        .single()
        .with_context(|| format!("Failed to convert {} to DateTime<Local>", datetime))?;

    Ok(local.to_utc())
}

/// UTCの日時をClockify APIで利用する`YYYY-MM-DDTHH:MM:SSZ`形式の文字列にする。
pub fn to_zulu_string(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Localタイムゾーンの日時をClockify APIの形式の文字列にする。
pub fn local_to_zulu_string(datetime: &NaiveDateTime) -> Result<String> {
    Ok(to_zulu_string(&local_to_utc(datetime)?))
}

/// Clockify APIの日時文字列をLocalタイムゾーンの日時に変換する。
pub fn zulu_string_to_local(s: &str) -> Result<NaiveDateTime> {
    let datetime = DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("Cannot parse remote datetime: {}", s))?;

    Ok(datetime.with_timezone(&Local).naive_local())
}

/// serdeで`YYYY-MM-DD`形式の日付をデシリアライズする。
pub fn deserialize_user_date<'de, D>(deserializer: D) -> std::result::Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_user_date(&s).map_err(de::Error::custom)
}

/// serdeで`YYYY-MM-DD`形式の日付の配列をデシリアライズする。
pub fn deserialize_user_dates<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<String>::deserialize(deserializer)?
        .iter()
        .map(|s| parse_user_date(s).map_err(de::Error::custom))
        .collect()
}

/// serdeで`HH:MM:SS`形式の時刻をデシリアライズする。
pub fn deserialize_user_time<'de, D>(deserializer: D) -> std::result::Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_user_time(&s).map_err(de::Error::custom)
}

/// serdeで`YYYY-MM-DD HH:MM:SS`形式の日時をデシリアライズする。
pub fn deserialize_user_datetime<'de, D>(
    deserializer: D,
) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_user_datetime(&s).map_err(de::Error::custom)
}
