use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
#[cfg(test)]
use mockall::automock;
use reqwest::{header::CONTENT_TYPE, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::datetime::to_zulu_string;
use crate::time_entry::{ClockifyTimeEntry, NewTimeEntry};

/// Clockify APIのエンドポイント。
const API_URL: &str = "https://api.clockify.me/api/v1";

/// 一覧を取得する時の1ページあたりの件数。
const PAGE_SIZE: usize = 200;

/// Clockifyのユーザー。
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockifyUser {
    pub id: String,
    pub email: String,
    pub default_workspace: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClockifyWorkspace {
    pub id: String,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClockifyProject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockifyTask {
    pub id: String,
    pub name: String,
    pub project_id: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ClockifyTag {
    pub id: String,
    pub name: String,
}

/// Clockify APIのエラーレスポンス。
#[derive(Debug, Deserialize)]
struct ClockifyError {
    message: String,
}

/// Clockifyとのやり取りを表すtrait。
///
/// テストではモックに差し替える。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClockifyRepository: Send + Sync {
    /// 認証済みのユーザーを取得する。
    async fn read_user(&self) -> Result<ClockifyUser>;

    async fn read_workspaces(&self) -> Result<Vec<ClockifyWorkspace>>;

    /// workspaceのプロジェクトを全て取得する。
    async fn read_projects(&self, workspace_id: &str) -> Result<Vec<ClockifyProject>>;

    /// プロジェクトのタスクを全て取得する。
    async fn read_tasks(&self, workspace_id: &str, project_id: &str) -> Result<Vec<ClockifyTask>>;

    /// workspaceのタグを全て取得する。
    async fn read_tags(&self, workspace_id: &str) -> Result<Vec<ClockifyTag>>;

    /// ユーザーの指定された期間のtime entryを取得する。
    ///
    /// # Arguments
    ///
    /// * `workspace_id` - 対象のworkspace
    /// * `user_id` - 対象のユーザー
    /// * `start` - 取得するtime entryの開始日時
    /// * `end` - 取得するtime entryの終了日時
    async fn read_time_entries(
        &self,
        workspace_id: &str,
        user_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<Vec<ClockifyTimeEntry>>;

    /// time entryを登録する。
    async fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<ClockifyTimeEntry>;

    /// time entryを削除する。
    async fn delete_time_entry(&self, workspace_id: &str, time_entry_id: &str) -> Result<()>;
}

/// 実行中に何度も参照されるClockifyの情報のキャッシュ。
#[derive(Default)]
struct Cache {
    user: Option<ClockifyUser>,
    projects: HashMap<String, Vec<ClockifyProject>>,
    tasks: HashMap<(String, String), Vec<ClockifyTask>>,
    tags: HashMap<String, Vec<ClockifyTag>>,
}

/// Clockify APIと通信するためのクライアント。
///
/// ユーザー、プロジェクト、タスク、タグは最初の取得結果をキャッシュする。
///
/// # Examples
///
/// ```
/// let client = ClockifyClient::new(&settings.token);
/// let user = client.read_user().await.unwrap();
/// ```
pub struct ClockifyClient {
    client: Client,
    api_url: String,
    api_key: String,
    cache: Mutex<Cache>,
}

impl ClockifyClient {
    /// 新しい`ClockifyClient`を返す。
    pub fn new(api_key: &str) -> Self {
        Self::with_api_url(API_URL, api_key)
    }

    /// 接続先を指定して新しい`ClockifyClient`を返す。
    pub fn with_api_url(api_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            cache: Mutex::new(Cache::default()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header("X-Api-Key", &self.api_key)
            .header(CONTENT_TYPE, "application/json")
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<Response> {
        let response = self
            .request(builder)
            .send()
            .await
            .with_context(|| format!("Failed to send request to Clockify API at {}", self.api_url))?;

        ensure_success(response, action).await
    }

    /// 1件のリソースを取得する。
    async fn get<T: DeserializeOwned>(&self, path: &str, action: &str) -> Result<T> {
        let builder = self.client.get(format!("{}{}", self.api_url, path));

        self.send(builder, action)
            .await?
            .json::<T>()
            .await
            .context("Failed to deserialize response")
    }

    /// ページングされた一覧を最後のページまで取得する。
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        action: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();

        for page in 1.. {
            let builder = self
                .client
                .get(format!("{}{}", self.api_url, path))
                .query(query)
                .query(&[("page", page.to_string()), ("page-size", PAGE_SIZE.to_string())]);
            let page_items = self
                .send(builder, action)
                .await?
                .json::<Vec<T>>()
                .await
                .context("Failed to deserialize response")?;
            let length = page_items.len();
            items.extend(page_items);

            if length < PAGE_SIZE {
                break;
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl ClockifyRepository for ClockifyClient {
    async fn read_user(&self) -> Result<ClockifyUser> {
        let cached = self.cache().user.clone();
        if let Some(user) = cached {
            return Ok(user);
        }

        let user: ClockifyUser = self.get("/user", "retrieving the current user").await?;
        debug!("Current user: {} ({})", user.email, user.id);
        self.cache().user = Some(user.clone());

        Ok(user)
    }

    async fn read_workspaces(&self) -> Result<Vec<ClockifyWorkspace>> {
        self.get("/workspaces", "retrieving workspaces").await
    }

    async fn read_projects(&self, workspace_id: &str) -> Result<Vec<ClockifyProject>> {
        let cached = self.cache().projects.get(workspace_id).cloned();
        if let Some(projects) = cached {
            return Ok(projects);
        }

        let projects: Vec<ClockifyProject> = self
            .get_all_pages(
                &format!("/workspaces/{}/projects", workspace_id),
                &[],
                "retrieving projects",
            )
            .await?;
        debug!("Projects of workspace {}: {}", workspace_id, projects.len());
        self.cache()
            .projects
            .insert(workspace_id.to_string(), projects.clone());

        Ok(projects)
    }

    async fn read_tasks(&self, workspace_id: &str, project_id: &str) -> Result<Vec<ClockifyTask>> {
        let key = (workspace_id.to_string(), project_id.to_string());
        let cached = self.cache().tasks.get(&key).cloned();
        if let Some(tasks) = cached {
            return Ok(tasks);
        }

        let tasks: Vec<ClockifyTask> = self
            .get_all_pages(
                &format!("/workspaces/{}/projects/{}/tasks", workspace_id, project_id),
                &[],
                "retrieving tasks",
            )
            .await?;
        self.cache().tasks.insert(key, tasks.clone());

        Ok(tasks)
    }

    async fn read_tags(&self, workspace_id: &str) -> Result<Vec<ClockifyTag>> {
        let cached = self.cache().tags.get(workspace_id).cloned();
        if let Some(tags) = cached {
            return Ok(tags);
        }

        let tags: Vec<ClockifyTag> = self
            .get_all_pages(
                &format!("/workspaces/{}/tags", workspace_id),
                &[],
                "retrieving tags",
            )
            .await?;
        self.cache()
            .tags
            .insert(workspace_id.to_string(), tags.clone());

        Ok(tags)
    }

    async fn read_time_entries(
        &self,
        workspace_id: &str,
        user_id: &str,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<Vec<ClockifyTimeEntry>> {
        let time_entries: Vec<ClockifyTimeEntry> = self
            .get_all_pages(
                &format!("/workspaces/{}/user/{}/time-entries", workspace_id, user_id),
                &[("start", to_zulu_string(start)), ("end", to_zulu_string(end))],
                "retrieving time entries",
            )
            .await?;
        info!("length of time entries: {}", time_entries.len());

        Ok(time_entries)
    }

    async fn create_time_entry(&self, entry: &NewTimeEntry) -> Result<ClockifyTimeEntry> {
        let builder = self
            .client
            .post(format!(
                "{}/workspaces/{}/time-entries",
                self.api_url, entry.workspace_id
            ))
            .json(entry);

        self.send(builder, "adding a time entry")
            .await?
            .json::<ClockifyTimeEntry>()
            .await
            .context("Failed to deserialize response")
    }

    async fn delete_time_entry(&self, workspace_id: &str, time_entry_id: &str) -> Result<()> {
        let builder = self.client.delete(format!(
            "{}/workspaces/{}/time-entries/{}",
            self.api_url, workspace_id, time_entry_id
        ));
        self.send(builder, "deleting a time entry").await?;

        Ok(())
    }
}

/// 成功以外のステータスの場合は、Clockifyが返したメッセージを含めたエラーを返す。
async fn ensure_success(response: Response, action: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ClockifyError>(&body)
        .map(|error| error.message)
        .unwrap_or(body);
    bail!(
        "Error while {}. Returned message: {}, status code: {}.",
        action,
        message,
        status.as_u16()
    )
}
