use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use log::debug;

use crate::clockify::{ClockifyRepository, ClockifyUser};
use crate::time_entry::ClockifyTimeEntry;

/// 登録済みのtime entryのプロジェクト、タスク、タグの名前。
///
/// Clockifyに見つからないIDは名前の代わりにIDのまま保持する。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryNames {
    pub project: Option<String>,
    pub task: Option<String>,
    pub tags: Vec<String>,
}

/// 登録済みのtime entryのIDごとの名前。
pub type RemoteNames = HashMap<String, EntryNames>;

/// 名前からClockifyのIDを解決する。
///
/// 名前は完全一致で比較し、一致するものがちょうど1つでない場合はエラーとする。
pub struct Resolver<'a, R: ClockifyRepository> {
    repository: &'a R,
}

impl<'a, R: ClockifyRepository> Resolver<'a, R> {
    /// 新しい`Resolver`を返す。
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// 認証済みのユーザーを返す。
    pub async fn user(&self) -> Result<ClockifyUser> {
        self.repository
            .read_user()
            .await
            .context("Failed to retrieve the current user")
    }

    /// プロジェクト名からプロジェクトのIDを返す。
    pub async fn project_id(&self, workspace_id: &str, name: &str) -> Result<String> {
        let projects = self
            .repository
            .read_projects(workspace_id)
            .await
            .context("Failed to get project list from clockify")?;
        let matching: Vec<_> = projects.iter().filter(|p| p.name == name).collect();

        Ok(expect_single(&matching, "project", name)?.id.clone())
    }

    /// タスク名からタスクのIDを返す。タスクが指定されていない場合は`None`を返す。
    pub async fn task_id(
        &self,
        workspace_id: &str,
        project_id: &str,
        name: Option<&str>,
    ) -> Result<Option<String>> {
        let Some(name) = name else {
            return Ok(None);
        };

        let tasks = self
            .repository
            .read_tasks(workspace_id, project_id)
            .await
            .with_context(|| format!("Failed to get task list of project {}", project_id))?;
        let matching: Vec<_> = tasks.iter().filter(|t| t.name == name).collect();

        Ok(Some(expect_single(&matching, "task", name)?.id.clone()))
    }

    /// タグ名の一覧からタグのIDを返す。
    ///
    /// IDはworkspaceのタグの並び順で返す。
    pub async fn tag_ids(&self, workspace_id: &str, names: &[String]) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(vec![]);
        }

        let tags = self
            .repository
            .read_tags(workspace_id)
            .await
            .context("Failed to get tag list from clockify")?;
        for name in names {
            let matching: Vec<_> = tags.iter().filter(|t| &t.name == name).collect();
            expect_single(&matching, "tag", name)?;
        }

        Ok(tags
            .iter()
            .filter(|tag| names.contains(&tag.name))
            .map(|tag| tag.id.clone())
            .collect())
    }

    /// 登録済みのtime entryのプロジェクト、タスク、タグのIDから名前を引く。
    ///
    /// # Arguments
    ///
    /// * `entry` - 名前を引くtime entry
    pub async fn entry_names(&self, entry: &ClockifyTimeEntry) -> Result<EntryNames> {
        let workspace_id = &entry.workspace_id;

        let project = match &entry.project_id {
            Some(project_id) => Some(self.project_name(workspace_id, project_id).await?),
            None => None,
        };
        let task = match (&entry.project_id, &entry.task_id) {
            (Some(project_id), Some(task_id)) => {
                Some(self.task_name(workspace_id, project_id, task_id).await?)
            }
            (None, Some(task_id)) => Some(task_id.clone()),
            (_, None) => None,
        };
        let tags = self.tag_names(workspace_id, &entry.tag_ids).await?;

        Ok(EntryNames {
            project,
            task,
            tags,
        })
    }

    async fn project_name(&self, workspace_id: &str, project_id: &str) -> Result<String> {
        let projects = self
            .repository
            .read_projects(workspace_id)
            .await
            .context("Failed to get project list from clockify")?;

        Ok(name_or_id(
            projects.iter().find(|p| p.id == project_id).map(|p| &p.name),
            project_id,
        ))
    }

    async fn task_name(&self, workspace_id: &str, project_id: &str, task_id: &str) -> Result<String> {
        let tasks = self
            .repository
            .read_tasks(workspace_id, project_id)
            .await
            .with_context(|| format!("Failed to get task list of project {}", project_id))?;

        Ok(name_or_id(
            tasks.iter().find(|t| t.id == task_id).map(|t| &t.name),
            task_id,
        ))
    }

    /// タグのIDをtime entryに登録されている順序のまま名前にする。
    async fn tag_names(&self, workspace_id: &str, tag_ids: &[String]) -> Result<Vec<String>> {
        if tag_ids.is_empty() {
            return Ok(vec![]);
        }

        let tags = self
            .repository
            .read_tags(workspace_id)
            .await
            .context("Failed to get tag list from clockify")?;

        Ok(tag_ids
            .iter()
            .map(|tag_id| {
                name_or_id(
                    tags.iter().find(|t| &t.id == tag_id).map(|t| &t.name),
                    tag_id,
                )
            })
            .collect())
    }
}

fn name_or_id(name: Option<&String>, id: &str) -> String {
    match name {
        Some(name) => name.clone(),
        None => {
            debug!("No name found for id {}", id);
            id.to_string()
        }
    }
}

fn expect_single<'a, T>(matching: &[&'a T], kind: &str, name: &str) -> Result<&'a T> {
    match matching {
        [single] => Ok(*single),
        _ => bail!(
            "One and only {} must match the name [{}], but {} found.",
            kind,
            name,
            matching.len()
        ),
    }
}
