use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use log::info;

use crate::clockify::{
    ClockifyProject, ClockifyRepository, ClockifyTag, ClockifyTask, ClockifyUser,
    ClockifyWorkspace,
};
use crate::datetime::{local_to_utc, parse_user_date};
use crate::resolver::Resolver;
use crate::time_entry::ClockifyTimeEntry;

/// 一覧を取得するworkspaceを指定するための引数。
#[derive(Debug, Default, clap::Args)]
pub struct WorkspaceArgs {
    #[clap(
        short = 'w',
        long = "workspace",
        help = "ID of the workspace, defaults to the workspace of the user"
    )]
    pub workspace: Option<String>,
}

/// 名前で絞り込むための引数。
#[derive(Debug, Default, clap::Args)]
pub struct NameFilterArgs {
    #[clap(flatten)]
    pub workspace: WorkspaceArgs,

    #[clap(short = 'n', long = "name", help = "Only shows items whose name contains the text")]
    pub name: Option<String>,
}

impl NameFilterArgs {
    fn accepts(&self, name: &str) -> bool {
        self.name
            .as_deref()
            .map_or(true, |filter| name.contains(filter))
    }
}

/// `tasks`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct TasksArgs {
    #[clap(help = "Name of the project")]
    pub project: String,

    #[clap(flatten)]
    pub filter: NameFilterArgs,
}

/// `time-entries`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct TimeEntriesArgs {
    #[clap(flatten)]
    pub workspace: WorkspaceArgs,

    #[clap(
        short = 's',
        long = "start",
        help = "First day in the format YYYY-MM-DD",
        parse(try_from_str = parse_user_date),
    )]
    pub start: NaiveDate,

    #[clap(
        short = 'e',
        long = "end",
        help = "Last day in the format YYYY-MM-DD",
        parse(try_from_str = parse_user_date),
    )]
    pub end: NaiveDate,
}

/// Clockifyに登録されている情報の一覧を返す。
///
/// workspaceを指定する一覧は、指定がなければユーザーのデフォルトのworkspaceを利用する。
pub struct ListCommand<'a, T: ClockifyRepository> {
    clockify: &'a T,
}

impl<'a, T: ClockifyRepository> ListCommand<'a, T> {
    pub fn new(clockify: &'a T) -> Self {
        Self { clockify }
    }

    pub async fn user(&self) -> Result<Vec<ClockifyUser>> {
        let user = Resolver::new(self.clockify).user().await?;

        Ok(vec![user])
    }

    pub async fn workspaces(&self) -> Result<Vec<ClockifyWorkspace>> {
        self.clockify
            .read_workspaces()
            .await
            .context("Failed to get workspace list from clockify")
    }

    pub async fn projects(&self, filter: &NameFilterArgs) -> Result<Vec<ClockifyProject>> {
        let workspace_id = self.workspace_id(&filter.workspace).await?;
        let projects = self
            .clockify
            .read_projects(&workspace_id)
            .await
            .context("Failed to get project list from clockify")?;

        Ok(projects
            .into_iter()
            .filter(|p| filter.accepts(&p.name))
            .collect())
    }

    pub async fn tags(&self, filter: &NameFilterArgs) -> Result<Vec<ClockifyTag>> {
        let workspace_id = self.workspace_id(&filter.workspace).await?;
        let tags = self
            .clockify
            .read_tags(&workspace_id)
            .await
            .context("Failed to get tag list from clockify")?;

        Ok(tags
            .into_iter()
            .filter(|t| filter.accepts(&t.name))
            .collect())
    }

    /// プロジェクト名で指定したプロジェクトのタスクを返す。
    pub async fn tasks(&self, args: &TasksArgs) -> Result<Vec<ClockifyTask>> {
        let workspace_id = self.workspace_id(&args.filter.workspace).await?;
        let project_id = Resolver::new(self.clockify)
            .project_id(&workspace_id, &args.project)
            .await?;
        let tasks = self
            .clockify
            .read_tasks(&workspace_id, &project_id)
            .await
            .with_context(|| format!("Failed to get task list of project {}", args.project))?;

        Ok(tasks
            .into_iter()
            .filter(|t| args.filter.accepts(&t.name))
            .collect())
    }

    /// 指定された日の00:00:00から最後の日の23:59:59までのtime entryを返す。
    pub async fn time_entries(&self, args: &TimeEntriesArgs) -> Result<Vec<ClockifyTimeEntry>> {
        let user = Resolver::new(self.clockify).user().await?;
        let workspace_id = args
            .workspace
            .workspace
            .clone()
            .unwrap_or_else(|| user.default_workspace.clone());
        let start = local_to_utc(&args.start.and_time(NaiveTime::MIN))?;
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).context("Invalid end of day")?;
        let end = local_to_utc(&args.end.and_time(end_of_day))?;
        info!("Start at: {}, End at: {}", start, end);

        self.clockify
            .read_time_entries(&workspace_id, &user.id, &start, &end)
            .await
            .context("Failed to retrieve time entries")
    }

    /// 指定されたworkspace、またはユーザーのデフォルトのworkspaceを返す。
    async fn workspace_id(&self, args: &WorkspaceArgs) -> Result<String> {
        match &args.workspace {
            Some(workspace_id) => Ok(workspace_id.clone()),
            None => Ok(Resolver::new(self.clockify).user().await?.default_workspace),
        }
    }
}
