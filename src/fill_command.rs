use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use log::{debug, info};

use crate::checker::{CheckOption, CheckReport, Checker};
use crate::clockify::ClockifyRepository;
use crate::diff::{ApplySummary, DayDiff, DiffComputer, EntryDiff, PeriodDiff};
use crate::generator::Generator;
use crate::period_file::PeriodFile;
use crate::resolver::{RemoteNames, Resolver};
use crate::settings::UserSettings;

/// `fill`サブコマンドの引数。
#[derive(Debug, clap::Args)]
pub struct FillArgs {
    #[clap(help = "Period file describing holidays and tasks", parse(from_os_str))]
    pub file: PathBuf,

    #[clap(
        long = "partial",
        help = "Report days below the working time as warnings instead of errors"
    )]
    pub partial: bool,

    #[clap(short = 'y', long = "yes", help = "Apply the changes without confirmation")]
    pub yes: bool,
}

/// 反映する前の差分と、その検査結果。
pub struct Plan {
    pub diff: PeriodDiff,
    pub report: CheckReport,
    /// 削除対象のtime entryのIDごとの名前。
    pub names: RemoteNames,
}

/// 期間の定義からtime entryを生成し、Clockifyとの差分を検査して反映する。
pub struct FillCommand<'a, T: ClockifyRepository> {
    clockify: &'a T,
    settings: &'a UserSettings,
}

impl<'a, T: ClockifyRepository> FillCommand<'a, T> {
    /// 新しい`FillCommand`を返す。
    ///
    /// # Arguments
    /// * `clockify` - Clockify APIと通信するためのリポジトリ
    /// * `settings` - ユーザーの設定
    pub fn new(clockify: &'a T, settings: &'a UserSettings) -> Self {
        Self { clockify, settings }
    }

    /// 期間の定義を読み込み、差分と検査結果を返す。Clockifyへの反映は行わない。
    ///
    /// # Arguments
    ///
    /// * `args` - `fill`サブコマンドの引数
    pub async fn plan(&self, args: &FillArgs) -> Result<Plan> {
        let period_file = PeriodFile::load(&args.file)?;

        let generated = Generator::new(self.clockify, self.settings)
            .generate(&period_file)
            .await
            .context("Failed to generate time entries")?;
        let diff = DiffComputer::new(self.clockify)
            .compute(generated)
            .await
            .context("Failed to compute the diff with clockify")?;
        let report = Checker::new(
            self.settings,
            CheckOption {
                partial: args.partial,
            },
        )
        .generate_report(&diff);
        let names = self
            .deleted_names(&diff)
            .await
            .context("Failed to get the names of the time entries to delete")?;

        Ok(Plan {
            diff,
            report,
            names,
        })
    }

    /// 削除対象のtime entryのプロジェクト、タスク、タグの名前を引く。
    async fn deleted_names(&self, diff: &PeriodDiff) -> Result<RemoteNames> {
        let resolver = Resolver::new(self.clockify);
        let mut names = RemoteNames::new();

        for entry in diff.days().flat_map(DayDiff::entries) {
            if let EntryDiff::Delete(remote) = entry {
                debug!("Looking up the names of time entry {}", remote.id);
                names.insert(remote.id.clone(), resolver.entry_names(remote).await?);
            }
        }

        Ok(names)
    }

    /// 差分をClockifyに反映する。検査でエラーが見つかっている場合は反映しない。
    pub async fn apply(&self, plan: &Plan) -> Result<ApplySummary> {
        if !plan.report.can_apply() {
            bail!(
                "Cannot apply the time entries, {} error(s) must be fixed first.",
                plan.report.errors.len()
            );
        }

        let summary = DiffComputer::new(self.clockify).apply(&plan.diff).await?;
        info!(
            "Applied: {} time entry(ies) added, {} deleted",
            summary.added, summary.deleted
        );

        Ok(summary)
    }
}

/// 反映してよいかを確認する。`y`または`yes`が入力された場合のみ`true`を返す。
pub fn confirm<R: BufRead, W: Write>(reader: &mut R, writer: &mut W) -> Result<bool> {
    write!(writer, "Apply the changes to clockify? [y/N] ").context("Failed to write prompt")?;
    writer.flush().context("Failed to flush prompt")?;

    let mut answer = String::new();
    reader
        .read_line(&mut answer)
        .context("Failed to read the answer")?;

    Ok(matches!(
        answer.trim().to_lowercase().as_str(),
        "y" | "yes"
    ))
}
