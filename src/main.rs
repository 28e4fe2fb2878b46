use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::{info, LevelFilter};

mod checker;
mod clockify;
mod console;
mod datetime;
mod diff;
mod fill_command;
#[cfg(test)]
mod fixtures;
mod generator;
mod interval;
mod list_command;
mod period_file;
mod resolver;
mod settings;
mod time_entry;

use clockify::ClockifyClient;
use console::{ConsolePresenter, ConsoleReport};
use fill_command::{confirm, FillArgs, FillCommand};
use list_command::{ListCommand, NameFilterArgs, TasksArgs, TimeEntriesArgs};
use settings::UserSettings;

/// 期間の定義からClockifyのtime entryを作成するためのCLIアプリケーション。
///
/// # Examples
/// ```
/// $ cargo run -- fill period.json
/// $ cargo run -- projects --name Holi
/// ```
#[derive(Debug, Parser)]
#[clap(version, about)]
struct Args {
    #[clap(
        short = 'v',
        long = "verbose",
        global = true,
        help = "Shows debug logs and prints the listed items as JSON"
    )]
    verbose: bool,

    #[clap(
        short = 'c',
        long = "config",
        global = true,
        help = "Path of the user settings, defaults to ~/.clockify.cfg",
        parse(from_os_str)
    )]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: SubCommands,
}

/// サブコマンドを表す列挙型。
#[derive(Debug, Subcommand)]
enum SubCommands {
    /// Generates the time entries of a period and applies them to clockify
    Fill(FillArgs),
    /// Shows the current user
    User,
    /// Lists the workspaces
    Workspaces,
    /// Lists the projects of a workspace
    Projects(NameFilterArgs),
    /// Lists the tags of a workspace
    Tags(NameFilterArgs),
    /// Lists the tasks of a project
    Tasks(TasksArgs),
    /// Lists the time entries between two days
    TimeEntries(TimeEntriesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logger(args.verbose)?;

    let settings = UserSettings::load(args.config.as_deref())?;
    let clockify = ClockifyClient::new(&settings.token);
    let mut stdout = io::stdout();
    let mut presenter = ConsoleReport::new(&mut stdout, &settings).with_json(args.verbose);

    match args.subcommand {
        SubCommands::Fill(fill) => {
            let command = FillCommand::new(&clockify, &settings);
            let plan = command.plan(&fill).await?;
            presenter.show_plan(&plan.diff, &plan.report, &plan.names)?;

            if !plan.report.can_apply() {
                bail!(
                    "The time entries cannot be applied, {} error(s) found.",
                    plan.report.errors.len()
                );
            }
            if plan.diff.is_up_to_date() {
                info!("Nothing to apply, clockify is up to date.");
                return Ok(());
            }
            if !fill.yes && !confirm(&mut io::stdin().lock(), &mut io::stderr())? {
                info!("Changes were not applied.");
                return Ok(());
            }

            command.apply(&plan).await?;
        }
        SubCommands::User => {
            let items = ListCommand::new(&clockify).user().await?;
            presenter.show_items(&items)?;
        }
        SubCommands::Workspaces => {
            let items = ListCommand::new(&clockify).workspaces().await?;
            presenter.show_items(&items)?;
        }
        SubCommands::Projects(filter) => {
            let items = ListCommand::new(&clockify).projects(&filter).await?;
            presenter.show_items(&items)?;
        }
        SubCommands::Tags(filter) => {
            let items = ListCommand::new(&clockify).tags(&filter).await?;
            presenter.show_items(&items)?;
        }
        SubCommands::Tasks(tasks) => {
            let items = ListCommand::new(&clockify).tasks(&tasks).await?;
            presenter.show_items(&items)?;
        }
        SubCommands::TimeEntries(time_entries) => {
            let items = ListCommand::new(&clockify)
                .time_entries(&time_entries)
                .await?;
            presenter.show_items(&items)?;
        }
    }

    Ok(())
}

/// ログを標準エラー出力に出す。標準出力はレポートのために空けておく。
fn setup_logger(verbose: bool) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue);
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}: {}",
                Local::now().format("%H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for(env!("CARGO_CRATE_NAME"), level)
        .chain(io::stderr())
        .apply()
        .context("Failed to setup logger")?;

    Ok(())
}
