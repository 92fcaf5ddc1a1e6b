pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    add_task_impl, check_new_week_impl, clear_tasks_impl, delete_task_impl,
    generate_summary_impl, list_summaries_impl, list_tasks_impl, productivity_stats_impl,
    run_backfill_impl, search_summaries_impl, set_api_key_impl, update_task_impl, AppState,
    NewTask, TaskMutationResponse, TaskPatch,
};
use application::weekly_summaries::{BackfillReport, ManualSummaryOutcome};
use cli::{Cli, Command};
use domain::models::Task;
use infrastructure::credential_store::KeyringApiKeyStore;
use infrastructure::error::InfraError;
use infrastructure::logging::init_tracing;
use serde::Serialize;

pub async fn run(cli: Cli) -> Result<(), String> {
    let workspace_root = match cli.root {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    if let Err(error) = init_tracing(&workspace_root.join("logs")) {
        eprintln!("warning: {error}");
    }

    if let Command::SetApiKey(args) = &cli.command {
        return set_api_key_impl(&KeyringApiKeyStore::default(), &args.api_key)
            .map(|()| println!("API key stored."))
            .map_err(|error| error.to_string());
    }

    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;
    dispatch(&state, cli.command, cli.json).await
}

async fn dispatch(state: &AppState, command: Command, json: bool) -> Result<(), String> {
    match command {
        Command::Add(args) => {
            let input = NewTask {
                name: args.name,
                time_spent: args.minutes,
                focus: args.focus,
                date: args.date,
            };
            let response = add_task_impl(state, input)
                .await
                .map_err(|error| state.command_error("add_task", &error))?;
            emit(json, &response, render_mutation)
        }
        Command::Edit(args) => {
            let index = list_position(args.index).map_err(|error| state.command_error("update_task", &error))?;
            let patch = TaskPatch {
                name: args.name,
                time_spent: args.minutes,
                focus: args.focus,
                date: args.date,
            };
            let response = update_task_impl(state, index, patch)
                .await
                .map_err(|error| state.command_error("update_task", &error))?;
            emit(json, &response, render_mutation)
        }
        Command::Delete(args) => {
            let index = list_position(args.index).map_err(|error| state.command_error("delete_task", &error))?;
            let response = delete_task_impl(state, index)
                .await
                .map_err(|error| state.command_error("delete_task", &error))?;
            emit(json, &response, render_mutation)
        }
        Command::Clear => {
            let response = clear_tasks_impl(state)
                .await
                .map_err(|error| state.command_error("clear_tasks", &error))?;
            emit(json, &response, render_mutation)
        }
        Command::List => {
            let tasks = list_tasks_impl(state).map_err(|error| state.command_error("list_tasks", &error))?;
            emit(json, &tasks, |tasks| render_tasks(tasks))
        }
        Command::Backfill => {
            let report = run_backfill_impl(state)
                .await
                .map_err(|error| state.command_error("run_backfill", &error))?;
            emit(json, &report, render_backfill)
        }
        Command::Summarize(args) => {
            let outcome = generate_summary_impl(state, args.date)
                .await
                .map_err(|error| state.command_error("generate_summary", &error))?;
            emit(json, &outcome, render_manual_summary)
        }
        Command::History => {
            let history =
                list_summaries_impl(state).map_err(|error| state.command_error("list_summaries", &error))?;
            emit(json, &history, |history| {
                if history.is_empty() {
                    return "No weekly summaries yet.".to_string();
                }
                history
                    .iter()
                    .map(|entry| format!("{}\n  {}", entry.label, entry.summary))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
        }
        Command::Search(args) => {
            let hits = search_summaries_impl(state, args.query)
                .await
                .map_err(|error| state.command_error("search_summaries", &error))?;
            emit(json, &hits, |hits| {
                if hits.is_empty() {
                    return "No matching summaries.".to_string();
                }
                hits.iter()
                    .map(|hit| format!("{:.2}  {}\n  {}", hit.similarity, hit.label, hit.summary))
                    .collect::<Vec<_>>()
                    .join("\n\n")
            })
        }
        Command::Stats => {
            let stats = productivity_stats_impl(state)
                .map_err(|error| state.command_error("productivity_stats", &error))?;
            emit(json, &stats, |stats| {
                let mut lines = vec![format!("Total: {} min", stats.total_minutes), "By task:".to_string()];
                lines.extend(stats.by_task.iter().map(|row| {
                    format!(
                        "  {}: low {} / medium {} / high {}",
                        row.name, row.minutes.low, row.minutes.medium, row.minutes.high
                    )
                }));
                lines.push("By day:".to_string());
                lines.extend(
                    stats
                        .daily
                        .iter()
                        .map(|day| format!("  {}: {} min", day.date, day.total)),
                );
                lines.join("\n")
            })
        }
        Command::NewWeek => {
            let response =
                check_new_week_impl(state).map_err(|error| state.command_error("check_new_week", &error))?;
            emit(json, &response, |response| {
                let status = if response.is_new_week { "yes" } else { "no" };
                format!("New week: {status} (current: {})", response.current_week)
            })
        }
        Command::SetApiKey(_) => Ok(()),
    }
}

fn list_position(position: usize) -> Result<usize, InfraError> {
    position
        .checked_sub(1)
        .ok_or_else(|| InfraError::Validation("task positions start at 1".to_string()))
}

fn emit<T, F>(json: bool, value: &T, render: F) -> Result<(), String>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    if json {
        let payload = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
        println!("{payload}");
    } else {
        println!("{}", render(value));
    }
    Ok(())
}

fn render_tasks(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks logged.".to_string();
    }
    tasks
        .iter()
        .enumerate()
        .map(|(index, task)| {
            format!(
                "{:>3}. {} ({} min, {}) {}",
                index + 1,
                task.name,
                task.time_spent,
                task.focus,
                task.date
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_mutation(response: &TaskMutationResponse) -> String {
    let mut text = render_tasks(&response.tasks);
    let regeneration = &response.regeneration;
    if !regeneration.generated.is_empty() || !regeneration.failed.is_empty() {
        text.push_str(&format!(
            "\nRegenerated {} weekly summaries ({} failed).",
            regeneration.generated.len(),
            regeneration.failed.len()
        ));
    }
    text
}

fn render_backfill(report: &BackfillReport) -> String {
    let mut lines = Vec::new();
    match &report.notification {
        Some(notification) => {
            lines.push(format!("New weekly summary for {}:", notification.label));
            lines.push(
                notification
                    .summary
                    .clone()
                    .unwrap_or_else(|| "(no tasks logged that week)".to_string()),
            );
        }
        None => lines.push("No completed weeks need a summary.".to_string()),
    }
    for failure in &report.failed {
        lines.push(format!("Failed {}: {}", failure.label, failure.message));
    }
    lines.join("\n")
}

fn render_manual_summary(outcome: &ManualSummaryOutcome) -> String {
    match outcome {
        ManualSummaryOutcome::NoTasks { label } => format!("No tasks logged for {label}."),
        ManualSummaryOutcome::AlreadyExists { label, summary } => {
            format!("Summary for {label} already exists:\n{summary}")
        }
        ManualSummaryOutcome::Generated { summary, .. } => {
            format!("Weekly summary for {}:\n{}", summary.label, summary.summary)
        }
    }
}
