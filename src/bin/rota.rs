//! rota CLI: operator interface to the task assignment engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use rota_rs::config::secrets::ExposeSecret;
use rota_rs::config::{Config, Settings};
use rota_rs::db::Db;
use rota_rs::engine::{AssignRequest, AssignmentEngine, AutoAssignOutcome, RecurrenceScheduler};
use rota_rs::event::TracingDispatcher;
use rota_rs::model::*;
use rota_rs::recurrence::upcoming_runs;
use rota_rs::store::TaskStore;
use rota_rs::telemetry::{TelemetryConfig, init_telemetry};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "rota", about = "Restaurant task assignment and scheduling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the recurrence scheduler daemon
    Serve,
    /// Preview upcoming occurrences of a pattern (no database needed)
    NextRun {
        #[command(flatten)]
        pattern: PatternArgs,
        /// Reference instant (RFC 3339); defaults to now
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        /// Number of occurrences to show
        #[arg(long, default_value_t = 5)]
        count: usize,
    },
    /// Task operations
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },
    /// Recurring schedule operations
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },
    /// Create many tasks from a JSON file: {"items": [...], "defaults": {...}}
    Bulk {
        file: PathBuf,
        /// Staff member performing the operation
        #[arg(long)]
        actor: StaffId,
    },
    /// Load roster and template data from JSON files
    Import {
        #[command(subcommand)]
        what: ImportAction,
    },
}

#[derive(Subcommand)]
enum TaskAction {
    /// Show a task and its assignment history
    Show { id: TaskId },
    /// List a restaurant's tasks, newest first
    List {
        #[arg(long)]
        restaurant: RestaurantId,
        /// Filter by status
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Bind a specific staff member
    Assign {
        task: TaskId,
        staff: StaffId,
        #[arg(long)]
        actor: StaffId,
        #[arg(long)]
        note: Option<String>,
    },
    /// Rank candidates and bind the best one
    AutoAssign {
        task: TaskId,
        #[arg(long)]
        actor: StaffId,
        /// Ranked candidates to report (defaults to the configured cap)
        #[arg(long)]
        max: Option<usize>,
    },
    /// Rank candidates without binding anyone
    Rank {
        task: TaskId,
        #[arg(long)]
        max: Option<usize>,
    },
    /// Assigned → in progress
    Start { id: TaskId },
    /// In progress → completed
    Complete { id: TaskId },
    /// In progress → failed
    Fail {
        id: TaskId,
        #[arg(long)]
        reason: String,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Create a recurring schedule for a template
    Create {
        #[arg(long)]
        template: TemplateId,
        #[arg(long)]
        restaurant: RestaurantId,
        #[arg(long)]
        actor: StaffId,
        #[command(flatten)]
        pattern: PatternArgs,
        /// Stop firing after this instant (RFC 3339)
        #[arg(long)]
        end_date: Option<DateTime<Utc>>,
        /// Stop firing after this many successful runs
        #[arg(long)]
        max_runs: Option<u32>,
    },
    /// Show a schedule
    Show { id: ScheduleId },
    /// Stop a schedule from firing
    Disable { id: ScheduleId },
    /// Fire every due schedule once and exit
    Sweep,
}

#[derive(Subcommand)]
enum ImportAction {
    /// JSON array of staff members
    Staff { file: PathBuf },
    /// JSON array of task templates
    Templates { file: PathBuf },
}

#[derive(Args)]
struct PatternArgs {
    /// daily, weekly, monthly, or yearly
    #[arg(long = "type")]
    kind: RecurrenceType,
    #[arg(long, default_value_t = 1)]
    interval: u32,
    /// Weekday indices for weekly patterns, 0 = Sunday (e.g. 1,3,5)
    #[arg(long, value_delimiter = ',')]
    weekdays: Vec<u8>,
    #[arg(long)]
    day_of_month: Option<u32>,
    #[arg(long)]
    month_of_year: Option<u32>,
    #[arg(long, default_value_t = 9)]
    hour: u32,
    #[arg(long, default_value_t = 0)]
    minute: u32,
    /// IANA timezone name
    #[arg(long, default_value = "UTC")]
    timezone: String,
}

impl PatternArgs {
    fn into_pattern(self) -> RecurrencePattern {
        RecurrencePattern {
            kind: self.kind,
            interval: self.interval,
            weekdays: self.weekdays.into_iter().collect(),
            day_of_month: self.day_of_month,
            month_of_year: self.month_of_year,
            hour: self.hour,
            minute: self.minute,
            timezone: self.timezone,
        }
    }
}

#[derive(Deserialize)]
struct BulkFile {
    items: Vec<NewTask>,
    #[serde(default)]
    defaults: Option<TaskDefaults>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::NextRun {
            pattern,
            from,
            count,
        } => cmd_next_run(pattern.into_pattern(), from.unwrap_or_else(Utc::now), count),
        command => {
            let config = Config::from_env()?;
            let settings = config.settings()?;
            let db = Db::connect(config.database_url.expose_secret()).await?;
            db.migrate().await?;
            let db = Arc::new(db);

            match command {
                Command::Task { action } => cmd_task(engine(&db, settings), action).await,
                Command::Schedule { action } => cmd_schedule(&db, &settings, action).await,
                Command::Bulk { file, actor } => {
                    cmd_bulk(engine(&db, settings), &file, actor).await
                }
                Command::Import { what } => cmd_import(&db, what).await,
                Command::Serve | Command::NextRun { .. } => Ok(()),
            }
        }
    }
}

fn engine(db: &Arc<Db>, settings: Settings) -> AssignmentEngine {
    AssignmentEngine::new(db.clone(), Arc::new(TracingDispatcher), settings)
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "rota".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let settings = config.settings()?;
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    db.health_check().await?;

    let scheduler = RecurrenceScheduler::new(Arc::new(db), &settings.scheduler);

    let sched = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        sched.shutdown();
    });

    scheduler.run().await?;
    Ok(())
}

fn cmd_next_run(
    pattern: RecurrencePattern,
    from: DateTime<Utc>,
    count: usize,
) -> anyhow::Result<()> {
    let tz: chrono_tz::Tz = pattern.validate()?;
    for (i, at) in upcoming_runs(&pattern, from, count)?.iter().enumerate() {
        println!(
            "{:>3}  {}  ({})",
            i + 1,
            at.to_rfc3339(),
            at.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z")
        );
    }
    Ok(())
}

async fn cmd_task(engine: AssignmentEngine, action: TaskAction) -> anyhow::Result<()> {
    match action {
        TaskAction::Show { id } => {
            let task = engine.store().get_task(id).await?;
            print_task(&task);
            let history = engine.assignment_history(id).await?;
            if !history.is_empty() {
                println!("---");
                for a in &history {
                    println!(
                        "{}  {:<9}  staff {}  by {}  score {}  {}",
                        a.assigned_at.format("%Y-%m-%d %H:%M"),
                        a.method,
                        a.staff_id,
                        a.assigned_by,
                        a.score.map(|s| format!("{s:.2}")).unwrap_or("-".to_string()),
                        a.note.as_deref().unwrap_or("")
                    );
                }
            }
        }
        TaskAction::List {
            restaurant,
            status,
            limit,
        } => {
            let tasks = engine.store().list_tasks(restaurant, status, limit).await?;
            if tasks.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }

            println!(
                "{:<8}  {:<11}  {:<8}  {:<8}  {:<30}  SCHEDULED",
                "ID", "STATUS", "PRIORITY", "ASSIGNEE", "TITLE"
            );
            println!("{}", "-".repeat(100));
            for t in &tasks {
                let title: String = t.title.chars().take(30).collect();
                println!(
                    "{:<8}  {:<11}  {:<8}  {:<8}  {:<30}  {}",
                    t.id,
                    t.status,
                    t.priority,
                    t.assignee_id.map(|s| s.to_string()).unwrap_or("-".to_string()),
                    title,
                    t.scheduled_for
                        .map(|s| s.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or("-".to_string())
                );
            }
            println!("\n{} task(s)", tasks.len());
        }
        TaskAction::Assign {
            task,
            staff,
            actor,
            note,
        } => {
            let outcome = engine
                .assign_task(AssignRequest {
                    task_id: task,
                    staff_id: staff,
                    note,
                    actor,
                })
                .await?;
            println!("Assigned: {} → {}", outcome.task.id, outcome.assignment.staff_id);
        }
        TaskAction::AutoAssign { task, actor, max } => {
            let max = max.unwrap_or(engine.settings().assignment.max_candidates);
            let outcome = engine.auto_assign_task(task, max, actor).await?;
            print_ranked(outcome.ranked());
            match outcome {
                AutoAssignOutcome::Assigned {
                    assigned_staff_id,
                    score,
                    confidence,
                    ..
                } => println!(
                    "\nAssigned: {task} → {assigned_staff_id} (score {score:.2}, {confidence} confidence)"
                ),
                AutoAssignOutcome::NoCandidatesFound { .. } => {
                    println!("\nNo eligible candidates; task left pending.")
                }
            }
        }
        TaskAction::Rank { task, max } => {
            let max = max.unwrap_or(engine.settings().assignment.max_candidates);
            print_ranked(&engine.rank_candidates(task, max).await?);
        }
        TaskAction::Start { id } => {
            let task = engine.start_task(id).await?;
            println!("{}: {}", task.id, task.status);
        }
        TaskAction::Complete { id } => {
            let task = engine.complete_task(id).await?;
            println!("{}: {}", task.id, task.status);
        }
        TaskAction::Fail { id, reason } => {
            let task = engine.fail_task(id, &reason).await?;
            println!("{}: {}", task.id, task.status);
        }
    }
    Ok(())
}

async fn cmd_schedule(
    db: &Arc<Db>,
    settings: &Settings,
    action: ScheduleAction,
) -> anyhow::Result<()> {
    let scheduler = RecurrenceScheduler::new(db.clone(), &settings.scheduler);

    match action {
        ScheduleAction::Create {
            template,
            restaurant,
            actor,
            pattern,
            end_date,
            max_runs,
        } => {
            let schedule = scheduler
                .create_recurrence(
                    NewRecurrence {
                        template_id: template,
                        restaurant_id: restaurant,
                        pattern: pattern.into_pattern(),
                        end_date,
                        max_runs,
                        created_by: actor,
                    },
                    Utc::now(),
                )
                .await?;
            println!("Created: {} (next run {})", schedule.id.0, schedule.next_run_at);
        }
        ScheduleAction::Show { id } => {
            let s = db.get_schedule(id).await?;
            println!("ID:         {}", s.id.0);
            println!("Template:   {}", s.template_id.0);
            println!("Pattern:    {}", serde_json::to_string(&s.pattern)?);
            println!("Active:     {}", s.is_active);
            println!("Next Run:   {}", s.next_run_at);
            println!(
                "Runs:       {} ok, {} failed{}",
                s.total_runs,
                s.failed_runs,
                s.max_runs.map(|m| format!(" (max {m})")).unwrap_or_default()
            );
            if let Some(end) = s.end_date {
                println!("Ends:       {end}");
            }
            if let Some(last) = s.last_run_at {
                println!("Last Run:   {last}");
            }
        }
        ScheduleAction::Disable { id } => {
            scheduler.disable_schedule(id).await?;
            println!("Disabled: {}", id.0);
        }
        ScheduleAction::Sweep => {
            let report = scheduler.fire_due_schedules(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

async fn cmd_bulk(engine: AssignmentEngine, file: &Path, actor: StaffId) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let request: BulkFile = serde_json::from_str(&content)?;

    let cancel = CancellationToken::new();
    let ctrl = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl.cancel();
    });

    let outcome = engine
        .bulk_schedule(request.items, request.defaults, actor, &cancel)
        .await?;

    for ok in &outcome.successful {
        println!("  ok    #{:<3} {}  {}", ok.index, ok.task.id, ok.task.title);
    }
    for failed in &outcome.failed {
        println!(
            "  fail  #{:<3} {}  {}",
            failed.index,
            failed.title.as_deref().unwrap_or("-"),
            failed.error
        );
    }
    println!(
        "\n{} of {} created, {} failed{}",
        outcome.successful_count,
        outcome.total_requested,
        outcome.failed_count,
        if outcome.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

async fn cmd_import(db: &Db, what: ImportAction) -> anyhow::Result<()> {
    match what {
        ImportAction::Staff { file } => {
            let members: Vec<StaffMember> = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            for m in &members {
                db.upsert_staff(m).await?;
            }
            println!("Imported {} staff member(s)", members.len());
        }
        ImportAction::Templates { file } => {
            let templates: Vec<TaskTemplate> =
                serde_json::from_str(&std::fs::read_to_string(file)?)?;
            for t in &templates {
                db.upsert_template(t).await?;
            }
            println!("Imported {} template(s)", templates.len());
        }
    }
    Ok(())
}

fn print_task(task: &Task) {
    println!("ID:         {}", task.id.0);
    println!("Title:      {}", task.title);
    if let Some(ref alt) = task.title_secondary {
        println!("Title (2):  {alt}");
    }
    println!("Type:       {}", task.task_type);
    println!("Status:     {}", task.status);
    println!("Priority:   {}", task.priority);
    println!("Role:       {}", task.required_role);
    if !task.required_skills.is_empty() {
        let skills: Vec<&str> = task.required_skills.iter().map(String::as_str).collect();
        println!("Skills:     {}", skills.join(", "));
    }
    println!("Location:   {}", task.location.as_deref().unwrap_or("-"));
    if let Some(at) = task.scheduled_for {
        println!("Scheduled:  {at}");
    }
    if let Some(at) = task.due_at {
        println!("Due:        {at}");
    }
    println!("Estimate:   {}m", task.estimated_minutes);
    if let Some(staff) = task.assignee_id {
        println!("Assignee:   {}", staff.0);
    }
    if let Some(schedule) = task.recurrence_id {
        println!("Recurrence: {}", schedule.0);
    }
    println!("Created:    {}", task.created_at);
    println!("Updated:    {}", task.updated_at);
    if let Some(done) = task.completed_at {
        println!("Finished:   {done}");
    }
}

fn print_ranked(ranked: &[rota_rs::scoring::RankedCandidate]) {
    if ranked.is_empty() {
        println!("No eligible candidates.");
        return;
    }
    println!(
        "{:<4}  {:<8}  {:<20}  {:>6}  {:>5}  {:>5}  {:>5}  {:>5}  LOAD",
        "#", "STAFF", "NAME", "SCORE", "SKILL", "AVAIL", "WORK", "LOC"
    );
    for (i, c) in ranked.iter().enumerate() {
        let name: String = c.name.chars().take(20).collect();
        println!(
            "{:<4}  {:<8}  {:<20}  {:>6.2}  {:>5.0}  {:>5.0}  {:>5.0}  {:>5.0}  {}",
            i + 1,
            c.staff_id,
            name,
            c.score,
            c.subscores.skill,
            c.subscores.availability,
            c.subscores.workload,
            c.subscores.location,
            c.workload
        );
    }
}
