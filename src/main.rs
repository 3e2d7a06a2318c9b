use chrono::NaiveDate;
use tokio::sync::broadcast;
use uuid::Uuid;

use wick::auth;
use wick::config::AppConfig;
use wick::core::recurrence::{Pattern, Recurrence};
use wick::core::task::Priority;
use wick::import;
use wick::storage;
use wick::store::{ImportMode, NewTask, TaskStore};
use wick::sync::RemoteStore;
use wick::sync::github::GitHubStore;

const USAGE: &str = "\
Usage: wick [COMMAND]

Commands:
  list [DATE]                      tasks for a day (default: today)
  add TITLE [--date D] [--priority N] [--notes TEXT]
            [--every PATTERN] [--interval N] [--days mon,wed,...]
  done ID [DATE]                   toggle completion for a day
  delete ID                        remove a task
  next ID                          show a recurring task's next date
  import FILE [--replace]          import a Todoist JSON/CSV backup
  sync [--pull]                    push state to GitHub (or pull it)
  password NEW_PASSWORD            set the gate password

DATE is YYYY-MM-DD; PATTERN is daily|workweek|weekly|monthly|yearly.";

#[tokio::main]
async fn main() {
    // Log to the systemd user journal (`journalctl --user -t wick -f`);
    // silently skip when no journal is around.
    if let Ok(journal) = systemd_journal_logger::JournalLog::new() {
        let _ = journal.with_syslog_identifier("wick".to_string()).install();
    }

    let config = AppConfig::default();
    if let Err(e) = config.ensure_dirs() {
        eprintln!("Failed to create data directory: {}", e);
        return;
    }
    let state_path = config.state_path();

    let (events, _rx) = broadcast::channel(16);
    let mut store = TaskStore::from_persisted(storage::load(&state_path), events);

    wick::set_debug_logging(store.settings().debug_logging);
    log::set_max_level(if wick::debug_logging() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("list");

    let mutated = match command {
        "list" => {
            cmd_list(&store, args.get(1).map(String::as_str));
            false
        }
        "add" => cmd_add(&mut store, &args[1..]),
        "done" => cmd_done(&mut store, &args[1..]),
        "delete" => cmd_delete(&mut store, &args[1..]),
        "next" => {
            cmd_next(&store, &args[1..]);
            false
        }
        "import" => cmd_import(&mut store, &args[1..]),
        "sync" => cmd_sync(&mut store, &args[1..]).await,
        "password" => cmd_password(&mut store, &args[1..]),
        "--help" | "-h" | "help" => {
            println!("{}", USAGE);
            false
        }
        other => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            false
        }
    };

    if mutated {
        if let Err(e) = storage::save(&state_path, &store.to_persisted()) {
            eprintln!("Failed to save state: {}", e);
        }
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Value following a `--flag`, if present.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn parse_pattern(raw: &str) -> Option<Pattern> {
    match raw {
        "daily" => Some(Pattern::Daily),
        "workweek" => Some(Pattern::Workweek),
        "weekly" => Some(Pattern::Weekly),
        "monthly" => Some(Pattern::Monthly),
        "yearly" => Some(Pattern::Yearly),
        _ => None,
    }
}

fn parse_days(raw: &str) -> Vec<u8> {
    raw.split(',')
        .filter_map(|name| match name.trim().to_lowercase().get(..3)? {
            "sun" => Some(0),
            "mon" => Some(1),
            "tue" => Some(2),
            "wed" => Some(3),
            "thu" => Some(4),
            "fri" => Some(5),
            "sat" => Some(6),
            _ => None,
        })
        .collect()
}

/// Resolve a task by id prefix; complains on stdout when it can't.
fn resolve_id(store: &TaskStore, prefix: &str) -> Option<Uuid> {
    let matches: Vec<Uuid> = store
        .tasks()
        .iter()
        .filter(|t| t.id.to_string().starts_with(prefix))
        .map(|t| t.id)
        .collect();
    match matches.len() {
        0 => {
            println!("No task matches '{}'", prefix);
            None
        }
        1 => Some(matches[0]),
        n => {
            println!("'{}' is ambiguous ({} tasks match)", prefix, n);
            None
        }
    }
}

fn cmd_list(store: &TaskStore, date_arg: Option<&str>) {
    let date = date_arg.and_then(parse_date).unwrap_or_else(today);
    let entries = store.tasks_for_date(date);
    if entries.is_empty() {
        println!("No tasks for {}", date);
        return;
    }

    println!("Tasks for {}:", date);
    for entry in &entries {
        let mark = if entry.completed { "x" } else { " " };
        let short_id: String = entry.task.id.to_string().chars().take(8).collect();
        let mut line = format!("[{}] {} {}", mark, short_id, entry.task.title);
        if !entry.task.priority.is_none() {
            line.push_str(&format!(" (P{})", entry.task.priority.value()));
        }
        if let Some(rule) = &entry.task.recurrence {
            if rule.enabled {
                line.push_str(&format!(" | {}", rule.label()));
            }
        }
        println!("  {}", line);
        for sub in &entry.task.sub_items {
            let sub_mark = if sub.completed { "x" } else { " " };
            println!("      [{}] {}", sub_mark, sub.title);
        }
    }
}

fn cmd_add(store: &mut TaskStore, args: &[String]) -> bool {
    let Some(title) = args.first().filter(|t| !t.trim().is_empty()) else {
        println!("Usage: wick add TITLE [...]");
        return false;
    };

    let hints = store.suggest_similar(title);
    if !hints.is_empty() {
        println!("Similar existing tasks:");
        for (task, score) in &hints {
            println!("  {} ({:.0}% match)", task.title, score * 100.0);
        }
    }

    let recurrence = flag_value(args, "--every")
        .and_then(parse_pattern)
        .map(|pattern| {
            let mut rule = Recurrence::new(pattern);
            if let Some(n) = flag_value(args, "--interval").and_then(|v| v.parse().ok()) {
                rule.interval = n;
            }
            if let Some(days) = flag_value(args, "--days") {
                rule.days = parse_days(days);
            }
            rule
        });

    let new = NewTask {
        title: title.clone(),
        notes: flag_value(args, "--notes").unwrap_or("").to_string(),
        priority: flag_value(args, "--priority")
            .and_then(|v| v.parse::<u8>().ok())
            .map(Priority::new)
            .unwrap_or(Priority::NONE),
        date: flag_value(args, "--date").and_then(parse_date),
        recurrence,
    };
    let id = store.add_task(new);
    println!("Added {}", id);
    true
}

fn cmd_done(store: &mut TaskStore, args: &[String]) -> bool {
    let Some(prefix) = args.first() else {
        println!("Usage: wick done ID [DATE]");
        return false;
    };
    let Some(id) = resolve_id(store, prefix) else {
        return false;
    };
    let date = args.get(1).and_then(|s| parse_date(s)).unwrap_or_else(today);

    store.toggle_completion(id, date);
    let done = if store.get(id).is_some_and(|t| t.is_recurring()) {
        store.is_occurrence_completed(id, date)
    } else {
        store.get(id).is_some_and(|t| t.completed)
    };
    println!(
        "{} on {}: {}",
        if done { "Completed" } else { "Reopened" },
        date,
        store.get(id).map(|t| t.title.as_str()).unwrap_or("?")
    );
    if done {
        if let Some(next) = store.next_occurrence_after(id, date) {
            println!("Next occurrence: {}", next);
        }
    }
    true
}

fn cmd_delete(store: &mut TaskStore, args: &[String]) -> bool {
    let Some(prefix) = args.first() else {
        println!("Usage: wick delete ID");
        return false;
    };
    let Some(id) = resolve_id(store, prefix) else {
        return false;
    };
    let title = store.get(id).map(|t| t.title.clone()).unwrap_or_default();
    store.delete_task(id);
    println!("Deleted: {}", title);
    true
}

fn cmd_next(store: &TaskStore, args: &[String]) {
    let Some(prefix) = args.first() else {
        println!("Usage: wick next ID");
        return;
    };
    let Some(id) = resolve_id(store, prefix) else {
        return;
    };
    match store.next_occurrence_after(id, today()) {
        Some(next) => println!("Next occurrence: {}", next),
        None => println!("Task does not repeat"),
    }
}

fn cmd_import(store: &mut TaskStore, args: &[String]) -> bool {
    let Some(path) = args.first() else {
        println!("Usage: wick import FILE [--replace]");
        return false;
    };
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            return false;
        }
    };
    let mode = if args.iter().any(|a| a == "--replace") {
        ImportMode::Replace
    } else {
        ImportMode::Merge
    };

    match import::parse_export(path, &content, today()) {
        Ok(items) => {
            let count = items.len();
            store.import_tasks(items, mode);
            println!(
                "Imported {} tasks ({})",
                count,
                if mode == ImportMode::Replace {
                    "replace"
                } else {
                    "merge"
                }
            );
            true
        }
        Err(e) => {
            eprintln!("Import failed: {}", e);
            false
        }
    }
}

async fn cmd_sync(store: &mut TaskStore, args: &[String]) -> bool {
    let settings = store.settings();
    let (Some(token), Some(repo)) = (
        settings.github_token.clone(),
        settings.github_repo.clone(),
    ) else {
        println!("GitHub sync is not configured (githubToken/githubRepo in settings).");
        return false;
    };

    let mut remote = match GitHubStore::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Sync setup failed: {}", e);
            return false;
        }
    };
    remote.configure(&token, &repo);

    if args.iter().any(|a| a == "--pull") {
        match remote.load().await {
            Ok(Some(state)) => {
                println!("Pulled {} tasks from {}", state.tasks.len(), repo);
                store.load_data(state);
                true
            }
            Ok(None) => {
                println!("No remote state yet.");
                false
            }
            Err(e) => {
                eprintln!("Pull failed: {}", e);
                false
            }
        }
    } else {
        // Pushing: fetch the current file sha first so the PUT updates in
        // place; a missing file is fine.
        if let Err(e) = remote.load().await {
            log::warn!("Pre-save load failed: {}", e);
        }
        match remote.save(&store.export_data()).await {
            Ok(()) => {
                println!("Synced {} tasks to {}", store.tasks().len(), repo);
                false
            }
            Err(e) => {
                eprintln!("Sync failed: {}", e);
                false
            }
        }
    }
}

fn cmd_password(store: &mut TaskStore, args: &[String]) -> bool {
    let Some(password) = args.first() else {
        println!("Usage: wick password NEW_PASSWORD");
        return false;
    };
    let mut result = Ok(());
    store.update_settings(|settings| {
        result = auth::set_password(settings, password);
    });
    match result {
        Ok(()) => {
            println!("Password updated.");
            true
        }
        Err(e) => {
            println!("{}", e);
            false
        }
    }
}
