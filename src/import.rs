use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::core::task::{Priority, Task};

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").unwrap());

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid JSON export: {0}")]
    Json(#[from] serde_json::Error),
    #[error("JSON export does not contain a task list")]
    NotATaskList,
}

/// Parse a Todoist export into task records, dispatching on the file
/// extension. `today` is the fallback for missing or unparseable dates.
pub fn parse_export(
    filename: &str,
    content: &str,
    today: NaiveDate,
) -> Result<Vec<Task>, ImportError> {
    if filename.ends_with(".json") {
        parse_json(content, today)
    } else if filename.ends_with(".csv") {
        Ok(parse_csv(content, today))
    } else {
        Err(ImportError::UnsupportedFormat(filename.to_string()))
    }
}

/// External 4-level priority scale to ours: external 1 is their highest and
/// maps to 5, external 4 is their default and maps to "none".
fn map_external_priority(raw: Option<i64>) -> Priority {
    match raw {
        Some(1) => Priority::new(5),
        Some(2) => Priority::new(4),
        Some(3) => Priority::new(2),
        _ => Priority::NONE,
    }
}

/// Pull a `YYYY-MM-DD` date out of whatever string the export carries
/// (bare dates, RFC 3339 stamps, quoted CSV cells); anything else is
/// `today`.
fn parse_date_or(raw: Option<&str>, today: NaiveDate) -> NaiveDate {
    let Some(raw) = raw else {
        return today;
    };
    let cleaned = raw.trim().trim_matches('"');
    DATE_RE
        .find(cleaned)
        .and_then(|m| NaiveDate::parse_from_str(m.as_str(), "%Y-%m-%d").ok())
        .unwrap_or(today)
}

fn str_field<'a>(item: &'a Value, keys: &[&str]) -> &'a str {
    keys.iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .unwrap_or("")
}

/// Todoist JSON backup: `{items: [...]}`, `{tasks: [...]}`, or a bare array.
fn parse_json(content: &str, today: NaiveDate) -> Result<Vec<Task>, ImportError> {
    let data: Value = serde_json::from_str(content)?;
    let items = data
        .get("items")
        .or_else(|| data.get("tasks"))
        .unwrap_or(&data);
    let items = items.as_array().ok_or(ImportError::NotATaskList)?;

    let mut tasks = Vec::new();
    for item in items {
        let title = str_field(item, &["content", "title", "name"]).trim();
        if title.is_empty() {
            continue;
        }
        let due = item
            .pointer("/due/date")
            .and_then(Value::as_str)
            .or_else(|| item.get("due_date").and_then(Value::as_str));

        let mut task = Task::new(title, parse_date_or(due, today));
        task.notes = str_field(item, &["description", "notes"]).to_string();
        task.priority = map_external_priority(item.get("priority").and_then(Value::as_i64));
        task.completed = item.get("checked").and_then(Value::as_i64) == Some(1)
            || item.get("completed").and_then(Value::as_bool) == Some(true);
        if let Some(stamp) = item
            .get("added_at")
            .or_else(|| item.get("created_at"))
            .and_then(Value::as_str)
        {
            if let Ok(created) = chrono::DateTime::parse_from_rfc3339(stamp) {
                task.created_at = created.naive_utc();
            }
        }
        tasks.push(task);
    }
    Ok(tasks)
}

/// Todoist CSV backup: header-driven column discovery, quote-aware splitting.
fn parse_csv(content: &str, today: NaiveDate) -> Vec<Task> {
    let mut lines = content.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let headers: Vec<String> = split_csv_line(header)
        .iter()
        .map(|h| h.trim_matches('"').to_lowercase())
        .collect();
    let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));
    let content_idx = find(&["content", "task", "title"]);
    let desc_idx = find(&["description", "notes"]);
    let priority_idx = find(&["priority"]);
    let date_idx = find(&["date", "due date", "due_date"]);

    let mut tasks = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let values = split_csv_line(line);
        let cell = |idx: Option<usize>| idx.and_then(|i| values.get(i)).map(String::as_str);

        let title = cell(content_idx)
            .or_else(|| values.first().map(String::as_str))
            .unwrap_or("")
            .trim_matches('"')
            .trim();
        if title.is_empty() {
            continue;
        }

        let mut task = Task::new(title, parse_date_or(cell(date_idx), today));
        task.notes = cell(desc_idx).unwrap_or("").trim_matches('"').to_string();
        task.priority = match cell(priority_idx) {
            Some(raw) => map_external_priority(Some(raw.trim().parse().unwrap_or(4))),
            None => Priority::NONE,
        };
        tasks.push(task);
    }
    tasks
}

/// Split one CSV line, honoring double-quoted fields. Deliberately simple;
/// the backups this reads never contain escaped quotes.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                values.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    values.push(current.trim().to_string());
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn json_items_with_field_fallbacks() {
        let content = r#"{"items":[
            {"content":"pay rent","priority":1,"due":{"date":"2024-07-01"},"checked":1},
            {"title":"water plants","notes":"balcony first","priority":3},
            {"name":"call mom","priority":4}
        ]}"#;
        let tasks = parse_export("backup.json", content, today()).unwrap();
        assert_eq!(tasks.len(), 3);

        assert_eq!(tasks[0].title, "pay rent");
        assert_eq!(tasks[0].priority, Priority::new(5));
        assert_eq!(tasks[0].date, NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert!(tasks[0].completed);

        assert_eq!(tasks[1].title, "water plants");
        assert_eq!(tasks[1].notes, "balcony first");
        assert_eq!(tasks[1].priority, Priority::new(2));
        assert_eq!(tasks[1].date, today());

        assert_eq!(tasks[2].priority, Priority::NONE);
    }

    #[test]
    fn json_accepts_tasks_key_and_bare_array() {
        let via_tasks = parse_export("a.json", r#"{"tasks":[{"title":"x"}]}"#, today()).unwrap();
        assert_eq!(via_tasks.len(), 1);
        let bare = parse_export("a.json", r#"[{"title":"y"}]"#, today()).unwrap();
        assert_eq!(bare.len(), 1);
    }

    #[test]
    fn json_drops_untitled_records() {
        let tasks =
            parse_export("a.json", r#"[{"title":""},{"notes":"no title"}]"#, today()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn json_errors() {
        assert!(matches!(
            parse_export("a.json", "{broken", today()),
            Err(ImportError::Json(_))
        ));
        assert!(matches!(
            parse_export("a.json", r#"{"items":42}"#, today()),
            Err(ImportError::NotATaskList)
        ));
        assert!(matches!(
            parse_export("a.txt", "", today()),
            Err(ImportError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn csv_with_quoted_commas_and_priority() {
        let content = "\
CONTENT,Description,Priority,Due Date
\"buy milk, eggs\",weekly run,2,2024-07-02
call dentist,,4,not-a-date
,skipped row,1,2024-07-03
";
        let tasks = parse_export("backup.csv", content, today()).unwrap();
        assert_eq!(tasks.len(), 2);

        assert_eq!(tasks[0].title, "buy milk, eggs");
        assert_eq!(tasks[0].notes, "weekly run");
        assert_eq!(tasks[0].priority, Priority::new(4));
        assert_eq!(tasks[0].date, NaiveDate::from_ymd_opt(2024, 7, 2).unwrap());

        // Unparseable dates fall back to today.
        assert_eq!(tasks[1].date, today());
        assert_eq!(tasks[1].priority, Priority::NONE);
    }

    #[test]
    fn csv_without_known_header_uses_first_column() {
        let content = "something,else\nfix bike,ignored\n";
        let tasks = parse_export("backup.csv", content, today()).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "fix bike");
        assert_eq!(tasks[0].date, today());
    }

    #[test]
    fn date_extraction_handles_timestamps() {
        assert_eq!(
            parse_date_or(Some("2024-05-06T10:00:00Z"), today()),
            NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
        );
        assert_eq!(parse_date_or(Some("\"2024-05-06\""), today()), NaiveDate::from_ymd_opt(2024, 5, 6).unwrap());
        assert_eq!(parse_date_or(None, today()), today());
        assert_eq!(parse_date_or(Some("soon"), today()), today());
    }
}
