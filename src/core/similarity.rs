use std::collections::HashSet;

use super::task::Task;

/// Minimum title length before duplicate hints kick in.
const MIN_TITLE_LEN: usize = 3;

/// How many suggestions to surface.
const MAX_MATCHES: usize = 3;

/// Word-overlap similarity between two titles in [0, 1]. Case-insensitive;
/// 1.0 for identical strings, Jaccard overlap of whitespace-split words
/// otherwise.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }

    let words_a: HashSet<&str> = a.split_whitespace().collect();
    let words_b: HashSet<&str> = b.split_whitespace().collect();
    let overlap = words_a.intersection(&words_b).count();
    let total = words_a.len() + words_b.len() - overlap;
    if total == 0 {
        0.0
    } else {
        overlap as f64 / total as f64
    }
}

/// Existing tasks whose titles look like `title`, best match first, capped at
/// three. Used for capture-time duplicate hints only; imports never consult
/// this.
pub fn find_similar<'a>(
    title: &str,
    tasks: &'a [Task],
    min_score: f64,
) -> Vec<(&'a Task, f64)> {
    if title.len() < MIN_TITLE_LEN || tasks.is_empty() {
        return Vec::new();
    }

    let mut matches: Vec<(&Task, f64)> = tasks
        .iter()
        .map(|task| (task, similarity(title, &task.title)))
        .filter(|(_, score)| *score >= min_score)
        .collect();
    matches.sort_by(|a, b| b.1.total_cmp(&a.1));
    matches.truncate(MAX_MATCHES);
    matches
}
