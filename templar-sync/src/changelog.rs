//! Commit-message changelog built from ledger changes.

use templar_core::Change;

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn describe(change: &Change) -> String {
    let Change { material, old, new } = change;
    match (old.is_empty(), new.is_empty()) {
        (true, true) => format!("{material} unknown changes"),
        (true, false) => format!("{material} (unknown)->{}", truncate(new, 8)),
        (false, true) => format!("{material} {}->(unknown)", truncate(old, 8)),
        (false, false) => format!("{material} {}->{}", truncate(old, 12), truncate(new, 12)),
    }
}

/// Human-readable summary of `changes`.
///
/// A single change is one line. Several changes get a `N changes` heading, a
/// blank line, then one line per material in name order.
pub fn format_changes(changes: &[Change]) -> String {
    match changes {
        [] => "no detected changes".to_string(),
        [only] => describe(only),
        many => {
            let mut sorted: Vec<&Change> = many.iter().collect();
            sorted.sort_by(|a, b| a.material.cmp(&b.material));
            let lines: Vec<String> = sorted.into_iter().map(describe).collect();
            format!("{} changes\n\n{}", many.len(), lines.join("\n"))
        }
    }
}
