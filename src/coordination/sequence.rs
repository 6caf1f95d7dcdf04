//! Sequence suffixes of sequential nodes.
//!
//! The service appends a ten digit, zero padded counter to the requested
//! prefix (`lock-0000000042`). Queue order is the numeric order of that
//! suffix, independent of the prefix.

/// Width of the sequence suffix appended by the service.
pub const SEQUENCE_WIDTH: usize = 10;

/// Name of the `n`th sequential node created with `prefix`.
pub fn format_sequence(prefix: &str, n: u64) -> String {
    format!("{}{:0width$}", prefix, n, width = SEQUENCE_WIDTH)
}

/// Sequence number carried by `name`, if it ends in a full-width suffix.
pub fn parse_sequence(name: &str) -> Option<u64> {
    if name.len() < SEQUENCE_WIDTH {
        return None;
    }
    let suffix = name.get(name.len() - SEQUENCE_WIDTH..)?;
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Sort children by sequence number, ascending.
///
/// Children without a sequence suffix are not queue entries and are dropped.
/// Equal sequence numbers are ordered by name.
pub fn sort_by_sequence(children: Vec<String>) -> Vec<(u64, String)> {
    let mut entries: Vec<(u64, String)> = children
        .into_iter()
        .filter_map(|name| parse_sequence(&name).map(|seq| (seq, name)))
        .collect();
    entries.sort();
    entries
}

/// Entry immediately ahead of `own` in a sorted queue.
///
/// Returns `None` when `own` is first or absent.
pub fn predecessor_of<'a>(sorted: &'a [(u64, String)], own: &str) -> Option<&'a str> {
    let idx = sorted.iter().position(|(_, name)| name == own)?;
    if idx == 0 {
        None
    } else {
        Some(sorted[idx - 1].1.as_str())
    }
}
