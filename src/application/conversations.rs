//! Conversation reconstruction.
//!
//! Flat record lists are grouped either by silence between messages or by
//! following reply references back to a root.

use std::collections::HashMap;

use chrono::Duration;

use crate::domain::{Conversation, ExportRecord};

/// Sorts records by timestamp, missing timestamps first.
///
/// The sort is stable so records sharing a timestamp keep document order.
pub fn sort_by_time(records: &mut [ExportRecord]) {
    records.sort_by_key(ExportRecord::sort_key);
}

/// Splits records into conversations wherever consecutive timestamps are
/// more than `gap` apart. A gap of exactly `gap` does not split.
#[must_use]
pub fn segment_by_gap(mut records: Vec<ExportRecord>, gap: Duration) -> Vec<Conversation> {
    sort_by_time(&mut records);
    let gap_ms = gap.num_milliseconds();

    let mut segments: Vec<Vec<ExportRecord>> = Vec::new();
    let mut previous: Option<i64> = None;

    for record in records {
        let key = record.sort_key();
        let split = previous.is_some_and(|prev| key - prev > gap_ms);
        match segments.last_mut() {
            Some(current) if !split => current.push(record),
            _ => segments.push(vec![record]),
        }
        previous = Some(key);
    }

    segments
        .into_iter()
        .enumerate()
        .map(|(i, records)| {
            let id = records
                .first()
                .map_or_else(|| format!("conversation{}", i + 1), |r| r.id.clone());
            Conversation::new(id, records)
        })
        .collect()
}

/// Groups records into threads by following reply references to their
/// root. Each record lands in exactly one thread; replies to records that
/// are not in the list start their own thread.
///
/// Threads are time-sorted internally and ordered by their first record.
#[must_use]
pub fn group_by_reply(records: Vec<ExportRecord>) -> Vec<Conversation> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (i, record) in records.iter().enumerate() {
        index.entry(record.id.as_str()).or_insert(i);
    }

    let root_of = |start: usize| -> usize {
        let mut current = start;
        let mut steps = 0;
        while let Some(parent) = records[current]
            .reply_to
            .as_deref()
            .and_then(|id| index.get(id).copied())
        {
            // Bail out of reference cycles.
            if parent == current || steps > records.len() {
                break;
            }
            current = parent;
            steps += 1;
        }
        current
    };

    let roots = (0..records.len()).map(root_of).collect::<Vec<_>>();

    let mut order: Vec<usize> = Vec::new();
    let mut threads: HashMap<usize, Vec<ExportRecord>> = HashMap::new();
    for (record, root) in records.into_iter().zip(roots) {
        threads
            .entry(root)
            .or_insert_with(|| {
                order.push(root);
                Vec::new()
            })
            .push(record);
    }

    let mut conversations = order
        .into_iter()
        .filter_map(|root| threads.remove(&root))
        .map(|mut thread| {
            sort_by_time(&mut thread);
            let id = thread.first().map(|r| r.id.clone()).unwrap_or_default();
            Conversation::new(id, thread)
        })
        .collect::<Vec<_>>();

    conversations.sort_by_key(|c| c.records.first().map_or(0, ExportRecord::sort_key));
    conversations
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn message(id: &str, secs: i64, sender: &str) -> ExportRecord {
        ExportRecord {
            timestamp: Utc.timestamp_opt(secs, 0).single(),
            sender: Some(sender.to_string()),
            ..ExportRecord::with_id(id)
        }
    }

    fn reply(id: &str, secs: i64, to: &str) -> ExportRecord {
        ExportRecord {
            reply_to: Some(to.to_string()),
            ..message(id, secs, "someone")
        }
    }

    #[test]
    fn test_exact_gap_stays_together() {
        let day = 24 * 3600;
        let convs = segment_by_gap(
            vec![message("a", 1000, "x"), message("b", 1000 + day, "y")],
            Duration::hours(24),
        );
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].participants, vec!["x", "y"]);
    }

    #[test]
    fn test_gap_plus_one_second_splits() {
        let day = 24 * 3600;
        let convs = segment_by_gap(
            vec![message("b", 1001 + day, "y"), message("a", 1000, "x")],
            Duration::hours(24),
        );
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].id, "a");
        assert_eq!(convs[1].id, "b");
    }

    #[test]
    fn test_missing_timestamp_sorts_first() {
        let mut undated = ExportRecord::with_id("undated");
        undated.sender = Some("z".to_string());
        let convs = segment_by_gap(
            vec![message("a", 10, "x"), undated],
            Duration::hours(24),
        );
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].records[0].id, "undated");
    }

    #[test]
    fn test_reply_chain_single_thread() {
        let convs = group_by_reply(vec![
            reply("3", 30, "1"),
            message("1", 10, "alice"),
            reply("2", 20, "1"),
        ]);
        assert_eq!(convs.len(), 1);
        let ids = convs[0].records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_nested_replies_reach_root() {
        let convs = group_by_reply(vec![
            message("1", 10, "a"),
            reply("2", 20, "1"),
            reply("3", 30, "2"),
            message("4", 5, "b"),
        ]);
        assert_eq!(convs.len(), 2);
        assert_eq!(convs[0].id, "4");
        assert_eq!(convs[1].message_count(), 3);
    }

    #[test]
    fn test_reply_cycle_terminates() {
        let convs = group_by_reply(vec![reply("1", 10, "2"), reply("2", 20, "1")]);
        let total: usize = convs.iter().map(Conversation::message_count).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_reply_to_missing_record() {
        let convs = group_by_reply(vec![reply("2", 20, "404")]);
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].id, "2");
    }
}
