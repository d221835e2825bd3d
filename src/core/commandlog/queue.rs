// src/core/commandlog/queue.rs

//! Append-only command log: a `VecDeque<LogItem>` plus a lock-free
//! `mod_time` snapshot so the `pull` hot path can cheaply tell "nothing
//! new" without taking the queue mutex (spec.md §4.1).

use crate::core::commandlog::item::{Command, LogItem};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

/// Items older than this relative to `now` may be garbage-collected at the
/// periodic cleanup tick. Matches the "dead-client horizon" in spec.md §4.1.
pub const DEAD_CLIENT_HORIZON_SECS: i64 = 15 * 60;

pub struct CommandQueue {
    items: Mutex<VecDeque<LogItem>>,
    mod_time: AtomicI64,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            mod_time: AtomicI64::new(0),
        }
    }

    /// Appends an item, updating `mod_time` to its timestamp. Items are
    /// never removed on consumption — only cursors advance — since multiple
    /// followers consume the same queue independently.
    pub fn push(&self, item: LogItem) {
        self.mod_time.store(item.timestamp, Ordering::Release);
        self.items.lock().push_back(item);
    }

    pub fn mod_time(&self) -> i64 {
        self.mod_time.load(Ordering::Acquire)
    }

    /// Returns all items with `timestamp > last_sync`. A fast empty-list
    /// return is possible without locking when `mod_time <= last_sync`.
    pub fn since(&self, last_sync: i64) -> Vec<LogItem> {
        if self.mod_time() <= last_sync {
            return Vec::new();
        }
        self.items
            .lock()
            .iter()
            .filter(|item| item.timestamp > last_sync)
            .cloned()
            .collect()
    }

    /// Prunes items older than [`DEAD_CLIENT_HORIZON_SECS`] relative to
    /// `now`. The teacher's source has a known bug here — it builds the
    /// pruned slice but never assigns it back to the queue (spec.md §9);
    /// this implementation writes the pruned tail back.
    pub fn cleanup(&self, now: i64) {
        let mut items = self.items.lock();
        let cutoff = now - DEAD_CLIENT_HORIZON_SECS;
        items.retain(|item| item.timestamp >= cutoff);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Collapses create-then-destroy of the same uuid within one pull batch
/// before dispatch (spec.md §4.1 "Compaction"). Preserves relative order of
/// the survivors.
pub fn remove_conflict_actions(items: Vec<LogItem>) -> Vec<LogItem> {
    use std::collections::HashSet;

    let mut destroyed_after_create: HashSet<(u32, String)> = HashSet::new();
    for i in 0..items.len() {
        if items[i].command != Command::Create {
            continue;
        }
        let key = (items[i].instance_id, items[i].instance_uuid.clone());
        let has_later_destroy = items[i + 1..]
            .iter()
            .any(|later| later.command == Command::Destroy && (later.instance_id, later.instance_uuid.clone()) == key);
        if has_later_destroy {
            destroyed_after_create.insert(key);
        }
    }

    items
        .into_iter()
        .filter(|item| {
            let key = (item.instance_id, item.instance_uuid.clone());
            if !destroyed_after_create.contains(&key) {
                return true;
            }
            !matches!(item.command, Command::Create | Command::Destroy)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(command: Command, id: u32, uuid: &str, ts: i64) -> LogItem {
        LogItem {
            command,
            instance_id: id,
            instance_uuid: uuid.to_string(),
            initiator: "test".to_string(),
            timestamp: ts,
            payload: None,
        }
    }

    #[test]
    fn since_returns_only_newer_items() {
        let q = CommandQueue::new();
        q.push(item(Command::Create, 1, "a", 10));
        q.push(item(Command::Start, 1, "a", 20));
        let result = q.since(10);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].timestamp, 20);
    }

    #[test]
    fn since_is_empty_when_mod_time_not_past_cursor() {
        let q = CommandQueue::new();
        q.push(item(Command::Create, 1, "a", 10));
        assert!(q.since(10).is_empty());
    }

    #[test]
    fn cleanup_retains_only_recent_items() {
        let q = CommandQueue::new();
        q.push(item(Command::Create, 1, "a", 10));
        q.push(item(Command::Start, 1, "a", 10_000));
        q.cleanup(10_000);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn compaction_collapses_create_then_destroy() {
        let items = vec![
            item(Command::Create, 5, "u5", 1),
            item(Command::Destroy, 5, "u5", 2),
        ];
        let compacted = remove_conflict_actions(items);
        assert!(compacted.is_empty());
    }

    #[test]
    fn compaction_is_order_preserving_for_survivors() {
        let items = vec![
            item(Command::Create, 1, "u1", 1),
            item(Command::Start, 2, "u2", 2),
            item(Command::Destroy, 1, "u1", 3),
            item(Command::Stop, 2, "u2", 4),
        ];
        let compacted = remove_conflict_actions(items);
        let commands: Vec<Command> = compacted.iter().map(|i| i.command).collect();
        assert_eq!(commands, vec![Command::Start, Command::Stop]);
    }

    #[test]
    fn compaction_is_idempotent() {
        let items = vec![
            item(Command::Create, 1, "u1", 1),
            item(Command::Start, 2, "u2", 2),
            item(Command::Destroy, 1, "u1", 3),
        ];
        let once = remove_conflict_actions(items);
        let twice = remove_conflict_actions(once.clone());
        assert_eq!(once.len(), twice.len());
    }
}
