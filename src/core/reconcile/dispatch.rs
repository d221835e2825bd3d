// src/core/reconcile/dispatch.rs

//! Pre-processes a pulled batch with [`remove_conflict_actions`] then
//! dispatches each surviving item in order. A single item's failure is
//! logged and never aborts the batch (spec.md §7 "the command-log dispatch
//! loop logs and continues").

use crate::core::commandlog::{LogItem, remove_conflict_actions};
use crate::core::reconcile::handlers::{self, HandlerContext};

pub async fn apply_batch(ctx: &HandlerContext<'_>, items: Vec<LogItem>) {
    let items = remove_conflict_actions(items);
    for item in items {
        let command = item.command;
        let id = item.instance_id;
        if let Err(e) = handlers::dispatch_item(ctx, item).await {
            tracing::error!(id, ?command, error = %e, "command handler failed, continuing to next item");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::commandlog::Command;

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
    fn batch_compaction_runs_before_dispatch() {
        let items = vec![item(Command::Create, 1, "a", 1), item(Command::Destroy, 1, "a", 2)];
        let compacted = remove_conflict_actions(items);
        assert!(compacted.is_empty());
    }
}
