//! Deterministic synthetic workload for `relay simulate`.
//!
//! Every ten consecutive tasks cover each routing path: three local, two
//! cacheable lookups over a small key space, three batchable events, one
//! plain remote call and one remote call behind an approval gate.

use relay_engine::TaskRequest;
use serde_json::json;

/// Build the `index`-th task of the workload.
pub fn task_at(index: usize) -> TaskRequest {
    match index % 10 {
        0 => TaskRequest::new(
            "text_processing",
            json!({"operation": "word_count", "text": format!("routine note number {}", index)}),
        ),
        1 => TaskRequest::new(
            "calculation",
            json!({"operation": "sum", "values": [index, index * 2, 3]}),
        ),
        2 => TaskRequest::new(
            "formatting",
            json!({"operation": "currency", "value": index as f64 * 1.5}),
        )
        .with_action("format_code"),
        3 => TaskRequest::new("product_lookup", json!({"id": index % 7})),
        4 => TaskRequest::new("price_lookup", json!({"sku": format!("SKU-{}", index % 5)})),
        5 => TaskRequest::new("analytics_event", json!({"event": "page_view", "seq": index})),
        6 => TaskRequest::new("notification", json!({"channel": "ops", "seq": index})),
        7 => TaskRequest::new("inventory_check", json!({"sku": format!("SKU-{}", index % 13)})),
        8 => TaskRequest::new("order_submission", json!({"order": index})),
        _ => {
            let update_type = ["patch", "patch", "major", "minor"][(index / 10) % 4];
            TaskRequest::new("external_sync", json!({"sync": index})).with_approval(
                "dependency",
                "canUpdate",
                json!({"package": format!("crate-{}", index % 3), "updateType": update_type}),
            )
        }
    }
}

/// The first `count` tasks of the workload.
pub fn generate(count: usize) -> Vec<TaskRequest> {
    (0..count).map(task_at).collect()
}

/// Decision prompts replayed after the routing workload to exercise the
/// rule, pattern and escalation paths.
pub fn decision_prompts() -> Vec<(&'static str, &'static str, serde_json::Value)> {
    vec![
        ("file_operation", "canDelete", json!({"filePath": ".env"})),
        ("file_operation", "canDelete", json!({"filePath": "build/output.log"})),
        ("file_operation", "canModify", json!({"filePath": "a.txt", "changeType": "format"})),
        ("file_operation", "canModify", json!({"filePath": "a.txt", "changeType": "format"})),
        ("code_change", "autoApprove", json!({"changeType": "lint", "importance": "low"})),
        ("code_change", "autoApprove", json!({"changeType": "refactor", "importance": "high"})),
        ("deployment", "promote", json!({"environment": "staging"})),
    ]
}
