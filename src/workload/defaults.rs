//! Create-time defaults
//!
//! Target kind inference plus the field defaults applied to a payload before
//! it is handed to the chosen collection.

use super::kind::WorkloadKind;
use super::record::Record;
use super::registry::BindingTable;
use crate::error::{Error, Result};

/// Label tying a workload to the pods it selects
pub const SELECTOR_LABEL: &str = "workload.user.cattle.io/workloadselector";

/// Restart policy given to batch kinds that do not set one
pub const BATCH_RESTART_POLICY: &str = "OnFailure";

/// Pick the target kind from the payload's hint fields.
///
/// Without a hint the primary kind is used. More than one hint is rejected.
pub fn infer_kind(table: &BindingTable, data: &Record) -> Result<WorkloadKind> {
    let hits: Vec<(&str, WorkloadKind)> = data
        .as_map()
        .iter()
        .filter(|(_, value)| !value.is_null())
        .filter_map(|(field, _)| Some((field.as_str(), table.kind_for_field(field)?)))
        .collect();

    match hits.as_slice() {
        [] => Ok(WorkloadKind::PRIMARY),
        [(_, kind)] => Ok(*kind),
        _ => {
            let mut fields: Vec<String> = hits.iter().map(|(f, _)| f.to_string()).collect();
            fields.sort();
            Err(Error::AmbiguousKind(fields))
        },
    }
}

/// Uniqueness token `<schemaId>-<namespaceId>-<name>`
pub fn workload_id(kind: WorkloadKind, data: &Record) -> String {
    format!(
        "{}-{}-{}",
        kind.schema_id(),
        data.get_string("namespaceId"),
        data.get_string("name")
    )
}

/// Give non-batch workloads without a selector a unique one, mirrored into
/// `workloadLabels` and `labels`.
///
/// Returns whether the payload was changed.
pub fn set_selector(kind: WorkloadKind, data: &mut Record) -> bool {
    if kind.is_batch() || !data.is_empty_value("selector") {
        return false;
    }

    let id = workload_id(kind, data);

    let mut match_labels = serde_json::Map::new();
    match_labels.insert(SELECTOR_LABEL.to_string(), id.clone().into());
    let mut selector = serde_json::Map::new();
    selector.insert("matchLabels".to_string(), match_labels.into());
    data.insert("selector", selector);

    data.merge_into_map("workloadLabels", SELECTOR_LABEL, &id);
    data.merge_into_map("labels", SELECTOR_LABEL, &id);

    tracing::debug!(kind = %kind, selector = %id, "assigned workload selector");
    true
}

/// Kind-specific field defaults
pub fn set_workload_specific_defaults(kind: WorkloadKind, data: &mut Record) {
    if kind.is_batch() && !data.contains("restartPolicy") {
        tracing::info!(kind = %kind, policy = BATCH_RESTART_POLICY, "setting restart policy");
        data.insert("restartPolicy", BATCH_RESTART_POLICY);
    }
}
