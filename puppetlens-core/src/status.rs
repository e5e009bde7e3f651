use crate::puppetdb::NodeRecord;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Display,
    AsRefStr,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeStatus {
    Changed,
    Failed,
    Noop,
    Skipped,
    Unchanged,
    Unreported,
}

impl NodeStatus {
    /// Maps a status string to a known status. Anything PuppetDB reports that
    /// is not one of the known names counts as `unchanged`.
    pub fn classify(status: &str) -> Self {
        status.parse().unwrap_or(NodeStatus::Unchanged)
    }
}

/// Status of a node as shown on the dashboard.
///
/// Starts from `latest_report_status`; an unchanged noop run with pending
/// changes is `noop`; a node whose last report is missing or older than
/// `unresponsive_hours` is `unreported`.
pub fn derive_status(node: &NodeRecord, unresponsive_hours: u64, now: DateTime<Utc>) -> String {
    let cutoff_hours = i64::try_from(unresponsive_hours).unwrap_or(i64::MAX);
    let cutoff = Duration::try_hours(cutoff_hours)
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    match node.report_timestamp {
        None => return NodeStatus::Unreported.to_string(),
        Some(ts) if ts < cutoff => return NodeStatus::Unreported.to_string(),
        Some(_) => {}
    }

    let status = node.latest_report_status.clone().unwrap_or_default();
    let noop = node.latest_report_noop.unwrap_or(false);
    let noop_pending = node.latest_report_noop_pending.unwrap_or(false);
    if status == NodeStatus::Unchanged.as_ref() && noop && noop_pending {
        return NodeStatus::Noop.to_string();
    }
    status
}
