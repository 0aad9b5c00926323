//! CronSearch: periodic creator of Searches.
//!
//! Drives Search creation off a `cron`-parsed schedule the same way a
//! CronJob drives Job creation.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::search::SearchSpec;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "ocular.crashoverride.run",
    version = "v1beta1",
    kind = "CronSearch",
    namespaced,
    status = "CronSearchStatus",
    shortname = "csrch",
    printcolumn = r#"{"name":"Schedule","type":"string","jsonPath":".spec.schedule"}"#,
    printcolumn = r#"{"name":"Suspend","type":"boolean","jsonPath":".spec.suspend"}"#,
    printcolumn = r#"{"name":"LastSchedule","type":"string","jsonPath":".status.lastScheduleTime"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CronSearchSpec {
    /// Standard five-field cron expression, evaluated in UTC.
    pub schedule: String,

    /// Embedded Search spec instantiated on each scheduled fire.
    pub search_template: SearchSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_deadline_seconds: Option<i64>,

    #[serde(default)]
    pub suspend: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CronSearchStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_schedule_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_created_search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
