use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::users::repo_types::WorkScheduleEntry;

/// One weekday of a submitted schedule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleDayRequest {
    #[serde(alias = "weekday")]
    pub day_of_week: Option<i32>,
    pub is_working_day: Option<bool>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleDayResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub day_of_week: i32,
    pub is_working_day: bool,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl From<WorkScheduleEntry> for ScheduleDayResponse {
    fn from(entry: WorkScheduleEntry) -> Self {
        Self {
            is_working_day: entry.is_working_day(),
            id: entry.id,
            user_id: entry.user_id,
            day_of_week: entry.weekday,
            start_time: entry.start_time,
            end_time: entry.end_time,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub search: String,
}
