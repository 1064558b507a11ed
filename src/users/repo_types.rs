use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// One row of `user_work_schedule`. Times are `HH:MM`; both absent on a day off.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct WorkScheduleEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weekday: i32, // 1 = Monday .. 7 = Sunday
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl WorkScheduleEntry {
    pub fn is_working_day(&self) -> bool {
        self.start_time.is_some() && self.end_time.is_some()
    }
}

/// A validated schedule day ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkDay {
    pub weekday: i32,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl WorkDay {
    pub fn working(weekday: i32, start: &str, end: &str) -> Self {
        Self {
            weekday,
            start_time: Some(start.to_string()),
            end_time: Some(end.to_string()),
        }
    }

    pub fn day_off(weekday: i32) -> Self {
        Self {
            weekday,
            start_time: None,
            end_time: None,
        }
    }
}
