use crate::schema::task_collaborations;
use crate::schema::task_completions;
use crate::schema::user_pillar_xp;
use crate::schema::user_quests;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Insertable, Debug)]
#[diesel(table_name = user_quests)]
pub struct NewUserQuest {
    pub user_id: Uuid,
    pub quest_id: i64,
    pub status: String,
    pub is_active: bool,
    pub times_picked_up: i32,
    pub reflection_notes: JsonValue,
    pub personalization_completed: bool,
    // started_at and last_picked_up_at have DB defaults (CURRENT_TIMESTAMP)
    // completed_at and last_set_down_at are nullable (default to NULL)
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_completions)]
pub struct NewTaskCompletion {
    pub user_id: Uuid,
    pub task_id: i64,
    pub quest_id: i64,
    pub evidence_url: Option<String>,
    pub evidence_text: Option<String>,
    // completed_at has a DB default (CURRENT_TIMESTAMP)
    // subject_distribution and verified_by_advisor_id are set by advisor verification
}

#[derive(Insertable, Debug)]
#[diesel(table_name = task_collaborations)]
pub struct NewTaskCollaboration {
    pub task_id: i64,
    pub student_1_id: Uuid,
    pub student_2_id: Uuid,
    pub status: String,
    pub double_xp_awarded: bool,
    // created_at has a DB default (CURRENT_TIMESTAMP)
}

#[derive(Insertable, Debug)]
#[diesel(table_name = user_pillar_xp)]
pub struct NewPillarXp {
    pub user_id: Uuid,
    pub pillar: String,
    pub xp_amount: i32,
    // updated_at has a DB default (CURRENT_TIMESTAMP)
}

/// One reflection entry on an enrollment, stored inside the
/// `reflection_notes` jsonb array in insertion order.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReflectionNote {
    pub note: String,
    pub prompt_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PickupQuestResponse {
    pub enrollment_id: i64,
    pub status: String,
    pub times_picked_up: i32,
    pub is_returning: bool,
    pub personalization_completed: bool,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct EnrollmentMetadata {
    pub enrollment_id: i64,
    pub status: String,
    pub is_active: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_picked_up_at: DateTime<Utc>,
    pub last_set_down_at: Option<DateTime<Utc>>,
    pub times_picked_up: i32,
    pub reflection_notes: JsonValue,
    pub personalization_completed: bool,

    pub quest_id: i64,
    pub quest_title: String,
    pub quest_description: String,
    pub quest_type: String,
    pub quest_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Queryable)]
pub struct BadgeSummary {
    pub badge_id: i64,
    pub name: String,
    pub pillar_primary: String,
    pub min_xp: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TaskCompletionResponse {
    pub completion_id: i64,
    pub pillar: String,
    pub xp_awarded: i32,
    pub new_pillar_xp: i32,
    pub quest_completed: bool,
    pub unlocked_badges: Vec<BadgeSummary>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct XpBreakdownResponse {
    pub pillars: BTreeMap<String, i32>,
    pub total: i64,
    pub rounded_total: i64,
    pub mastery_level: i32,
}

#[derive(Serialize, Deserialize, Debug, Queryable)]
pub struct EarnedBadge {
    pub badge_id: i64,
    pub name: String,
    pub description: String,
    pub pillar_primary: String,
    pub min_xp: i32,
    pub min_quests: i32,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CollaborationResponse {
    pub collaboration_id: i64,
    pub status: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CollaborationCompletionResponse {
    pub has_collaboration: bool,
    pub already_awarded: bool,
    pub pillar: Option<String>,
    pub xp_awarded_each: Option<i32>,
}
