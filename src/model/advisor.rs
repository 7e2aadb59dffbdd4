use crate::schema::advisor_students;
use crate::schema::badges;
use crate::schema::quest_tasks;
use crate::schema::quests;
use crate::schema::users;
use chrono::{DateTime, Utc};
use diesel::{AsChangeset, Insertable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Insertable, Debug)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub organization_id: Option<Uuid>,
    pub is_dependent: bool,
    // created_at and last_active have DB defaults
}

#[derive(Insertable, Debug)]
#[diesel(table_name = quests)]
pub struct NewQuest {
    pub title: String,
    pub description: String,
    pub quest_type: String,
    pub organization_id: Option<Uuid>,
    pub is_active: bool,
    // created_at, updated_at have DB defaults
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = quests)]
pub struct QuestChangeset {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = quest_tasks)]
pub struct NewQuestTask {
    pub quest_id: i64,
    pub user_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub pillar: String,
    pub xp_value: i32,
    pub order_index: i32,
    pub approval_status: String,
    pub is_required: bool,
    // created_at has a DB default
}

#[derive(Insertable, Debug)]
#[diesel(table_name = badges)]
pub struct NewBadge {
    pub name: String,
    pub description: String,
    pub pillar_primary: String,
    pub min_xp: i32,
    pub min_quests: i32,
    pub is_active: bool,
    // created_at has a DB default
}

#[derive(Insertable, Debug)]
#[diesel(table_name = advisor_students)]
pub struct NewAdvisorStudent {
    pub advisor_id: Uuid,
    pub student_id: Uuid,
    // created_at has a DB default
}

#[derive(Serialize, Deserialize, Debug)]
pub struct StudentProgressResponse {
    pub student_id: Uuid,
    pub total_xp: i64,
    pub mastery_level: i32,
    pub pillar_xp: BTreeMap<String, i32>,
    pub quests_picked_up: i64,
    pub quests_completed: i64,
    pub tasks_completed: i64,
}
