use serde::Deserialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct CreateStudentPayload {
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub organization_id: Option<Uuid>,
    pub is_dependent: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct AddAdvisorStudentPayload {
    pub advisor_id: Uuid,
    pub student_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct RemoveAdvisorStudentPayload {
    pub advisor_id: Uuid,
    pub student_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct CreateQuestPayload {
    pub advisor_id: Uuid,
    pub title: String,
    pub description: String,
    pub quest_type: String,
    pub organization_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct ModifyQuestPayload {
    pub advisor_id: Uuid,
    pub quest_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ActivateQuestPayload {
    pub advisor_id: Uuid,
    pub quest_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct DeactivateQuestPayload {
    pub advisor_id: Uuid,
    pub quest_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct AddQuestTaskPayload {
    pub advisor_id: Uuid,
    pub quest_id: i64,
    pub title: String,
    pub description: String,
    pub pillar: String,
    pub xp_value: i32,
    pub order_index: i32,
    pub is_required: Option<bool>,
}

#[derive(Deserialize, Debug)]
pub struct SetTaskApprovalPayload {
    pub advisor_id: Uuid,
    pub task_id: i64,
    pub approval_status: String,
}

#[derive(Deserialize, Debug)]
pub struct CreateBadgePayload {
    pub advisor_id: Uuid,
    pub name: String,
    pub description: String,
    pub pillar_primary: String,
    pub min_xp: i32,
    pub min_quests: i32,
}

#[derive(Deserialize, Debug)]
pub struct ListStudentsParams {
    pub advisor_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct GetStudentProgressParams {
    pub advisor_id: Uuid,
    pub student_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct VerifyCompletionPayload {
    pub advisor_id: Uuid,
    pub completion_id: i64,
    pub subject_distribution: Option<JsonValue>,
}
