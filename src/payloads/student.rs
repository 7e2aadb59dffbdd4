use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize, Debug)]
pub struct PickupQuestPayload {
    pub user_id: Uuid,
    pub quest_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct SetDownQuestPayload {
    pub user_id: Uuid,
    pub quest_id: i64,
    pub reflection_note: Option<String>,
    pub prompt_id: Option<i64>,
}

#[derive(Deserialize, Debug)]
pub struct CompleteTaskPayload {
    pub user_id: Uuid,
    pub quest_id: i64,
    pub task_id: i64,
    pub evidence_url: Option<String>,
    pub evidence_text: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct InviteCollaboratorPayload {
    pub task_id: i64,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct AcceptCollaborationPayload {
    pub collaboration_id: i64,
    pub user_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct DeclineCollaborationPayload {
    pub collaboration_id: i64,
    pub user_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct CompleteCollaborationPayload {
    pub task_id: i64,
}

#[derive(Deserialize, Debug)]
pub struct GetAvailableQuestsParams {
    pub user_id: Option<Uuid>,
}

#[derive(Deserialize, Debug)]
pub struct GetUserQuestsParams {
    pub user_id: Uuid,
    pub active: bool,
}

#[derive(Deserialize, Debug)]
pub struct GetXpBreakdownParams {
    pub user_id: Uuid,
}

#[derive(Deserialize, Debug)]
pub struct GetEarnedBadgesParams {
    pub user_id: Uuid,
}
