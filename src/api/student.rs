use super::helper;
use crate::model::advisor::NewQuestTask;
use crate::model::student::{
    BadgeSummary, CollaborationCompletionResponse, CollaborationResponse, EarnedBadge,
    EnrollmentMetadata, NewTaskCollaboration, NewTaskCompletion, NewUserQuest, PickupQuestResponse,
    ReflectionNote, TaskCompletionResponse, XpBreakdownResponse,
};
use crate::payloads::student::{
    AcceptCollaborationPayload, CompleteCollaborationPayload, CompleteTaskPayload,
    DeclineCollaborationPayload, GetAvailableQuestsParams, GetEarnedBadgesParams,
    GetUserQuestsParams, GetXpBreakdownParams, InviteCollaboratorPayload, PickupQuestPayload,
    SetDownQuestPayload,
};
use crate::progression::{calculate_mastery_level, newly_crossed, round_to_nearest_50};
use crate::taxonomy::{ALL_PILLARS, ApprovalStatus, CollaborationStatus, Pillar, QuestStatus, QuestType};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        badges::dsl as badges_dsl, quest_tasks::dsl as qt_dsl, quests::dsl as quests_dsl,
        task_collaborations::dsl as tc_dsl, task_completions::dsl as tcmp_dsl,
        user_pillar_xp::dsl as upx_dsl, user_quests::dsl as uq_dsl, users::dsl as users_dsl,
    },
};
use anyhow::anyhow;
use axum::extract::{Path, Query};
use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use deadpool_diesel::postgres::Pool;
use diesel::dsl::now;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde_json::Value as JsonValue;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::log::warn;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Queries all active quests visible to a user: global quests plus the
/// ones scoped to the user's organization.
///
/// Query Parameters:
/// * `user_id`: Optional. When present, organization-scoped quests for that
///   user's organization are included alongside global quests.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<i64>`: List of quest IDs (200 OK).
/// * `404 Not Found`: If a `user_id` is supplied but does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_available_quests(
    State(pool): State<Pool>,
    Query(params): Query<GetAvailableQuestsParams>,
) -> Result<ApiResponse<Vec<i64>>, AppError> {
    info!("Fetching available quests for user: {:?}", params.user_id);

    let organization_id = match params.user_id {
        Some(user_id) => {
            let org = helper::run_query(&pool, move |conn| {
                users_dsl::users
                    .find(user_id)
                    .select(users_dsl::organization_id)
                    .first::<Option<Uuid>>(conn)
                    .optional()
            })
            .await?;

            match org {
                None => {
                    error!("User with ID {} not found.", user_id);
                    return Err(AppError::NotFound(format!(
                        "User with ID {} not found.",
                        user_id
                    )));
                }
                Some(org) => org,
            }
        }
        None => None,
    };

    let quest_ids = helper::run_query(&pool, move |conn_sync| {
        match organization_id {
            Some(org) => quests_dsl::quests
                .filter(quests_dsl::is_active.eq(true))
                .filter(
                    quests_dsl::organization_id
                        .is_null()
                        .or(quests_dsl::organization_id.eq(org)),
                )
                .select(quests_dsl::id)
                .load::<i64>(conn_sync),
            None => quests_dsl::quests
                .filter(quests_dsl::is_active.eq(true))
                .filter(quests_dsl::organization_id.is_null())
                .select(quests_dsl::id)
                .load::<i64>(conn_sync),
        }
    })
    .await?;

    info!(
        "Successfully fetched {} available quest IDs",
        quest_ids.len()
    );
    Ok(ApiResponse::ok(quest_ids))
}

/// Picks up a quest for a user: creates the enrollment on first pickup or
/// revives a set-down one, tracking how many times the quest has been
/// picked up. Course quests copy their approved template tasks into
/// per-user rows the first time they are picked up.
///
/// Request Body: `PickupQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `PickupQuestResponse`: Enrollment state with an `is_returning` flag (200 OK).
/// * `404 Not Found`: If the user or quest does not exist.
/// * `409 Conflict`: If the enrollment is already completed.
/// * `422 Unprocessable Entity`: If the quest is not active.
/// * `500 Internal Server Error`: If a database error or transaction failure occurs.
#[instrument(skip(pool, payload))]
pub async fn pickup_quest(
    State(pool): State<Pool>,
    Json(payload): Json<PickupQuestPayload>,
) -> Result<ApiResponse<PickupQuestResponse>, AppError> {
    info!(
        "Attempting to pick up quest {} for user_id: {}",
        payload.quest_id, payload.user_id
    );
    debug!("Pickup quest payload: {:?}", payload);

    let conn = pool.get().await?;
    let transaction_result: Result<PickupQuestResponse, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx| {
                let user_id = payload.user_id;
                let quest_id = payload.quest_id;

                let quest = quests_dsl::quests
                    .find(quest_id)
                    .select((quests_dsl::quest_type, quests_dsl::is_active))
                    .first::<(String, bool)>(tx)
                    .optional()?;

                let (quest_type_raw, quest_active) = match quest {
                    Some(q) => q,
                    None => {
                        warn!("Quest with ID {} not found for pickup.", quest_id);
                        return Err(AppError::NotFound(format!(
                            "Quest with ID {} not found.",
                            quest_id
                        )));
                    }
                };

                if !quest_active {
                    warn!(
                        "User {} attempted to pick up inactive quest {}.",
                        user_id, quest_id
                    );
                    return Err(AppError::UnprocessableEntity(format!(
                        "Quest {} is not active and cannot be picked up.",
                        quest_id
                    )));
                }

                let user_exists = diesel::select(diesel::dsl::exists(
                    users_dsl::users.find(user_id),
                ))
                .get_result::<bool>(tx)?;

                if !user_exists {
                    warn!("User {} not found for quest pickup.", user_id);
                    return Err(AppError::NotFound(format!(
                        "User with ID {} not found.",
                        user_id
                    )));
                }

                let existing = uq_dsl::user_quests
                    .filter(uq_dsl::user_id.eq(user_id))
                    .filter(uq_dsl::quest_id.eq(quest_id))
                    .select((
                        uq_dsl::id,
                        uq_dsl::status,
                        uq_dsl::times_picked_up,
                        uq_dsl::personalization_completed,
                    ))
                    .first::<(i64, String, i32, bool)>(tx)
                    .optional()?;

                match existing {
                    None => {
                        let is_course_quest =
                            QuestType::parse(&quest_type_raw) == Some(QuestType::Course);
                        let personalization_completed = if is_course_quest {
                            personalize_course_tasks(tx, quest_id, user_id)?;
                            true
                        } else {
                            false
                        };

                        let new_enrollment = NewUserQuest {
                            user_id,
                            quest_id,
                            status: QuestStatus::PickedUp.as_str().to_string(),
                            is_active: true,
                            times_picked_up: 1,
                            reflection_notes: json!([]),
                            personalization_completed,
                        };

                        let enrollment_id = diesel::insert_into(uq_dsl::user_quests)
                            .values(&new_enrollment)
                            .returning(uq_dsl::id)
                            .get_result::<i64>(tx)?;

                        info!(
                            "User {} picked up quest {} for the first time, enrollment_id: {}",
                            user_id, quest_id, enrollment_id
                        );
                        Ok(PickupQuestResponse {
                            enrollment_id,
                            status: QuestStatus::PickedUp.as_str().to_string(),
                            times_picked_up: 1,
                            is_returning: false,
                            personalization_completed,
                        })
                    }
                    Some((enrollment_id, status_raw, times_picked_up, personalization_completed)) => {
                        if QuestStatus::parse(&status_raw) == Some(QuestStatus::Completed) {
                            warn!(
                                "User {} attempted to pick up completed quest {}.",
                                user_id, quest_id
                            );
                            return Err(AppError::Conflict(format!(
                                "Quest {} is already completed for user {}.",
                                quest_id, user_id
                            )));
                        }

                        if QuestStatus::parse(&status_raw) == Some(QuestStatus::PickedUp) {
                            // Already in hand: refresh the pickup timestamp only.
                            diesel::update(uq_dsl::user_quests.filter(uq_dsl::id.eq(enrollment_id)))
                                .set(uq_dsl::last_picked_up_at.eq(now))
                                .execute(tx)?;

                            info!(
                                "User {} re-picked up active quest {} (idempotent).",
                                user_id, quest_id
                            );
                            return Ok(PickupQuestResponse {
                                enrollment_id,
                                status: QuestStatus::PickedUp.as_str().to_string(),
                                times_picked_up,
                                is_returning: false,
                                personalization_completed,
                            });
                        }

                        let new_times = times_picked_up + 1;
                        diesel::update(uq_dsl::user_quests.filter(uq_dsl::id.eq(enrollment_id)))
                            .set((
                                uq_dsl::status.eq(QuestStatus::PickedUp.as_str()),
                                uq_dsl::is_active.eq(true),
                                uq_dsl::completed_at.eq(None::<DateTime<Utc>>),
                                uq_dsl::times_picked_up.eq(new_times),
                                uq_dsl::last_picked_up_at.eq(now),
                            ))
                            .execute(tx)?;

                        info!(
                            "User {} returned to quest {} (pickup #{}).",
                            user_id, quest_id, new_times
                        );
                        Ok(PickupQuestResponse {
                            enrollment_id,
                            status: QuestStatus::PickedUp.as_str().to_string(),
                            times_picked_up: new_times,
                            is_returning: true,
                            personalization_completed,
                        })
                    }
                }
            })
        })
        .await?;

    transaction_result.map(ApiResponse::ok)
}

/// Copies a course quest's approved template tasks into per-user rows.
/// Runs once, on the first pickup of the quest by this user.
fn personalize_course_tasks(
    conn: &mut PgConnection,
    quest_id: i64,
    user_id: Uuid,
) -> Result<(), DieselError> {
    let templates = qt_dsl::quest_tasks
        .filter(qt_dsl::quest_id.eq(quest_id))
        .filter(qt_dsl::user_id.is_null())
        .filter(qt_dsl::approval_status.eq(ApprovalStatus::Approved.as_str()))
        .select((
            qt_dsl::title,
            qt_dsl::description,
            qt_dsl::pillar,
            qt_dsl::xp_value,
            qt_dsl::order_index,
            qt_dsl::is_required,
        ))
        .load::<(String, String, String, i32, i32, bool)>(conn)?;

    if templates.is_empty() {
        return Ok(());
    }

    let copies: Vec<NewQuestTask> = templates
        .into_iter()
        .map(
            |(title, description, pillar, xp_value, order_index, is_required)| NewQuestTask {
                quest_id,
                user_id: Some(user_id),
                title,
                description,
                pillar,
                xp_value,
                order_index,
                approval_status: ApprovalStatus::Approved.as_str().to_string(),
                is_required,
            },
        )
        .collect();

    diesel::insert_into(qt_dsl::quest_tasks)
        .values(&copies)
        .execute(conn)?;

    Ok(())
}

/// Sets down a quest: a conscious pause, as opposed to abandoning it. The
/// enrollment stays in place and can be picked back up later. An optional
/// reflection note is appended to the enrollment's ordered note list.
///
/// Request Body: `SetDownQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `404 Not Found`: If no enrollment exists for the user and quest.
/// * `422 Unprocessable Entity`: If the enrollment is already completed.
/// * `500 Internal Server Error`: If a database error or transaction failure occurs.
#[instrument(skip(pool, payload))]
pub async fn set_down_quest(
    State(pool): State<Pool>,
    Json(payload): Json<SetDownQuestPayload>,
) -> Result<ApiResponse<()>, AppError> {
    info!(
        "Attempting to set down quest {} for user_id: {}",
        payload.quest_id, payload.user_id
    );
    debug!("Set down quest payload: {:?}", payload);

    let conn = pool.get().await?;
    let transaction_result: Result<(), AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx| {
                let user_id = payload.user_id;
                let quest_id = payload.quest_id;

                let existing = uq_dsl::user_quests
                    .filter(uq_dsl::user_id.eq(user_id))
                    .filter(uq_dsl::quest_id.eq(quest_id))
                    .select((uq_dsl::id, uq_dsl::status, uq_dsl::reflection_notes))
                    .first::<(i64, String, JsonValue)>(tx)
                    .optional()?;

                let (enrollment_id, status_raw, notes_raw) = match existing {
                    Some(row) => row,
                    None => {
                        warn!(
                            "No enrollment found to set down for user {} and quest {}.",
                            user_id, quest_id
                        );
                        return Err(AppError::NotFound(format!(
                            "No enrollment found for user {} and quest {}.",
                            user_id, quest_id
                        )));
                    }
                };

                if QuestStatus::parse(&status_raw) == Some(QuestStatus::Completed) {
                    warn!(
                        "User {} attempted to set down completed quest {}.",
                        user_id, quest_id
                    );
                    return Err(AppError::UnprocessableEntity(format!(
                        "Quest {} is already completed and cannot be set down.",
                        quest_id
                    )));
                }

                let updated_notes = match payload.reflection_note {
                    Some(ref note) => {
                        let mut items = match notes_raw {
                            JsonValue::Array(items) => items,
                            _ => {
                                warn!(
                                    "Enrollment {} had non-array reflection_notes; resetting.",
                                    enrollment_id
                                );
                                Vec::new()
                            }
                        };
                        let entry = ReflectionNote {
                            note: note.clone(),
                            prompt_id: payload.prompt_id,
                            created_at: Utc::now(),
                        };
                        items.push(serde_json::to_value(entry).map_err(|e| {
                            AppError::InternalServerError(anyhow!(
                                "Failed to serialize reflection note: {}",
                                e
                            ))
                        })?);
                        Some(JsonValue::Array(items))
                    }
                    None => None,
                };

                match updated_notes {
                    Some(notes) => {
                        diesel::update(uq_dsl::user_quests.filter(uq_dsl::id.eq(enrollment_id)))
                            .set((
                                uq_dsl::status.eq(QuestStatus::SetDown.as_str()),
                                uq_dsl::is_active.eq(false),
                                uq_dsl::last_set_down_at.eq(now),
                                uq_dsl::reflection_notes.eq(notes),
                            ))
                            .execute(tx)?;
                    }
                    None => {
                        diesel::update(uq_dsl::user_quests.filter(uq_dsl::id.eq(enrollment_id)))
                            .set((
                                uq_dsl::status.eq(QuestStatus::SetDown.as_str()),
                                uq_dsl::is_active.eq(false),
                                uq_dsl::last_set_down_at.eq(now),
                            ))
                            .execute(tx)?;
                    }
                }

                info!(
                    "User {} set down quest {} (enrollment {}).",
                    user_id, quest_id, enrollment_id
                );
                Ok(())
            })
        })
        .await?;

    transaction_result.map(ApiResponse::ok)
}

/// Retrieves enrollment IDs for a given user.
/// Can filter for active enrollments only.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
/// * `active`: If true, only return enrollments that are picked up and whose quest is active.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<i64>`: List of user_quests IDs (200 OK).
/// * `404 Not Found`: If the specified user_id does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_user_quests(
    State(pool): State<Pool>,
    Query(params): Query<GetUserQuestsParams>,
) -> Result<ApiResponse<Vec<i64>>, AppError> {
    let user_id = params.user_id;
    let only_active = params.active;

    info!(
        "Fetching quest enrollments for user_id: {}. Active only: {}",
        user_id, only_active
    );
    debug!("Get user quests params: {:?}", params);

    let user_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(users_dsl::users.find(user_id)))
            .get_result::<bool>(conn)
    })
    .await?;

    if !user_exists {
        error!("User with ID {} not found.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }
    info!("User {} found. Fetching enrollments...", user_id);

    let enrollment_ids = if !only_active {
        helper::run_query(&pool, move |conn_sync| {
            uq_dsl::user_quests
                .filter(uq_dsl::user_id.eq(user_id))
                .select(uq_dsl::id)
                .load::<i64>(conn_sync)
        })
        .await?
    } else {
        helper::run_query(&pool, move |conn_sync| {
            uq_dsl::user_quests
                .filter(uq_dsl::user_id.eq(user_id))
                .filter(uq_dsl::is_active.eq(true))
                .inner_join(quests_dsl::quests.on(uq_dsl::quest_id.eq(quests_dsl::id)))
                .filter(quests_dsl::is_active.eq(true))
                .select(uq_dsl::id)
                .load::<i64>(conn_sync)
        })
        .await?
    };

    info!(
        "Successfully fetched {} enrollments for user_id: {}",
        enrollment_ids.len(),
        user_id
    );
    Ok(ApiResponse::ok(enrollment_ids))
}

/// Retrieves detailed metadata for a specific enrollment and its quest.
///
/// Path Parameters:
/// * `enrollment_id`: The ID of the user_quests record.
///
/// Returns (wrapped in `ApiResponse`)
/// * `EnrollmentMetadata`: The combined metadata (200 OK).
/// * `404 Not Found`: If the specified enrollment ID does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool))]
pub async fn get_enrollment_metadata(
    State(pool): State<Pool>,
    Path(enrollment_id): Path<i64>,
) -> Result<ApiResponse<EnrollmentMetadata>, AppError> {
    info!(
        "Fetching enrollment metadata for enrollment_id: {}",
        enrollment_id
    );

    type QueryResultTuple = (
        i64,                   // uq.id
        String,                // uq.status
        bool,                  // uq.is_active
        DateTime<Utc>,         // uq.started_at
        Option<DateTime<Utc>>, // uq.completed_at
        DateTime<Utc>,         // uq.last_picked_up_at
        Option<DateTime<Utc>>, // uq.last_set_down_at
        i32,                   // uq.times_picked_up
        JsonValue,             // uq.reflection_notes
        bool,                  // uq.personalization_completed
        i64,                   // q.id
        String,                // q.title
        String,                // q.description
        String,                // q.quest_type
        bool,                  // q.is_active
    );

    let data = helper::run_query(&pool, move |conn_sync| {
        uq_dsl::user_quests
            .filter(uq_dsl::id.eq(enrollment_id))
            .inner_join(quests_dsl::quests.on(uq_dsl::quest_id.eq(quests_dsl::id)))
            .select((
                uq_dsl::id,
                uq_dsl::status,
                uq_dsl::is_active,
                uq_dsl::started_at,
                uq_dsl::completed_at,
                uq_dsl::last_picked_up_at,
                uq_dsl::last_set_down_at,
                uq_dsl::times_picked_up,
                uq_dsl::reflection_notes,
                uq_dsl::personalization_completed,
                quests_dsl::id,
                quests_dsl::title,
                quests_dsl::description,
                quests_dsl::quest_type,
                quests_dsl::is_active,
            ))
            .first::<QueryResultTuple>(conn_sync)
    })
    .await?;

    let metadata = EnrollmentMetadata {
        enrollment_id: data.0,
        status: data.1,
        is_active: data.2,
        started_at: data.3,
        completed_at: data.4,
        last_picked_up_at: data.5,
        last_set_down_at: data.6,
        times_picked_up: data.7,
        reflection_notes: data.8,
        personalization_completed: data.9,
        quest_id: data.10,
        quest_title: data.11,
        quest_description: data.12,
        quest_type: data.13,
        quest_active: data.14,
    };
    info!(
        "Successfully fetched enrollment metadata for enrollment_id: {}",
        enrollment_id
    );
    Ok(ApiResponse::ok(metadata))
}

/// Marks a task complete for a user, awards its XP to the task's pillar,
/// reports any badge thresholds crossed by the award, and recomputes quest
/// completion: when every required task visible to the user is done, the
/// enrollment flips to completed in the same transaction.
///
/// Request Body: `CompleteTaskPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `TaskCompletionResponse`: Awarded XP, new pillar total, completion state (200 OK).
/// * `403 Forbidden`: If the task is personalized for another user.
/// * `404 Not Found`: If the enrollment or task does not exist.
/// * `409 Conflict`: If the task was already completed by this user.
/// * `422 Unprocessable Entity`: If the quest is not picked up, the task does not
///   belong to the quest, or the task is not approved.
/// * `500 Internal Server Error`: If a database error or transaction failure occurs.
#[instrument(skip(pool, payload))]
pub async fn complete_task(
    State(pool): State<Pool>,
    Json(payload): Json<CompleteTaskPayload>,
) -> Result<ApiResponse<TaskCompletionResponse>, AppError> {
    info!(
        "Attempting task completion for task_id: {}, user_id: {}, quest_id: {}",
        payload.task_id, payload.user_id, payload.quest_id
    );
    debug!("Complete task payload: {:?}", payload);

    let conn = pool.get().await?;
    let transaction_result: Result<TaskCompletionResponse, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx| {
                let user_id = payload.user_id;
                let quest_id = payload.quest_id;
                let task_id = payload.task_id;

                let enrollment = uq_dsl::user_quests
                    .filter(uq_dsl::user_id.eq(user_id))
                    .filter(uq_dsl::quest_id.eq(quest_id))
                    .select((uq_dsl::id, uq_dsl::is_active, uq_dsl::personalization_completed))
                    .first::<(i64, bool, bool)>(tx)
                    .optional()?;

                let (enrollment_id, is_active, personalized) = match enrollment {
                    Some(row) => row,
                    None => {
                        warn!(
                            "No enrollment found for user {} and quest {}. Cannot complete task.",
                            user_id, quest_id
                        );
                        return Err(AppError::NotFound(format!(
                            "No enrollment found for user {} and quest {}.",
                            user_id, quest_id
                        )));
                    }
                };

                if !is_active {
                    warn!(
                        "User {} attempted to complete task {} on a quest that is not picked up.",
                        user_id, task_id
                    );
                    return Err(AppError::UnprocessableEntity(format!(
                        "Quest {} is not currently picked up by user {}.",
                        quest_id, user_id
                    )));
                }

                let task = qt_dsl::quest_tasks
                    .find(task_id)
                    .select((
                        qt_dsl::quest_id,
                        qt_dsl::user_id,
                        qt_dsl::pillar,
                        qt_dsl::xp_value,
                        qt_dsl::approval_status,
                    ))
                    .first::<(i64, Option<Uuid>, String, i32, String)>(tx)
                    .optional()?;

                let (task_quest_id, task_owner, pillar_raw, xp_value, approval_raw) = match task {
                    Some(row) => row,
                    None => {
                        warn!("Task with ID {} not found.", task_id);
                        return Err(AppError::NotFound(format!(
                            "Task with ID {} not found.",
                            task_id
                        )));
                    }
                };

                if task_quest_id != quest_id {
                    warn!(
                        "Task {} belongs to quest {}, not quest {}.",
                        task_id, task_quest_id, quest_id
                    );
                    return Err(AppError::UnprocessableEntity(format!(
                        "Task {} does not belong to quest {}.",
                        task_id, quest_id
                    )));
                }

                match task_owner {
                    Some(owner) if owner != user_id => {
                        warn!(
                            "Task {} is personalized for user {}, not user {}.",
                            task_id, owner, user_id
                        );
                        return Err(AppError::Forbidden(format!(
                            "Task {} is personalized for another user.",
                            task_id
                        )));
                    }
                    None if personalized => {
                        warn!(
                            "User {} attempted to complete template task {} on a personalized quest.",
                            user_id, task_id
                        );
                        return Err(AppError::UnprocessableEntity(format!(
                            "Task {} is a template; complete your personalized copy instead.",
                            task_id
                        )));
                    }
                    _ => {}
                }

                if ApprovalStatus::parse(&approval_raw) != Some(ApprovalStatus::Approved) {
                    warn!(
                        "Task {} has approval status '{}' and cannot be completed.",
                        task_id, approval_raw
                    );
                    return Err(AppError::UnprocessableEntity(format!(
                        "Task {} is not approved.",
                        task_id
                    )));
                }

                let pillar = Pillar::parse(&pillar_raw).ok_or_else(|| {
                    error!("Task {} carries unknown pillar '{}'.", task_id, pillar_raw);
                    AppError::InternalServerError(anyhow!(
                        "Task {} carries unknown pillar '{}'",
                        task_id,
                        pillar_raw
                    ))
                })?;

                let new_completion = NewTaskCompletion {
                    user_id,
                    task_id,
                    quest_id,
                    evidence_url: payload.evidence_url.clone(),
                    evidence_text: payload.evidence_text.clone(),
                };

                let completion_id = diesel::insert_into(tcmp_dsl::task_completions)
                    .values(&new_completion)
                    .returning(tcmp_dsl::id)
                    .get_result::<i64>(tx)
                    .map_err(|e| {
                        if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &e {
                            warn!(
                                "User {} already completed task {}. Details: {}",
                                user_id,
                                task_id,
                                info.message()
                            );
                            AppError::Conflict(format!(
                                "Task {} is already completed by user {}.",
                                task_id, user_id
                            ))
                        } else {
                            AppError::from(e)
                        }
                    })?;

                let (old_total, new_total) =
                    helper::award_pillar_xp(tx, user_id, pillar.as_str(), xp_value)?;

                info!(
                    "Awarded {} XP in pillar '{}' to user {} ({} -> {}).",
                    xp_value, pillar, user_id, old_total, new_total
                );

                let crossed_badges = badges_dsl::badges
                    .filter(badges_dsl::is_active.eq(true))
                    .filter(badges_dsl::pillar_primary.eq(pillar.as_str()))
                    .select((
                        badges_dsl::id,
                        badges_dsl::name,
                        badges_dsl::pillar_primary,
                        badges_dsl::min_xp,
                    ))
                    .load::<BadgeSummary>(tx)?
                    .into_iter()
                    .filter(|b| newly_crossed(b.min_xp, old_total, new_total))
                    .collect::<Vec<_>>();

                let quest_completed =
                    recompute_quest_completion(tx, enrollment_id, quest_id, user_id, personalized)?;

                Ok(TaskCompletionResponse {
                    completion_id,
                    pillar: pillar.as_str().to_string(),
                    xp_awarded: xp_value,
                    new_pillar_xp: new_total,
                    quest_completed,
                    unlocked_badges: crossed_badges,
                })
            })
        })
        .await?;

    transaction_result.map(ApiResponse::ok)
}

/// Recomputes the "all required tasks done" invariant for an enrollment.
/// Called inside the task-completion transaction so an enrollment can never
/// be left behind its tasks. Quests with no required tasks never
/// auto-complete.
fn recompute_quest_completion(
    conn: &mut PgConnection,
    enrollment_id: i64,
    quest_id: i64,
    user_id: Uuid,
    personalized: bool,
) -> Result<bool, DieselError> {
    let required_task_ids: Vec<i64> = if personalized {
        qt_dsl::quest_tasks
            .filter(qt_dsl::quest_id.eq(quest_id))
            .filter(qt_dsl::user_id.eq(user_id))
            .filter(qt_dsl::approval_status.eq(ApprovalStatus::Approved.as_str()))
            .filter(qt_dsl::is_required.eq(true))
            .select(qt_dsl::id)
            .load::<i64>(conn)?
    } else {
        qt_dsl::quest_tasks
            .filter(qt_dsl::quest_id.eq(quest_id))
            .filter(qt_dsl::user_id.is_null())
            .filter(qt_dsl::approval_status.eq(ApprovalStatus::Approved.as_str()))
            .filter(qt_dsl::is_required.eq(true))
            .select(qt_dsl::id)
            .load::<i64>(conn)?
    };

    if required_task_ids.is_empty() {
        return Ok(false);
    }

    let completed_count = tcmp_dsl::task_completions
        .filter(tcmp_dsl::user_id.eq(user_id))
        .filter(tcmp_dsl::quest_id.eq(quest_id))
        .filter(tcmp_dsl::task_id.eq_any(&required_task_ids))
        .select(diesel::dsl::count_distinct(tcmp_dsl::task_id))
        .get_result::<i64>(conn)?;

    if completed_count < required_task_ids.len() as i64 {
        return Ok(false);
    }

    diesel::update(uq_dsl::user_quests.filter(uq_dsl::id.eq(enrollment_id)))
        .set((
            uq_dsl::status.eq(QuestStatus::Completed.as_str()),
            uq_dsl::is_active.eq(false),
            uq_dsl::completed_at.eq(now),
        ))
        .execute(conn)?;

    info!(
        "All {} required tasks done; enrollment {} marked completed.",
        required_task_ids.len(),
        enrollment_id
    );
    Ok(true)
}

/// Invites another student to collaborate on a task. A successful invite
/// creates a pending collaboration the invitee must accept.
///
/// Request Body: `InviteCollaboratorPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CollaborationResponse`: The new pending collaboration (200 OK).
/// * `404 Not Found`: If the task, inviter or invitee does not exist.
/// * `409 Conflict`: If a collaboration on this task already references the invitee.
/// * `422 Unprocessable Entity`: If the inviter invites themselves.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn invite_collaborator(
    State(pool): State<Pool>,
    Json(payload): Json<InviteCollaboratorPayload>,
) -> Result<ApiResponse<CollaborationResponse>, AppError> {
    let task_id = payload.task_id;
    let inviter_id = payload.inviter_id;
    let invitee_id = payload.invitee_id;

    info!(
        "User {} inviting user {} to collaborate on task {}",
        inviter_id, invitee_id, task_id
    );
    debug!("Invite collaborator payload: {:?}", payload);

    if inviter_id == invitee_id {
        warn!("User {} attempted to invite themselves.", inviter_id);
        return Err(AppError::UnprocessableEntity(
            "A student cannot collaborate with themselves.".to_string(),
        ));
    }

    let task_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(qt_dsl::quest_tasks.find(task_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !task_exists {
        error!("Task with ID {} not found.", task_id);
        return Err(AppError::NotFound(format!(
            "Task with ID {} not found.",
            task_id
        )));
    }

    let both_exist = helper::run_query(&pool, move |conn| {
        users_dsl::users
            .filter(users_dsl::id.eq_any(vec![inviter_id, invitee_id]))
            .count()
            .get_result::<i64>(conn)
    })
    .await?;
    if both_exist != 2 {
        error!(
            "Inviter {} or invitee {} not found.",
            inviter_id, invitee_id
        );
        return Err(AppError::NotFound(format!(
            "User with ID {} or {} not found.",
            inviter_id, invitee_id
        )));
    }

    let invitee_already_involved = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(
            tc_dsl::task_collaborations
                .filter(tc_dsl::task_id.eq(task_id))
                .filter(
                    tc_dsl::student_1_id
                        .eq(invitee_id)
                        .or(tc_dsl::student_2_id.eq(invitee_id)),
                ),
        ))
        .get_result::<bool>(conn)
    })
    .await?;
    if invitee_already_involved {
        warn!(
            "Invitee {} already referenced by a collaboration on task {}.",
            invitee_id, task_id
        );
        return Err(AppError::Conflict(format!(
            "User {} is already part of a collaboration on task {}.",
            invitee_id, task_id
        )));
    }

    let new_collaboration = NewTaskCollaboration {
        task_id,
        student_1_id: inviter_id,
        student_2_id: invitee_id,
        status: CollaborationStatus::Pending.as_str().to_string(),
        double_xp_awarded: false,
    };

    let collaboration_id = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(tc_dsl::task_collaborations)
            .values(&new_collaboration)
            .returning(tc_dsl::id)
            .get_result::<i64>(conn_sync)
    })
    .await?;

    info!(
        "Created pending collaboration {} on task {} ({} -> {}).",
        collaboration_id, task_id, inviter_id, invitee_id
    );
    Ok(ApiResponse::ok(CollaborationResponse {
        collaboration_id,
        status: CollaborationStatus::Pending.as_str().to_string(),
    }))
}

/// Accepts a pending collaboration invite. Only the invited student may
/// accept.
///
/// Request Body: `AcceptCollaborationPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CollaborationResponse`: The now-active collaboration (200 OK).
/// * `403 Forbidden`: If the acting user is not the invitee.
/// * `404 Not Found`: If the collaboration does not exist.
/// * `409 Conflict`: If the collaboration is not pending.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn accept_collaboration(
    State(pool): State<Pool>,
    Json(payload): Json<AcceptCollaborationPayload>,
) -> Result<ApiResponse<CollaborationResponse>, AppError> {
    let collaboration_id = payload.collaboration_id;
    let user_id = payload.user_id;

    info!(
        "User {} accepting collaboration {}",
        user_id, collaboration_id
    );

    let row = helper::run_query(&pool, move |conn| {
        tc_dsl::task_collaborations
            .find(collaboration_id)
            .select((tc_dsl::student_2_id, tc_dsl::status))
            .first::<(Uuid, String)>(conn)
            .optional()
    })
    .await?;

    let (invitee_id, status_raw) = match row {
        Some(row) => row,
        None => {
            error!("Collaboration with ID {} not found.", collaboration_id);
            return Err(AppError::NotFound(format!(
                "Collaboration with ID {} not found.",
                collaboration_id
            )));
        }
    };

    if invitee_id != user_id {
        warn!(
            "User {} is not the invitee of collaboration {}.",
            user_id, collaboration_id
        );
        return Err(AppError::Forbidden(
            "Only the invited student can accept a collaboration.".to_string(),
        ));
    }

    if CollaborationStatus::parse(&status_raw) != Some(CollaborationStatus::Pending) {
        warn!(
            "Collaboration {} is '{}', not pending; cannot accept.",
            collaboration_id, status_raw
        );
        return Err(AppError::Conflict(format!(
            "Collaboration {} is not pending.",
            collaboration_id
        )));
    }

    helper::run_query(&pool, move |conn_sync| {
        diesel::update(tc_dsl::task_collaborations.find(collaboration_id))
            .set((
                tc_dsl::status.eq(CollaborationStatus::Active.as_str()),
                tc_dsl::accepted_at.eq(now),
            ))
            .execute(conn_sync)
    })
    .await?;

    info!("Collaboration {} is now active.", collaboration_id);
    Ok(ApiResponse::ok(CollaborationResponse {
        collaboration_id,
        status: CollaborationStatus::Active.as_str().to_string(),
    }))
}

/// Declines a pending collaboration invite, removing it. Only the invited
/// student may decline.
///
/// Request Body: `DeclineCollaborationPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the acting user is not the invitee.
/// * `404 Not Found`: If the collaboration does not exist.
/// * `409 Conflict`: If the collaboration is not pending.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn decline_collaboration(
    State(pool): State<Pool>,
    Json(payload): Json<DeclineCollaborationPayload>,
) -> Result<ApiResponse<()>, AppError> {
    let collaboration_id = payload.collaboration_id;
    let user_id = payload.user_id;

    info!(
        "User {} declining collaboration {}",
        user_id, collaboration_id
    );

    let row = helper::run_query(&pool, move |conn| {
        tc_dsl::task_collaborations
            .find(collaboration_id)
            .select((tc_dsl::student_2_id, tc_dsl::status))
            .first::<(Uuid, String)>(conn)
            .optional()
    })
    .await?;

    let (invitee_id, status_raw) = match row {
        Some(row) => row,
        None => {
            error!("Collaboration with ID {} not found.", collaboration_id);
            return Err(AppError::NotFound(format!(
                "Collaboration with ID {} not found.",
                collaboration_id
            )));
        }
    };

    if invitee_id != user_id {
        warn!(
            "User {} is not the invitee of collaboration {}.",
            user_id, collaboration_id
        );
        return Err(AppError::Forbidden(
            "Only the invited student can decline a collaboration.".to_string(),
        ));
    }

    if CollaborationStatus::parse(&status_raw) != Some(CollaborationStatus::Pending) {
        warn!(
            "Collaboration {} is '{}', not pending; cannot decline.",
            collaboration_id, status_raw
        );
        return Err(AppError::Conflict(format!(
            "Collaboration {} is not pending.",
            collaboration_id
        )));
    }

    helper::run_query(&pool, move |conn_sync| {
        diesel::delete(tc_dsl::task_collaborations.find(collaboration_id)).execute(conn_sync)
    })
    .await?;

    info!("Collaboration {} declined and removed.", collaboration_id);
    Ok(ApiResponse::ok(()))
}

/// Pays the collaboration bonus for a task: both participants receive the
/// task's base XP a second time. The `double_xp_awarded` flag makes the
/// payout at-most-once; the flag flip and both awards share one
/// transaction.
///
/// Request Body: `CompleteCollaborationPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `CollaborationCompletionResponse`: Payout state (200 OK). `has_collaboration`
///   is false when no accepted collaboration exists for the task;
///   `already_awarded` is true when the bonus was paid earlier.
/// * `404 Not Found`: If the collaboration references a task that no longer exists.
/// * `500 Internal Server Error`: If a database error or transaction failure occurs.
#[instrument(skip(pool, payload))]
pub async fn complete_collaboration(
    State(pool): State<Pool>,
    Json(payload): Json<CompleteCollaborationPayload>,
) -> Result<ApiResponse<CollaborationCompletionResponse>, AppError> {
    let task_id = payload.task_id;
    info!("Completing collaboration for task_id: {}", task_id);

    let conn = pool.get().await?;
    let transaction_result: Result<CollaborationCompletionResponse, AppError> = conn
        .interact(move |conn_sync| {
            conn_sync.transaction(|tx| {
                let row = tc_dsl::task_collaborations
                    .filter(tc_dsl::task_id.eq(task_id))
                    .filter(tc_dsl::status.ne(CollaborationStatus::Pending.as_str()))
                    .order(tc_dsl::created_at.desc())
                    .select((
                        tc_dsl::id,
                        tc_dsl::student_1_id,
                        tc_dsl::student_2_id,
                        tc_dsl::double_xp_awarded,
                    ))
                    .first::<(i64, Uuid, Uuid, bool)>(tx)
                    .optional()?;

                let (collaboration_id, student_1_id, student_2_id, double_xp_awarded) = match row {
                    Some(row) => row,
                    None => {
                        info!("No accepted collaboration found for task {}.", task_id);
                        return Ok(CollaborationCompletionResponse {
                            has_collaboration: false,
                            already_awarded: false,
                            pillar: None,
                            xp_awarded_each: None,
                        });
                    }
                };

                if double_xp_awarded {
                    info!(
                        "Collaboration {} bonus already awarded; skipping.",
                        collaboration_id
                    );
                    return Ok(CollaborationCompletionResponse {
                        has_collaboration: true,
                        already_awarded: true,
                        pillar: None,
                        xp_awarded_each: None,
                    });
                }

                let (pillar_raw, xp_value) = qt_dsl::quest_tasks
                    .find(task_id)
                    .select((qt_dsl::pillar, qt_dsl::xp_value))
                    .first::<(String, i32)>(tx)
                    .map_err(|e| match e {
                        DieselError::NotFound => {
                            error!(
                                "Task {} referenced by collaboration {} not found.",
                                task_id, collaboration_id
                            );
                            AppError::NotFound(format!("Task with ID {} not found.", task_id))
                        }
                        _ => AppError::from(e),
                    })?;

                let pillar = Pillar::parse(&pillar_raw).ok_or_else(|| {
                    error!("Task {} carries unknown pillar '{}'.", task_id, pillar_raw);
                    AppError::InternalServerError(anyhow!(
                        "Task {} carries unknown pillar '{}'",
                        task_id,
                        pillar_raw
                    ))
                })?;

                helper::award_pillar_xp(tx, student_1_id, pillar.as_str(), xp_value)?;
                helper::award_pillar_xp(tx, student_2_id, pillar.as_str(), xp_value)?;

                diesel::update(tc_dsl::task_collaborations.find(collaboration_id))
                    .set((
                        tc_dsl::status.eq(CollaborationStatus::Completed.as_str()),
                        tc_dsl::double_xp_awarded.eq(true),
                        tc_dsl::completed_at.eq(now),
                    ))
                    .execute(tx)?;

                info!(
                    "Collaboration {} completed; {} bonus XP in '{}' paid to {} and {}.",
                    collaboration_id, xp_value, pillar, student_1_id, student_2_id
                );
                Ok(CollaborationCompletionResponse {
                    has_collaboration: true,
                    already_awarded: false,
                    pillar: Some(pillar.as_str().to_string()),
                    xp_awarded_each: Some(xp_value),
                })
            })
        })
        .await?;

    transaction_result.map(ApiResponse::ok)
}

/// Retrieves a user's XP split by pillar, with the overall total, its
/// display rounding (nearest 50) and the mastery level for the total.
/// Every pillar appears in the map, zero-filled when no XP exists yet;
/// legacy pillar keys in stored rows normalize onto the canonical set.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `XpBreakdownResponse`: Pillar map plus totals (200 OK).
/// * `404 Not Found`: If the specified user does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_xp_breakdown(
    State(pool): State<Pool>,
    Query(params): Query<GetXpBreakdownParams>,
) -> Result<ApiResponse<XpBreakdownResponse>, AppError> {
    let user_id = params.user_id;
    info!("Fetching XP breakdown for user_id: {}", user_id);

    let user_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(users_dsl::users.find(user_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !user_exists {
        error!("User with ID {} not found.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    let rows = helper::run_query(&pool, move |conn_sync| {
        upx_dsl::user_pillar_xp
            .filter(upx_dsl::user_id.eq(user_id))
            .select((upx_dsl::pillar, upx_dsl::xp_amount))
            .load::<(String, i32)>(conn_sync)
    })
    .await?;

    let mut pillars: BTreeMap<String, i32> = ALL_PILLARS
        .iter()
        .map(|p| (p.as_str().to_string(), 0))
        .collect();

    for (pillar_raw, amount) in rows {
        match Pillar::parse(&pillar_raw) {
            Some(pillar) => {
                *pillars.entry(pillar.as_str().to_string()).or_insert(0) += amount;
            }
            None => {
                warn!(
                    "Skipping XP row with unknown pillar '{}' for user {}.",
                    pillar_raw, user_id
                );
            }
        }
    }

    let total: i64 = pillars.values().map(|v| *v as i64).sum();
    let response = XpBreakdownResponse {
        pillars,
        total,
        rounded_total: round_to_nearest_50(total),
        mastery_level: calculate_mastery_level(total),
    };

    info!(
        "Successfully fetched XP breakdown for user {}: total {}, level {}",
        user_id, response.total, response.mastery_level
    );
    Ok(ApiResponse::ok(response))
}

/// Computes the badges a user has earned. Earned status is derived on
/// read: a badge qualifies when the user's XP in its primary pillar meets
/// `min_xp` and the user has completed at least `min_quests` quests that
/// contain an approved task in that pillar. Nothing is persisted.
///
/// Query Parameters:
/// * `user_id`: The ID of the user.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<EarnedBadge>`: Badges currently earned (200 OK).
/// * `404 Not Found`: If the specified user does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_earned_badges(
    State(pool): State<Pool>,
    Query(params): Query<GetEarnedBadgesParams>,
) -> Result<ApiResponse<Vec<EarnedBadge>>, AppError> {
    let user_id = params.user_id;
    info!("Computing earned badges for user_id: {}", user_id);

    let user_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(users_dsl::users.find(user_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !user_exists {
        error!("User with ID {} not found.", user_id);
        return Err(AppError::NotFound(format!(
            "User with ID {} not found.",
            user_id
        )));
    }

    let earned = helper::run_query(&pool, move |conn_sync| {
        let all_badges = badges_dsl::badges
            .filter(badges_dsl::is_active.eq(true))
            .select((
                badges_dsl::id,
                badges_dsl::name,
                badges_dsl::description,
                badges_dsl::pillar_primary,
                badges_dsl::min_xp,
                badges_dsl::min_quests,
            ))
            .load::<EarnedBadge>(conn_sync)?;

        let xp_rows = upx_dsl::user_pillar_xp
            .filter(upx_dsl::user_id.eq(user_id))
            .select((upx_dsl::pillar, upx_dsl::xp_amount))
            .load::<(String, i32)>(conn_sync)?;

        let mut pillar_xp: BTreeMap<&'static str, i32> = BTreeMap::new();
        for (pillar_raw, amount) in xp_rows {
            if let Some(pillar) = Pillar::parse(&pillar_raw) {
                *pillar_xp.entry(pillar.as_str()).or_insert(0) += amount;
            }
        }

        let mut completed_per_pillar: BTreeMap<&'static str, i64> = BTreeMap::new();
        let mut result = Vec::new();
        for badge in all_badges {
            let pillar = match Pillar::parse(&badge.pillar_primary) {
                Some(p) => p,
                None => continue,
            };

            let xp = pillar_xp.get(pillar.as_str()).copied().unwrap_or(0);
            if xp < badge.min_xp {
                continue;
            }

            let completed = match completed_per_pillar.get(pillar.as_str()) {
                Some(count) => *count,
                None => {
                    let count = uq_dsl::user_quests
                        .inner_join(
                            qt_dsl::quest_tasks.on(qt_dsl::quest_id.eq(uq_dsl::quest_id)),
                        )
                        .filter(uq_dsl::user_id.eq(user_id))
                        .filter(uq_dsl::status.eq(QuestStatus::Completed.as_str()))
                        .filter(qt_dsl::pillar.eq(pillar.as_str()))
                        .filter(qt_dsl::approval_status.eq(ApprovalStatus::Approved.as_str()))
                        .select(diesel::dsl::count_distinct(uq_dsl::quest_id))
                        .get_result::<i64>(conn_sync)?;
                    completed_per_pillar.insert(pillar.as_str(), count);
                    count
                }
            };

            if completed >= badge.min_quests as i64 {
                result.push(badge);
            }
        }
        Ok::<_, DieselError>(result)
    })
    .await?;

    info!(
        "User {} currently qualifies for {} badges.",
        user_id,
        earned.len()
    );
    Ok(ApiResponse::ok(earned))
}
