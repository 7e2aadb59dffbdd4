use super::helper;
use crate::model::advisor::{
    NewAdvisorStudent, NewBadge, NewQuest, NewQuestTask, NewUser, QuestChangeset,
    StudentProgressResponse,
};
use crate::payloads::advisor::{
    ActivateQuestPayload, AddAdvisorStudentPayload, AddQuestTaskPayload, CreateBadgePayload,
    CreateQuestPayload, CreateStudentPayload, DeactivateQuestPayload, GetStudentProgressParams,
    ListStudentsParams, ModifyQuestPayload, RemoveAdvisorStudentPayload, SetTaskApprovalPayload,
    VerifyCompletionPayload,
};
use crate::progression::calculate_mastery_level;
use crate::taxonomy::{self, ALL_PILLARS, ApprovalStatus, Pillar, QuestStatus, QuestType};
use crate::{
    errors::AppError,
    response::ApiResponse,
    schema::{
        advisor_students::dsl as links_dsl, badges::dsl as badges_dsl,
        quest_tasks::dsl as qt_dsl, quests::dsl as quests_dsl,
        task_completions::dsl as tcmp_dsl, user_pillar_xp::dsl as upx_dsl,
        user_quests::dsl as uq_dsl, users::dsl as users_dsl,
    },
};
use anyhow::anyhow;
use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use deadpool_diesel::postgres::Pool;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use std::collections::BTreeMap;
use tracing::log::warn;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// Registers a new user account.
///
/// Request Body: `CreateStudentPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `Uuid`: The new user's ID (201 Created).
/// * `400 Bad Request`: If the role is not in the accepted role set.
/// * `409 Conflict`: If the email is already registered.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_student(
    State(pool): State<Pool>,
    Json(payload): Json<CreateStudentPayload>,
) -> Result<ApiResponse<Uuid>, AppError> {
    info!("Creating user account for email: {}", payload.email);
    debug!("Create student payload: {:?}", payload);

    if !taxonomy::is_valid_role(&payload.role) {
        warn!("Rejected registration with unknown role '{}'.", payload.role);
        return Err(AppError::BadRequest(format!(
            "Role '{}' is not recognized.",
            payload.role
        )));
    }

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: payload.email.clone(),
        display_name: payload.display_name,
        role: payload.role,
        organization_id: payload.organization_id,
        is_dependent: payload.is_dependent.unwrap_or(false),
    };

    let insert_result = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(users_dsl::users)
            .values(&new_user)
            .returning(users_dsl::id)
            .get_result::<Uuid>(conn_sync)
    })
    .await;

    match insert_result {
        Ok(user_id) => {
            info!("Created user {} for email {}", user_id, payload.email);
            Ok(ApiResponse::created(user_id))
        }
        Err(AppError::InternalServerError(ref err)) => {
            if let Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info)) =
                err.downcast_ref::<DieselError>()
            {
                warn!(
                    "Registration conflict for email {}. Details: {}",
                    payload.email,
                    info.message()
                );
                return Err(AppError::Conflict(format!(
                    "Email {} is already registered.",
                    payload.email
                )));
            }
            Err(insert_result.unwrap_err())
        }
        Err(e) => Err(e),
    }
}

/// Links a student to an advisor's roster.
///
/// Request Body: `AddAdvisorStudentPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the advisor or student does not exist.
/// * `409 Conflict`: If the link already exists.
/// * `422 Unprocessable Entity`: If advisor and student are the same user.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn add_advisor_student(
    State(pool): State<Pool>,
    Json(payload): Json<AddAdvisorStudentPayload>,
) -> Result<ApiResponse<()>, AppError> {
    let advisor_id = payload.advisor_id;
    let student_id = payload.student_id;

    info!("Linking student {} to advisor {}", student_id, advisor_id);

    if advisor_id == student_id {
        warn!("Advisor {} attempted a self-link.", advisor_id);
        return Err(AppError::UnprocessableEntity(
            "An advisor cannot be linked to themselves.".to_string(),
        ));
    }

    helper::check_advisor_role(&pool, advisor_id).await?;

    let student_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(users_dsl::users.find(student_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !student_exists {
        error!("Student with ID {} not found.", student_id);
        return Err(AppError::NotFound(format!(
            "Student with ID {} not found.",
            student_id
        )));
    }

    let new_link = NewAdvisorStudent {
        advisor_id,
        student_id,
    };

    let insert_result = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(links_dsl::advisor_students)
            .values(&new_link)
            .execute(conn_sync)
    })
    .await;

    match insert_result {
        Ok(_) => {
            info!(
                "Student {} linked to advisor {}.",
                student_id, advisor_id
            );
            Ok(ApiResponse::ok(()))
        }
        Err(AppError::InternalServerError(ref err)) => {
            if let Some(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) =
                err.downcast_ref::<DieselError>()
            {
                warn!(
                    "Student {} is already linked to advisor {}.",
                    student_id, advisor_id
                );
                return Err(AppError::Conflict(format!(
                    "Student {} is already linked to advisor {}.",
                    student_id, advisor_id
                )));
            }
            Err(insert_result.unwrap_err())
        }
        Err(e) => Err(e),
    }
}

/// Removes a student from an advisor's roster.
///
/// Request Body: `RemoveAdvisorStudentPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `()`: Empty success response (200 OK).
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If no such link exists.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn remove_advisor_student(
    State(pool): State<Pool>,
    Json(payload): Json<RemoveAdvisorStudentPayload>,
) -> Result<ApiResponse<()>, AppError> {
    let advisor_id = payload.advisor_id;
    let student_id = payload.student_id;

    info!(
        "Unlinking student {} from advisor {}",
        student_id, advisor_id
    );

    helper::check_advisor_role(&pool, advisor_id).await?;

    let rows_affected = helper::run_query(&pool, move |conn_sync| {
        diesel::delete(
            links_dsl::advisor_students
                .filter(links_dsl::advisor_id.eq(advisor_id))
                .filter(links_dsl::student_id.eq(student_id)),
        )
        .execute(conn_sync)
    })
    .await?;

    if rows_affected == 0 {
        warn!(
            "No roster link found between advisor {} and student {}.",
            advisor_id, student_id
        );
        return Err(AppError::NotFound(format!(
            "Student {} is not linked to advisor {}.",
            student_id, advisor_id
        )));
    }

    info!(
        "Student {} unlinked from advisor {}.",
        student_id, advisor_id
    );
    Ok(ApiResponse::ok(()))
}

/// Creates a new quest.
///
/// Request Body: `CreateQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new quest ID (201 Created).
/// * `400 Bad Request`: If the quest type is unknown.
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the advisor does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_quest(
    State(pool): State<Pool>,
    Json(payload): Json<CreateQuestPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Advisor {} creating quest '{}'",
        payload.advisor_id, payload.title
    );
    debug!("Create quest payload: {:?}", payload);

    helper::check_advisor_role(&pool, payload.advisor_id).await?;

    if QuestType::parse(&payload.quest_type).is_none() {
        warn!("Rejected quest with unknown type '{}'.", payload.quest_type);
        return Err(AppError::BadRequest(format!(
            "Quest type '{}' is not recognized.",
            payload.quest_type
        )));
    }

    let new_quest = NewQuest {
        title: payload.title,
        description: payload.description,
        quest_type: payload.quest_type,
        organization_id: payload.organization_id,
        is_active: true,
    };

    let quest_id = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(quests_dsl::quests)
            .values(&new_quest)
            .returning(quests_dsl::id)
            .get_result::<i64>(conn_sync)
    })
    .await?;

    info!("Created quest {}.", quest_id);
    Ok(ApiResponse::created(quest_id))
}

/// Applies a partial update to a quest.
///
/// Request Body: `ModifyQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true indicating success (200 OK).
/// * `400 Bad Request`: If no updatable field is present.
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the quest does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn modify_quest(
    State(pool): State<Pool>,
    Json(payload): Json<ModifyQuestPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let quest_id = payload.quest_id;
    info!("Advisor {} modifying quest {}", payload.advisor_id, quest_id);
    debug!("Modify quest payload: {:?}", payload);

    helper::check_advisor_role(&pool, payload.advisor_id).await?;

    if payload.title.is_none() && payload.description.is_none() {
        warn!("Modify quest {} carried no fields to update.", quest_id);
        return Err(AppError::BadRequest(
            "No fields provided to update.".to_string(),
        ));
    }

    let changeset = QuestChangeset {
        title: payload.title,
        description: payload.description,
        is_active: None,
        updated_at: Some(Utc::now()),
    };

    let rows_affected = helper::run_query(&pool, move |conn_sync| {
        diesel::update(quests_dsl::quests.find(quest_id))
            .set(&changeset)
            .execute(conn_sync)
    })
    .await?;

    if rows_affected == 0 {
        error!("Quest with ID {} not found for modification.", quest_id);
        return Err(AppError::NotFound(format!(
            "Quest with ID {} not found.",
            quest_id
        )));
    }

    info!("Quest {} modified.", quest_id);
    Ok(ApiResponse::ok(true))
}

/// Activates a quest, making it visible for pickup.
///
/// Request Body: `ActivateQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true indicating success (200 OK).
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the quest does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn activate_quest(
    State(pool): State<Pool>,
    Json(payload): Json<ActivateQuestPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    set_quest_active(&pool, payload.advisor_id, payload.quest_id, true).await
}

/// Deactivates a quest. Existing enrollments are untouched; the quest
/// simply stops being available for new pickups.
///
/// Request Body: `DeactivateQuestPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true indicating success (200 OK).
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the quest does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn deactivate_quest(
    State(pool): State<Pool>,
    Json(payload): Json<DeactivateQuestPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    set_quest_active(&pool, payload.advisor_id, payload.quest_id, false).await
}

async fn set_quest_active(
    pool: &Pool,
    advisor_id: Uuid,
    quest_id: i64,
    active: bool,
) -> Result<ApiResponse<bool>, AppError> {
    info!(
        "Advisor {} setting quest {} active = {}",
        advisor_id, quest_id, active
    );

    helper::check_advisor_role(pool, advisor_id).await?;

    let rows_affected = helper::run_query(pool, move |conn_sync| {
        diesel::update(quests_dsl::quests.find(quest_id))
            .set((
                quests_dsl::is_active.eq(active),
                quests_dsl::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn_sync)
    })
    .await?;

    if rows_affected == 0 {
        error!("Quest with ID {} not found.", quest_id);
        return Err(AppError::NotFound(format!(
            "Quest with ID {} not found.",
            quest_id
        )));
    }

    info!("Quest {} active flag set to {}.", quest_id, active);
    Ok(ApiResponse::ok(true))
}

/// Adds a template task to a quest. New tasks start in the `pending`
/// approval state and become completable once approved.
///
/// Request Body: `AddQuestTaskPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new task ID (201 Created).
/// * `400 Bad Request`: If the pillar is unknown or the XP value is negative.
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the quest does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn add_quest_task(
    State(pool): State<Pool>,
    Json(payload): Json<AddQuestTaskPayload>,
) -> Result<ApiResponse<i64>, AppError> {
    let quest_id = payload.quest_id;
    info!(
        "Advisor {} adding task '{}' to quest {}",
        payload.advisor_id, payload.title, quest_id
    );
    debug!("Add quest task payload: {:?}", payload);

    helper::check_advisor_role(&pool, payload.advisor_id).await?;

    let pillar = match Pillar::parse(&payload.pillar) {
        Some(p) => p,
        None => {
            warn!("Rejected task with unknown pillar '{}'.", payload.pillar);
            return Err(AppError::BadRequest(format!(
                "Pillar '{}' is not one of the five learning pillars.",
                payload.pillar
            )));
        }
    };

    if payload.xp_value < 0 {
        warn!(
            "Rejected task with negative XP value {} on quest {}.",
            payload.xp_value, quest_id
        );
        return Err(AppError::BadRequest(
            "Task XP value cannot be negative.".to_string(),
        ));
    }

    let quest_exists = helper::run_query(&pool, move |conn| {
        diesel::select(diesel::dsl::exists(quests_dsl::quests.find(quest_id)))
            .get_result::<bool>(conn)
    })
    .await?;
    if !quest_exists {
        error!("Quest with ID {} not found.", quest_id);
        return Err(AppError::NotFound(format!(
            "Quest with ID {} not found.",
            quest_id
        )));
    }

    let new_task = NewQuestTask {
        quest_id,
        user_id: None,
        title: payload.title,
        description: payload.description,
        pillar: pillar.as_str().to_string(),
        xp_value: payload.xp_value,
        order_index: payload.order_index,
        approval_status: ApprovalStatus::Pending.as_str().to_string(),
        is_required: payload.is_required.unwrap_or(true),
    };

    let task_id = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(qt_dsl::quest_tasks)
            .values(&new_task)
            .returning(qt_dsl::id)
            .get_result::<i64>(conn_sync)
    })
    .await?;

    info!("Created task {} on quest {}.", task_id, quest_id);
    Ok(ApiResponse::created(task_id))
}

/// Transitions a task's approval status.
///
/// Request Body: `SetTaskApprovalPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true indicating success (200 OK).
/// * `400 Bad Request`: If the approval status is unknown.
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the task does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn set_task_approval(
    State(pool): State<Pool>,
    Json(payload): Json<SetTaskApprovalPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let task_id = payload.task_id;
    info!(
        "Advisor {} setting approval of task {} to '{}'",
        payload.advisor_id, task_id, payload.approval_status
    );

    helper::check_advisor_role(&pool, payload.advisor_id).await?;

    let status = match ApprovalStatus::parse(&payload.approval_status) {
        Some(s) => s,
        None => {
            warn!(
                "Rejected unknown approval status '{}' for task {}.",
                payload.approval_status, task_id
            );
            return Err(AppError::BadRequest(format!(
                "Approval status '{}' is not recognized.",
                payload.approval_status
            )));
        }
    };

    let rows_affected = helper::run_query(&pool, move |conn_sync| {
        diesel::update(qt_dsl::quest_tasks.find(task_id))
            .set(qt_dsl::approval_status.eq(status.as_str()))
            .execute(conn_sync)
    })
    .await?;

    if rows_affected == 0 {
        error!("Task with ID {} not found.", task_id);
        return Err(AppError::NotFound(format!(
            "Task with ID {} not found.",
            task_id
        )));
    }

    info!("Task {} approval set to '{}'.", task_id, status.as_str());
    Ok(ApiResponse::ok(true))
}

/// Creates a badge threshold definition.
///
/// Request Body: `CreateBadgePayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `i64`: The new badge ID (201 Created).
/// * `400 Bad Request`: If the pillar is unknown or a threshold is negative.
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the advisor does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn create_badge(
    State(pool): State<Pool>,
    Json(payload): Json<CreateBadgePayload>,
) -> Result<ApiResponse<i64>, AppError> {
    info!(
        "Advisor {} creating badge '{}'",
        payload.advisor_id, payload.name
    );
    debug!("Create badge payload: {:?}", payload);

    helper::check_advisor_role(&pool, payload.advisor_id).await?;

    let pillar = match Pillar::parse(&payload.pillar_primary) {
        Some(p) => p,
        None => {
            warn!(
                "Rejected badge with unknown pillar '{}'.",
                payload.pillar_primary
            );
            return Err(AppError::BadRequest(format!(
                "Pillar '{}' is not one of the five learning pillars.",
                payload.pillar_primary
            )));
        }
    };

    if payload.min_xp < 0 || payload.min_quests < 0 {
        warn!(
            "Rejected badge '{}' with negative thresholds.",
            payload.name
        );
        return Err(AppError::BadRequest(
            "Badge thresholds cannot be negative.".to_string(),
        ));
    }

    let new_badge = NewBadge {
        name: payload.name,
        description: payload.description,
        pillar_primary: pillar.as_str().to_string(),
        min_xp: payload.min_xp,
        min_quests: payload.min_quests,
        is_active: true,
    };

    let badge_id = helper::run_query(&pool, move |conn_sync| {
        diesel::insert_into(badges_dsl::badges)
            .values(&new_badge)
            .returning(badges_dsl::id)
            .get_result::<i64>(conn_sync)
    })
    .await?;

    info!("Created badge {}.", badge_id);
    Ok(ApiResponse::created(badge_id))
}

/// Lists the student IDs on an advisor's roster.
///
/// Query Parameters:
/// * `advisor_id`: The ID of the advisor.
///
/// Returns (wrapped in `ApiResponse`)
/// * `Vec<Uuid>`: Linked student IDs (200 OK).
/// * `403 Forbidden`: If the actor does not hold an advisor role.
/// * `404 Not Found`: If the advisor does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn list_students(
    State(pool): State<Pool>,
    Query(params): Query<ListStudentsParams>,
) -> Result<ApiResponse<Vec<Uuid>>, AppError> {
    let advisor_id = params.advisor_id;
    info!("Listing students for advisor_id: {}", advisor_id);

    helper::check_advisor_role(&pool, advisor_id).await?;

    let student_ids = helper::run_query(&pool, move |conn_sync| {
        links_dsl::advisor_students
            .filter(links_dsl::advisor_id.eq(advisor_id))
            .select(links_dsl::student_id)
            .load::<Uuid>(conn_sync)
    })
    .await?;

    info!(
        "Advisor {} has {} students on their roster.",
        advisor_id,
        student_ids.len()
    );
    Ok(ApiResponse::ok(student_ids))
}

/// Retrieves a progress summary for one of the advisor's students: XP by
/// pillar, overall total and mastery level, quest counters and completed
/// task count.
///
/// Query Parameters:
/// * `advisor_id`: The ID of the advisor requesting the data.
/// * `student_id`: The ID of the student.
///
/// Returns (wrapped in `ApiResponse`)
/// * `StudentProgressResponse`: The progress summary (200 OK).
/// * `403 Forbidden`: If the advisor is not linked to the student.
/// * `404 Not Found`: If the advisor does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, params))]
pub async fn get_student_progress(
    State(pool): State<Pool>,
    Query(params): Query<GetStudentProgressParams>,
) -> Result<ApiResponse<StudentProgressResponse>, AppError> {
    let advisor_id = params.advisor_id;
    let student_id = params.student_id;

    info!(
        "Fetching progress for student {} requested by advisor {}",
        student_id, advisor_id
    );
    debug!("Get student progress params: {:?}", params);

    helper::check_advisor_role(&pool, advisor_id).await?;
    helper::check_advisor_student_link(&pool, advisor_id, student_id).await?;

    let (xp_rows, quests_picked_up, quests_completed, tasks_completed) =
        helper::run_query(&pool, move |conn_sync| {
            let xp_rows = upx_dsl::user_pillar_xp
                .filter(upx_dsl::user_id.eq(student_id))
                .select((upx_dsl::pillar, upx_dsl::xp_amount))
                .load::<(String, i32)>(conn_sync)?;

            let quests_picked_up = uq_dsl::user_quests
                .filter(uq_dsl::user_id.eq(student_id))
                .count()
                .get_result::<i64>(conn_sync)?;

            let quests_completed = uq_dsl::user_quests
                .filter(uq_dsl::user_id.eq(student_id))
                .filter(uq_dsl::status.eq(QuestStatus::Completed.as_str()))
                .count()
                .get_result::<i64>(conn_sync)?;

            let tasks_completed = tcmp_dsl::task_completions
                .filter(tcmp_dsl::user_id.eq(student_id))
                .count()
                .get_result::<i64>(conn_sync)?;

            Ok::<_, DieselError>((xp_rows, quests_picked_up, quests_completed, tasks_completed))
        })
        .await?;

    let mut pillar_xp: BTreeMap<String, i32> = ALL_PILLARS
        .iter()
        .map(|p| (p.as_str().to_string(), 0))
        .collect();
    for (pillar_raw, amount) in xp_rows {
        if let Some(pillar) = Pillar::parse(&pillar_raw) {
            *pillar_xp.entry(pillar.as_str().to_string()).or_insert(0) += amount;
        }
    }

    let total_xp: i64 = pillar_xp.values().map(|v| *v as i64).sum();
    let response = StudentProgressResponse {
        student_id,
        total_xp,
        mastery_level: calculate_mastery_level(total_xp),
        pillar_xp,
        quests_picked_up,
        quests_completed,
        tasks_completed,
    };

    info!(
        "Progress for student {}: {} XP, level {}, {}/{} quests completed.",
        student_id,
        response.total_xp,
        response.mastery_level,
        response.quests_completed,
        response.quests_picked_up
    );
    Ok(ApiResponse::ok(response))
}

/// Stamps an advisor verification on a task completion, optionally with a
/// subject distribution breakdown.
///
/// Request Body: `VerifyCompletionPayload`
///
/// Returns (wrapped in `ApiResponse`)
/// * `bool`: true indicating success (200 OK).
/// * `403 Forbidden`: If the advisor is not linked to the completing student.
/// * `404 Not Found`: If the completion does not exist.
/// * `500 Internal Server Error`: If a database error occurs.
#[instrument(skip(pool, payload))]
pub async fn verify_completion(
    State(pool): State<Pool>,
    Json(payload): Json<VerifyCompletionPayload>,
) -> Result<ApiResponse<bool>, AppError> {
    let advisor_id = payload.advisor_id;
    let completion_id = payload.completion_id;

    info!(
        "Advisor {} verifying completion {}",
        advisor_id, completion_id
    );
    debug!("Verify completion payload: {:?}", payload);

    helper::check_advisor_role(&pool, advisor_id).await?;

    let completing_user = helper::run_query(&pool, move |conn| {
        tcmp_dsl::task_completions
            .find(completion_id)
            .select(tcmp_dsl::user_id)
            .first::<Uuid>(conn)
            .optional()
    })
    .await?;

    let student_id = match completing_user {
        Some(id) => id,
        None => {
            error!("Completion with ID {} not found.", completion_id);
            return Err(AppError::NotFound(format!(
                "Task completion with ID {} not found.",
                completion_id
            )));
        }
    };

    helper::check_advisor_student_link(&pool, advisor_id, student_id).await?;

    let subject_distribution = payload.subject_distribution;
    let rows_affected = helper::run_query(&pool, move |conn_sync| {
        diesel::update(tcmp_dsl::task_completions.find(completion_id))
            .set((
                tcmp_dsl::verified_by_advisor_id.eq(Some(advisor_id)),
                tcmp_dsl::subject_distribution.eq(subject_distribution),
            ))
            .execute(conn_sync)
    })
    .await?;

    if rows_affected != 1 {
        error!(
            "Expected 1 row affected verifying completion {}, got {}.",
            completion_id, rows_affected
        );
        return Err(AppError::InternalServerError(anyhow!(
            "Verification update affected {} rows, expected 1",
            rows_affected
        )));
    }

    info!(
        "Completion {} verified by advisor {}.",
        completion_id, advisor_id
    );
    Ok(ApiResponse::ok(true))
}
