use axum::http::StatusCode;
use optio_server::model::advisor::StudentProgressResponse;
use optio_server::response::ApiResponse;
use optio_server::schema;
use diesel::prelude::*;
use serde_json::{Value, json};
use uuid::Uuid;

mod helpers;
use helpers::{
    TestPool, create_test_quest, create_test_task, create_test_user, link_advisor_student,
    set_pillar_xp, setup_test_environment,
};

async fn get_quest_active(pool: &TestPool, quest_id: i64) -> bool {
    let conn = pool.get().await.expect("Failed to get conn for quest check");
    conn.interact(move |conn| {
        schema::quests::table
            .find(quest_id)
            .select(schema::quests::is_active)
            .first::<bool>(conn)
    })
    .await
    .expect("Interact failed for quest check")
    .expect("DB query failed for quest check")
}

async fn get_task_approval(pool: &TestPool, task_id: i64) -> String {
    let conn = pool.get().await.expect("Failed to get conn for task check");
    conn.interact(move |conn| {
        schema::quest_tasks::table
            .find(task_id)
            .select(schema::quest_tasks::approval_status)
            .first::<String>(conn)
    })
    .await
    .expect("Interact failed for task check")
    .expect("DB query failed for task check")
}

async fn get_completion_verifier(pool: &TestPool, completion_id: i64) -> Option<Uuid> {
    let conn = pool
        .get()
        .await
        .expect("Failed to get conn for completion check");
    conn.interact(move |conn| {
        schema::task_completions::table
            .find(completion_id)
            .select(schema::task_completions::verified_by_advisor_id)
            .first::<Option<Uuid>>(conn)
    })
    .await
    .expect("Interact failed for completion check")
    .expect("DB query failed for completion check")
}

// create_student

#[tokio::test]
async fn test_create_student_success() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/advisor/create_student")
        .json(&json!({
            "email": "new@test.com",
            "display_name": "New Student",
            "role": "student"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: ApiResponse<Uuid> = response.json();
    assert!(body.data.is_some());
}

#[tokio::test]
async fn test_create_student_unknown_role() {
    let (server, _pool) = setup_test_environment().await;

    let response = server
        .post("/advisor/create_student")
        .json(&json!({
            "email": "badrole@test.com",
            "display_name": "Bad Role",
            "role": "wizard"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_student_duplicate_email() {
    let (server, pool) = setup_test_environment().await;
    create_test_user(&pool, "taken@test.com", "Taken", "student").await;

    let response = server
        .post("/advisor/create_student")
        .json(&json!({
            "email": "taken@test.com",
            "display_name": "Taken Again",
            "role": "student"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CONFLICT);
    let body: ApiResponse<Value> = response.json();
    assert!(body.status_message.contains("already registered"));
}

// roster links

#[tokio::test]
async fn test_add_advisor_student_success_and_duplicate() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "adv@test.com", "Advisor", "advisor").await;
    let student_id = create_test_user(&pool, "stu@test.com", "Student", "student").await;

    let first = server
        .post("/advisor/add_advisor_student")
        .json(&json!({ "advisor_id": advisor_id, "student_id": student_id }))
        .await;
    assert_eq!(first.status_code(), StatusCode::OK);

    let second = server
        .post("/advisor/add_advisor_student")
        .json(&json!({ "advisor_id": advisor_id, "student_id": student_id }))
        .await;
    assert_eq!(second.status_code(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_add_advisor_student_requires_advisor_role() {
    let (server, pool) = setup_test_environment().await;
    let not_advisor = create_test_user(&pool, "fake_adv@test.com", "Fake", "student").await;
    let student_id = create_test_user(&pool, "stu2@test.com", "Student Two", "student").await;

    let response = server
        .post("/advisor/add_advisor_student")
        .json(&json!({ "advisor_id": not_advisor, "student_id": student_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_add_advisor_student_self_link_rejected() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "selfadv@test.com", "Self Advisor", "advisor").await;

    let response = server
        .post("/advisor/add_advisor_student")
        .json(&json!({ "advisor_id": advisor_id, "student_id": advisor_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_remove_advisor_student_not_linked() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "rm_adv@test.com", "Rm Advisor", "advisor").await;
    let student_id = create_test_user(&pool, "rm_stu@test.com", "Rm Student", "student").await;

    let response = server
        .post("/advisor/remove_advisor_student")
        .json(&json!({ "advisor_id": advisor_id, "student_id": student_id }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

// quest authoring

#[tokio::test]
async fn test_create_quest_success() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "qadv@test.com", "Quest Advisor", "advisor").await;

    let response = server
        .post("/advisor/create_quest")
        .json(&json!({
            "advisor_id": advisor_id,
            "title": "Build a Garden",
            "description": "Plan and plant a garden bed.",
            "quest_type": "optio"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: ApiResponse<i64> = response.json();
    assert!(body.data.unwrap() > 0);
}

#[tokio::test]
async fn test_create_quest_unknown_type() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "qadv2@test.com", "Quest Advisor 2", "advisor").await;

    let response = server
        .post("/advisor/create_quest")
        .json(&json!({
            "advisor_id": advisor_id,
            "title": "Mystery Quest",
            "description": "???",
            "quest_type": "mystery"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_create_quest_forbidden_for_students() {
    let (server, pool) = setup_test_environment().await;
    let student_id = create_test_user(&pool, "qstu@test.com", "Quest Student", "student").await;

    let response = server
        .post("/advisor/create_quest")
        .json(&json!({
            "advisor_id": student_id,
            "title": "Sneaky Quest",
            "description": "Should not exist.",
            "quest_type": "optio"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_modify_quest_success_and_missing_fields() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "madv@test.com", "Mod Advisor", "advisor").await;
    let quest_id = create_test_quest(&pool, "Old Title", "optio").await;

    let no_fields = server
        .post("/advisor/modify_quest")
        .json(&json!({ "advisor_id": advisor_id, "quest_id": quest_id }))
        .await;
    assert_eq!(no_fields.status_code(), StatusCode::BAD_REQUEST);

    let response = server
        .post("/advisor/modify_quest")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": quest_id,
            "title": "New Title"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn test_modify_quest_not_found() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "madv2@test.com", "Mod Advisor 2", "advisor").await;

    let response = server
        .post("/advisor/modify_quest")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": 424_242,
            "title": "Ghost Title"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_activate_and_deactivate_quest() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "actadv@test.com", "Act Advisor", "advisor").await;
    let quest_id = create_test_quest(&pool, "Toggle Quest", "optio").await;

    let deactivate = server
        .post("/advisor/deactivate_quest")
        .json(&json!({ "advisor_id": advisor_id, "quest_id": quest_id }))
        .await;
    assert_eq!(deactivate.status_code(), StatusCode::OK);
    assert!(!get_quest_active(&pool, quest_id).await);

    let activate = server
        .post("/advisor/activate_quest")
        .json(&json!({ "advisor_id": advisor_id, "quest_id": quest_id }))
        .await;
    assert_eq!(activate.status_code(), StatusCode::OK);
    assert!(get_quest_active(&pool, quest_id).await);
}

// task authoring

#[tokio::test]
async fn test_add_quest_task_starts_pending() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "tadv@test.com", "Task Advisor", "advisor").await;
    let quest_id = create_test_quest(&pool, "Task Quest", "optio").await;

    let response = server
        .post("/advisor/add_quest_task")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": quest_id,
            "title": "Interview a neighbor",
            "description": "Record a short oral history.",
            "pillar": "communication",
            "xp_value": 75,
            "order_index": 1
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
    let body: ApiResponse<i64> = response.json();
    let task_id = body.data.unwrap();
    assert_eq!(get_task_approval(&pool, task_id).await, "pending");
}

#[tokio::test]
async fn test_add_quest_task_accepts_legacy_pillar_name() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "tadv2@test.com", "Task Advisor 2", "advisor").await;
    let quest_id = create_test_quest(&pool, "Legacy Pillar Quest", "optio").await;

    let response = server
        .post("/advisor/add_quest_task")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": quest_id,
            "title": "Logic puzzles",
            "description": "A set of deduction puzzles.",
            "pillar": "stem_logic",
            "xp_value": 50,
            "order_index": 1
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_add_quest_task_rejects_bad_input() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "tadv3@test.com", "Task Advisor 3", "advisor").await;
    let quest_id = create_test_quest(&pool, "Bad Input Quest", "optio").await;

    let bad_pillar = server
        .post("/advisor/add_quest_task")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": quest_id,
            "title": "T",
            "description": "D",
            "pillar": "alchemy",
            "xp_value": 50,
            "order_index": 1
        }))
        .await;
    assert_eq!(bad_pillar.status_code(), StatusCode::BAD_REQUEST);

    let negative_xp = server
        .post("/advisor/add_quest_task")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": quest_id,
            "title": "T",
            "description": "D",
            "pillar": "stem",
            "xp_value": -5,
            "order_index": 1
        }))
        .await;
    assert_eq!(negative_xp.status_code(), StatusCode::BAD_REQUEST);

    let missing_quest = server
        .post("/advisor/add_quest_task")
        .json(&json!({
            "advisor_id": advisor_id,
            "quest_id": 424_242,
            "title": "T",
            "description": "D",
            "pillar": "stem",
            "xp_value": 5,
            "order_index": 1
        }))
        .await;
    assert_eq!(missing_quest.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_set_task_approval() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "appadv@test.com", "App Advisor", "advisor").await;
    let quest_id = create_test_quest(&pool, "Approval Quest", "optio").await;
    let task_id = create_test_task(&pool, quest_id, "stem", 50, 1, false).await;

    let response = server
        .post("/advisor/set_task_approval")
        .json(&json!({
            "advisor_id": advisor_id,
            "task_id": task_id,
            "approval_status": "approved"
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(get_task_approval(&pool, task_id).await, "approved");

    let unknown = server
        .post("/advisor/set_task_approval")
        .json(&json!({
            "advisor_id": advisor_id,
            "task_id": task_id,
            "approval_status": "blessed"
        }))
        .await;
    assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);
}

// badges

#[tokio::test]
async fn test_create_badge_success_and_validation() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "badv@test.com", "Badge Advisor", "advisor").await;

    let response = server
        .post("/advisor/create_badge")
        .json(&json!({
            "advisor_id": advisor_id,
            "name": "Communicator I",
            "description": "First steps in communication.",
            "pillar_primary": "communication",
            "min_xp": 500,
            "min_quests": 2
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);

    let negative = server
        .post("/advisor/create_badge")
        .json(&json!({
            "advisor_id": advisor_id,
            "name": "Broken Badge",
            "description": "Negative threshold.",
            "pillar_primary": "communication",
            "min_xp": -1,
            "min_quests": 0
        }))
        .await;
    assert_eq!(negative.status_code(), StatusCode::BAD_REQUEST);
}

// roster reads

#[tokio::test]
async fn test_list_students() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "ladv@test.com", "List Advisor", "advisor").await;
    let student_1 = create_test_user(&pool, "ls1@test.com", "List One", "student").await;
    let student_2 = create_test_user(&pool, "ls2@test.com", "List Two", "student").await;
    let _unlinked = create_test_user(&pool, "ls3@test.com", "List Three", "student").await;
    link_advisor_student(&pool, advisor_id, student_1).await;
    link_advisor_student(&pool, advisor_id, student_2).await;

    let response = server
        .get("/advisor/list_students")
        .add_query_param("advisor_id", advisor_id)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<Vec<Uuid>> = response.json();
    let mut student_ids = body.data.unwrap();
    student_ids.sort();
    let mut expected = vec![student_1, student_2];
    expected.sort();
    assert_eq!(student_ids, expected);
}

#[tokio::test]
async fn test_get_student_progress_requires_link() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "padv@test.com", "Prog Advisor", "advisor").await;
    let student_id = create_test_user(&pool, "pstu@test.com", "Prog Student", "student").await;

    let response = server
        .get("/advisor/get_student_progress")
        .add_query_param("advisor_id", advisor_id)
        .add_query_param("student_id", student_id)
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_get_student_progress_summary() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "padv2@test.com", "Prog Advisor 2", "advisor").await;
    let student_id = create_test_user(&pool, "pstu2@test.com", "Prog Student 2", "student").await;
    link_advisor_student(&pool, advisor_id, student_id).await;
    set_pillar_xp(&pool, student_id, "stem", 600).await;
    set_pillar_xp(&pool, student_id, "art", 100).await;

    let quest_id = create_test_quest(&pool, "Progress Quest", "optio").await;
    let task_id = create_test_task(&pool, quest_id, "civics", 30, 1, true).await;
    let pickup = server
        .post("/student/pickup_quest")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id }))
        .await;
    assert_eq!(pickup.status_code(), StatusCode::OK);
    let complete = server
        .post("/student/complete_task")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id, "task_id": task_id }))
        .await;
    assert_eq!(complete.status_code(), StatusCode::OK);

    let response = server
        .get("/advisor/get_student_progress")
        .add_query_param("advisor_id", advisor_id)
        .add_query_param("student_id", student_id)
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: ApiResponse<StudentProgressResponse> = response.json();
    let data = body.data.unwrap();
    assert_eq!(data.student_id, student_id);
    assert_eq!(data.pillar_xp["stem"], 600);
    assert_eq!(data.pillar_xp["civics"], 30);
    assert_eq!(data.total_xp, 730);
    assert_eq!(data.mastery_level, 2);
    assert_eq!(data.quests_picked_up, 1);
    assert_eq!(data.quests_completed, 1);
    assert_eq!(data.tasks_completed, 1);
}

// verification

#[tokio::test]
async fn test_verify_completion() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "vadv@test.com", "Verify Advisor", "advisor").await;
    let student_id = create_test_user(&pool, "vstu@test.com", "Verify Student", "student").await;
    link_advisor_student(&pool, advisor_id, student_id).await;

    let quest_id = create_test_quest(&pool, "Verify Quest", "optio").await;
    let task_id = create_test_task(&pool, quest_id, "wellness", 45, 1, true).await;
    let pickup = server
        .post("/student/pickup_quest")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id }))
        .await;
    assert_eq!(pickup.status_code(), StatusCode::OK);
    let complete = server
        .post("/student/complete_task")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id, "task_id": task_id }))
        .await;
    assert_eq!(complete.status_code(), StatusCode::OK);

    let completion_id = helpers::get_first_completion_id(&pool, student_id).await;

    let response = server
        .post("/advisor/verify_completion")
        .json(&json!({
            "advisor_id": advisor_id,
            "completion_id": completion_id,
            "subject_distribution": { "wellness": 1.0 }
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        get_completion_verifier(&pool, completion_id).await,
        Some(advisor_id)
    );
}

#[tokio::test]
async fn test_verify_completion_requires_link() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "vadv2@test.com", "Verify Advisor 2", "advisor").await;
    let student_id = create_test_user(&pool, "vstu2@test.com", "Verify Student 2", "student").await;

    let quest_id = create_test_quest(&pool, "Unlinked Verify Quest", "optio").await;
    let task_id = create_test_task(&pool, quest_id, "wellness", 45, 1, true).await;
    let pickup = server
        .post("/student/pickup_quest")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id }))
        .await;
    assert_eq!(pickup.status_code(), StatusCode::OK);
    let complete = server
        .post("/student/complete_task")
        .json(&json!({ "user_id": student_id, "quest_id": quest_id, "task_id": task_id }))
        .await;
    assert_eq!(complete.status_code(), StatusCode::OK);

    let completion_id = helpers::get_first_completion_id(&pool, student_id).await;

    let response = server
        .post("/advisor/verify_completion")
        .json(&json!({
            "advisor_id": advisor_id,
            "completion_id": completion_id
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_verify_completion_not_found() {
    let (server, pool) = setup_test_environment().await;
    let advisor_id = create_test_user(&pool, "vadv3@test.com", "Verify Advisor 3", "advisor").await;

    let response = server
        .post("/advisor/verify_completion")
        .json(&json!({ "advisor_id": advisor_id, "completion_id": 424_242 }))
        .await;

    assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
}
