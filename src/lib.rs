use crate::cli::Args;
use anyhow::Context;
use axum::Router;
use axum::routing::{get, post};
use axum_keycloak_auth::PassthroughMode;
use axum_keycloak_auth::instance::{KeycloakAuthInstance, KeycloakConfig};
use axum_keycloak_auth::layer::KeycloakAuthLayer;
use deadpool_diesel::Runtime;
use deadpool_diesel::postgres::{Manager, Pool};
use tracing::log::info;

pub mod cli;
pub mod model;
pub mod payloads;
pub mod progression;
pub mod response;
pub mod schema;
pub mod taxonomy;

mod api;
mod errors;

pub fn init_router(args: &Args) -> anyhow::Result<Router> {
    info!("Initializing database pool...");
    let pool = init_pool(&args.connection_str, args.db_pool_max_size)
        .context("Failed to initialize database pool")?;

    info!("Initializing Keycloak authentication layer...");
    let keycloak_layer =
        init_protection_layer(args).context("Failed to initialize Keycloak layer")?;

    info!("Initializing router...");
    Ok(init_router_internal(pool, keycloak_layer))
}

pub fn init_test_router(pool: Pool) -> Router {
    let student_api = student_routes();
    let advisor_api = advisor_routes();

    Router::new()
        .nest("/student", student_api)
        .nest("/advisor", advisor_api)
        .with_state(pool)
}

fn init_router_internal(pool: Pool, keycloak_layer: KeycloakAuthLayer<String>) -> Router {
    let student_api = student_routes().layer(keycloak_layer.clone());
    let advisor_api = advisor_routes().layer(keycloak_layer.clone());

    Router::new()
        .nest("/student", student_api)
        .nest("/advisor", advisor_api)
        .with_state(pool)
}

fn init_pool(conn_str: &str, max_size: u32) -> anyhow::Result<Pool> {
    let manager = Manager::new(conn_str, Runtime::Tokio1);
    let pool = Pool::builder(manager).max_size(max_size as usize).build()?;
    Ok(pool)
}

fn init_protection_layer(args: &Args) -> anyhow::Result<KeycloakAuthLayer<String>> {
    let config = KeycloakConfig::builder()
        .server(args.keycloak_server_url.clone())
        .realm(args.keycloak_realm.clone())
        .build();

    let instance = KeycloakAuthInstance::new(config);

    let layer = KeycloakAuthLayer::builder()
        .instance(instance)
        .passthrough_mode(PassthroughMode::Block)
        .persist_raw_claims(false)
        .expected_audiences(vec![args.keycloak_audiences.clone()])
        .build();

    Ok(layer)
}

fn student_routes() -> Router<Pool> {
    Router::new()
        // protected routes go here
        .route(
            "/get_available_quests",
            get(api::student::get_available_quests),
        )
        .route("/pickup_quest", post(api::student::pickup_quest))
        .route("/set_down_quest", post(api::student::set_down_quest))
        .route("/get_user_quests", get(api::student::get_user_quests))
        .route(
            "/get_enrollment_metadata/{enrollment_id}",
            get(api::student::get_enrollment_metadata),
        )
        .route("/complete_task", post(api::student::complete_task))
        .route(
            "/invite_collaborator",
            post(api::student::invite_collaborator),
        )
        .route(
            "/accept_collaboration",
            post(api::student::accept_collaboration),
        )
        .route(
            "/decline_collaboration",
            post(api::student::decline_collaboration),
        )
        .route(
            "/complete_collaboration",
            post(api::student::complete_collaboration),
        )
        .route("/get_xp_breakdown", get(api::student::get_xp_breakdown))
        .route("/get_earned_badges", get(api::student::get_earned_badges))
    // public routes go here
}

fn advisor_routes() -> Router<Pool> {
    Router::new()
        // protected routes go here
        .route("/create_student", post(api::advisor::create_student))
        .route(
            "/add_advisor_student",
            post(api::advisor::add_advisor_student),
        )
        .route(
            "/remove_advisor_student",
            post(api::advisor::remove_advisor_student),
        )
        .route("/create_quest", post(api::advisor::create_quest))
        .route("/modify_quest", post(api::advisor::modify_quest))
        .route("/activate_quest", post(api::advisor::activate_quest))
        .route("/deactivate_quest", post(api::advisor::deactivate_quest))
        .route("/add_quest_task", post(api::advisor::add_quest_task))
        .route("/set_task_approval", post(api::advisor::set_task_approval))
        .route("/create_badge", post(api::advisor::create_badge))
        .route("/list_students", get(api::advisor::list_students))
        .route(
            "/get_student_progress",
            get(api::advisor::get_student_progress),
        )
        .route("/verify_completion", post(api::advisor::verify_completion))
    // public routes go here
}
