use crate::errors::AppError;
use crate::model::student::NewPillarXp;
use crate::schema::{
    advisor_students::dsl as links_dsl, user_pillar_xp::dsl as upx_dsl, users::dsl as users_dsl,
};
use crate::taxonomy;
use diesel::dsl::now;
use diesel::prelude::*;
use tracing::log::{debug, error, warn};
use uuid::Uuid;

pub(super) async fn run_query<T, F>(
    pool: &deadpool_diesel::postgres::Pool,
    query: F,
) -> Result<T, AppError>
where
    F: FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error> + Send + 'static,
    T: Send + 'static,
{
    let conn = pool.get().await.map_err(|pool_err| {
        error!(
            "Failed to get DB connection object from pool: {:?}",
            pool_err
        );
        AppError::from(pool_err)
    })?;
    debug!("DB connection object obtained from pool for interaction");

    let res = conn.interact(query).await;

    match res {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(diesel_err)) => {
            error!("Diesel query failed within interaction: {:?}", diesel_err);
            Err(AppError::from(diesel_err))
        }
        Err(interact_err) => {
            error!("Deadpool interact error: {:?}", interact_err);
            Err(AppError::from(interact_err))
        }
    }
}

/// Verifies the actor exists and holds an advisor-capable role.
pub(super) async fn check_advisor_role(
    pool: &deadpool_diesel::postgres::Pool,
    advisor_id: Uuid,
) -> Result<(), AppError> {
    let role = run_query(pool, move |conn| {
        users_dsl::users
            .find(advisor_id)
            .select(users_dsl::role)
            .first::<String>(conn)
            .optional()
    })
    .await?;

    match role {
        None => {
            error!("Advisor with ID {} not found.", advisor_id);
            Err(AppError::NotFound(format!(
                "Advisor with ID {} not found.",
                advisor_id
            )))
        }
        Some(role) if !taxonomy::is_advisor_role(&role) => {
            warn!(
                "User {} with role '{}' attempted an advisor operation.",
                advisor_id, role
            );
            Err(AppError::Forbidden(format!(
                "User {} does not hold an advisor role.",
                advisor_id
            )))
        }
        Some(_) => Ok(()),
    }
}

/// Verifies the advisor is linked to the student in the roster.
pub(super) async fn check_advisor_student_link(
    pool: &deadpool_diesel::postgres::Pool,
    advisor_id: Uuid,
    student_id: Uuid,
) -> Result<(), AppError> {
    let linked = run_query(pool, move |conn| {
        diesel::select(diesel::dsl::exists(
            links_dsl::advisor_students
                .filter(links_dsl::advisor_id.eq(advisor_id))
                .filter(links_dsl::student_id.eq(student_id)),
        ))
        .get_result::<bool>(conn)
    })
    .await?;

    if !linked {
        warn!(
            "Advisor {} is not linked to student {}. Refusing access.",
            advisor_id, student_id
        );
        return Err(AppError::Forbidden(format!(
            "Advisor {} is not assigned to student {}.",
            advisor_id, student_id
        )));
    }
    Ok(())
}

/// Atomically increments a (user, pillar) ledger row, creating it on first
/// award, and returns `(old_total, new_total)` for that pillar. The
/// increment happens in a single upsert statement; callers run this inside
/// a transaction when the award is part of a larger mutation.
pub(super) fn award_pillar_xp(
    conn: &mut PgConnection,
    user_id: Uuid,
    pillar: &str,
    amount: i32,
) -> Result<(i32, i32), diesel::result::Error> {
    let old_total = upx_dsl::user_pillar_xp
        .filter(upx_dsl::user_id.eq(user_id))
        .filter(upx_dsl::pillar.eq(pillar))
        .select(upx_dsl::xp_amount)
        .first::<i32>(conn)
        .optional()?
        .unwrap_or(0);

    let new_row = NewPillarXp {
        user_id,
        pillar: pillar.to_string(),
        xp_amount: amount,
    };

    let new_total = diesel::insert_into(upx_dsl::user_pillar_xp)
        .values(&new_row)
        .on_conflict((upx_dsl::user_id, upx_dsl::pillar))
        .do_update()
        .set((
            upx_dsl::xp_amount.eq(upx_dsl::xp_amount + amount),
            upx_dsl::updated_at.eq(now),
        ))
        .returning(upx_dsl::xp_amount)
        .get_result::<i32>(conn)?;

    Ok((old_total, new_total))
}
