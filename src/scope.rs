use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::Error;
use crate::models::{ROLE_ADMIN, ROLE_STUDENT, ROLE_TEACHER};

/// Resolves the effective tenant id for the caller. Admins are the tenant
/// root; teachers and students inherit their profile's institute. Every
/// query on tenant-owned collections must filter or stamp with this id.
pub async fn institute_id_for(user: &AuthUser, pg: &PgPool) -> Result<Uuid, Error> {
    match user.role.as_str() {
        ROLE_ADMIN => Ok(user.id),
        ROLE_STUDENT => {
            sqlx::query_scalar::<_, Uuid>("SELECT institute_id FROM students WHERE id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
                .ok_or_else(|| Error::not_found("Student profile not found"))
        }
        ROLE_TEACHER => {
            sqlx::query_scalar::<_, Uuid>("SELECT institute_id FROM teachers WHERE id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
                .ok_or_else(|| Error::not_found("Teacher profile not found"))
        }
        other => Err(Error::invalid(format!("Unknown user role `{}`", other))),
    }
}
