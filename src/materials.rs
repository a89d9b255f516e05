use axum::extract::{Path, Query};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{CourseMaterial, CourseSchedule};
use crate::scope;

/// Records an uploaded file against a schedule. The bytes themselves live in
/// external storage; this service owns only the metadata.
pub async fn upload_material(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UploadMaterial>,
) -> Payload<CourseMaterial> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.original_name.trim().is_empty() {
        return Err(Error::invalid("File is required"));
    }

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE id = $1 AND institute_id = $2",
    )
    .bind(body.schedule_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    let schedule = match schedule {
        Some(schedule) => schedule,
        None => return Err(Error::not_found("Course schedule not found")),
    };

    let material = sqlx::query_as::<_, CourseMaterial>(
        "INSERT INTO course_materials \
         (id, course_schedule_id, original_name, stored_name, mime_type, size, uploaded_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(body.schedule_id)
    .bind(body.original_name.trim())
    .bind(stored_name_for(&body.original_name))
    .bind(&body.mime_type)
    .bind(body.size)
    .bind(schedule.instructor_id)
    .fetch_one(&pg)
    .await?;

    creates(material)
}

pub async fn list_materials(
    user: AuthUser,
    Query(query): Query<MaterialFilter>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<CourseMaterial>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let materials = sqlx::query_as::<_, CourseMaterial>(
        "SELECT m.* FROM course_materials m \
         JOIN course_schedules cs ON cs.id = m.course_schedule_id \
         WHERE cs.institute_id = $1 AND ($2::uuid IS NULL OR m.course_schedule_id = $2) \
         ORDER BY m.created_at DESC",
    )
    .bind(institute_id)
    .bind(query.schedule_id)
    .fetch_all(&pg)
    .await?;
    proceeds(materials)
}

pub async fn delete_material(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<MaterialDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let deleted = sqlx::query(
        "DELETE FROM course_materials m \
         USING course_schedules cs \
         WHERE cs.id = m.course_schedule_id AND m.id = $1 AND cs.institute_id = $2",
    )
    .bind(id)
    .bind(institute_id)
    .execute(&pg)
    .await?;
    if deleted.rows_affected() < 1 {
        return Err(Error::not_found("Material not found"));
    }
    proceeds(MaterialDeleted {
        message: "Deleted".to_string(),
    })
}

/// Server-side storage key: a fresh uuid carrying the original extension.
pub(crate) fn stored_name_for(original_name: &str) -> String {
    match original_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() && !extension.is_empty() => {
            format!("{}.{}", Uuid::new_v4(), extension)
        }
        _ => Uuid::new_v4().to_string(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMaterial {
    pub schedule_id: Uuid,
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialFilter {
    pub schedule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterialDeleted {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_names_keep_the_extension() {
        let name = stored_name_for("notes.pdf");
        assert!(name.ends_with(".pdf"));
        assert_ne!(name, "notes.pdf");
    }

    #[test]
    fn extensionless_names_get_a_bare_key() {
        let name = stored_name_for("README");
        assert!(!name.contains('.'));
    }

    #[test]
    fn dotfiles_are_not_treated_as_extensions() {
        let name = stored_name_for(".env");
        assert!(!name.ends_with(".env"));
    }
}
