use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{proceeds, Error, Payload};
use crate::models::Teacher;
use crate::scope;

/// Teacher profile joined with its credential record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeacherWithUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institute_id: Uuid,
    pub department: String,
    pub mobile: String,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub degree: Option<String>,
    pub status: String,
    pub joining_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

pub async fn get_teachers(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<TeacherWithUser>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let teachers = sqlx::query_as::<_, TeacherWithUser>(
        "SELECT t.*, u.first_name, u.last_name, u.email \
         FROM teachers t JOIN users u ON u.id = t.user_id \
         WHERE t.institute_id = $1 ORDER BY t.created_at DESC",
    )
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(teachers)
}

pub async fn update_teacher(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateTeacher>,
) -> Payload<TeacherUpdated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let teacher = sqlx::query_as::<_, Teacher>(
        "UPDATE teachers SET \
           department = COALESCE($1, department), \
           mobile = COALESCE($2, mobile), \
           address = COALESCE($3, address), \
           gender = COALESCE($4, gender), \
           degree = COALESCE($5, degree), \
           status = COALESCE($6, status), \
           joining_date = COALESCE($7, joining_date), \
           updated_at = now() \
         WHERE id = $8 AND institute_id = $9 RETURNING *",
    )
    .bind(&body.department)
    .bind(&body.mobile)
    .bind(&body.address)
    .bind(&body.gender)
    .bind(&body.degree)
    .bind(&body.status)
    .bind(body.joining_date)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match teacher {
        Some(teacher) => proceeds(TeacherUpdated {
            message: "Teacher updated".to_string(),
            teacher,
        }),
        None => Err(Error::not_found("Teacher not found")),
    }
}

/// Removing a teacher removes the profile and its owning credential.
pub async fn delete_teacher(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<TeacherDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let teacher =
        sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE id = $1 AND institute_id = $2")
            .bind(id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    let teacher = match teacher {
        Some(teacher) => teacher,
        None => return Err(Error::not_found("Teacher not found")),
    };

    sqlx::query("DELETE FROM teachers WHERE id = $1")
        .bind(teacher.id)
        .execute(&pg)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(teacher.user_id)
        .execute(&pg)
        .await?;

    proceeds(TeacherDeleted {
        message: "Teacher deleted successfully".to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeacher {
    pub department: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub degree: Option<String>,
    pub status: Option<String>,
    pub joining_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherUpdated {
    pub message: String,
    pub teacher: Teacher,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherDeleted {
    pub message: String,
}
