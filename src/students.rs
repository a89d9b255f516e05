use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{proceeds, Error, Payload};
use crate::models::Student;
use crate::scope;

/// Student profile joined with its credential record.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentWithUser {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institute_id: Uuid,
    pub roll_no: i64,
    pub department: String,
    pub gender: String,
    pub mobile: String,
    pub admission_date: Option<DateTime<Utc>>,
    pub class_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub section: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

pub async fn get_students(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<StudentWithUser>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let students = sqlx::query_as::<_, StudentWithUser>(
        "SELECT s.*, u.first_name, u.last_name, u.email \
         FROM students s JOIN users u ON u.id = s.user_id \
         WHERE s.institute_id = $1 ORDER BY s.created_at DESC",
    )
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(students)
}

pub async fn update_student(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateStudent>,
) -> Payload<StudentUpdated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let student = sqlx::query_as::<_, Student>(
        "UPDATE students SET \
           department = COALESCE($1, department), \
           gender = COALESCE($2, gender), \
           mobile = COALESCE($3, mobile), \
           admission_date = COALESCE($4, admission_date), \
           class_id = COALESCE($5, class_id), \
           section_id = COALESCE($6, section_id), \
           section = COALESCE($7, section), \
           status = COALESCE($8, status), \
           updated_at = now() \
         WHERE id = $9 AND institute_id = $10 RETURNING *",
    )
    .bind(&body.department)
    .bind(&body.gender)
    .bind(&body.mobile)
    .bind(body.admission_date)
    .bind(body.class_id)
    .bind(body.section_id)
    .bind(&body.section)
    .bind(&body.status)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match student {
        Some(student) => proceeds(StudentUpdated {
            message: "Student updated".to_string(),
            student,
        }),
        None => Err(Error::not_found("Student not found")),
    }
}

/// Removing a student removes the profile and its owning credential;
/// sessions go with the credential.
pub async fn delete_student(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<StudentDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let student =
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1 AND institute_id = $2")
            .bind(id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    let student = match student {
        Some(student) => student,
        None => return Err(Error::not_found("Student not found")),
    };

    sqlx::query("DELETE FROM students WHERE id = $1")
        .bind(student.id)
        .execute(&pg)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(student.user_id)
        .execute(&pg)
        .await?;

    proceeds(StudentDeleted {
        message: "Student deleted successfully".to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudent {
    pub department: Option<String>,
    pub gender: Option<String>,
    pub mobile: Option<String>,
    pub admission_date: Option<DateTime<Utc>>,
    pub class_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub section: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentUpdated {
    pub message: String,
    pub student: Student,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentDeleted {
    pub message: String,
}
