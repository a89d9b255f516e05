use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{CourseSchedule, Student, Submission, SubmissionUpload};
use crate::scope;

/// Submission joined with its schedule's course and section.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionWithSchedule {
    pub id: Uuid,
    pub course_schedule_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub course_id: Uuid,
    pub section: String,
}

/// Upload joined with the student's profile and credential.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UploadWithStudent {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub student_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub roll_no: i64,
    pub section: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: String,
}

/// Teacher opens a submission window against one of their schedules.
pub async fn create_submission(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateSubmission>,
) -> Payload<Submission> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.title.trim().is_empty() {
        return Err(Error::invalid("Missing required fields"));
    }

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE id = $1 AND institute_id = $2",
    )
    .bind(body.course_schedule_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    if schedule.is_none() {
        return Err(Error::not_found("Course schedule not found"));
    }

    let submission = sqlx::query_as::<_, Submission>(
        "INSERT INTO submissions \
         (id, course_schedule_id, title, description, start_date, end_date, created_by) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(body.course_schedule_id)
    .bind(body.title.trim())
    .bind(&body.description)
    .bind(body.start_date)
    .bind(body.end_date)
    .bind(user.id)
    .fetch_one(&pg)
    .await?;

    creates(submission)
}

pub async fn list_teacher_submissions(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<SubmissionWithSchedule>> {
    let submissions = sqlx::query_as::<_, SubmissionWithSchedule>(
        "SELECT sub.*, cs.course_id, cs.section \
         FROM submissions sub \
         JOIN course_schedules cs ON cs.id = sub.course_schedule_id \
         WHERE sub.created_by = $1 ORDER BY sub.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&pg)
    .await?;
    proceeds(submissions)
}

pub async fn get_submission_uploads(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<UploadWithStudent>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if fetch_submission(&pg, id, institute_id).await?.is_none() {
        return Err(Error::not_found("Submission not found"));
    }

    let uploads = sqlx::query_as::<_, UploadWithStudent>(
        "SELECT up.*, s.roll_no, s.section, u.first_name, u.last_name, u.email \
         FROM submission_uploads up \
         JOIN students s ON s.id = up.student_id \
         JOIN users u ON u.id = s.user_id \
         WHERE up.submission_id = $1 ORDER BY up.uploaded_at ASC",
    )
    .bind(id)
    .fetch_all(&pg)
    .await?;
    proceeds(uploads)
}

/// Active submission windows for the student's section.
pub async fn list_student_submissions(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<SubmissionWithSchedule>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&pg)
        .await?;
    let student = match student {
        Some(student) => student,
        None => return Err(Error::not_found("Student not found")),
    };

    let submissions = sqlx::query_as::<_, SubmissionWithSchedule>(
        "SELECT sub.*, cs.course_id, cs.section \
         FROM submissions sub \
         JOIN course_schedules cs ON cs.id = sub.course_schedule_id \
         WHERE cs.institute_id = $1 AND cs.section = $2 AND cs.status = 'active' \
           AND sub.start_date <= now() AND sub.end_date >= now() \
         ORDER BY sub.end_date ASC",
    )
    .bind(institute_id)
    .bind(student.section.as_deref().unwrap_or_default())
    .fetch_all(&pg)
    .await?;
    proceeds(submissions)
}

/// Student uploads (or replaces) their file while the window is open.
pub async fn upload_student_submission(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UploadSubmissionFile>,
) -> Payload<SubmissionUpload> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.original_name.trim().is_empty() {
        return Err(Error::invalid("File is required"));
    }

    let submission = match fetch_submission(&pg, id, institute_id).await? {
        Some(submission) => submission,
        None => return Err(Error::not_found("Submission not found")),
    };

    let now = Utc::now();
    if now < submission.start_date || now > submission.end_date {
        return Err(Error::invalid("Submission window closed"));
    }

    let upload = sqlx::query_as::<_, SubmissionUpload>(
        "INSERT INTO submission_uploads \
         (id, submission_id, student_id, original_name, stored_name, mime_type, size, uploaded_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, now()) \
         ON CONFLICT (submission_id, student_id) DO UPDATE SET \
           original_name = EXCLUDED.original_name, \
           stored_name = EXCLUDED.stored_name, \
           mime_type = EXCLUDED.mime_type, \
           size = EXCLUDED.size, \
           uploaded_at = now() \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(user.id)
    .bind(body.original_name.trim())
    .bind(crate::materials::stored_name_for(&body.original_name))
    .bind(&body.mime_type)
    .bind(body.size)
    .fetch_one(&pg)
    .await?;

    creates(upload)
}

/// The student's own upload for a submission; null body when nothing was
/// uploaded yet.
pub async fn get_own_submission_upload(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Option<SubmissionUpload>> {
    let upload = sqlx::query_as::<_, SubmissionUpload>(
        "SELECT * FROM submission_uploads WHERE submission_id = $1 AND student_id = $2",
    )
    .bind(id)
    .bind(user.id)
    .fetch_optional(&pg)
    .await?;
    proceeds(upload)
}

async fn fetch_submission(
    pg: &PgPool,
    id: Uuid,
    institute_id: Uuid,
) -> Result<Option<Submission>, Error> {
    let submission = sqlx::query_as::<_, Submission>(
        "SELECT sub.* FROM submissions sub \
         JOIN course_schedules cs ON cs.id = sub.course_schedule_id \
         WHERE sub.id = $1 AND cs.institute_id = $2",
    )
    .bind(id)
    .bind(institute_id)
    .fetch_optional(pg)
    .await?;
    Ok(submission)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubmission {
    pub course_schedule_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSubmissionFile {
    pub original_name: String,
    pub mime_type: String,
    pub size: i64,
}
