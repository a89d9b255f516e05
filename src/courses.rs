use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{Course, CourseSchedule, Teacher};
use crate::scope;

/// Course joined with its instructor's profile and credential.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseWithInstructor {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub course_code: String,
    pub course_name: String,
    pub instructor_id: Uuid,
    pub description: String,
    pub section: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub instructor_department: String,
    pub instructor_first_name: Option<String>,
    pub instructor_last_name: Option<String>,
    pub instructor_email: String,
}

const COURSE_WITH_INSTRUCTOR: &str = "SELECT co.*, \
       t.department AS instructor_department, \
       u.first_name AS instructor_first_name, \
       u.last_name AS instructor_last_name, \
       u.email AS instructor_email \
     FROM courses co \
     JOIN teachers t ON t.id = co.instructor_id \
     JOIN users u ON u.id = t.user_id";

pub async fn add_course(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<AddCourse>,
) -> Payload<CourseCreated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.course_code.trim().is_empty() || body.course_name.trim().is_empty() {
        return Err(Error::invalid("courseCode and courseName are required"));
    }

    let existing = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE course_code = $1 AND institute_id = $2",
    )
    .bind(body.course_code.trim())
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    if existing.is_some() {
        return Err(Error::already_exists("Course with this code already exists"));
    }

    let instructor =
        sqlx::query_as::<_, Teacher>("SELECT * FROM teachers WHERE id = $1 AND institute_id = $2")
            .bind(body.instructor)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    if instructor.is_none() {
        return Err(Error::not_found("Instructor not found"));
    }

    let course = sqlx::query_as::<_, Course>(
        "INSERT INTO courses \
         (id, institute_id, course_code, course_name, instructor_id, description, section) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(body.course_code.trim())
    .bind(body.course_name.trim())
    .bind(body.instructor)
    .bind(body.description.unwrap_or_default())
    .bind(&body.section)
    .fetch_one(&pg)
    .await?;

    creates(CourseCreated {
        message: "Course added successfully".to_string(),
        course,
    })
}

pub async fn get_courses(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<CourseWithInstructor>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let courses = sqlx::query_as::<_, CourseWithInstructor>(&format!(
        "{} WHERE co.institute_id = $1 ORDER BY co.created_at DESC",
        COURSE_WITH_INSTRUCTOR
    ))
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(courses)
}

pub async fn get_course_by_id(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CourseWithInstructor> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let course = sqlx::query_as::<_, CourseWithInstructor>(&format!(
        "{} WHERE co.id = $1 AND co.institute_id = $2",
        COURSE_WITH_INSTRUCTOR
    ))
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    match course {
        Some(course) => proceeds(course),
        None => Err(Error::not_found("Course not found")),
    }
}

pub async fn get_courses_by_instructor(
    user: AuthUser,
    Path(instructor_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<CourseWithInstructor>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let courses = sqlx::query_as::<_, CourseWithInstructor>(&format!(
        "{} WHERE co.instructor_id = $1 AND co.institute_id = $2 ORDER BY co.created_at DESC",
        COURSE_WITH_INSTRUCTOR
    ))
    .bind(instructor_id)
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(courses)
}

pub async fn update_course(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateCourse>,
) -> Payload<CourseUpdated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    if let Some(instructor_id) = body.instructor {
        let instructor = sqlx::query_as::<_, Teacher>(
            "SELECT * FROM teachers WHERE id = $1 AND institute_id = $2",
        )
        .bind(instructor_id)
        .bind(institute_id)
        .fetch_optional(&pg)
        .await?;
        if instructor.is_none() {
            return Err(Error::not_found("Instructor not found"));
        }
    }

    if let Some(course_code) = body.course_code.as_deref() {
        let duplicate = sqlx::query_as::<_, Course>(
            "SELECT * FROM courses WHERE course_code = $1 AND institute_id = $2 AND id <> $3",
        )
        .bind(course_code.trim())
        .bind(institute_id)
        .bind(id)
        .fetch_optional(&pg)
        .await?;
        if duplicate.is_some() {
            return Err(Error::already_exists("Course with this code already exists"));
        }
    }

    let course = sqlx::query_as::<_, CourseWithInstructor>(&format!(
        "WITH updated AS ( \
           UPDATE courses SET \
             course_code = COALESCE($1, course_code), \
             course_name = COALESCE($2, course_name), \
             instructor_id = COALESCE($3, instructor_id), \
             description = COALESCE($4, description), \
             section = COALESCE($5, section), \
             status = COALESCE($6, status), \
             updated_at = now() \
           WHERE id = $7 AND institute_id = $8 RETURNING * \
         ) \
         {} ",
        "SELECT co.*, \
           t.department AS instructor_department, \
           u.first_name AS instructor_first_name, \
           u.last_name AS instructor_last_name, \
           u.email AS instructor_email \
         FROM updated co \
         JOIN teachers t ON t.id = co.instructor_id \
         JOIN users u ON u.id = t.user_id"
    ))
    .bind(body.course_code.as_deref().map(str::trim))
    .bind(&body.course_name)
    .bind(body.instructor)
    .bind(&body.description)
    .bind(&body.section)
    .bind(&body.status)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match course {
        Some(course) => proceeds(CourseUpdated {
            message: "Course updated successfully".to_string(),
            course,
        }),
        None => Err(Error::not_found("Course not found")),
    }
}

pub async fn delete_course(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CourseDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let deleted = sqlx::query("DELETE FROM courses WHERE id = $1 AND institute_id = $2")
        .bind(id)
        .bind(institute_id)
        .execute(&pg)
        .await?;
    if deleted.rows_affected() < 1 {
        return Err(Error::not_found("Course not found"));
    }
    proceeds(CourseDeleted {
        message: "Course deleted successfully".to_string(),
    })
}

pub async fn get_course_schedules(
    user: AuthUser,
    Path(course_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<CourseSchedule>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let course =
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 AND institute_id = $2")
            .bind(course_id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    if course.is_none() {
        return Err(Error::not_found("Course not found"));
    }

    let schedules = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE course_id = $1 ORDER BY created_at DESC",
    )
    .bind(course_id)
    .fetch_all(&pg)
    .await?;
    proceeds(schedules)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCourse {
    pub course_code: String,
    pub course_name: String,
    pub instructor: Uuid,
    pub description: Option<String>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourse {
    pub course_code: Option<String>,
    pub course_name: Option<String>,
    pub instructor: Option<Uuid>,
    pub description: Option<String>,
    pub section: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseCreated {
    pub message: String,
    pub course: Course,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseUpdated {
    pub message: String,
    pub course: CourseWithInstructor,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseDeleted {
    pub message: String,
}
