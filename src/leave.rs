use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{CourseSchedule, LeaveRequest, Student};
use crate::scope;
use crate::week::iso_week_range;

/// Leave request joined with its course for student listings.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudentLeave {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_schedule_id: Uuid,
    pub requested_day: String,
    pub reason: String,
    pub status: String,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub course_code: String,
    pub course_name: String,
}

/// Pending leave joined with course and student info for moderation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TeacherLeave {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_schedule_id: Uuid,
    pub requested_day: String,
    pub reason: String,
    pub status: String,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub course_code: String,
    pub course_name: String,
    pub roll_no: i64,
}

pub async fn get_student_leaves(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<StudentLeave>> {
    let leaves = sqlx::query_as::<_, StudentLeave>(
        "SELECT lr.*, c.course_code, c.course_name \
         FROM leave_requests lr \
         JOIN course_schedules cs ON cs.id = lr.course_schedule_id \
         JOIN courses c ON c.id = cs.course_id \
         WHERE lr.student_id = $1 ORDER BY lr.created_at DESC",
    )
    .bind(user.id)
    .fetch_all(&pg)
    .await?;
    proceeds(leaves)
}

pub async fn create_leave_request(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateLeaveRequest>,
) -> Payload<LeaveCreated> {
    if body.requested_day.trim().is_empty() || body.reason.trim().is_empty() {
        return Err(Error::invalid(
            "courseScheduleId, requestedDay and reason are required",
        ));
    }
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let student = sqlx::query_as::<_, Student>("SELECT * FROM students WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&pg)
        .await?;
    let student = match student {
        Some(student) => student,
        None => return Err(Error::not_found("Student profile not found")),
    };

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE id = $1 AND institute_id = $2",
    )
    .bind(body.course_schedule_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    let schedule = match schedule {
        Some(schedule) => schedule,
        None => return Err(Error::not_found("Course Schedule not found")),
    };

    if student.section.as_deref() != Some(schedule.section.as_str()) {
        return Err(Error::forbidden(
            "You cannot request leave for a schedule outside your section",
        ));
    }
    if !day_in_schedule(&schedule.days_of_week, &body.requested_day) {
        return Err(Error::invalid(
            "requestedDay must be one of the schedule.daysOfWeek",
        ));
    }

    let week = iso_week_range(Utc::now());

    let existing = sqlx::query_as::<_, LeaveRequest>(
        "SELECT * FROM leave_requests \
         WHERE student_id = $1 AND course_schedule_id = $2 \
           AND requested_day = $3 AND week_start = $4",
    )
    .bind(user.id)
    .bind(body.course_schedule_id)
    .bind(&body.requested_day)
    .bind(week.start)
    .fetch_optional(&pg)
    .await?;
    if existing.is_some() {
        return Err(Error::conflict(
            "You have already requested leave for this lecture in the current week",
        ));
    }

    let leave = sqlx::query_as::<_, LeaveRequest>(
        "INSERT INTO leave_requests \
         (id, student_id, course_schedule_id, requested_day, reason, status, week_start, week_end) \
         VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(body.course_schedule_id)
    .bind(&body.requested_day)
    .bind(body.reason.trim())
    .bind(week.start)
    .bind(week.end)
    .fetch_one(&pg)
    .await?;

    creates(LeaveCreated {
        message: "Leave request submitted".to_string(),
        leave,
    })
}

/// Pending requests for the current week across the teacher's own schedules.
pub async fn get_teacher_leaves(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<TeacherLeave>> {
    let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM teachers WHERE id = $1")
        .bind(user.id)
        .fetch_optional(&pg)
        .await?;
    if exists.is_none() {
        return Err(Error::not_found("Teacher profile not found"));
    }

    let current_week = iso_week_range(Utc::now());
    let leaves = sqlx::query_as::<_, TeacherLeave>(
        "SELECT lr.*, c.course_code, c.course_name, s.roll_no \
         FROM leave_requests lr \
         JOIN course_schedules cs ON cs.id = lr.course_schedule_id \
         JOIN courses c ON c.id = cs.course_id \
         JOIN students s ON s.id = lr.student_id \
         WHERE lr.status = 'pending' AND lr.week_start = $1 AND cs.instructor_id = $2 \
         ORDER BY lr.created_at DESC",
    )
    .bind(current_week.start)
    .bind(user.id)
    .fetch_all(&pg)
    .await?;
    proceeds(leaves)
}

pub async fn update_leave_status(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateLeaveStatus>,
) -> Payload<LeaveUpdated> {
    if !matches!(body.status.as_str(), "accepted" | "rejected") {
        return Err(Error::invalid(
            "status must be either 'accepted' or 'rejected'",
        ));
    }

    let leave = sqlx::query_as::<_, LeaveRequest>("SELECT * FROM leave_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&pg)
        .await?;
    let leave = match leave {
        Some(leave) => leave,
        None => return Err(Error::not_found("Leave request not found")),
    };

    let instructor_id: Option<Uuid> =
        sqlx::query_scalar("SELECT instructor_id FROM course_schedules WHERE id = $1")
            .bind(leave.course_schedule_id)
            .fetch_optional(&pg)
            .await?;
    if instructor_id != Some(user.id) {
        return Err(Error::forbidden(
            "You are not allowed to modify this leave request",
        ));
    }

    let leave = sqlx::query_as::<_, LeaveRequest>(
        "UPDATE leave_requests SET status = $1 WHERE id = $2 RETURNING *",
    )
    .bind(&body.status)
    .bind(id)
    .fetch_one(&pg)
    .await?;

    proceeds(LeaveUpdated {
        message: format!("Leave {}", body.status),
        leave,
    })
}

fn day_in_schedule(days: &[String], day: &str) -> bool {
    days.iter().any(|scheduled| scheduled == day)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeaveRequest {
    pub course_schedule_id: Uuid,
    pub requested_day: String,
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLeaveStatus {
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveCreated {
    pub message: String,
    pub leave: LeaveRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaveUpdated {
    pub message: String,
    pub leave: LeaveRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_day_must_be_scheduled() {
        let days = vec!["Tuesday".to_string(), "Thursday".to_string()];
        assert!(day_in_schedule(&days, "Tuesday"));
        assert!(!day_in_schedule(&days, "Monday"));
        assert!(!day_in_schedule(&days, "tuesday"));
    }

    #[test]
    fn moderation_statuses_are_whitelisted() {
        for status in ["accepted", "rejected"] {
            assert!(matches!(status, "accepted" | "rejected"));
        }
        assert!(!matches!("pending", "accepted" | "rejected"));
        assert!(!matches!("approved", "accepted" | "rejected"));
    }
}
