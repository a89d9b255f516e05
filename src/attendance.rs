use axum::extract::Query;
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::Json as Jsonb;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{proceeds, Error, Payload};
use crate::models::{AttendanceSlot, CourseSchedule, StudentStatus, ATTENDANCE_STATUSES};
use crate::scope;
use crate::students::StudentWithUser;

/// Teacher marks (or remarks) a lecture slot; the whole statuses array is
/// replaced on conflict.
pub async fn mark_attendance(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<MarkAttendance>,
) -> Payload<AttendanceSlot> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    if body.slot.trim().is_empty() || body.statuses.is_empty() {
        return Err(Error::invalid("Missing fields"));
    }
    if NaiveDate::parse_from_str(&body.date, "%Y-%m-%d").is_err() {
        return Err(Error::invalid(format!(
            "{} is not a valid date (YYYY-MM-DD)",
            body.date
        )));
    }
    for entry in &body.statuses {
        if !ATTENDANCE_STATUSES.contains(&entry.status.as_str()) {
            return Err(Error::invalid(format!(
                "{} is not a valid attendance status",
                entry.status
            )));
        }
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

    let slot = sqlx::query_as::<_, AttendanceSlot>(
        "INSERT INTO attendance_slots \
         (id, course_schedule_id, date, slot, statuses, marked_by, marked_at) \
         VALUES ($1, $2, $3, $4, $5, $6, now()) \
         ON CONFLICT (course_schedule_id, date, slot) DO UPDATE \
         SET statuses = EXCLUDED.statuses, marked_by = EXCLUDED.marked_by, marked_at = now() \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(body.course_schedule_id)
    .bind(&body.date)
    .bind(body.slot.trim())
    .bind(Jsonb(body.statuses.clone()))
    .bind(user.id)
    .fetch_one(&pg)
    .await?;

    proceeds(slot)
}

pub async fn get_attendance_for_schedule(
    user: AuthUser,
    Query(query): Query<ScheduleQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<AttendanceSlot>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let schedule_id = match query.course_schedule_id {
        Some(id) => id,
        None => return Err(Error::invalid("courseScheduleId required")),
    };

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE id = $1 AND institute_id = $2",
    )
    .bind(schedule_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    if schedule.is_none() {
        return Err(Error::not_found("Course schedule not found"));
    }

    let records = sqlx::query_as::<_, AttendanceSlot>(
        "SELECT * FROM attendance_slots WHERE course_schedule_id = $1 ORDER BY date ASC, slot ASC",
    )
    .bind(schedule_id)
    .fetch_all(&pg)
    .await?;
    proceeds(records)
}

/// Student's own attendance across all schedules of a course, reduced to
/// their own status per slot.
pub async fn get_student_attendance(
    user: AuthUser,
    Query(query): Query<CourseQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<OwnAttendance>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let course_id = match query.course_id {
        Some(id) => id,
        None => return Err(Error::invalid("courseId required")),
    };

    let schedule_ids: Vec<Uuid> = sqlx::query_scalar(
        "SELECT id FROM course_schedules WHERE course_id = $1 AND institute_id = $2",
    )
    .bind(course_id)
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    if schedule_ids.is_empty() {
        return proceeds(Vec::new());
    }

    let marker = serde_json::json!([{ "student": user.id }]);
    let records = sqlx::query_as::<_, AttendanceSlot>(
        "SELECT * FROM attendance_slots \
         WHERE course_schedule_id = ANY($1) AND statuses @> $2 \
         ORDER BY date ASC, slot ASC",
    )
    .bind(&schedule_ids)
    .bind(marker)
    .fetch_all(&pg)
    .await?;

    let own = records
        .into_iter()
        .filter_map(|record| {
            let status = record
                .statuses
                .0
                .iter()
                .find(|entry| entry.student == user.id)
                .map(|entry| entry.status.clone())?;
            Some(OwnAttendance {
                id: record.id,
                course_schedule: record.course_schedule_id,
                date: record.date,
                slot: record.slot,
                status,
            })
        })
        .collect();
    proceeds(own)
}

/// Roster for marking: every student in the schedule's section.
pub async fn get_students_for_schedule(
    user: AuthUser,
    Query(query): Query<ScheduleQuery>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<StudentWithUser>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let schedule_id = match query.course_schedule_id {
        Some(id) => id,
        None => return Err(Error::invalid("courseScheduleId required")),
    };

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules WHERE id = $1 AND institute_id = $2",
    )
    .bind(schedule_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    let schedule = match schedule {
        Some(schedule) => schedule,
        None => return Err(Error::not_found("Schedule not found")),
    };

    let students = sqlx::query_as::<_, StudentWithUser>(
        "SELECT s.*, u.first_name, u.last_name, u.email \
         FROM students s JOIN users u ON u.id = s.user_id \
         WHERE s.section = $1 AND s.institute_id = $2 ORDER BY s.roll_no ASC",
    )
    .bind(&schedule.section)
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(students)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAttendance {
    pub course_schedule_id: Uuid,
    pub date: String,
    pub slot: String,
    pub statuses: Vec<StudentStatus>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleQuery {
    pub course_schedule_id: Option<Uuid>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseQuery {
    pub course_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnAttendance {
    pub id: Uuid,
    pub course_schedule: Uuid,
    pub date: String,
    pub slot: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_status_is_extracted_from_a_slot() {
        let me = Uuid::new_v4();
        let other = Uuid::new_v4();
        let statuses = vec![
            StudentStatus {
                student: other,
                status: "present".to_string(),
            },
            StudentStatus {
                student: me,
                status: "late".to_string(),
            },
        ];
        let mine = statuses.iter().find(|entry| entry.student == me).unwrap();
        assert_eq!(mine.status, "late");
    }

    #[test]
    fn status_whitelist_matches_the_model() {
        assert!(ATTENDANCE_STATUSES.contains(&"present"));
        assert!(ATTENDANCE_STATUSES.contains(&"absent"));
        assert!(ATTENDANCE_STATUSES.contains(&"late"));
        assert!(!ATTENDANCE_STATUSES.contains(&"excused"));
    }
}
