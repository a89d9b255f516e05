use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{Course, CourseSchedule, Teacher, DAYS_OF_WEEK, SECTION_LABELS};
use crate::scope;

/// Schedule joined with course and instructor details.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDetail {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub course_id: Uuid,
    pub instructor_id: Uuid,
    pub section: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i32,
    pub days_of_week: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub course_code: String,
    pub course_name: String,
    pub course_description: String,
    pub course_status: String,
    pub instructor_department: String,
    pub instructor_first_name: Option<String>,
    pub instructor_last_name: Option<String>,
    pub instructor_email: String,
}

pub async fn create_schedule(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateSchedule>,
) -> Payload<ScheduleCreated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    if !SECTION_LABELS.contains(&body.section.as_str()) {
        return Err(Error::invalid(format!(
            "section must be one of {}",
            SECTION_LABELS.join(", ")
        )));
    }
    validate_days(&body.schedule.days_of_week)?;
    let duration_minutes =
        lecture_duration_minutes(&body.schedule.start_time, &body.schedule.end_time)?;

    let course =
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1 AND institute_id = $2")
            .bind(body.course)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    if course.is_none() {
        return Err(Error::not_found("Course not found"));
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

    let duplicate = sqlx::query_as::<_, CourseSchedule>(
        "SELECT * FROM course_schedules \
         WHERE course_id = $1 AND instructor_id = $2 AND section = $3 \
           AND days_of_week = $4 AND start_time = $5 AND end_time = $6",
    )
    .bind(body.course)
    .bind(body.instructor)
    .bind(&body.section)
    .bind(&body.schedule.days_of_week)
    .bind(&body.schedule.start_time)
    .bind(&body.schedule.end_time)
    .fetch_optional(&pg)
    .await?;
    if duplicate.is_some() {
        return Err(Error::already_exists(
            "A schedule with these details already exists",
        ));
    }

    let schedule = sqlx::query_as::<_, CourseSchedule>(
        "INSERT INTO course_schedules \
         (id, institute_id, course_id, instructor_id, section, start_time, end_time, \
          duration_minutes, days_of_week, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(body.course)
    .bind(body.instructor)
    .bind(&body.section)
    .bind(&body.schedule.start_time)
    .bind(&body.schedule.end_time)
    .bind(duration_minutes)
    .bind(&body.schedule.days_of_week)
    .bind(body.status.as_deref().unwrap_or("active"))
    .fetch_one(&pg)
    .await?;

    creates(ScheduleCreated {
        message: "Schedule created successfully".to_string(),
        schedule,
    })
}

pub async fn get_schedule_detail(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<ScheduleDetail> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let schedule = sqlx::query_as::<_, ScheduleDetail>(
        "SELECT cs.*, \
           c.course_code, c.course_name, \
           c.description AS course_description, c.status AS course_status, \
           t.department AS instructor_department, \
           u.first_name AS instructor_first_name, \
           u.last_name AS instructor_last_name, \
           u.email AS instructor_email \
         FROM course_schedules cs \
         JOIN courses c ON c.id = cs.course_id \
         JOIN teachers t ON t.id = cs.instructor_id \
         JOIN users u ON u.id = t.user_id \
         WHERE cs.id = $1 AND cs.institute_id = $2",
    )
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    match schedule {
        Some(schedule) => proceeds(schedule),
        None => Err(Error::not_found("Schedule not found")),
    }
}

/// Minutes between two "HH:MM" wall-clock times; the lecture must end after
/// it starts.
pub fn lecture_duration_minutes(start: &str, end: &str) -> Result<i32, Error> {
    let start_time = parse_lecture_time(start)?;
    let end_time = parse_lecture_time(end)?;
    let minutes = (end_time - start_time).num_minutes();
    if minutes <= 0 {
        return Err(Error::invalid("endTime must be after startTime"));
    }
    Ok(minutes as i32)
}

fn parse_lecture_time(value: &str) -> Result<NaiveTime, Error> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| Error::invalid(format!("{} is not a valid time format (HH:MM)", value)))
}

pub fn validate_days(days: &[String]) -> Result<(), Error> {
    if days.is_empty() {
        return Err(Error::invalid("daysOfWeek must not be empty"));
    }
    for day in days {
        if !DAYS_OF_WEEK.contains(&day.as_str()) {
            return Err(Error::invalid(format!(
                "{} is not a valid day of the week",
                day
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSchedule {
    pub course: Uuid,
    pub instructor: Uuid,
    pub section: String,
    pub schedule: LectureSlot,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LectureSlot {
    pub start_time: String,
    pub end_time: String,
    pub days_of_week: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleCreated {
    pub message: String,
    pub schedule: CourseSchedule,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_derived_from_the_time_range() {
        assert_eq!(lecture_duration_minutes("08:00", "09:00").unwrap(), 60);
        assert_eq!(lecture_duration_minutes("09:15", "10:45").unwrap(), 90);
        assert_eq!(lecture_duration_minutes("9:05", "9:35").unwrap(), 30);
    }

    #[test]
    fn backwards_or_empty_ranges_are_rejected() {
        assert!(lecture_duration_minutes("10:00", "09:00").is_err());
        assert!(lecture_duration_minutes("10:00", "10:00").is_err());
    }

    #[test]
    fn malformed_times_are_rejected() {
        assert!(lecture_duration_minutes("25:00", "26:00").is_err());
        assert!(lecture_duration_minutes("8am", "9am").is_err());
        assert!(lecture_duration_minutes("", "09:00").is_err());
    }

    #[test]
    fn day_names_must_come_from_the_week() {
        assert!(validate_days(&["Monday".to_string(), "Friday".to_string()]).is_ok());
        assert!(validate_days(&[]).is_err());
        assert!(validate_days(&["Funday".to_string()]).is_err());
        assert!(validate_days(&["monday".to_string()]).is_err());
    }
}
