use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_STUDENT: &str = "student";

pub const SECTION_LABELS: [&str; 6] = ["A", "B", "C", "D", "E", "F"];

pub const DAYS_OF_WEEK: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Credential record. One per human actor regardless of role.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Teacher role profile. `institute_id` references the owning admin credential.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
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
}

/// Student role profile. Carries both the section document reference used by
/// the admin structure and the flat cohort label ("A".."F") that course
/// schedules match on.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
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
}

/// Grade level within a school institute (Playgroup, Nursery, 1..10, ...).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Class {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub class_name: String,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub class_id: Uuid,
    pub section_name: String,
    pub description: String,
    pub capacity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Course {
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
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseSchedule {
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
}

pub const ATTENDANCE_STATUSES: [&str; 3] = ["present", "absent", "late"];

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSlot {
    pub id: Uuid,
    pub course_schedule_id: Uuid,
    pub date: String,
    pub slot: String,
    pub statuses: Json<Vec<StudentStatus>>,
    pub marked_by: Uuid,
    pub marked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StudentStatus {
    pub student: Uuid,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Announcement {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CourseMaterial {
    pub id: Uuid,
    pub course_schedule_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: Uuid,
    pub course_schedule_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionUpload {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub student_id: Uuid,
    pub original_name: String,
    pub stored_name: String,
    pub mime_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    pub id: Uuid,
    pub student_id: Uuid,
    pub course_schedule_id: Uuid,
    pub requested_day: String,
    pub reason: String,
    pub status: String,
    pub week_start: DateTime<Utc>,
    pub week_end: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PortalSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub institute_name: String,
    pub institute_type: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub logo_url: String,
    pub address: String,
    pub contact_email: String,
    pub contact_phone: String,
    pub portal_permissions: Json<PortalPermissions>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortalPermissions {
    pub admin_portal: PortalAccess,
    pub teacher_portal: PortalAccess,
    pub student_portal: PortalAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortalAccess {
    pub enabled: bool,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Default for PortalPermissions {
    /// New institutes start with only the admin portal open; teacher and
    /// student portals stay closed until the admin enables them.
    fn default() -> Self {
        PortalPermissions {
            admin_portal: PortalAccess {
                enabled: true,
                features: Vec::new(),
            },
            teacher_portal: PortalAccess {
                enabled: false,
                features: Vec::new(),
            },
            student_portal: PortalAccess {
                enabled: false,
                features: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portal_permissions_use_camel_case_keys() {
        let json = serde_json::to_value(PortalPermissions::default()).unwrap();
        assert!(json["adminPortal"]["enabled"].as_bool().unwrap());
        assert!(!json["teacherPortal"]["enabled"].as_bool().unwrap());
        assert!(!json["studentPortal"]["enabled"].as_bool().unwrap());
    }
}
