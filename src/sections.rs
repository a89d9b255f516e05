use axum::extract::{Path, Query};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{Class, Section};
use crate::scope;
use crate::students::StudentWithUser;

/// Section joined with its class for listing responses.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SectionWithClass {
    pub id: Uuid,
    pub institute_id: Uuid,
    pub class_id: Uuid,
    pub section_name: String,
    pub description: String,
    pub capacity: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub class_name: String,
    pub class_description: String,
}

pub async fn add_section(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<AddSection>,
) -> Payload<SectionCreated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.section_name.trim().is_empty() {
        return Err(Error::invalid("sectionName is required"));
    }

    let class =
        sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1 AND institute_id = $2")
            .bind(body.class_id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    if class.is_none() {
        return Err(Error::not_found("Class not found"));
    }

    let existing = sqlx::query_as::<_, Section>(
        "SELECT * FROM sections WHERE section_name = $1 AND class_id = $2 AND institute_id = $3",
    )
    .bind(body.section_name.trim())
    .bind(body.class_id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    if existing.is_some() {
        return Err(Error::already_exists(
            "Section with this name already exists in this class",
        ));
    }

    let section = sqlx::query_as::<_, Section>(
        "INSERT INTO sections (id, institute_id, class_id, section_name, description, capacity, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(body.class_id)
    .bind(body.section_name.trim())
    .bind(body.description.unwrap_or_default())
    .bind(body.capacity.unwrap_or(0))
    .bind(body.status.as_deref().unwrap_or("active"))
    .fetch_one(&pg)
    .await?;

    creates(SectionCreated {
        message: "Section added successfully".to_string(),
        section,
    })
}

pub async fn get_sections(
    user: AuthUser,
    Query(query): Query<SectionFilter>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<SectionWithClass>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let sections = sqlx::query_as::<_, SectionWithClass>(
        "SELECT s.*, c.class_name, c.description AS class_description \
         FROM sections s JOIN classes c ON c.id = s.class_id \
         WHERE s.institute_id = $1 AND ($2::uuid IS NULL OR s.class_id = $2) \
         ORDER BY s.created_at DESC",
    )
    .bind(institute_id)
    .bind(query.class_id)
    .fetch_all(&pg)
    .await?;
    proceeds(sections)
}

pub async fn get_section_by_id(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SectionWithClass> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let section = fetch_section(&pg, id, institute_id).await?;
    match section {
        Some(section) => proceeds(section),
        None => Err(Error::not_found("Section not found")),
    }
}

pub async fn update_section(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateSection>,
) -> Payload<SectionUpdated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let section =
        sqlx::query_as::<_, Section>("SELECT * FROM sections WHERE id = $1 AND institute_id = $2")
            .bind(id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    let section = match section {
        Some(section) => section,
        None => return Err(Error::not_found("Section not found")),
    };

    if let Some(section_name) = body.section_name.as_deref() {
        if section_name != section.section_name {
            let duplicate = sqlx::query_as::<_, Section>(
                "SELECT * FROM sections \
                 WHERE section_name = $1 AND class_id = $2 AND institute_id = $3 AND id <> $4",
            )
            .bind(section_name.trim())
            .bind(section.class_id)
            .bind(institute_id)
            .bind(id)
            .fetch_optional(&pg)
            .await?;
            if duplicate.is_some() {
                return Err(Error::already_exists(
                    "Section with this name already exists in this class",
                ));
            }
        }
    }

    let updated = sqlx::query_as::<_, SectionWithClass>(
        "WITH updated AS ( \
           UPDATE sections SET \
             section_name = COALESCE($1, section_name), \
             description = COALESCE($2, description), \
             capacity = COALESCE($3, capacity), \
             status = COALESCE($4, status), \
             updated_at = now() \
           WHERE id = $5 AND institute_id = $6 RETURNING * \
         ) \
         SELECT u.*, c.class_name, c.description AS class_description \
         FROM updated u JOIN classes c ON c.id = u.class_id",
    )
    .bind(body.section_name.as_deref().map(str::trim))
    .bind(&body.description)
    .bind(body.capacity)
    .bind(&body.status)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match updated {
        Some(section) => proceeds(SectionUpdated {
            message: "Section updated successfully".to_string(),
            section,
        }),
        None => Err(Error::not_found("Section not found")),
    }
}

pub async fn delete_section(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SectionDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let students_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE section_id = $1")
            .bind(id)
            .fetch_one(&pg)
            .await?;
    if students_count > 0 {
        return Err(Error::invalid(format!(
            "Cannot delete section. There are {} students in this section.",
            students_count
        )));
    }

    let deleted = sqlx::query("DELETE FROM sections WHERE id = $1 AND institute_id = $2")
        .bind(id)
        .bind(institute_id)
        .execute(&pg)
        .await?;
    if deleted.rows_affected() < 1 {
        return Err(Error::not_found("Section not found"));
    }

    proceeds(SectionDeleted {
        message: "Section deleted successfully".to_string(),
    })
}

pub async fn get_section_statistics(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<SectionStatistics> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let section = match fetch_section(&pg, id, institute_id).await? {
        Some(section) => section,
        None => return Err(Error::not_found("Section not found")),
    };

    let students_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE section_id = $1")
            .bind(id)
            .fetch_one(&pg)
            .await?;
    let male_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM students WHERE section_id = $1 AND gender = 'male'",
    )
    .bind(id)
    .fetch_one(&pg)
    .await?;
    let female_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM students WHERE section_id = $1 AND gender = 'female'",
    )
    .bind(id)
    .fetch_one(&pg)
    .await?;

    let capacity = section.capacity;
    let capacity_utilization = if capacity > 0 {
        Some(format!(
            "{:.2}",
            students_count as f64 / f64::from(capacity) * 100.0
        ))
    } else {
        None
    };
    let available_seats = if capacity > 0 {
        Some(i64::from(capacity) - students_count)
    } else {
        None
    };

    proceeds(SectionStatistics {
        section,
        students_count,
        gender_distribution: GenderDistribution {
            male: male_count,
            female: female_count,
        },
        capacity,
        capacity_utilization,
        available_seats,
    })
}

pub async fn get_section_students(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<StudentWithUser>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if fetch_section(&pg, id, institute_id).await?.is_none() {
        return Err(Error::not_found("Section not found"));
    }

    let students = sqlx::query_as::<_, StudentWithUser>(
        "SELECT s.*, u.first_name, u.last_name, u.email \
         FROM students s JOIN users u ON u.id = s.user_id \
         WHERE s.section_id = $1 ORDER BY s.roll_no ASC",
    )
    .bind(id)
    .fetch_all(&pg)
    .await?;
    proceeds(students)
}

async fn fetch_section(
    pg: &PgPool,
    id: Uuid,
    institute_id: Uuid,
) -> Result<Option<SectionWithClass>, Error> {
    let section = sqlx::query_as::<_, SectionWithClass>(
        "SELECT s.*, c.class_name, c.description AS class_description \
         FROM sections s JOIN classes c ON c.id = s.class_id \
         WHERE s.id = $1 AND s.institute_id = $2",
    )
    .bind(id)
    .bind(institute_id)
    .fetch_optional(pg)
    .await?;
    Ok(section)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSection {
    pub class_id: Uuid,
    pub section_name: String,
    pub description: Option<String>,
    pub capacity: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSection {
    pub section_name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionFilter {
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionCreated {
    pub message: String,
    pub section: Section,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionUpdated {
    pub message: String,
    pub section: SectionWithClass,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionDeleted {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStatistics {
    pub section: SectionWithClass,
    pub students_count: i64,
    pub gender_distribution: GenderDistribution,
    pub capacity: i32,
    pub capacity_utilization: Option<String>,
    pub available_seats: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenderDistribution {
    pub male: i64,
    pub female: i64,
}
