use axum::extract::Path;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{Class, Section};
use crate::scope;

pub async fn add_class(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<AddClass>,
) -> Payload<ClassCreated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.class_name.trim().is_empty() {
        return Err(Error::invalid("className is required"));
    }

    let existing = sqlx::query_as::<_, Class>(
        "SELECT * FROM classes WHERE class_name = $1 AND institute_id = $2",
    )
    .bind(body.class_name.trim())
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;
    if existing.is_some() {
        return Err(Error::already_exists("Class with this name already exists"));
    }

    let class = sqlx::query_as::<_, Class>(
        "INSERT INTO classes (id, institute_id, class_name, description, status) \
         VALUES ($1, $2, $3, $4, $5) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(body.class_name.trim())
    .bind(body.description.unwrap_or_default())
    .bind(body.status.as_deref().unwrap_or("active"))
    .fetch_one(&pg)
    .await?;

    creates(ClassCreated {
        message: "Class added successfully".to_string(),
        class,
    })
}

pub async fn get_classes(user: AuthUser, Extension(pg): Extension<PgPool>) -> Payload<Vec<Class>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let classes = sqlx::query_as::<_, Class>(
        "SELECT * FROM classes WHERE institute_id = $1 ORDER BY created_at DESC",
    )
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(classes)
}

pub async fn get_class_by_id(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Class> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let class =
        sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1 AND institute_id = $2")
            .bind(id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    match class {
        Some(class) => proceeds(class),
        None => Err(Error::not_found("Class not found")),
    }
}

pub async fn update_class(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateClass>,
) -> Payload<ClassUpdated> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    if let Some(class_name) = body.class_name.as_deref() {
        let duplicate = sqlx::query_as::<_, Class>(
            "SELECT * FROM classes WHERE class_name = $1 AND institute_id = $2 AND id <> $3",
        )
        .bind(class_name.trim())
        .bind(institute_id)
        .bind(id)
        .fetch_optional(&pg)
        .await?;
        if duplicate.is_some() {
            return Err(Error::already_exists("Class with this name already exists"));
        }
    }

    let class = sqlx::query_as::<_, Class>(
        "UPDATE classes SET \
           class_name = COALESCE($1, class_name), \
           description = COALESCE($2, description), \
           status = COALESCE($3, status), \
           updated_at = now() \
         WHERE id = $4 AND institute_id = $5 RETURNING *",
    )
    .bind(body.class_name.as_deref().map(str::trim))
    .bind(&body.description)
    .bind(&body.status)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match class {
        Some(class) => proceeds(ClassUpdated {
            message: "Class updated successfully".to_string(),
            class,
        }),
        None => Err(Error::not_found("Class not found")),
    }
}

pub async fn delete_class(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<ClassDeleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let students_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE class_id = $1")
        .bind(id)
        .fetch_one(&pg)
        .await?;
    if students_count > 0 {
        return Err(Error::invalid(format!(
            "Cannot delete class. There are {} students enrolled in this class.",
            students_count
        )));
    }

    let deleted = sqlx::query("DELETE FROM classes WHERE id = $1 AND institute_id = $2")
        .bind(id)
        .bind(institute_id)
        .execute(&pg)
        .await?;
    if deleted.rows_affected() < 1 {
        return Err(Error::not_found("Class not found"));
    }

    sqlx::query("DELETE FROM sections WHERE class_id = $1")
        .bind(id)
        .execute(&pg)
        .await?;

    proceeds(ClassDeleted {
        message: "Class and related sections deleted successfully".to_string(),
    })
}

pub async fn get_class_sections(
    user: AuthUser,
    Path(class_id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Vec<Section>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let class =
        sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1 AND institute_id = $2")
            .bind(class_id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    if class.is_none() {
        return Err(Error::not_found(
            "Class not found or you don't have permission to access it.",
        ));
    }

    let sections = sqlx::query_as::<_, Section>(
        "SELECT * FROM sections WHERE class_id = $1 ORDER BY section_name ASC",
    )
    .bind(class_id)
    .fetch_all(&pg)
    .await?;
    proceeds(sections)
}

pub async fn get_class_statistics(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<ClassStatistics> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;

    let class =
        sqlx::query_as::<_, Class>("SELECT * FROM classes WHERE id = $1 AND institute_id = $2")
            .bind(id)
            .bind(institute_id)
            .fetch_optional(&pg)
            .await?;
    let class = match class {
        Some(class) => class,
        None => return Err(Error::not_found("Class not found")),
    };

    let sections_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sections WHERE class_id = $1")
        .bind(id)
        .fetch_one(&pg)
        .await?;
    let students_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE class_id = $1")
        .bind(id)
        .fetch_one(&pg)
        .await?;

    let sections =
        sqlx::query_as::<_, Section>("SELECT * FROM sections WHERE class_id = $1")
            .bind(id)
            .fetch_all(&pg)
            .await?;
    let mut section_stats = Vec::with_capacity(sections.len());
    for section in sections {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE section_id = $1")
            .bind(section.id)
            .fetch_one(&pg)
            .await?;
        section_stats.push(SectionStat {
            section_id: section.id,
            section_name: section.section_name,
            students_count: count,
            capacity: section.capacity,
        });
    }

    proceeds(ClassStatistics {
        class,
        sections_count,
        students_count,
        section_stats,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddClass {
    pub class_name: String,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClass {
    pub class_name: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassCreated {
    pub message: String,
    pub class: Class,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassUpdated {
    pub message: String,
    pub class: Class,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassDeleted {
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassStatistics {
    pub class: Class,
    pub sections_count: i64,
    pub students_count: i64,
    pub section_stats: Vec<SectionStat>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionStat {
    pub section_id: Uuid,
    pub section_name: String,
    pub students_count: i64,
    pub capacity: i32,
}
