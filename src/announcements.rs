use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::Announcement;
use crate::scope;

pub async fn create_announcement(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateAnnouncement>,
) -> Payload<SuccessData<Announcement>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    if body.title.trim().is_empty() || body.description.trim().is_empty() {
        return Err(Error::invalid("title and description are required"));
    }

    let announcement = sqlx::query_as::<_, Announcement>(
        "INSERT INTO announcements \
         (id, institute_id, created_by, title, description, image_url, tags, expiry_date) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(user.id)
    .bind(body.title.trim())
    .bind(body.description.trim())
    .bind(&body.image_url)
    .bind(body.tags.unwrap_or_default())
    .bind(body.expiry_date)
    .fetch_one(&pg)
    .await?;

    creates(SuccessData {
        success: true,
        data: announcement,
    })
}

pub async fn get_announcements(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<SuccessData<Vec<Announcement>>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let announcements = sqlx::query_as::<_, Announcement>(
        "SELECT * FROM announcements WHERE institute_id = $1 ORDER BY created_at DESC",
    )
    .bind(institute_id)
    .fetch_all(&pg)
    .await?;
    proceeds(SuccessData {
        success: true,
        data: announcements,
    })
}

pub async fn update_announcement(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateAnnouncement>,
) -> Payload<SuccessData<Announcement>> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let announcement = sqlx::query_as::<_, Announcement>(
        "UPDATE announcements SET \
           title = COALESCE($1, title), \
           description = COALESCE($2, description), \
           image_url = COALESCE($3, image_url), \
           tags = COALESCE($4, tags), \
           expiry_date = COALESCE($5, expiry_date), \
           updated_at = now() \
         WHERE id = $6 AND institute_id = $7 RETURNING *",
    )
    .bind(&body.title)
    .bind(&body.description)
    .bind(&body.image_url)
    .bind(&body.tags)
    .bind(body.expiry_date)
    .bind(id)
    .bind(institute_id)
    .fetch_optional(&pg)
    .await?;

    match announcement {
        Some(announcement) => proceeds(SuccessData {
            success: true,
            data: announcement,
        }),
        None => Err(Error::not_found("Announcement not found")),
    }
}

pub async fn delete_announcement(
    user: AuthUser,
    Path(id): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let deleted = sqlx::query("DELETE FROM announcements WHERE id = $1 AND institute_id = $2")
        .bind(id)
        .bind(institute_id)
        .execute(&pg)
        .await?;
    if deleted.rows_affected() < 1 {
        return Err(Error::not_found("Announcement not found"));
    }
    proceeds(Deleted { success: true })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnouncement {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAnnouncement {
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub tags: Option<Vec<String>>,
    pub expiry_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessData<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub success: bool,
}
