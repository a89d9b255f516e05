use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as Jsonb;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::err::{proceeds, Error, Payload};
use crate::models::{PortalAccess, PortalPermissions, PortalSettings, ROLE_ADMIN, ROLE_TEACHER};
use crate::scope;

pub async fn get_portal_settings(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<SettingsResponse> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let settings = ensure_settings(&pg, institute_id).await?;
    proceeds(SettingsResponse {
        success: true,
        data: settings,
    })
}

/// Branding and permission updates; only the institute admin may write.
pub async fn update_portal_settings(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<UpdateSettings>,
) -> Payload<SettingsResponse> {
    if user.role != ROLE_ADMIN {
        return Err(Error::forbidden(
            "Only institute admins can update portal settings",
        ));
    }
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    ensure_settings(&pg, institute_id).await?;

    let settings = sqlx::query_as::<_, PortalSettings>(
        "UPDATE portal_settings SET \
           institute_name = COALESCE($1, institute_name), \
           institute_type = COALESCE($2, institute_type), \
           primary_color = COALESCE($3, primary_color), \
           secondary_color = COALESCE($4, secondary_color), \
           logo_url = COALESCE($5, logo_url), \
           address = COALESCE($6, address), \
           contact_email = COALESCE($7, contact_email), \
           contact_phone = COALESCE($8, contact_phone), \
           portal_permissions = COALESCE($9, portal_permissions), \
           updated_at = now() \
         WHERE user_id = $10 RETURNING *",
    )
    .bind(&body.institute_name)
    .bind(&body.institute_type)
    .bind(&body.primary_color)
    .bind(&body.secondary_color)
    .bind(&body.logo_url)
    .bind(&body.address)
    .bind(&body.contact_email)
    .bind(&body.contact_phone)
    .bind(body.portal_permissions.clone().map(Jsonb))
    .bind(institute_id)
    .fetch_one(&pg)
    .await?;

    proceeds(SettingsResponse {
        success: true,
        data: settings,
    })
}

/// The feature list and flag for the caller's own portal.
pub async fn get_portal_features(
    user: AuthUser,
    Extension(pg): Extension<PgPool>,
) -> Payload<FeaturesResponse> {
    let institute_id = scope::institute_id_for(&user, &pg).await?;
    let settings = ensure_settings(&pg, institute_id).await?;
    let permissions = settings.portal_permissions.0;

    let portal = if user.role == ROLE_ADMIN {
        permissions.admin_portal
    } else if user.role == ROLE_TEACHER {
        permissions.teacher_portal
    } else {
        permissions.student_portal
    };

    proceeds(FeaturesResponse {
        success: true,
        data: portal,
    })
}

/// Fetches the institute's settings row, creating the defaults on first use.
pub async fn ensure_settings(pg: &PgPool, institute_id: Uuid) -> Result<PortalSettings, Error> {
    let existing =
        sqlx::query_as::<_, PortalSettings>("SELECT * FROM portal_settings WHERE user_id = $1")
            .bind(institute_id)
            .fetch_optional(pg)
            .await?;
    if let Some(settings) = existing {
        return Ok(settings);
    }

    // first read wins; a concurrent insert is absorbed by the conflict clause
    let settings = sqlx::query_as::<_, PortalSettings>(
        "INSERT INTO portal_settings (id, user_id, portal_permissions) VALUES ($1, $2, $3) \
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(institute_id)
    .bind(Jsonb(PortalPermissions::default()))
    .fetch_one(pg)
    .await?;
    Ok(settings)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettings {
    pub institute_name: Option<String>,
    pub institute_type: Option<String>,
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub logo_url: Option<String>,
    pub address: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub portal_permissions: Option<PortalPermissions>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub data: PortalSettings,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeaturesResponse {
    pub success: bool,
    pub data: PortalAccess,
}
