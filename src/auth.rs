use axum::async_trait;
use axum::extract::{FromRequest, RequestParts};
use axum::http::header::AUTHORIZATION;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::err::{creates, proceeds, Error, Payload};
use crate::models::{
    PortalPermissions, PortalSettings, Session, User, ROLE_ADMIN, ROLE_STUDENT, ROLE_TEACHER,
};

/// Claim set embedded in every bearer token. Stateless to verify, but the
/// session id must still resolve to a live row before a request proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub email: String,
    pub user_id: Uuid,
    pub session_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

pub fn sign_token(claims: &TokenClaims, secret: &str) -> Result<String, Error> {
    Ok(encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?)
}

pub fn decode_token(token: &str, secret: &str) -> Result<TokenClaims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    // the claims carry no exp; liveness comes from the session row instead
    validation.validate_exp = false;
    validation.required_spec_claims = Default::default();
    let data = decode::<TokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

/// The resolved actor attached to every protected request. `id` is the
/// operative id: the role-profile id for teachers and students, the raw
/// credential id for admins.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub session_id: Uuid,
    pub role: String,
}

pub async fn resolve_session(
    header: Option<&str>,
    pg: &PgPool,
    secret: &str,
) -> Result<AuthUser, Error> {
    let header = header.ok_or_else(|| Error::unauthenticated("Authentication required"))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::unauthenticated("Authentication required"))?;
    if token.is_empty() {
        return Err(Error::unauthenticated("Authentication token required"));
    }

    let claims = decode_token(token, secret)
        .map_err(|err| Error::unauthenticated(format!("Invalid authentication token: {}", err)))?;

    let session = sqlx::query_as::<_, Session>("SELECT * FROM sessions WHERE id = $1")
        .bind(claims.session_id)
        .fetch_optional(pg)
        .await?;
    let session = match session {
        Some(session) if session.expires_at > Utc::now() => session,
        _ => return Err(Error::unauthenticated("Session expired")),
    };

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(claims.user_id)
        .fetch_optional(pg)
        .await?;
    let user = match user {
        Some(user) => user,
        None => return Err(Error::unauthenticated("Invalid session")),
    };

    // Teachers and students act under their role-profile id. A credential
    // without a profile row falls back to its own id.
    let operative_id = match user.role.as_str() {
        ROLE_TEACHER => {
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM teachers WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
                .unwrap_or(user.id)
        }
        ROLE_STUDENT => {
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM students WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
                .unwrap_or(user.id)
        }
        _ => user.id,
    };

    Ok(AuthUser {
        id: operative_id,
        email: claims.email,
        session_id: session.id,
        role: user.role,
    })
}

#[async_trait]
impl<B> FromRequest<B> for AuthUser
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let pg = req.extensions().get::<PgPool>().cloned().ok_or_else(|| {
            Error::internal("StateError", "database pool missing from request extensions")
        })?;
        let config = req.extensions().get::<AppConfig>().cloned().ok_or_else(|| {
            Error::internal("StateError", "configuration missing from request extensions")
        })?;
        let header = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        resolve_session(header, &pg, &config.secret).await
    }
}

/// Creates a session expiring one hour out, signs the bearer token and
/// stamps it back onto the row. A signing failure after the insert leaves a
/// usable session missing only its cached token copy.
pub async fn issue_session(
    user: &User,
    pg: &PgPool,
    secret: &str,
) -> Result<(Session, String), Error> {
    let session = sqlx::query_as::<_, Session>(
        "INSERT INTO sessions (id, user_id, expires_at) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(Utc::now() + Duration::hours(1))
    .fetch_one(pg)
    .await?;

    let claims = TokenClaims {
        email: user.email.clone(),
        user_id: user.id,
        session_id: session.id,
        role: Some(user.role.clone()),
    };
    let token = sign_token(&claims, secret)?;

    let session = sqlx::query_as::<_, Session>(
        "UPDATE sessions SET access_token = $1 WHERE id = $2 RETURNING *",
    )
    .bind(&token)
    .bind(session.id)
    .fetch_one(pg)
    .await?;

    Ok((session, token))
}

pub async fn register(
    registrar: Option<AuthUser>,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<RegisterRequest>,
) -> Payload<Registered> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(Error::invalid("not a valid email"));
    }
    if body.username.trim().is_empty() {
        return Err(Error::invalid("username is required"));
    }
    if body.password.is_empty() {
        return Err(Error::invalid("password is required"));
    }

    let role = body.role.as_deref().unwrap_or(ROLE_ADMIN);
    if !matches!(role, ROLE_ADMIN | ROLE_TEACHER | ROLE_STUDENT) {
        return Err(Error::invalid(format!("Unknown role `{}`", role)));
    }

    // Student and teacher accounts are provisioned by their institute's
    // admin; the registrar becomes the profile's institute.
    let institute_id = match role {
        ROLE_TEACHER | ROLE_STUDENT => {
            let registrar =
                registrar.ok_or_else(|| Error::unauthenticated("Authentication required"))?;
            if registrar.role != ROLE_ADMIN {
                return Err(Error::forbidden(
                    "Only institute admins can register teachers or students",
                ));
            }
            Some(registrar.id)
        }
        _ => None,
    };

    let existing = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&pg)
        .await?;
    if existing.is_some() {
        return Err(Error::already_exists("Email Already Exists!"));
    }

    let password_hash = Pbkdf2
        .hash_password(body.password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string();

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, email, username, password_hash, first_name, last_name, phone, role) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(&email)
    .bind(body.username.trim())
    .bind(&password_hash)
    .bind(body.name.as_ref().and_then(|name| name.first.clone()))
    .bind(body.name.as_ref().and_then(|name| name.last.clone()))
    .bind(&body.phone)
    .bind(role)
    .fetch_one(&pg)
    .await?;

    // The credential and profile writes are not transactional; compensate
    // by removing the credential when the profile cannot be created.
    if let Err(err) = create_role_profile(&user, role, &body, institute_id, &pg).await {
        let _ = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user.id)
            .execute(&pg)
            .await;
        return Err(err);
    }

    creates(Registered {
        user: RegisteredUser {
            username: user.username,
            email: user.email,
        },
        message: "Signed Up Successfully !".to_string(),
    })
}

async fn create_role_profile(
    user: &User,
    role: &str,
    body: &RegisterRequest,
    institute_id: Option<Uuid>,
    pg: &PgPool,
) -> Result<(), Error> {
    match role {
        ROLE_STUDENT => {
            let data = body.student_data.as_ref().ok_or_else(|| {
                Error::invalid("studentData is required for student registration")
            })?;
            let institute_id = institute_id.ok_or_else(|| {
                Error::internal("StateError", "student registration without a registrar")
            })?;
            let count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE institute_id = $1")
                    .bind(institute_id)
                    .fetch_one(pg)
                    .await?;
            sqlx::query(
                "INSERT INTO students \
                 (id, user_id, institute_id, roll_no, department, gender, mobile, \
                  admission_date, class_id, section_id, section, status) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(institute_id)
            .bind(count + 1)
            .bind(&data.department)
            .bind(&data.gender)
            .bind(&data.mobile)
            .bind(data.admission_date)
            .bind(data.class_id)
            .bind(data.section_id)
            .bind(&data.section)
            .bind("active")
            .execute(pg)
            .await?;
            Ok(())
        }
        ROLE_TEACHER => {
            let data = body.teacher_data.as_ref().ok_or_else(|| {
                Error::invalid("teacherData is required for teacher registration")
            })?;
            let institute_id = institute_id.ok_or_else(|| {
                Error::internal("StateError", "teacher registration without a registrar")
            })?;
            sqlx::query(
                "INSERT INTO teachers \
                 (id, user_id, institute_id, department, mobile, address, gender, degree, \
                  status, joining_date) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(Uuid::new_v4())
            .bind(user.id)
            .bind(institute_id)
            .bind(&data.department)
            .bind(&data.mobile)
            .bind(&data.address)
            .bind(&data.gender)
            .bind(&data.degree)
            .bind(data.status.as_deref().unwrap_or("active"))
            .bind(data.joining_date)
            .execute(pg)
            .await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

pub async fn login(
    Extension(pg): Extension<PgPool>,
    Extension(config): Extension<AppConfig>,
    Json(body): Json<LoginRequest>,
) -> Payload<LoggedIn> {
    if body.password.is_empty() {
        return Err(Error::invalid("password is required"));
    }
    let email = body.email.trim().to_lowercase();

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = $1")
        .bind(&email)
        .fetch_optional(&pg)
        .await?;
    let user = match user {
        Some(user) => user,
        None => return Err(Error::invalid("User not Found!")),
    };

    let hash = PasswordHash::new(&user.password_hash)?;
    if Pbkdf2
        .verify_password(body.password.as_bytes(), &hash)
        .is_err()
    {
        return Err(Error::invalid("Invalid Credentials !"));
    }

    let (session, token) = issue_session(&user, &pg, &config.secret).await?;

    // valid credentials are necessary but not sufficient: the tenant's
    // portal for this role must be open
    let settings = portal_settings_for(&user, &pg).await?;
    if !portal_allows(&user.role, settings.as_ref().map(|s| &s.portal_permissions.0)) {
        return Err(Error::PortalDisabled {
            message: format!(
                "The {} portal is currently disabled for this institute",
                user.role
            ),
        });
    }

    proceeds(LoggedIn {
        user: PublicUser {
            id: user.id,
            email: user.email,
            username: user.username,
            role: user.role,
        },
        token,
        expires_at: session.expires_at,
        settings,
        message: "Successfully LoggedIn!".to_string(),
    })
}

async fn portal_settings_for(user: &User, pg: &PgPool) -> Result<Option<PortalSettings>, Error> {
    let institute_id = match user.role.as_str() {
        ROLE_STUDENT => {
            sqlx::query_scalar::<_, Uuid>("SELECT institute_id FROM students WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
        }
        ROLE_TEACHER => {
            sqlx::query_scalar::<_, Uuid>("SELECT institute_id FROM teachers WHERE user_id = $1")
                .bind(user.id)
                .fetch_optional(pg)
                .await?
        }
        _ => Some(user.id),
    };
    let institute_id = match institute_id {
        Some(id) => id,
        None => return Ok(None),
    };

    let settings =
        sqlx::query_as::<_, PortalSettings>("SELECT * FROM portal_settings WHERE user_id = $1")
            .bind(institute_id)
            .fetch_optional(pg)
            .await?;
    Ok(settings)
}

/// Admins are never gated; teachers and students need their portal flag on.
/// An institute without a settings row gates nothing.
pub fn portal_allows(role: &str, permissions: Option<&PortalPermissions>) -> bool {
    match (role, permissions) {
        (_, None) => true,
        (ROLE_STUDENT, Some(permissions)) => permissions.student_portal.enabled,
        (ROLE_TEACHER, Some(permissions)) => permissions.teacher_portal.enabled,
        _ => true,
    }
}

pub async fn change_password(
    Extension(pg): Extension<PgPool>,
    Json(body): Json<ChangePasswordRequest>,
) -> Payload<PasswordChanged> {
    if body.password.is_empty() {
        return Err(Error::invalid("password is required"));
    }
    let password_hash = Pbkdf2
        .hash_password(body.password.as_bytes(), &SaltString::generate(&mut OsRng))?
        .to_string();

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET password_hash = $1, updated_at = now() \
         WHERE lower(email) = $2 RETURNING *",
    )
    .bind(&password_hash)
    .bind(body.email.trim().to_lowercase())
    .fetch_optional(&pg)
    .await?;
    let user = match user {
        Some(user) => user,
        None => return Err(Error::invalid("User not Found!")),
    };

    proceeds(PasswordChanged {
        user,
        message: "Password Changed Successfully!".to_string(),
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub name: Option<NameParts>,
    pub phone: Option<String>,
    pub student_data: Option<StudentData>,
    pub teacher_data: Option<TeacherData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NameParts {
    pub first: Option<String>,
    pub last: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentData {
    pub department: String,
    pub gender: String,
    pub mobile: String,
    pub admission_date: Option<DateTime<Utc>>,
    pub class_id: Option<Uuid>,
    pub section_id: Option<Uuid>,
    pub section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherData {
    pub department: String,
    pub mobile: String,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub degree: Option<String>,
    pub status: Option<String>,
    pub joining_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Registered {
    pub user: RegisteredUser,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedIn {
    pub user: PublicUser,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub settings: Option<PortalSettings>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordChanged {
    pub user: User,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> TokenClaims {
        TokenClaims {
            email: "admin@institute.example".to_string(),
            user_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            role: Some("admin".to_string()),
        }
    }

    #[test]
    fn token_round_trips_with_the_same_secret() {
        let claims = sample_claims();
        let token = sign_token(&claims, "s3cret").unwrap();
        let decoded = decode_token(&token, "s3cret").unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let token = sign_token(&sample_claims(), "s3cret").unwrap();
        assert!(decode_token(&token, "other").is_err());
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(decode_token("not-a-token", "s3cret").is_err());
        assert!(decode_token("", "s3cret").is_err());
    }

    #[test]
    fn claims_use_the_wire_field_names() {
        let json = serde_json::to_value(sample_claims()).unwrap();
        assert!(json.get("email").is_some());
        assert!(json.get("userId").is_some());
        assert!(json.get("sessionId").is_some());
        assert!(json.get("role").is_some());
    }

    #[test]
    fn role_claim_is_optional_on_decode() {
        let json = r#"{"email":"a@b.c","userId":"6f4a2d9e-5b3c-4e2f-9a1b-2c3d4e5f6a7b","sessionId":"0f1e2d3c-4b5a-6978-8695-a4b3c2d1e0f9"}"#;
        let claims: TokenClaims = serde_json::from_str(json).unwrap();
        assert!(claims.role.is_none());
    }

    #[test]
    fn portal_gate_blocks_disabled_roles_only() {
        let mut permissions = PortalPermissions::default();
        assert!(portal_allows(ROLE_ADMIN, Some(&permissions)));
        assert!(!portal_allows(ROLE_STUDENT, Some(&permissions)));
        assert!(!portal_allows(ROLE_TEACHER, Some(&permissions)));

        permissions.student_portal.enabled = true;
        assert!(portal_allows(ROLE_STUDENT, Some(&permissions)));
        assert!(!portal_allows(ROLE_TEACHER, Some(&permissions)));

        // no settings row at all gates nothing
        assert!(portal_allows(ROLE_STUDENT, None));
        assert!(portal_allows(ROLE_TEACHER, None));
    }
}
