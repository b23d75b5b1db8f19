use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Level};

use crate::auth::service::SessionGrant;
use crate::db::PrincipalId;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Client mistakes are warnings; only server-side failures are errors.
fn failure_level(err: &AppError) -> Level {
    if err.status_code().is_client_error() {
        Level::WARN
    } else {
        Level::ERROR
    }
}

fn log_failure(action: &str, name: &str, err: AuthError) -> AppError {
    let err = AppError::from(err);
    if failure_level(&err) == Level::WARN {
        warn!("{} failed for {}: {}", action, name, err);
    } else {
        error!("{} failed for {}: {}", action, name, err);
    }
    err
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub name: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub user_id: PrincipalId,
    pub secret: String,
    pub expiration: String,
}

impl From<SessionGrant> for SessionResponse {
    fn from(grant: SessionGrant) -> Self {
        Self {
            user_id: grant.user_id,
            secret: grant.secret.encoded().to_string(),
            expiration: grant.secret.expiration_utc(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrincipalResponse {
    pub user_id: PrincipalId,
    pub name: String,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for {}", req.name);
    match state.auth_service.login(&req.name, &req.password).await {
        Ok(grant) => Ok(HttpResponse::Ok().json(SessionResponse::from(grant))),
        Err(e) => Err(log_failure("Login", &req.name, e)),
    }
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for {}", req.name);

    if let Err(e) = state.auth_service.register(&req.name, &req.password).await {
        return Err(log_failure("Registration", &req.name, e));
    }

    // Log the new principal straight in
    match state.auth_service.login(&req.name, &req.password).await {
        Ok(grant) => Ok(HttpResponse::Created().json(SessionResponse::from(grant))),
        Err(e) => {
            error!("Post-registration login failed unexpectedly for {}: {}", req.name, e);
            Err(e.into())
        }
    }
}

pub async fn verify(
    req: web::Json<VerifyRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let grant = state.auth_service.verify_secret(&req.name, &req.secret).await?;
    Ok(HttpResponse::Ok().json(SessionResponse::from(grant)))
}

/// Requires a request signed with the secret of the principal in the path.
pub async fn principal(
    req: HttpRequest,
    path: web::Path<PrincipalId>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    state.auth_service.authenticate_request(&req, user_id).await?;

    let name = state.auth_service.username(user_id).await?;
    Ok(HttpResponse::Ok().json(PrincipalResponse { user_id, name }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/login", web::post().to(login))
        .route("/auth/register", web::post().to(register))
        .route("/auth/verify", web::post().to(verify))
        .route("/users/{user_id}", web::get().to(principal));
}
