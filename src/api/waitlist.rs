/// Waitlist endpoints used by the landing page
use crate::{
    context::AppContext,
    error::{WaitlistError, WaitlistResult},
    mailer::WelcomeEmail,
    metrics,
    waitlist::{JoinOutcome, JoinRequest, WaitlistResponse, WaitlistStats},
};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Build waitlist routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/waitlist", post(join_waitlist))
        .route("/api/waitlist/stats", get(get_stats))
        .route(
            "/api/waitlist/verify",
            get(verify_email_link).post(verify_email),
        )
        .route("/api/waitlist/share", post(record_share))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

#[derive(Debug, Deserialize)]
pub struct ShareRequest {
    pub code: String,
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ShareResponse {
    pub recorded: bool,
}

pub const MALFORMED_REQUEST_MESSAGE: &str =
    "Invalid request. Please check the form and try again.";

/// Turn an extractor rejection into the JSON validation error
fn invalid_request(detail: String) -> WaitlistError {
    tracing::debug!(detail = %detail, "request_rejected");
    WaitlistError::Validation(MALFORMED_REQUEST_MESSAGE.to_string())
}

/// Origin of the calling page: the `Origin` header, else `http://<Host>`
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "null");
    if let Some(origin) = origin {
        return Some(origin.to_string());
    }

    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(|host| format!("http://{}", host))
}

/// Join the waitlist
async fn join_waitlist(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Result<Json<JoinRequest>, JsonRejection>,
) -> (StatusCode, Json<WaitlistResponse>) {
    // The landing page always reads a WaitlistResponse, even for unparseable bodies
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::debug!(detail = %rejection.body_text(), "waitlist_join_malformed");
            metrics::record_signup("rejected");
            let outcome = JoinOutcome::Rejected {
                message: MALFORMED_REQUEST_MESSAGE.to_string(),
            };
            return (StatusCode::BAD_REQUEST, Json(WaitlistResponse::from(outcome)));
        }
    };

    let origin = request_origin(&headers);
    let recipient = req.email.trim().to_lowercase();
    let name = req.name.trim().to_string();

    let outcome = ctx.waitlist.join_waitlist(req, origin.as_deref()).await;

    let status = match outcome {
        JoinOutcome::Joined { .. } => StatusCode::CREATED,
        JoinOutcome::AlreadyRegistered { .. } => StatusCode::CONFLICT,
        JoinOutcome::Rejected { .. } => StatusCode::BAD_REQUEST,
        JoinOutcome::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if let JoinOutcome::Joined {
        ref access_code,
        position,
        ref referral_link,
    } = outcome
    {
        if ctx.mailer.is_configured() {
            let verify_url = format!(
                "{}/api/waitlist/verify?code={}",
                ctx.public_base_url(origin.as_deref()),
                urlencoding::encode(access_code)
            );
            let email = WelcomeEmail {
                to: &recipient,
                name: &name,
                access_code,
                position,
                referral_link,
                verify_url: &verify_url,
            };
            if let Err(e) = ctx.mailer.send_welcome_email(&email).await {
                tracing::warn!("Failed to send welcome email: {}", e);
                // Don't fail the signup if email fails
            }
        }
    }

    (status, Json(WaitlistResponse::from(outcome)))
}

/// Waitlist counters
async fn get_stats(State(ctx): State<AppContext>) -> Json<WaitlistStats> {
    Json(ctx.waitlist.get_waitlist_stats().await)
}

/// Verify via JSON body
async fn verify_email(
    State(ctx): State<AppContext>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> WaitlistResult<Json<VerifyResponse>> {
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    Ok(Json(VerifyResponse {
        verified: ctx.waitlist.verify_email(&req.code).await,
    }))
}

/// Verify via the link in the welcome email
async fn verify_email_link(
    State(ctx): State<AppContext>,
    query: Result<Query<VerifyRequest>, QueryRejection>,
) -> WaitlistResult<Json<VerifyResponse>> {
    let Query(req) = query.map_err(|e| invalid_request(e.body_text()))?;
    Ok(Json(VerifyResponse {
        verified: ctx.waitlist.verify_email(&req.code).await,
    }))
}

/// Record a share of a referral link
async fn record_share(
    State(ctx): State<AppContext>,
    body: Result<Json<ShareRequest>, JsonRejection>,
) -> WaitlistResult<Json<ShareResponse>> {
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    Ok(Json(ShareResponse {
        recorded: ctx.waitlist.record_share(&req.code, &req.channel).await,
    }))
}
