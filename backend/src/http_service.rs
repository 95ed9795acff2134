//! REST API for the browser client
//!
//! Paths keep the trailing slashes the client already calls.

use crate::error::{AppError, AppResult};
use crate::services::account_service::{
    CompanySigninRequest, CompanySignupRequest, LinkWalletRequest, SignupRequest, UserSigninRequest,
};
use crate::services::marketplace_service::{BuyListingRequest, CreateListingRequest};
use crate::services::prediction::EMISSION_UNIT;
use crate::AppState;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

type SharedState = State<Arc<AppState>>;

/// JSON body whose rejections use the API error envelope
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
struct ApiQuery<T>(T);

/// Build the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Activities and chain
        .route("/api/log/", post(log_activity))
        .route("/api/activities/:username/", get(get_user_activities))
        .route("/api/credits/:wallet/", get(get_blockchain_credits))
        .route("/api/blockchain/status/", get(blockchain_status))
        .route("/api/predict/", post(predict_emission))
        // Dashboard and goals
        .route("/api/dashboard/:username/", get(dashboard_stats))
        .route("/api/goals/", get(list_goals).post(create_goal))
        .route("/api/goals/:username/progress/", get(goal_progress))
        // Marketplace
        .route("/api/marketplace/listings/", get(marketplace_listings))
        .route("/api/marketplace/user-credits/:wallet/", get(user_nft_credits))
        .route("/api/marketplace/create/", post(create_listing))
        .route("/api/marketplace/buy/:listing_id/", post(buy_listing))
        .route(
            "/api/marketplace/check-approval/:token_id/:owner/",
            get(check_approval),
        )
        .route(
            "/api/marketplace/contract-address/",
            get(marketplace_contract_address),
        )
        .route("/api/marketplace/history/:wallet/", get(marketplace_history))
        // Accounts
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/company-signup", post(company_signup))
        .route("/api/auth/signin/user", post(signin_user))
        .route("/api/auth/signin/company", post(signin_company))
        .route("/api/auth/session", get(current_session))
        .route("/api/auth/wallet", post(link_wallet))
        .route("/api/profile", get(profile))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_check(State(state): SharedState) -> Json<Value> {
    let database = state.database.ping(Duration::from_secs(1)).await;
    Json(json!({
        "status": "ok",
        "service": "carbonsmart-backend",
        "database": if database { "up" } else { "down" },
    }))
}

async fn log_activity(
    State(state): SharedState,
    ApiJson(payload): ApiJson<Value>,
) -> AppResult<impl IntoResponse> {
    let logged = state.activity_service.log_activity(payload).await?;
    Ok((StatusCode::CREATED, Json(logged)))
}

async fn get_user_activities(
    State(state): SharedState,
    ApiPath(username): ApiPath<String>,
) -> AppResult<impl IntoResponse> {
    let activities = state.activity_service.get_user_activities(&username).await?;
    Ok(Json(activities))
}

async fn get_blockchain_credits(
    State(state): SharedState,
    ApiPath(wallet): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let credits = state.ledger.user_credits(&wallet).await?;
    Ok(Json(json!({
        "wallet": wallet,
        "total_credits": credits.len(),
        "credits": credits,
    })))
}

async fn blockchain_status(State(state): SharedState) -> impl IntoResponse {
    Json(state.ledger.status().await)
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    #[serde(default)]
    activity: String,
    #[serde(default = "other_type")]
    activity_type: String,
}

fn other_type() -> String {
    "other".to_string()
}

async fn predict_emission(
    State(state): SharedState,
    ApiJson(request): ApiJson<PredictRequest>,
) -> AppResult<Json<Value>> {
    if request.activity.trim().is_empty() {
        return Err(AppError::Validation("activity is required".to_string()));
    }
    let predicted = state
        .activity_service
        .predict(&request.activity_type, &request.activity)
        .await;

    Ok(Json(json!({
        "activity": request.activity,
        "predicted_emission": predicted,
        "unit": EMISSION_UNIT,
    })))
}

async fn dashboard_stats(
    State(state): SharedState,
    ApiPath(username): ApiPath<String>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.dashboard_service.stats(&username).await?))
}

#[derive(Debug, Deserialize)]
struct GoalQuery {
    #[serde(default)]
    all: bool,
}

async fn list_goals(
    State(state): SharedState,
    ApiQuery(query): ApiQuery<GoalQuery>,
) -> AppResult<Json<Value>> {
    let goals = state.goal_service.list(!query.all).await?;
    Ok(Json(json!({ "success": true, "count": goals.len(), "goals": goals })))
}

async fn create_goal(
    State(state): SharedState,
    ApiJson(goal): ApiJson<crate::models::NewCarbonGoal>,
) -> AppResult<impl IntoResponse> {
    let goal = state.goal_service.create(goal).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "goal": goal }))))
}

async fn goal_progress(
    State(state): SharedState,
    ApiPath(username): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let progress = state.goal_service.progress(&username).await?;
    Ok(Json(json!({ "success": true, "user": username, "goals": progress })))
}

async fn marketplace_listings(State(state): SharedState) -> AppResult<Json<Value>> {
    let listings = state.marketplace_service.listings().await?;
    Ok(Json(json!({
        "success": true,
        "count": listings.len(),
        "listings": listings,
    })))
}

async fn user_nft_credits(
    State(state): SharedState,
    ApiPath(wallet): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let credits = state.marketplace_service.user_nft_credits(&wallet).await?;
    Ok(Json(json!({
        "success": true,
        "count": credits.len(),
        "credits": credits,
    })))
}

async fn create_listing(
    State(state): SharedState,
    ApiJson(request): ApiJson<CreateListingRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state.marketplace_service.create_listing(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn buy_listing(
    State(state): SharedState,
    ApiPath(listing_id): ApiPath<String>,
    ApiJson(request): ApiJson<BuyListingRequest>,
) -> AppResult<impl IntoResponse> {
    let listing_id = Uuid::parse_str(&listing_id)
        .map_err(|_| AppError::NotFound("Listing not found".to_string()))?;
    let purchase = state.marketplace_service.buy_listing(listing_id, request).await?;
    Ok(Json(purchase))
}

async fn check_approval(
    State(state): SharedState,
    ApiPath((token_id, owner)): ApiPath<(u64, String)>,
) -> AppResult<Json<Value>> {
    let approval = state.marketplace_service.check_approval(token_id, &owner).await?;
    Ok(Json(json!({
        "success": true,
        "approved": approval.approved,
        "backend_address": approval.backend_address,
        "is_approved_for_all": approval.is_approved_for_all,
    })))
}

async fn marketplace_contract_address(State(state): SharedState) -> impl IntoResponse {
    Json(state.marketplace_service.contract_info())
}

async fn marketplace_history(
    State(state): SharedState,
    ApiPath(wallet): ApiPath<String>,
) -> AppResult<Json<Value>> {
    let history = state.marketplace_service.history(&wallet).await?;
    Ok(Json(json!({
        "success": true,
        "count": history.len(),
        "history": history,
    })))
}

async fn signup(
    State(state): SharedState,
    ApiJson(request): ApiJson<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state.account_service.signup(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn company_signup(
    State(state): SharedState,
    ApiJson(request): ApiJson<CompanySignupRequest>,
) -> AppResult<impl IntoResponse> {
    let created = state.account_service.company_signup(request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn signin_user(
    State(state): SharedState,
    ApiJson(request): ApiJson<UserSigninRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.account_service.signin_user(request).await?))
}

async fn signin_company(
    State(state): SharedState,
    ApiJson(request): ApiJson<CompanySigninRequest>,
) -> AppResult<impl IntoResponse> {
    Ok(Json(state.account_service.signin_company(request).await?))
}

async fn current_session(State(state): SharedState, headers: HeaderMap) -> AppResult<Json<Value>> {
    let claims = state.account_service.sessions().from_headers(&headers)?;
    Ok(Json(json!({ "success": true, "user": claims })))
}

async fn link_wallet(
    State(state): SharedState,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LinkWalletRequest>,
) -> AppResult<impl IntoResponse> {
    let claims = state.account_service.sessions().from_headers(&headers)?;
    Ok(Json(state.account_service.link_wallet(&claims, request).await?))
}

async fn profile(State(state): SharedState, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    let claims = state.account_service.sessions().from_headers(&headers)?;
    Ok(Json(state.account_service.profile(&claims).await?))
}
