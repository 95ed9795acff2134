//! End-to-end flows through the router, a real Postgres and the in-memory ledger
mod helpers;

use axum::http::StatusCode;
use carbonsmart_backend::chain::{format_address, parse_signer, CreditLedger};
use carbonsmart_backend::services::activity_service::{EMISSION_LOGGED, NO_WALLET_CONNECTED};
use helpers::*;
use serde_json::json;
use sqlx::PgPool;

const SELLER_KEY: &str = "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

#[sqlx::test]
async fn test_signup_signin_and_profile(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let username = unique("eco");
    let signup = json!({
        "username": username,
        "email": format!("{}@carbonsmart.com", username),
        "password": "secret123",
    });

    let (status, body) = app.post("/api/auth/signup", signup.clone()).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], username.as_str());
    assert!(body["user"].get("password_hash").is_none());
    assert_eq!(body["user"]["profile"]["displayName"], username.as_str());
    assert_eq!(body["user"]["profile"]["xp"], 0);

    let (status, body) = app.post("/api/auth/signup", signup).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Username or email already exists");

    let (status, body) = app
        .post(
            "/api/auth/signin/user",
            json!({ "username": username, "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");

    let (status, body) = app
        .post(
            "/api/auth/signin/user",
            json!({ "username": username, "password": "secret123" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();

    let (status, body) = app.get_with_token("/api/profile", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["accountType"], "user");
    assert_eq!(body["profile"]["level"], 1);
}

#[sqlx::test]
async fn test_log_activity_credit_steps(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let user = unique("logger");

    let (status, body) = app
        .post(
            "/api/log/",
            json!({ "user": user, "activity_type": "driving", "activity": "Drive 50 km" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_offset"], false);
    assert_eq!(body["predicted_emission"], 10.0);
    assert_eq!(body["transaction_hash"], EMISSION_LOGGED);

    let (status, body) = app
        .post(
            "/api/log/",
            json!({ "user": user, "activity_type": "recycling", "activity": "Recycled 4 kg of paper" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["is_offset"], true);
    assert_eq!(body["transaction_hash"], NO_WALLET_CONNECTED);
    assert!(body["token_id"].is_null());

    let (status, body) = app
        .post(
            "/api/log/",
            json!({
                "user": user,
                "activity_type": "tree_planting",
                "activity": "Planted 3 trees",
                "user_wallet": DEMO_WALLET,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_id"], 1);
    assert!(body["transaction_hash"].as_str().unwrap().starts_with("0x"));
    assert_eq!(app.ledger.credit_balance(DEMO_WALLET).await.unwrap(), 1);

    let (status, body) = app.get(&format!("/api/activities/{}/", user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 3);

    let (status, body) = app.get(&format!("/api/dashboard/{}/", user)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalActivities"], 3);
}

#[sqlx::test]
async fn test_marketplace_listing_and_purchase(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let seller = unique("seller");
    let buyer = unique("buyer");
    let signer = parse_signer(SELLER_KEY).unwrap();
    let seller_wallet = format_address(signer.address());

    let (_, logged) = app
        .post(
            "/api/log/",
            json!({
                "user": seller,
                "activity_type": "renewable_energy",
                "activity": "Installed 2 solar panels",
                "user_wallet": seller_wallet,
            }),
        )
        .await;
    let token_id = logged["token_id"].as_i64().expect("credit minted");

    let (status, body) = app
        .post(
            "/api/marketplace/create/",
            json!({
                "tokenId": token_id,
                "sellerWallet": seller_wallet,
                "priceEth": 0.05,
                "seller": seller,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let listing_id = body["listingId"].as_str().unwrap().to_string();

    let (status, body) = app.get("/api/marketplace/listings/").await;
    assert_eq!(status, StatusCode::OK);
    let listing = body["listings"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["id"] == listing_id.as_str())
        .expect("listing visible")
        .clone();
    assert_eq!(listing["priceEth"], 0.05);
    assert_eq!(listing["seller"], seller.as_str());

    let purchase = json!({ "buyer": buyer, "buyerWallet": BUYER_WALLET });

    // the operator may not move the credit yet
    let (status, body) = app
        .post(&format!("/api/marketplace/buy/{}/", listing_id), purchase.clone())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Blockchain transfer failed"));

    let operator = app.ledger.operator_address().unwrap();
    app.ledger
        .set_approval_for_all(&signer, &operator, true)
        .await
        .unwrap();

    let (status, body) = app
        .post(&format!("/api/marketplace/buy/{}/", listing_id), purchase.clone())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["tokenId"], token_id);
    assert_eq!(
        app.ledger.owner_of(token_id as u64).await.unwrap().to_lowercase(),
        BUYER_WALLET.to_lowercase()
    );

    let (status, body) = app
        .post(&format!("/api/marketplace/buy/{}/", listing_id), purchase)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Listing is no longer available");

    let (status, body) = app
        .get(&format!("/api/marketplace/history/{}/", BUYER_WALLET))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["history"]
        .as_array()
        .unwrap()
        .iter()
        .any(|h| h["type"] == "purchase" && h["tokenId"] == token_id));
}

#[sqlx::test]
async fn test_seed_is_idempotent(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let seed = app.state.seed_service();

    seed.run().await.unwrap();
    let second = seed.run().await.unwrap();
    assert_eq!(second.users, 0);
    assert_eq!(second.activities, 0);
    assert_eq!(second.goals, 0);

    let (status, body) = app.get("/api/goals/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["count"].as_u64().unwrap() >= 1);
}

#[sqlx::test]
async fn test_concurrent_logs_both_count(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let username = unique("racer");
    let (status, _) = app
        .post(
            "/api/auth/signup",
            json!({
                "username": username,
                "email": format!("{}@carbonsmart.com", username),
                "password": "secret123",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let activities = &app.state.activity_service;
    let (first, second) = tokio::join!(
        activities.log_activity(json!({
            "user": username,
            "activity_type": "driving",
            "activity": "Drive 50 km",
        })),
        activities.log_activity(json!({
            "user": username,
            "activity_type": "driving",
            "activity": "Drive 20 km",
        })),
    );
    first.unwrap();
    second.unwrap();

    let profile = app
        .state
        .profile_repo
        .find_by_username(&username)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(profile.xp, 50);
    assert_eq!(profile.level, 1);
    assert_eq!(profile.total_emissions, 14.0);
}

#[sqlx::test]
async fn test_company_signup_returns_profile(pool: PgPool) {
    let app = TestApp::with_pool(pool);
    let (status, body) = app
        .post(
            "/api/auth/company-signup",
            json!({
                "companyName": "Green Corp",
                "gstin": "27AAPFU0939F1ZV",
                "email": "hello@greencorp",
                "password": "secret1",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["company"]["companyName"], "Green Corp");
    assert_eq!(body["company"]["profile"]["displayName"], "Green Corp");
    assert_eq!(body["company"]["profile"]["level"], 1);
}
