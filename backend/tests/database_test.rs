//! Repository tests; each runs against a fresh migrated database
mod helpers;

use carbonsmart_backend::models::*;
use helpers::*;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use std::str::FromStr;
use tokio_test::{assert_err, assert_ok};

#[sqlx::test]
async fn test_user_create_with_profile(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let username = unique("eco");

    let user = db
        .user_repo
        .create(
            &username,
            &format!("{}@carbonsmart.com", username),
            "$2b$10$hash",
            Some(DEMO_WALLET),
            &NewProfile::named(&username),
        )
        .await
        .expect("Failed to create user");

    assert_eq!(user.username, username);
    assert_eq!(user.wallet_address.as_deref(), Some(DEMO_WALLET));

    let profile = db
        .profile_repo
        .find_by_username(&username)
        .await
        .unwrap()
        .expect("profile created with user");
    assert_eq!(profile.user_id, Some(user.id));
    assert_eq!(profile.level, 1);
    assert_eq!(profile.account_type(), AccountType::User);
}

#[sqlx::test]
async fn test_duplicate_username_is_rejected(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let username = unique("dup");

    assert_ok!(
        db.user_repo
            .create(&username, &format!("{}@a.com", username), "h", None, &NewProfile::named(&username))
            .await
    );
    let second = db
        .user_repo
        .create(&username, &format!("{}@b.com", username), "h", None, &NewProfile::named(&username))
        .await;

    assert!(matches!(second, Err(carbonsmart_backend::error::RepositoryError::Duplicate(_))));
}

#[sqlx::test]
async fn test_company_conflicts_and_profile(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let name = unique("Green Corp");
    let gstin = "27AAPFU0939F1ZV";

    let company = db
        .company_repo
        .create(&name, gstin, &format!("{}@corp.in", name.replace(' ', "")), "h")
        .await
        .expect("Failed to create company");

    let conflict = db
        .company_repo
        .find_conflicting("Other Name", gstin, "other@corp.in")
        .await
        .unwrap();
    assert_eq!(conflict.map(|c| c.id), Some(company.id));

    let profile = db.profile_repo.find_by_company(company.id).await.unwrap().unwrap();
    assert_eq!(profile.display_name, name);
    assert_eq!(profile.account_type(), AccountType::Company);
}

#[sqlx::test]
async fn test_activity_listing_and_sale(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let seller = unique("seller");
    let buyer = unique("buyer");
    let token_id = (uuid::Uuid::new_v4().as_u128() % 1_000_000_000) as i64;

    let mut minted = NewActivity::new(&seller, "tree_planting", "Planted 3 trees", json!({}));
    minted.predicted_emission = 60.0;
    minted.user_wallet = Some(DEMO_WALLET.to_string());
    let activity = db.activity_repo.create(&minted).await.unwrap();
    let activity = db
        .activity_repo
        .update_chain_result(activity.id, "0xabc", Some(token_id))
        .await
        .unwrap();
    assert!(activity.is_tradeable());

    let found = db
        .activity_repo
        .find_by_token_and_wallet(token_id, &DEMO_WALLET.to_lowercase())
        .await
        .unwrap()
        .expect("lookup ignores wallet case");
    assert_eq!(found.id, activity.id);

    let listed = db
        .activity_repo
        .mark_listed(activity.id, Decimal::from_str("0.05").unwrap())
        .await
        .unwrap();
    assert_eq!(listed.status_enum(), MarketplaceStatus::Listed);
    assert!(db
        .activity_repo
        .find_listed()
        .await
        .unwrap()
        .iter()
        .any(|a| a.id == listed.id));

    let mut purchase = NewActivity::new(&buyer, MARKETPLACE_PURCHASE, "Bought", json!({ "seller": seller }));
    purchase.token_id = Some(token_id);
    purchase.user_wallet = Some(BUYER_WALLET.to_string());
    purchase.transaction_hash = Some("0xdef".to_string());

    let (sold, bought) = db.activity_repo.record_sale(listed.id, &purchase).await.unwrap();
    assert_eq!(sold.status_enum(), MarketplaceStatus::Sold);
    assert_eq!(bought.username, buyer);

    // a listing sells once
    assert_err!(db.activity_repo.record_sale(listed.id, &purchase).await);

    let purchases = db.activity_repo.find_purchases_by_wallet(BUYER_WALLET).await.unwrap();
    assert!(purchases.iter().any(|a| a.id == bought.id));
    let sales = db.activity_repo.find_sold_by_wallet(DEMO_WALLET).await.unwrap();
    assert!(sales.iter().any(|a| a.id == sold.id));
}

#[sqlx::test]
async fn test_goal_create_and_list(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let title = unique("Goal");
    let start = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    let end = chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap().and_hms_opt(0, 0, 0).unwrap();

    let goal = db
        .goal_repo
        .create(&NewCarbonGoal {
            title: title.clone(),
            description: None,
            target_emission: 100.0,
            start_date: start,
            end_date: end,
            is_active: false,
        })
        .await
        .unwrap();

    let active = db.goal_repo.list(true).await.unwrap();
    assert!(!active.iter().any(|g| g.id == goal.id));
    let all = db.goal_repo.list(false).await.unwrap();
    assert!(all.iter().any(|g| g.id == goal.id));
    assert_eq!(db.goal_repo.find_by_title(&title).await.unwrap().map(|g| g.id), Some(goal.id));
}

#[sqlx::test]
async fn test_shared_handle_resolves_to_user(pool: PgPool) {
    let db = TestDatabase::from_pool(pool);
    let handle = "Green Corp";

    let company = db
        .company_repo
        .create(handle, "27AAPFU0939F1ZV", "hello@greencorp.in", "h")
        .await
        .unwrap();
    let company_profile = db.profile_repo.find_by_username(handle).await.unwrap().unwrap();
    assert_eq!(company_profile.company_id, Some(company.id));

    let user = db
        .user_repo
        .create(handle, "green@carbonsmart.com", "h", None, &NewProfile::named(handle))
        .await
        .unwrap();

    let increment = ProfileIncrement::for_activity(10.0, false, false);
    let updated = db.profile_repo.add_activity(handle, &increment).await.unwrap().unwrap();
    assert_eq!(updated.user_id, Some(user.id));
    assert_eq!(updated.xp, 25);

    let untouched = db.profile_repo.find_by_company(company.id).await.unwrap().unwrap();
    assert_eq!(untouched.xp, 0);
}
