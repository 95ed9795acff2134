//! Demo data for local development.
//!
//! Every step checks for existing rows first, so seeding twice leaves the
//! database unchanged.

use crate::auth;
use crate::error::AppResult;
use crate::models::{NewActivity, NewCarbonGoal, NewProfile};
use crate::repositories::{ActivityRepository, GoalRepository, UserRepository};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

pub const DEMO_USERNAME: &str = "demo_user";
pub const DEMO_PASSWORD: &str = "demo123";
pub const DEMO_WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc9e7595f0bEb4";
pub const TEST_PASSWORD: &str = "test123";

struct SeedActivity {
    activity_type: &'static str,
    activity: &'static str,
    predicted_emission: f64,
    transaction_hash: &'static str,
}

const DEMO_ACTIVITIES: [SeedActivity; 5] = [
    SeedActivity {
        activity_type: "driving",
        activity: "Drive 20 km to work",
        predicted_emission: 4.2,
        transaction_hash: "0x123abc456def789ghi",
    },
    SeedActivity {
        activity_type: "flight",
        activity: "Flight from NYC to Boston",
        predicted_emission: 125.0,
        transaction_hash: "0x456def789ghi123abc",
    },
    SeedActivity {
        activity_type: "home_energy",
        activity: "Used 50 kWh electricity this week",
        predicted_emission: 22.5,
        transaction_hash: "0x789ghi123abc456def",
    },
    SeedActivity {
        activity_type: "shopping",
        activity: "Bought 5 kg of meat",
        predicted_emission: 135.0,
        transaction_hash: "0xabc123def456ghi789",
    },
    // recycling lowers the footprint
    SeedActivity {
        activity_type: "waste",
        activity: "Recycled 10 kg of paper",
        predicted_emission: -2.5,
        transaction_hash: "0xdef456ghi789abc123",
    },
];

struct SeedUser {
    username: &'static str,
    email: &'static str,
    display_name: &'static str,
    bio: &'static str,
    total_emissions: f64,
    credits_earned: i32,
    xp: i32,
}

const TEST_USERS: [SeedUser; 3] = [
    SeedUser {
        username: "eco_warrior",
        email: "warrior@carbonsmart.com",
        display_name: "Eco Warrior",
        bio: "Leading the charge against climate change!",
        total_emissions: 87.3,
        credits_earned: 18,
        xp: 420,
    },
    SeedUser {
        username: "green_thumb",
        email: "green@carbonsmart.com",
        display_name: "Green Thumb",
        bio: "Plant trees, save bees, clean seas!",
        total_emissions: 42.0,
        credits_earned: 64,
        xp: 910,
    },
    SeedUser {
        username: "carbon_crusher",
        email: "crusher@carbonsmart.com",
        display_name: "Carbon Crusher",
        bio: "Crushing carbon emissions one day at a time.",
        total_emissions: 156.8,
        credits_earned: 7,
        xp: 130,
    },
];

fn day(year: i32, month: u32, d: u32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month, d)?.and_hms_opt(0, 0, 0)
}

/// Counts of rows created by one seeding run
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SeedReport {
    pub users: usize,
    pub activities: usize,
    pub goals: usize,
}

fn demo_profile() -> NewProfile {
    NewProfile {
        display_name: "Demo User".to_string(),
        bio: Some("Passionate about saving the planet!".to_string()),
        total_emissions: 125.5,
        credits_earned: 42,
        level: 3,
        xp: 750,
    }
}

fn sample_goals() -> Vec<NewCarbonGoal> {
    let mut goals = Vec::new();
    if let (Some(start), Some(end)) = (day(2024, 1, 1), day(2024, 1, 31)) {
        goals.push(NewCarbonGoal {
            title: "Reduce Monthly Emissions".to_string(),
            description: Some("Reduce carbon emissions by 20% this month".to_string()),
            target_emission: 100.0,
            start_date: start,
            end_date: end,
            is_active: true,
        });
    }
    if let (Some(start), Some(end)) = (day(2024, 1, 1), day(2024, 12, 31)) {
        goals.push(NewCarbonGoal {
            title: "Go Carbon Neutral".to_string(),
            description: Some("Achieve carbon neutrality by end of year".to_string()),
            target_emission: 0.0,
            start_date: start,
            end_date: end,
            is_active: true,
        });
    }
    goals
}

pub struct SeedService {
    user_repo: Arc<UserRepository>,
    activity_repo: Arc<ActivityRepository>,
    goal_repo: Arc<GoalRepository>,
}

impl SeedService {
    pub fn new(
        user_repo: Arc<UserRepository>,
        activity_repo: Arc<ActivityRepository>,
        goal_repo: Arc<GoalRepository>,
    ) -> Self {
        Self {
            user_repo,
            activity_repo,
            goal_repo,
        }
    }

    pub async fn run(&self) -> AppResult<SeedReport> {
        info!("🌱 Seeding database...");
        let mut report = SeedReport::default();

        if self.user_repo.find_by_username(DEMO_USERNAME).await?.is_none() {
            let hash = auth::hash_password(DEMO_PASSWORD)?;
            self.user_repo
                .create(
                    DEMO_USERNAME,
                    "demo@carbonsmart.com",
                    &hash,
                    Some(DEMO_WALLET),
                    &demo_profile(),
                )
                .await?;
            report.users += 1;
            info!("Created demo user: {}", DEMO_USERNAME);
        }

        if self.activity_repo.count_by_user(DEMO_USERNAME).await? == 0 {
            for sample in &DEMO_ACTIVITIES {
                let mut activity = NewActivity::new(
                    DEMO_USERNAME,
                    sample.activity_type,
                    sample.activity,
                    json!({
                        "user": DEMO_USERNAME,
                        "activity": sample.activity,
                        "activity_type": sample.activity_type,
                        "source": "seed",
                        "version": "1.0",
                    }),
                );
                activity.predicted_emission = sample.predicted_emission;
                activity.transaction_hash = Some(sample.transaction_hash.to_string());
                self.activity_repo.create(&activity).await?;
                report.activities += 1;
            }
            info!("Created {} sample activities", report.activities);
        }

        for goal in sample_goals() {
            if self.goal_repo.find_by_title(&goal.title).await?.is_none() {
                self.goal_repo.create(&goal).await?;
                report.goals += 1;
            }
        }

        for user in &TEST_USERS {
            if self.user_repo.find_by_username(user.username).await?.is_some() {
                continue;
            }
            let hash = auth::hash_password(TEST_PASSWORD)?;
            let profile = NewProfile {
                display_name: user.display_name.to_string(),
                bio: Some(user.bio.to_string()),
                total_emissions: user.total_emissions,
                credits_earned: user.credits_earned,
                level: crate::models::Profile::level_for_xp(user.xp),
                xp: user.xp,
            };
            self.user_repo
                .create(user.username, user.email, &hash, None, &profile)
                .await?;
            report.users += 1;
        }

        info!(
            "🎉 Seeding completed: {} users, {} activities, {} goals",
            report.users, report.activities, report.goals
        );
        Ok(report)
    }
}
