//! Deterministic synthetic dataset
//!
//! Every field is a pure function of the record index, so two runs with the
//! same sizes produce identical records (and identical bulk files).
//!
//! - business `i`: stars cycle 1.5, 2.5, 3.5, 4.5; cities `City 0..9`;
//!   even ids are restaurants, odd ids are shops; closed when `i % 3 == 0`.
//! - user `i`: friends with the users within 5 positions on either side.
//! - review `i`: written by user `i % users` about business `(i * 7) % businesses`,
//!   stars cycle 1..=5, one review per day starting 2023-01-01.

use crate::config::SyntheticConfig;
use crate::types::{BusinessRecord, Dataset, ReviewRecord, UserRecord};

use chrono::{Duration, NaiveDate};
use serde_json::json;

const FRIEND_WINDOW: usize = 5;

pub struct SyntheticGenerator {
    sizes: SyntheticConfig,
}

impl SyntheticGenerator {
    pub fn new(sizes: SyntheticConfig) -> Self {
        Self { sizes }
    }

    pub fn generate(&self) -> Dataset {
        Dataset {
            businesses: (0..self.sizes.businesses).map(business).collect(),
            users: (0..self.sizes.users)
                .map(|i| user(i, self.sizes.users))
                .collect(),
            reviews: (0..self.sizes.reviews)
                .filter_map(|i| review(i, self.sizes.users, self.sizes.businesses))
                .collect(),
        }
    }
}

pub fn business_id(i: usize) -> String {
    format!("uem_sample_{}", i)
}

pub fn user_id(i: usize) -> String {
    format!("uem_user_{}", i)
}

fn business(i: usize) -> BusinessRecord {
    let restaurant = i % 2 == 0;
    BusinessRecord {
        business_id: business_id(i),
        name: format!("Sample Business {}", i),
        address: format!("Sample Address {}", i),
        city: format!("City {}", i % 10),
        state: "SP".to_string(),
        postal_code: "28000".to_string(),
        latitude: Some(40.4168 + i as f64 * 0.001),
        longitude: Some(-3.7038 + i as f64 * 0.001),
        stars: 1.5 + (i % 4) as f64,
        review_count: (i * 10) as i64,
        is_open: if i % 3 == 0 { 0 } else { 1 },
        categories: if restaurant {
            vec!["Restaurants".to_string(), "Food".to_string()]
        } else {
            vec!["Shopping".to_string(), "Retail".to_string()]
        },
        attributes: Some(json!({
            "BusinessAcceptsCreditCards": true,
            "WiFi": if i % 3 == 0 { "free" } else { "paid" },
        })),
        hours: Some(json!({
            "Monday": "9:0-17:0",
            "Tuesday": "9:0-17:0",
        })),
    }
}

fn user(i: usize, total: usize) -> UserRecord {
    let low = i.saturating_sub(FRIEND_WINDOW);
    let high = (i + FRIEND_WINDOW).min(total);
    UserRecord {
        user_id: user_id(i),
        name: format!("User {}", i),
        review_count: (i * 5) as i64,
        yelping_since: "2015-01-01 00:00:00".to_string(),
        useful: (i * 3) as i64,
        funny: (i * 2) as i64,
        cool: (i * 4) as i64,
        friends: (low..high).filter(|&j| j != i).map(user_id).collect(),
    }
}

fn review(i: usize, users: usize, businesses: usize) -> Option<ReviewRecord> {
    if users == 0 || businesses == 0 {
        return None;
    }
    let start = NaiveDate::from_ymd_opt(2023, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some(ReviewRecord {
        review_id: format!("uem_review_{}", i),
        user_id: user_id(i % users),
        business_id: business_id((i * 7) % businesses),
        stars: (1 + i % 5) as f64,
        date: start + Duration::days((i % 365) as i64),
        text: format!("Sample review text {}", i),
        useful: (i % 10) as i64,
        funny: (i % 5) as i64,
        cool: (i % 7) as i64,
    })
}
