//! Shape transformer
//!
//! Validation runs once over the whole [`Dataset`]; the resulting
//! [`ValidatedDataset`] is then reshaped either into documents (one JSON
//! object per record) or into graph rows (nodes and relationships with
//! `neo4j-admin import` headers).

use crate::config::{RatingConfig, RatingPolicy};
use crate::error::{PipelineError, Result};
use crate::types::{
    review_date, BusinessRecord, Dataset, EntityKind, IssueKind, ReviewRecord, UserRecord,
    ValidationIssue,
};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub const BUSINESS_LABEL: &str = "Business";
pub const USER_LABEL: &str = "User";
pub const REVIEWED_TYPE: &str = "REVIEWED";
pub const FRIENDS_TYPE: &str = "FRIENDS";
/// Separator for `string[]` columns.
pub const ARRAY_DELIMITER: char = ';';

/// Records that passed validation, in input order.
#[derive(Debug, Clone, Default)]
pub struct ValidatedDataset {
    pub businesses: Vec<BusinessRecord>,
    pub users: Vec<UserRecord>,
    pub reviews: Vec<ReviewRecord>,
    /// One `(user, friend)` pair per unordered friendship, both ends known.
    pub friendships: Vec<(String, String)>,
    pub issues: Vec<ValidationIssue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentShape {
    pub businesses: Vec<Value>,
    pub users: Vec<Value>,
    pub reviews: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessNode {
    #[serde(rename = "business_id:ID(Business)")]
    pub business_id: String,
    pub name: String,
    pub city: String,
    pub state: String,
    #[serde(rename = "stars:float")]
    pub stars: f64,
    #[serde(rename = "review_count:int")]
    pub review_count: i64,
    #[serde(rename = "categories:string[]")]
    pub categories: String,
    #[serde(rename = ":LABEL")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNode {
    #[serde(rename = "user_id:ID(User)")]
    pub user_id: String,
    pub name: String,
    #[serde(rename = "review_count:int")]
    pub review_count: i64,
    pub yelping_since: String,
    #[serde(rename = ":LABEL")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedRelationship {
    pub review_id: String,
    #[serde(rename = ":START_ID(User)")]
    pub user_id: String,
    #[serde(rename = ":END_ID(Business)")]
    pub business_id: String,
    #[serde(rename = "stars:float")]
    pub stars: f64,
    #[serde(rename = "date:date")]
    pub date: String,
    #[serde(rename = ":TYPE")]
    pub rel_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendRelationship {
    #[serde(rename = ":START_ID(User)")]
    pub user_id: String,
    #[serde(rename = ":END_ID(User)")]
    pub friend_id: String,
    #[serde(rename = ":TYPE")]
    pub rel_type: String,
}

/// Node and relationship rows for bulk graph import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphShape {
    pub businesses: Vec<BusinessNode>,
    pub users: Vec<UserNode>,
    pub reviewed: Vec<ReviewedRelationship>,
    pub friends: Vec<FriendRelationship>,
}

enum RatingCheck {
    InRange,
    Clamped(f64),
    Rejected,
}

pub struct Transformer {
    rating: RatingConfig,
}

impl Transformer {
    pub fn new(rating: RatingConfig) -> Self {
        Self { rating }
    }

    fn check_rating(&self, value: f64) -> RatingCheck {
        if value >= self.rating.min && value <= self.rating.max {
            return RatingCheck::InRange;
        }
        match self.rating.policy {
            RatingPolicy::Reject => RatingCheck::Rejected,
            RatingPolicy::Clamp if value > self.rating.max => RatingCheck::Clamped(self.rating.max),
            // below range, or NaN
            RatingPolicy::Clamp => RatingCheck::Clamped(self.rating.min),
        }
    }

    /// Applies the rating policy to `stars`. Returns false when the record must be dropped.
    fn apply_rating(
        &self,
        entity: EntityKind,
        id: &str,
        stars: &mut f64,
        issues: &mut Vec<ValidationIssue>,
    ) -> bool {
        let value = *stars;
        let (keep, clamped_to) = match self.check_rating(value) {
            RatingCheck::InRange => return true,
            RatingCheck::Clamped(bound) => {
                *stars = bound;
                (true, Some(bound))
            }
            RatingCheck::Rejected => (false, None),
        };
        let issue = ValidationIssue::new(entity, id, IssueKind::RatingOutOfRange { value, clamped_to });
        warn!("{}", issue);
        issues.push(issue);
        keep
    }

    pub fn validate(&self, dataset: Dataset) -> ValidatedDataset {
        let mut issues = Vec::new();

        // first occurrence wins even when it is then rejected
        let mut seen_businesses = HashSet::new();
        let mut business_ids = HashSet::new();
        let mut businesses = Vec::with_capacity(dataset.businesses.len());
        for mut business in dataset.businesses {
            if !seen_businesses.insert(business.business_id.clone()) {
                push_duplicate(&mut issues, EntityKind::Business, &business.business_id);
                continue;
            }
            let unrated = business.stars == 0.0 && business.review_count == 0;
            if !unrated
                && !self.apply_rating(
                    EntityKind::Business,
                    &business.business_id,
                    &mut business.stars,
                    &mut issues,
                )
            {
                continue;
            }
            business_ids.insert(business.business_id.clone());
            businesses.push(business);
        }

        let mut user_ids = HashSet::new();
        let mut users = Vec::with_capacity(dataset.users.len());
        for user in dataset.users {
            if !user_ids.insert(user.user_id.clone()) {
                push_duplicate(&mut issues, EntityKind::User, &user.user_id);
                continue;
            }
            users.push(user);
        }

        let mut review_ids = HashSet::new();
        let mut reviews = Vec::with_capacity(dataset.reviews.len());
        for mut review in dataset.reviews {
            if !review_ids.insert(review.review_id.clone()) {
                push_duplicate(&mut issues, EntityKind::Review, &review.review_id);
                continue;
            }
            if !user_ids.contains(&review.user_id) {
                let issue = ValidationIssue::new(
                    EntityKind::Review,
                    review.review_id.as_str(),
                    IssueKind::UnknownUser {
                        user_id: review.user_id.clone(),
                    },
                );
                warn!("Dropping {}", issue);
                issues.push(issue);
                continue;
            }
            if !business_ids.contains(&review.business_id) {
                let issue = ValidationIssue::new(
                    EntityKind::Review,
                    review.review_id.as_str(),
                    IssueKind::UnknownBusiness {
                        business_id: review.business_id.clone(),
                    },
                );
                warn!("Dropping {}", issue);
                issues.push(issue);
                continue;
            }
            if !self.apply_rating(
                EntityKind::Review,
                &review.review_id,
                &mut review.stars,
                &mut issues,
            ) {
                continue;
            }
            reviews.push(review);
        }

        let mut seen_pairs = HashSet::new();
        let mut friendships = Vec::new();
        for user in &users {
            for friend in &user.friends {
                if friend == &user.user_id {
                    continue;
                }
                if !user_ids.contains(friend) {
                    let issue = ValidationIssue::new(
                        EntityKind::User,
                        user.user_id.as_str(),
                        IssueKind::DanglingFriend {
                            friend_id: friend.clone(),
                        },
                    );
                    debug!("{}", issue);
                    issues.push(issue);
                    continue;
                }
                let key = if user.user_id < *friend {
                    (user.user_id.clone(), friend.clone())
                } else {
                    (friend.clone(), user.user_id.clone())
                };
                if seen_pairs.insert(key) {
                    friendships.push((user.user_id.clone(), friend.clone()));
                }
            }
        }

        info!(
            "Validated {} businesses, {} users, {} reviews, {} friendships ({} issues)",
            businesses.len(),
            users.len(),
            reviews.len(),
            friendships.len(),
            issues.len()
        );

        ValidatedDataset {
            businesses,
            users,
            reviews,
            friendships,
            issues,
        }
    }
}

fn push_duplicate(issues: &mut Vec<ValidationIssue>, entity: EntityKind, id: &str) {
    let issue = ValidationIssue::new(entity, id, IssueKind::DuplicateId);
    warn!("Dropping {}", issue);
    issues.push(issue);
}

/// ISO-8601 when the value parses as a date, unchanged otherwise.
fn normalize_since(raw: &str, format: &str) -> String {
    review_date::parse(raw)
        .map(|d| d.format(format).to_string())
        .unwrap_or_else(|| raw.to_string())
}

impl ValidatedDataset {
    pub fn to_documents(&self) -> Result<DocumentShape> {
        let businesses = self
            .businesses
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>>>()?;

        let users = self
            .users
            .iter()
            .map(|user| {
                let mut doc = to_document(user)?;
                if let Some(map) = doc.as_object_mut() {
                    map.remove("friends");
                    map.insert(
                        "yelping_since".to_string(),
                        Value::String(normalize_since(&user.yelping_since, review_date::ISO_FORMAT)),
                    );
                }
                Ok(doc)
            })
            .collect::<Result<Vec<_>>>()?;

        let reviews = self
            .reviews
            .iter()
            .map(to_document)
            .collect::<Result<Vec<_>>>()?;

        Ok(DocumentShape {
            businesses,
            users,
            reviews,
        })
    }

    pub fn to_graph(&self) -> GraphShape {
        let businesses = self
            .businesses
            .iter()
            .map(|b| BusinessNode {
                business_id: b.business_id.clone(),
                name: b.name.clone(),
                city: b.city.clone(),
                state: b.state.clone(),
                stars: b.stars,
                review_count: b.review_count,
                categories: b.categories.join(&ARRAY_DELIMITER.to_string()),
                label: BUSINESS_LABEL.to_string(),
            })
            .collect();

        let users = self
            .users
            .iter()
            .map(|u| UserNode {
                user_id: u.user_id.clone(),
                name: u.name.clone(),
                review_count: u.review_count,
                yelping_since: normalize_since(&u.yelping_since, "%Y-%m-%d"),
                label: USER_LABEL.to_string(),
            })
            .collect();

        let reviewed = self
            .reviews
            .iter()
            .map(|r| ReviewedRelationship {
                review_id: r.review_id.clone(),
                user_id: r.user_id.clone(),
                business_id: r.business_id.clone(),
                stars: r.stars,
                date: r.date.format("%Y-%m-%d").to_string(),
                rel_type: REVIEWED_TYPE.to_string(),
            })
            .collect();

        let friends = self
            .friendships
            .iter()
            .map(|(user_id, friend_id)| FriendRelationship {
                user_id: user_id.clone(),
                friend_id: friend_id.clone(),
                rel_type: FRIENDS_TYPE.to_string(),
            })
            .collect();

        GraphShape {
            businesses,
            users,
            reviewed,
            friends,
        }
    }
}

fn to_document<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record).map_err(|e| PipelineError::Internal(format!("document encoding: {}", e)))
}
