// crates/trident-core/src/types.rs
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// The three database paradigms under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Document,
    Graph,
    KeyValue,
}

impl StoreKind {
    /// Name of the concrete system backing this paradigm.
    pub fn system(&self) -> &'static str {
        match self {
            StoreKind::Document => "mongodb",
            StoreKind::Graph => "neo4j",
            StoreKind::KeyValue => "redis",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.system())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct BusinessRecord {
    pub business_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub stars: f64,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub is_open: i64,
    #[serde(default, deserialize_with = "string_list")]
    pub categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub review_count: i64,
    #[serde(default)]
    pub yelping_since: String,
    #[serde(default)]
    pub useful: i64,
    #[serde(default)]
    pub funny: i64,
    #[serde(default)]
    pub cool: i64,
    #[serde(default, deserialize_with = "string_list")]
    pub friends: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReviewRecord {
    pub review_id: String,
    pub user_id: String,
    pub business_id: String,
    #[serde(default)]
    pub stars: f64,
    #[serde(with = "review_date")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub useful: i64,
    #[serde(default)]
    pub funny: i64,
    #[serde(default)]
    pub cool: i64,
}

/// All records read or generated for one run.
#[derive(Debug, Default, Clone)]
pub struct Dataset {
    pub businesses: Vec<BusinessRecord>,
    pub users: Vec<UserRecord>,
    pub reviews: Vec<ReviewRecord>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.businesses.is_empty() && self.users.is_empty() && self.reviews.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Business,
    User,
    Review,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IssueKind {
    UnknownUser { user_id: String },
    UnknownBusiness { business_id: String },
    RatingOutOfRange { value: f64, clamped_to: Option<f64> },
    DuplicateId,
    DanglingFriend { friend_id: String },
    Malformed { line: usize, message: String },
}

/// A record-level problem found while reading or transforming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub entity: EntityKind,
    pub id: String,
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl ValidationIssue {
    pub fn new(entity: EntityKind, id: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            entity,
            id: id.into(),
            kind,
        }
    }

    /// True when the record was dropped rather than repaired.
    pub fn dropped(&self) -> bool {
        !matches!(
            self.kind,
            IssueKind::RatingOutOfRange {
                clamped_to: Some(_),
                ..
            } | IssueKind::DanglingFriend { .. }
        )
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = match self.entity {
            EntityKind::Business => "business",
            EntityKind::User => "user",
            EntityKind::Review => "review",
        };
        match &self.kind {
            IssueKind::UnknownUser { user_id } => {
                write!(f, "{} {} references unknown user {}", entity, self.id, user_id)
            }
            IssueKind::UnknownBusiness { business_id } => write!(
                f,
                "{} {} references unknown business {}",
                entity, self.id, business_id
            ),
            IssueKind::RatingOutOfRange { value, clamped_to } => match clamped_to {
                Some(bound) => write!(
                    f,
                    "{} {} rating {} out of range, clamped to {}",
                    entity, self.id, value, bound
                ),
                None => write!(
                    f,
                    "{} {} rating {} out of range, rejected",
                    entity, self.id, value
                ),
            },
            IssueKind::DuplicateId => write!(f, "{} {} is a duplicate id", entity, self.id),
            IssueKind::DanglingFriend { friend_id } => write!(
                f,
                "{} {} lists unknown friend {}",
                entity, self.id, friend_id
            ),
            IssueKind::Malformed { line, message } => {
                write!(f, "{} line {} is malformed: {}", entity, line, message)
            }
        }
    }
}

/// Accepts either a JSON array of strings, a comma-separated string, `"None"` or null.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::List(items)) => items,
        Some(Raw::Joined(joined)) => joined
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "None")
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    })
}

/// Review timestamps: accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` and ISO-8601,
/// always writes ISO-8601 without offset.
pub mod review_date {
    use super::*;
    use serde::de::Error;

    pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, ISO_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(ISO_FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("unrecognized date '{}'", raw)))
    }
}
