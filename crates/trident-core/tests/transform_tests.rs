use chrono::NaiveDate;
use std::collections::HashSet;
use std::fs;
use tempfile::tempdir;
use trident_core::config::{RatingConfig, RatingPolicy, SyntheticConfig};
use trident_core::prepare::{prepare, PrepareTargets, RecordSource};
use trident_core::transform::Transformer;
use trident_core::types::{
    BusinessRecord, Dataset, IssueKind, ReviewRecord, UserRecord,
};
use trident_core::writer::{
    BulkFileWriter, BUSINESS_NODES, FRIEND_RELATIONSHIPS, REVIEWED_RELATIONSHIPS, USER_NODES,
};

fn business(id: &str, stars: f64) -> BusinessRecord {
    BusinessRecord {
        business_id: id.to_string(),
        name: format!("Business {}", id),
        address: "1 Main St".to_string(),
        city: "Madrid".to_string(),
        state: "MD".to_string(),
        postal_code: "28001".to_string(),
        latitude: Some(40.4168),
        longitude: Some(-3.7038),
        stars,
        review_count: 7,
        is_open: 1,
        categories: vec!["Restaurants".to_string(), "Tapas".to_string()],
        attributes: Some(serde_json::json!({"WiFi": "free"})),
        hours: None,
    }
}

fn user(id: &str, friends: &[&str]) -> UserRecord {
    UserRecord {
        user_id: id.to_string(),
        name: id.to_string(),
        review_count: 3,
        yelping_since: "2017-05-01".to_string(),
        useful: 1,
        funny: 2,
        cool: 3,
        friends: friends.iter().map(|f| f.to_string()).collect(),
    }
}

fn review(id: &str, user_id: &str, business_id: &str, stars: f64) -> ReviewRecord {
    ReviewRecord {
        review_id: id.to_string(),
        user_id: user_id.to_string(),
        business_id: business_id.to_string(),
        stars,
        date: NaiveDate::from_ymd_opt(2021, 11, 20)
            .unwrap()
            .and_hms_opt(18, 5, 9)
            .unwrap(),
        text: "Great tortilla".to_string(),
        useful: 4,
        funny: 0,
        cool: 1,
    }
}

fn scenario() -> Dataset {
    Dataset {
        businesses: vec![business("b1", 4.5), business("b2", 3.0), business("b3", 1.5)],
        users: vec![user("u1", &["u2"]), user("u2", &["u1"])],
        reviews: vec![
            review("r1", "u1", "b1", 5.0),
            review("r2", "u2", "b1", 4.0),
            review("r3", "u1", "b2", 3.0),
            review("r4", "ghost", "b3", 2.0),
            review("r5", "u2", "b3", 1.0),
        ],
    }
}

fn data_lines(path: &std::path::Path) -> usize {
    fs::read_to_string(path).unwrap().lines().count() - 1
}

#[test]
fn test_three_businesses_two_users_five_reviews() {
    let dir = tempdir().unwrap();
    let validated = Transformer::new(RatingConfig::default()).validate(scenario());
    let writer = BulkFileWriter::new(dir.path());
    writer.write_graph(&validated.to_graph()).unwrap();

    let graph_dir = writer.graph_dir();
    assert_eq!(data_lines(&graph_dir.join(BUSINESS_NODES)), 3);
    assert_eq!(data_lines(&graph_dir.join(USER_NODES)), 2);
    assert_eq!(data_lines(&graph_dir.join(REVIEWED_RELATIONSHIPS)), 4);
    assert_eq!(data_lines(&graph_dir.join(FRIEND_RELATIONSHIPS)), 1);

    assert_eq!(validated.issues.len(), 1);
    assert_eq!(
        validated.issues[0].kind,
        IssueKind::UnknownUser {
            user_id: "ghost".to_string()
        }
    );
    assert_eq!(validated.issues[0].id, "r4");
}

#[test]
fn test_relationship_endpoints_exist_in_node_files() {
    let dir = tempdir().unwrap();
    let validated = Transformer::new(RatingConfig::default()).validate(scenario());
    let writer = BulkFileWriter::new(dir.path());
    writer.write_graph(&validated.to_graph()).unwrap();

    let ids = |file: &str| -> HashSet<String> {
        let mut reader = csv::Reader::from_path(writer.graph_dir().join(file)).unwrap();
        reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect()
    };
    let businesses = ids(BUSINESS_NODES);
    let users = ids(USER_NODES);

    let mut reader = csv::Reader::from_path(writer.graph_dir().join(REVIEWED_RELATIONSHIPS)).unwrap();
    let headers = reader.headers().unwrap().clone();
    assert_eq!(&headers[1], ":START_ID(User)");
    assert_eq!(&headers[2], ":END_ID(Business)");
    for record in reader.records() {
        let record = record.unwrap();
        assert!(users.contains(&record[1]), "missing user {}", &record[1]);
        assert!(businesses.contains(&record[2]), "missing business {}", &record[2]);
    }
}

#[test]
fn test_documents_round_trip() {
    let validated = Transformer::new(RatingConfig::default()).validate(scenario());
    let docs = validated.to_documents().unwrap();

    for (doc, original) in docs.businesses.iter().zip(&validated.businesses) {
        let line = serde_json::to_string(doc).unwrap();
        let parsed: BusinessRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(&parsed, original);
    }
    for (doc, original) in docs.reviews.iter().zip(&validated.reviews) {
        let line = serde_json::to_string(doc).unwrap();
        let parsed: ReviewRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(&parsed, original);
        assert_eq!(parsed.stars.to_bits(), original.stars.to_bits());
    }
    for (doc, original) in docs.users.iter().zip(&validated.users) {
        let parsed: UserRecord = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(parsed.user_id, original.user_id);
        assert_eq!(parsed.cool, original.cool);
        assert!(parsed.friends.is_empty());
    }
}

#[test]
fn test_rating_boundaries_clamp() {
    let mut data = scenario();
    data.reviews[0].stars = 7.5;
    data.reviews[1].stars = 0.5;
    data.reviews[2].stars = 5.0;
    let validated = Transformer::new(RatingConfig::default()).validate(data);

    assert_eq!(validated.reviews.len(), 4);
    assert_eq!(validated.reviews[0].stars, 5.0);
    assert_eq!(validated.reviews[1].stars, 1.0);
    assert_eq!(validated.reviews[2].stars, 5.0);
    let clamps: Vec<_> = validated
        .issues
        .iter()
        .filter(|i| matches!(i.kind, IssueKind::RatingOutOfRange { .. }))
        .collect();
    assert_eq!(clamps.len(), 2);
    assert!(clamps.iter().all(|i| !i.dropped()));
}

#[test]
fn test_rating_boundaries_reject() {
    let mut data = scenario();
    data.reviews[0].stars = 7.5;
    data.reviews[1].stars = 1.0;
    let rating = RatingConfig {
        policy: RatingPolicy::Reject,
        ..RatingConfig::default()
    };
    let validated = Transformer::new(rating).validate(data);

    let ids: Vec<_> = validated.reviews.iter().map(|r| r.review_id.as_str()).collect();
    assert_eq!(ids, vec!["r2", "r3", "r5"]);
    assert!(validated.issues.iter().any(|i| matches!(
        i.kind,
        IssueKind::RatingOutOfRange {
            clamped_to: None,
            ..
        }
    )));
}

#[test]
fn test_prepare_is_idempotent() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let source = RecordSource::Synthetic(SyntheticConfig {
        businesses: 30,
        users: 15,
        reviews: 90,
    });

    let a = prepare(&source, &RatingConfig::default(), first.path(), PrepareTargets::all()).unwrap();
    let b = prepare(&source, &RatingConfig::default(), second.path(), PrepareTargets::all()).unwrap();
    assert_eq!(a.files.files.len(), 7);

    for (left, right) in a.files.files.iter().zip(&b.files.files) {
        assert_eq!(left.name, right.name);
        assert_eq!(fs::read(&left.path).unwrap(), fs::read(&right.path).unwrap());
    }

    // rewriting into the same directory yields the same bytes
    let before = fs::read(&a.files.files[0].path).unwrap();
    prepare(&source, &RatingConfig::default(), first.path(), PrepareTargets::all()).unwrap();
    assert_eq!(before, fs::read(&a.files.files[0].path).unwrap());
}

#[test]
fn test_prepare_from_raw_files_reports_malformed_lines() {
    let raw = tempdir().unwrap();
    let out = tempdir().unwrap();
    let generated = trident_core::synthetic::SyntheticGenerator::new(SyntheticConfig {
        businesses: 4,
        users: 3,
        reviews: 6,
    })
    .generate();
    BulkFileWriter::write_raw(raw.path(), &generated).unwrap();
    let review_path = raw.path().join("review.json");
    let mut content = fs::read_to_string(&review_path).unwrap();
    content.push_str("{broken\n");
    fs::write(&review_path, content).unwrap();

    let source = RecordSource::Files {
        dir: raw.path().to_path_buf(),
        limit: None,
    };
    let prepared = prepare(
        &source,
        &RatingConfig::default(),
        out.path(),
        PrepareTargets {
            documents: true,
            graph: false,
        },
    )
    .unwrap();

    assert_eq!(prepared.dataset.reviews.len(), 6);
    assert!(prepared.graph.is_none());
    assert!(matches!(prepared.issues()[0].kind, IssueKind::Malformed { line: 7, .. }));
    let summary = prepared.summary();
    assert_eq!(summary.issue_count, 1);
    assert_eq!(summary.files.files.len(), 3);
}
