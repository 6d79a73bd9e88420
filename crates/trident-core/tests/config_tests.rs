use std::fs;
use tempfile::tempdir;
use trident_core::config::{load_config, parse_key_value_pair, ImportMethod, RatingPolicy};
use trident_core::retry::BackoffStrategy;
use trident_core::PipelineError;

#[test]
fn test_load_yaml_with_env_and_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trident.yaml");
    fs::write(
        &path,
        r#"
data:
  input_dir: /data/yelp
  limit: 500
rating:
  policy: reject
neo4j:
  password: ENV_TRIDENT_TEST_NEO4J_PASSWORD
redis:
  url: ${TRIDENT_TEST_REDIS_URL}
retry:
  max_attempts: 2
  backoff_strategy:
    fixed:
      delay_ms: 10
import:
  method: native
"#,
    )
    .unwrap();
    std::env::set_var("TRIDENT_TEST_NEO4J_PASSWORD", "s3cret");
    std::env::set_var("TRIDENT_TEST_REDIS_URL", "redis://cache:6380");

    let overrides = vec![
        parse_key_value_pair("mongo.database=yelp_test").unwrap(),
        parse_key_value_pair("rating.max=4.5").unwrap(),
    ];
    let config = load_config(Some(&path), &overrides).unwrap();

    assert_eq!(config.data.input_dir.to_str(), Some("/data/yelp"));
    assert_eq!(config.data.limit, Some(500));
    assert_eq!(config.data.output_dir.to_str(), Some("data/processed"));
    assert_eq!(config.rating.policy, RatingPolicy::Reject);
    assert_eq!(config.rating.max, 4.5);
    assert_eq!(config.neo4j.password, "s3cret");
    assert_eq!(config.neo4j.user, "neo4j");
    assert_eq!(config.redis.url, "redis://cache:6380");
    assert_eq!(config.mongo.database, "yelp_test");
    assert_eq!(config.retry.max_attempts, 2);
    assert!(matches!(
        config.retry.backoff_strategy,
        BackoffStrategy::Fixed { delay_ms: 10 }
    ));
    assert_eq!(config.import.method, ImportMethod::Native);
}

#[test]
fn test_missing_config_file_is_config_error() {
    let dir = tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.yaml")), &[]).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn test_unset_env_reference_is_config_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("trident.yaml");
    fs::write(&path, "mongo:\n  uri: ENV_TRIDENT_TEST_SURELY_UNSET\n").unwrap();
    let err = load_config(Some(&path), &[]).unwrap_err();
    assert!(err.to_string().contains("TRIDENT_TEST_SURELY_UNSET"));
}

#[test]
fn test_empty_file_keeps_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("empty.yaml");
    fs::write(&path, "").unwrap();
    let config = load_config(Some(&path), &[]).unwrap();
    assert_eq!(config.mongo.uri, "mongodb://localhost:27017");
    assert_eq!(config.redis.top_limit, 10);
}

#[test]
fn test_empty_redis_prefix_rejected() {
    for prefix in ["", "  "] {
        let err = load_config(None, &[("redis.key_prefix".into(), prefix.into())]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(err.to_string().contains("key_prefix"));
    }
}

#[test]
fn test_document_limit_independent_of_cache_limit() {
    let config = load_config(
        None,
        &[
            ("redis.top_limit".into(), "3".into()),
            ("mongo.top_limit".into(), "25".into()),
        ],
    )
    .unwrap();
    assert_eq!(config.mongo.top_limit, 25);
    assert_eq!(config.redis.top_limit, 3);
}
