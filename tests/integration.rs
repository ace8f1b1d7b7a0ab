use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use review_harness::config::load_config;
use review_harness::db;
use review_harness::models::{PlaceId, Review};
use review_harness::store::sqlite::SqliteStore;
use review_harness::store::{CachedReviews, Store};

fn rh_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_rh"))
}

fn setup_test_env(extra: &str) -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/reviews.sqlite"

[fetch]
api_key_env = "RH_TEST_UNSET_SERPAPI_KEY"

[places]
api_key_env = "RH_TEST_UNSET_GMAPS_KEY"
{}
"#,
        root.display(),
        extra
    );

    let config_path = config_dir.join("reviews.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_rh(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = rh_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run rh binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Put a review set in the cache directly, as a previous fetch would have.
async fn seed_reviews(config_path: &Path, place: &str) {
    let config = load_config(config_path).unwrap();
    let pool = db::connect(&config).await.unwrap();
    let store = SqliteStore::new(pool.clone());
    store.ensure_review_namespace().await.unwrap();

    let review = |page: u32, author: &str, text: Option<&str>| Review {
        page,
        author_name: author.to_string(),
        author_profile_link: None,
        author_thumbnail: None,
        rating: Some(4.0),
        date: Some("a month ago".to_string()),
        text: text.map(str::to_string),
        images: None,
        is_local_guide: Some(false),
    };
    let cached = CachedReviews {
        reviews: vec![
            review(1, "Anu", Some("Good light in the evening.")),
            review(1, "Bo", None),
            review(2, "Cy", Some("Ticket queue is long.")),
        ],
        pages: 2,
        fetched_at: chrono::Utc::now().timestamp(),
    };
    assert!(store
        .save_reviews(&PlaceId::new(place).unwrap(), &cached)
        .await
        .unwrap());
    pool.close().await;
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_rh(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/reviews.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, _, success1) = run_rh(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_rh(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_stats_empty() {
    let (_tmp, config_path) = setup_test_env("");

    let (stdout, stderr, success) = run_rh(&config_path, &["stats"]);
    assert!(success, "stats failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Places:      0"));
}

#[tokio::test]
async fn test_fetch_serves_cached_reviews_without_credentials() {
    let (_tmp, config_path) = setup_test_env("");
    seed_reviews(&config_path, "ChIJ-fort").await;

    let (stdout, stderr, success) = run_rh(&config_path, &["fetch", "ChIJ-fort"]);
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Cached:   3 reviews for ChIJ-fort"));
    assert!(stdout.contains("with text: 2"));
    assert!(stdout.contains("pages:     2"));
}

#[test]
fn test_fetch_uncached_without_credentials_fails() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_rh(&config_path, &["fetch", "ChIJ-unknown"]);
    assert!(!success);
    assert!(stderr.contains("RH_TEST_UNSET_SERPAPI_KEY"));

    // Nothing was cached.
    let (stdout, _, _) = run_rh(&config_path, &["stats"]);
    assert!(stdout.contains("Places:      0"));
}

#[test]
fn test_fetch_rejects_zero_min_count() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_rh(&config_path, &["fetch", "ChIJ-x", "--min-count", "0"]);
    assert!(!success);
    assert!(stderr.contains("min-count"));
}

#[tokio::test]
async fn test_stats_lists_cached_place() {
    let (_tmp, config_path) = setup_test_env("");
    seed_reviews(&config_path, "ChIJ-stats").await;

    let (stdout, _, success) = run_rh(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("ChIJ-stats"));
    assert!(stdout.contains("Reviews:     3"));
    assert!(stdout.contains("Indexed:     0 / 1"));
}

#[tokio::test]
async fn test_index_with_embeddings_disabled_fails_cleanly() {
    let (_tmp, config_path) = setup_test_env("");
    seed_reviews(&config_path, "ChIJ-noembed").await;

    let (_, stderr, success) = run_rh(&config_path, &["index", "ChIJ-noembed"]);
    assert!(!success);
    assert!(stderr.to_lowercase().contains("disabled"));

    let (stdout, _, _) = run_rh(&config_path, &["stats"]);
    assert!(stdout.contains("Indexed:     0 / 1"));
}

#[tokio::test]
async fn test_forget_reviews() {
    let (_tmp, config_path) = setup_test_env("");
    seed_reviews(&config_path, "ChIJ-gone").await;

    let (stdout, _, success) = run_rh(&config_path, &["forget", "ChIJ-gone"]);
    assert!(success);
    assert!(stdout.contains("No index stored"));

    let (stdout, _, success) = run_rh(&config_path, &["forget", "ChIJ-gone", "--reviews"]);
    assert!(success);
    assert!(stdout.contains("Removed index and cached reviews"));

    let (stdout, _, _) = run_rh(&config_path, &["stats"]);
    assert!(stdout.contains("Places:      0"));
}

#[test]
fn test_ask_with_blank_place_errors() {
    let (_tmp, config_path) = setup_test_env("");

    let (_, stderr, success) = run_rh(&config_path, &["ask", " ", "Is it open?"]);
    assert!(!success);
    assert!(stderr.contains("place id must not be empty"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config_path) = setup_test_env("\n[retrieval]\ntop_k = 0\n");

    let (_, stderr, success) = run_rh(&config_path, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("top_k"));
}

#[test]
fn test_missing_config_is_reported() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (_, stderr, success) = run_rh(&missing, &["stats"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_completions_need_no_config() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("nope.toml");

    let (stdout, _, success) = run_rh(&missing, &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("rh"));
}
