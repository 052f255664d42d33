//! Common test utilities for API testing with a mock oracle.
//!
//! This module provides a test fixture that creates an in-process router
//! with a scripted oracle and on-disk SQLite stores in a temp directory,
//! so the full HTTP surface can be exercised without network access.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use trialmatch_core::matching::{CacheStore, LlmClient};
use trialmatch_core::testing::MockLlmClient;
use trialmatch_core::{
    Config, LlmConfig, MatchingConfig, SqliteCacheStore, SqliteTermStore, TermStore,
};
use trialmatch_core::config::DatabaseConfig;
use trialmatch_server::api::create_router;
use trialmatch_server::state::AppState;

/// Re-export fixtures for test convenience
pub use trialmatch_core::testing::fixtures;

/// In-process router over a throwaway database.
///
/// ```rust,ignore
/// let fixture = TestFixture::without_oracle(TestConfig::lexical_only());
/// let response = fixture.get("/api/terms/approved").await;
/// assert_status!(response, StatusCode::OK);
/// ```
pub struct TestFixture {
    pub router: Router,
    /// Absent when the fixture runs without credentials.
    pub oracle: Option<Arc<MockLlmClient>>,
    pub term_store: Arc<SqliteTermStore>,
    pub temp_dir: TempDir,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    pub semantic_enabled: bool,
    pub persist_to_storage: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            semantic_enabled: true,
            persist_to_storage: false,
        }
    }
}

impl TestConfig {
    /// Lexical matching only.
    pub fn lexical_only() -> Self {
        Self {
            semantic_enabled: false,
            ..Self::default()
        }
    }

    /// Semantic verdicts written through to SQLite.
    pub fn persisted() -> Self {
        Self {
            persist_to_storage: true,
            ..Self::default()
        }
    }
}

impl TestFixture {
    /// Fixture with an unscripted mock oracle.
    pub fn new() -> Self {
        Self::with_oracle(MockLlmClient::new(), TestConfig::default())
    }

    /// Fixture with the given mock oracle.
    pub fn with_oracle(oracle: MockLlmClient, test_config: TestConfig) -> Self {
        Self::build(Some(Arc::new(oracle)), test_config)
    }

    /// Fixture with no oracle credentials configured.
    pub fn without_oracle(test_config: TestConfig) -> Self {
        Self::build(None, test_config)
    }

    fn build(oracle: Option<Arc<MockLlmClient>>, test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            matching: MatchingConfig {
                semantic_enabled: test_config.semantic_enabled,
                ..MatchingConfig::default()
            },
            llm: Some(LlmConfig {
                persist_to_storage: test_config.persist_to_storage,
                ..LlmConfig::default()
            }),
            ..Config::default()
        };

        let term_store =
            Arc::new(SqliteTermStore::new(&db_path).expect("Failed to create term store"));

        let mut state = AppState::new(config, Arc::clone(&term_store) as Arc<dyn TermStore>);
        if test_config.persist_to_storage {
            let cache_store =
                SqliteCacheStore::new(&db_path).expect("Failed to create cache store");
            state = state.with_cache_store(Arc::new(cache_store) as Arc<dyn CacheStore>);
        }
        if let Some(oracle) = &oracle {
            state = state.with_oracle(Arc::clone(oracle) as Arc<dyn LlmClient>);
        }

        Self {
            router: create_router(Arc::new(state)),
            oracle,
            term_store,
            temp_dir,
        }
    }

    /// The mock oracle. Panics when the fixture has none.
    pub fn oracle(&self) -> &MockLlmClient {
        self.oracle.as_deref().expect("fixture has no oracle")
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        self.dispatch(Request::get(path).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.post_raw(path, &body.to_string()).await
    }

    /// POST an arbitrary string as `application/json`, malformed or not.
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::post(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap();
        self.dispatch(request).await
    }

    /// Send a fully built request, e.g. one carrying extra headers.
    pub async fn dispatch(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();

        TestResponse {
            status: parts.status,
            headers: parts.headers,
            // Non-JSON bodies (e.g. /metrics) come back as Null.
            body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
