//! Remote key-value checkpoint backend.
//!
//! Speaks the REST dialect of hosted Redis services: each command is a JSON
//! array POSTed to the base URL (or an array of arrays to `/pipeline`) with a
//! bearer token, and every reply is `{"result": ...}` or `{"error": "..."}`.
//!
//! Layout in the remote store:
//!
//! ```text
//! rakugaki:checkpoint:<id>   → checkpoint document (string), EX 30 days
//! rakugaki:checkpoints       → sorted set, member <id>, score = write time (ms)
//! ```
//!
//! The sorted set drives eviction: after each save, members beyond the
//! ceiling are removed oldest-first together with their documents.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

use rakugaki_types::{Checkpoint, CheckpointData, CheckpointId};

use crate::store::ops::{CheckpointStore, StoreLimits, encode_payload, parse_id};
use crate::store::{StoreError, StoreResult};

/// Entry lifetime in the remote store.
pub const CHECKPOINT_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Per-request timeout inherited by every remote call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const KEY_PREFIX: &str = "rakugaki:checkpoint:";
const INDEX_KEY: &str = "rakugaki:checkpoints";

/// Connection settings for the remote store.
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub url: String,
    pub token: String,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Remote key-value checkpoint backend.
///
/// The HTTP client is built on first use, not at construction.
pub struct RemoteStore {
    config: RemoteConfig,
    limits: StoreLimits,
    client: OnceCell<reqwest::Client>,
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("config", &self.config)
            .field("limits", &self.limits)
            .field("connected", &self.client.initialized())
            .finish()
    }
}

impl RemoteStore {
    /// Create a remote store. Missing connection settings are an error here,
    /// at startup, rather than on the first save.
    pub fn new(config: RemoteConfig) -> StoreResult<Self> {
        Self::with_limits(config, StoreLimits::default())
    }

    pub fn with_limits(config: RemoteConfig, limits: StoreLimits) -> StoreResult<Self> {
        if config.url.trim().is_empty() {
            return Err(StoreError::config("remote store URL is empty"));
        }
        if config.token.trim().is_empty() {
            return Err(StoreError::config("remote store token is empty"));
        }
        let config = RemoteConfig {
            url: config.url.trim().trim_end_matches('/').to_string(),
            token: config.token.trim().to_string(),
        };
        Ok(Self {
            config,
            limits,
            client: OnceCell::new(),
        })
    }

    async fn client(&self) -> StoreResult<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                tracing::debug!(url = %self.config.url, "connecting to remote checkpoint store");
                reqwest::Client::builder()
                    .timeout(REQUEST_TIMEOUT)
                    .build()
                    .map_err(StoreError::from)
            })
            .await
    }

    /// Run one command.
    async fn command(&self, command: Value) -> StoreResult<Value> {
        let response = self
            .client()
            .await?
            .post(&self.config.url)
            .bearer_auth(&self.config.token)
            .json(&command)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        parse_reply(read_body(status, &text)?)
    }

    /// Run several commands in one round trip.
    async fn pipeline(&self, commands: Vec<Value>) -> StoreResult<Vec<Value>> {
        let expected = commands.len();
        let response = self
            .client()
            .await?
            .post(format!("{}/pipeline", self.config.url))
            .bearer_auth(&self.config.token)
            .json(&Value::Array(commands))
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        parse_pipeline_reply(read_body(status, &text)?, expected)
    }

    /// Drop expired index members, then the oldest beyond the ceiling.
    async fn evict(&self, now_ms: u64) -> StoreResult<()> {
        let cutoff = now_ms.saturating_sub(CHECKPOINT_TTL.as_millis() as u64);
        let replies = self
            .pipeline(vec![
                json!(["ZREMRANGEBYSCORE", INDEX_KEY, "-inf", format!("({cutoff}")]),
                json!(["ZCARD", INDEX_KEY]),
            ])
            .await?;

        let live = replies
            .get(1)
            .and_then(reply_as_u64)
            .ok_or_else(|| StoreError::remote("ZCARD returned a non-integer"))?;
        let surplus = (live as usize).saturating_sub(self.limits.max_entries);
        if surplus == 0 {
            return Ok(());
        }

        let oldest = self
            .command(json!(["ZRANGE", INDEX_KEY, 0, surplus - 1]))
            .await?;
        let ids: Vec<String> = oldest
            .as_array()
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        if ids.is_empty() {
            return Ok(());
        }

        self.pipeline(eviction_commands(&ids)).await?;
        tracing::debug!(evicted = ids.len(), "remote store evicted oldest checkpoints");
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for RemoteStore {
    #[tracing::instrument(skip(self, data))]
    async fn save(&self, id: &str, data: &CheckpointData) -> StoreResult<()> {
        let id = parse_id(id)?;
        let bytes = encode_payload(data, &self.limits)?;
        let document = String::from_utf8(bytes)
            .map_err(|e| StoreError::remote(format!("document is not UTF-8: {e}")))?;
        let now_ms = unix_millis(SystemTime::now());

        self.pipeline(save_commands(&id, &document, now_ms)).await?;

        if let Err(e) = self.evict(now_ms).await {
            tracing::warn!(error = %e, "remote checkpoint eviction failed");
        }
        Ok(())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<Checkpoint>> {
        let id = parse_id(id)?;
        let replies = self
            .pipeline(vec![
                json!(["GET", document_key(&id)]),
                json!(["ZSCORE", INDEX_KEY, id.as_str()]),
            ])
            .await?;

        let document = match replies.first() {
            Some(Value::String(document)) => document,
            Some(Value::Null) | None => return Ok(None),
            Some(other) => {
                return Err(StoreError::remote(format!(
                    "GET returned unexpected value: {other}"
                )));
            }
        };
        let data = CheckpointData::from_json_slice(document.as_bytes())?;
        let saved_at = replies
            .get(1)
            .and_then(reply_as_u64)
            .map(|ms| UNIX_EPOCH + Duration::from_millis(ms));

        Ok(Some(Checkpoint { id, data, saved_at }))
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }
}

fn document_key(id: &CheckpointId) -> String {
    format!("{KEY_PREFIX}{id}")
}

fn unix_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Commands that store a document and record its write time.
fn save_commands(id: &CheckpointId, document: &str, now_ms: u64) -> Vec<Value> {
    vec![
        json!([
            "SET",
            document_key(id),
            document,
            "EX",
            CHECKPOINT_TTL.as_secs()
        ]),
        json!(["ZADD", INDEX_KEY, now_ms, id.as_str()]),
    ]
}

/// Commands that delete the given checkpoints and their index members.
fn eviction_commands(ids: &[String]) -> Vec<Value> {
    let mut del = vec![json!("DEL")];
    del.extend(ids.iter().map(|id| json!(format!("{KEY_PREFIX}{id}"))));
    let mut zrem = vec![json!("ZREM"), json!(INDEX_KEY)];
    zrem.extend(ids.iter().map(|id| json!(id)));
    vec![Value::Array(del), Value::Array(zrem)]
}

/// Decode a response body, folding a non-success status into the error.
fn read_body(status: reqwest::StatusCode, text: &str) -> StoreResult<Value> {
    if status.is_success() {
        return Ok(serde_json::from_str(text)?);
    }
    let detail = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => map
            .get("error")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| Value::Object(map).to_string()),
        _ => text.trim().chars().take(200).collect(),
    };
    Err(StoreError::remote(format!("HTTP {status}: {detail}")))
}

/// Unwrap `{"result": ..}` / `{"error": ..}`.
fn parse_reply(body: Value) -> StoreResult<Value> {
    match body {
        Value::Object(mut map) => {
            if let Some(error) = map.remove("error") {
                let msg = error.as_str().map(String::from).unwrap_or_else(|| error.to_string());
                return Err(StoreError::remote(msg));
            }
            map.remove("result")
                .ok_or_else(|| StoreError::remote("reply has neither result nor error"))
        }
        other => Err(StoreError::remote(format!("unexpected reply: {other}"))),
    }
}

fn parse_pipeline_reply(body: Value, expected: usize) -> StoreResult<Vec<Value>> {
    let Value::Array(replies) = body else {
        // A whole-request failure comes back as a single object.
        return parse_reply(body).and_then(|v| {
            Err(StoreError::remote(format!("pipeline returned a single value: {v}")))
        });
    };
    if replies.len() != expected {
        return Err(StoreError::remote(format!(
            "pipeline returned {} replies for {} commands",
            replies.len(),
            expected
        )));
    }
    replies.into_iter().map(parse_reply).collect()
}

/// Integers arrive as numbers or, for scores, as decimal strings.
fn reply_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        Value::String(s) => s.parse::<f64>().ok().map(|f| f as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RemoteConfig {
        RemoteConfig {
            url: "https://kv.example.com/".into(),
            token: "secret".into(),
        }
    }

    #[test]
    fn test_missing_config_is_startup_error() {
        let err = RemoteStore::new(RemoteConfig {
            url: "".into(),
            token: "t".into(),
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));

        let err = RemoteStore::new(RemoteConfig {
            url: "https://kv.example.com".into(),
            token: "  ".into(),
        })
        .unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_connection_is_lazy() {
        let store = RemoteStore::new(config()).unwrap();
        assert!(!store.client.initialized());
        assert_eq!(store.config.url, "https://kv.example.com");
    }

    #[test]
    fn test_debug_redacts_token() {
        let store = RemoteStore::new(config()).unwrap();
        let shown = format!("{store:?}");
        assert!(!shown.contains("secret"));
        assert!(shown.contains("redacted"));
    }

    #[tokio::test]
    async fn test_invalid_id_rejected_before_connecting() {
        let store = RemoteStore::new(config()).unwrap();
        let err = store
            .save("../../admin", &CheckpointData::default())
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!store.client.initialized());

        assert!(store.load("bad id").await.is_err());
        assert!(!store.client.initialized());
    }

    #[tokio::test]
    async fn test_oversized_rejected_before_connecting() {
        let store = RemoteStore::with_limits(
            config(),
            StoreLimits {
                max_entries: 100,
                max_payload_bytes: 4,
            },
        )
        .unwrap();
        let err = store.save("ok", &CheckpointData::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::TooLarge { limit: 4, .. }));
        assert!(!store.client.initialized());
    }

    #[test]
    fn test_save_commands() {
        let id = CheckpointId::parse("cp1").unwrap();
        let cmds = save_commands(&id, "{}", 42);
        assert_eq!(
            cmds[0],
            json!(["SET", "rakugaki:checkpoint:cp1", "{}", "EX", 2_592_000u64])
        );
        assert_eq!(cmds[1], json!(["ZADD", "rakugaki:checkpoints", 42, "cp1"]));
    }

    #[test]
    fn test_eviction_commands() {
        let cmds = eviction_commands(&["a".into(), "b".into()]);
        assert_eq!(
            cmds[0],
            json!(["DEL", "rakugaki:checkpoint:a", "rakugaki:checkpoint:b"])
        );
        assert_eq!(cmds[1], json!(["ZREM", "rakugaki:checkpoints", "a", "b"]));
    }

    #[test]
    fn test_read_body_reports_status() {
        let err = read_body(
            reqwest::StatusCode::UNAUTHORIZED,
            r#"{"error":"WRONGPASS invalid token"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, StoreError::Remote(_)));
        let msg = err.to_string();
        assert!(msg.contains("401"), "{msg}");
        assert!(msg.contains("WRONGPASS"), "{msg}");

        let err = read_body(
            reqwest::StatusCode::BAD_GATEWAY,
            "<html><body>502 Bad Gateway</body></html>",
        )
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("502"), "{msg}");
        assert!(msg.contains("Bad Gateway"), "{msg}");
    }

    #[test]
    fn test_read_body_success() {
        let body = read_body(reqwest::StatusCode::OK, r#"{"result":"OK"}"#).unwrap();
        assert_eq!(body, json!({"result": "OK"}));

        let err = read_body(reqwest::StatusCode::OK, "not json").unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn test_parse_reply() {
        assert_eq!(parse_reply(json!({"result": "OK"})).unwrap(), json!("OK"));
        assert_eq!(parse_reply(json!({"result": null})).unwrap(), Value::Null);
        let err = parse_reply(json!({"error": "WRONGPASS"})).unwrap_err();
        assert!(err.to_string().contains("WRONGPASS"));
        assert!(parse_reply(json!([1])).is_err());
    }

    #[test]
    fn test_parse_pipeline_reply() {
        let replies =
            parse_pipeline_reply(json!([{"result": "OK"}, {"result": 1}]), 2).unwrap();
        assert_eq!(replies, vec![json!("OK"), json!(1)]);

        assert!(parse_pipeline_reply(json!([{"result": "OK"}]), 2).is_err());
        assert!(parse_pipeline_reply(json!([{"result": 1}, {"error": "boom"}]), 2).is_err());
        assert!(parse_pipeline_reply(json!({"error": "unauthorized"}), 1).is_err());
    }

    #[test]
    fn test_reply_as_u64() {
        assert_eq!(reply_as_u64(&json!(7)), Some(7));
        assert_eq!(reply_as_u64(&json!("1700000000000")), Some(1_700_000_000_000));
        assert_eq!(reply_as_u64(&Value::Null), None);
    }
}
