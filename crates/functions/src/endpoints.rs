use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    concierge_common::MessageDirection,
    concierge_config::BackendConfig,
    serde::{Deserialize, Serialize},
    tracing::debug,
};

use crate::{
    client::FunctionsClient,
    error::{Error, Result},
    retry::{RetryPolicy, retry_with_backoff},
};

/// Body of a reply request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyRequest {
    /// Business phone number the customer wrote to.
    pub phone: String,
    /// Customer identity on the transport.
    pub user_id: String,
    pub text: String,
}

/// One record in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub phone: String,
    pub user_id: String,
    pub text: String,
    pub message_type: MessageDirection,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyResponse {
    #[serde(default)]
    reply: Option<String>,
}

/// Produces the text answering a customer message.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Returns non-empty reply text.
    ///
    /// [`Error::EmptyReply`] means the backend answered but had nothing to
    /// say; any other error means every attempt failed.
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String>;
}

/// Records messages in the conversation log.
#[async_trait]
pub trait MessageLogger: Send + Sync {
    async fn log_message(&self, entry: &LogEntry) -> Result<()>;
}

/// Both endpoints backed by hosted functions.
pub struct BackendFunctions {
    client: FunctionsClient,
    reply_function: String,
    log_function: String,
    reply_policy: RetryPolicy,
    log_policy: RetryPolicy,
}

impl BackendFunctions {
    pub fn new(client: FunctionsClient, config: &BackendConfig) -> Self {
        Self {
            client,
            reply_function: config.reply_function.clone(),
            log_function: config.log_function.clone(),
            reply_policy: RetryPolicy::for_reply(config),
            log_policy: RetryPolicy::for_log(config),
        }
    }

    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(FunctionsClient::from_config(config), config)
    }
}

#[async_trait]
impl ReplyGenerator for BackendFunctions {
    async fn generate_reply(&self, request: &ReplyRequest) -> Result<String> {
        let function = self.reply_function.as_str();
        retry_with_backoff(function, &self.reply_policy, |_| async move {
            let value = self.client.invoke(function, request).await?;
            let reply = match value {
                serde_json::Value::Null => ReplyResponse::default(),
                other => serde_json::from_value(other).map_err(|source| Error::Decode {
                    function: function.to_string(),
                    source,
                })?,
            };
            match reply.reply {
                Some(text) if !text.trim().is_empty() => Ok(text),
                _ => Err(Error::EmptyReply {
                    function: function.to_string(),
                }),
            }
        })
        .await
    }
}

#[async_trait]
impl MessageLogger for BackendFunctions {
    async fn log_message(&self, entry: &LogEntry) -> Result<()> {
        let function = self.log_function.as_str();
        retry_with_backoff(function, &self.log_policy, |_| async move {
            self.client.invoke(function, entry).await?;
            Ok(())
        })
        .await?;
        debug!(
            function,
            direction = entry.message_type.as_str(),
            "message logged"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, mockito::Matcher, secrecy::Secret};

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            api_key: Secret::new("anon".into()),
            retry_base_delay_ms: 1,
            ..BackendConfig::default()
        }
    }

    fn request() -> ReplyRequest {
        ReplyRequest {
            phone: "+972525587933".into(),
            user_id: "972501234567@c.us".into(),
            text: "מה שעות הפתיחה?".into(),
        }
    }

    #[test]
    fn log_entry_uses_backend_field_names() {
        let entry = LogEntry {
            phone: "+972525587933".into(),
            user_id: "972501234567@c.us".into(),
            text: "hi".into(),
            message_type: MessageDirection::Outgoing,
            timestamp: DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["userId"], "972501234567@c.us");
        assert_eq!(value["messageType"], "outgoing");
        assert_eq!(value["timestamp"], "2026-01-01T10:00:00Z");
    }

    #[tokio::test]
    async fn reply_is_returned_from_backend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/get-reply")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "phone": "+972525587933",
                "userId": "972501234567@c.us",
            })))
            .with_status(200)
            .with_body(r#"{"reply":"אנחנו פתוחים 9-18"}"#)
            .create_async()
            .await;

        let functions = BackendFunctions::from_config(&config(&server.url()));
        let reply = functions.generate_reply(&request()).await.unwrap();
        assert_eq!(reply, "אנחנו פתוחים 9-18");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn blank_reply_is_reported_once() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/get-reply")
            .with_status(200)
            .with_body(r#"{"reply":"  "}"#)
            .expect(1)
            .create_async()
            .await;

        let functions = BackendFunctions::from_config(&config(&server.url()));
        let err = functions.generate_reply(&request()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyReply { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn failing_backend_is_tried_three_times() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/get-reply")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let functions = BackendFunctions::from_config(&config(&server.url()));
        let err = functions.generate_reply(&request()).await.unwrap_err();
        assert!(matches!(err, Error::Exhausted { attempts: 3, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn log_message_posts_to_log_function() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/functions/v1/bot-message")
            .match_header("authorization", "Bearer anon")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "messageType": "incoming",
                "text": "hi",
            })))
            .with_status(200)
            .with_body(r#"{"success":true,"logged":true}"#)
            .create_async()
            .await;

        let functions = BackendFunctions::from_config(&config(&server.url()));
        functions
            .log_message(&LogEntry {
                phone: "+972525587933".into(),
                user_id: "972501234567@c.us".into(),
                text: "hi".into(),
                message_type: MessageDirection::Incoming,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }
}
