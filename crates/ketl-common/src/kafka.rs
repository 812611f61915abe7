//! Kafka connection settings shared by the producer and the consumer
//!
//! Both services read the same broker variables. When `KAFKA_USERNAME` and
//! `KAFKA_PASSWORD` are present the client authenticates with SASL/SCRAM over
//! TLS, which is what the hosted cluster expects.

use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::{KetlError, Result};

/// Session timeout handed to librdkafka, in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u32 = 6000;

/// Security protocol used when credentials are configured.
pub const DEFAULT_SECURITY_PROTOCOL: &str = "SASL_SSL";

/// SASL mechanism used when credentials are configured.
pub const DEFAULT_SASL_MECHANISM: &str = "SCRAM-SHA-256";

/// SASL credentials for the broker
#[derive(Clone, Serialize, Deserialize)]
pub struct KafkaCredentials {
    pub username: String,
    pub password: String,
    pub security_protocol: String,
    pub sasl_mechanism: String,
}

impl std::fmt::Debug for KafkaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaCredentials")
            .field("username", &self.username)
            .field("password", &"***")
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .finish()
    }
}

/// Broker connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,
    /// Topics named by `KAFKA_TOPIC`; the producer writes to the first one
    pub topics: Vec<String>,
    pub session_timeout_ms: u32,
    pub credentials: Option<KafkaCredentials>,
}

impl KafkaConfig {
    /// Load broker settings from the environment
    ///
    /// Required: `KAFKA_HOST`, `KAFKA_TOPIC`.
    /// Optional: `KAFKA_USERNAME`, `KAFKA_PASSWORD`, `KAFKA_SECURITY_PROTOCOL`,
    /// `KAFKA_SASL_MECHANISM`, `KAFKA_SESSION_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        let brokers = std::env::var("KAFKA_HOST")
            .map_err(|_| KetlError::config("KAFKA_HOST not set"))?;
        let topics = parse_topics(
            &std::env::var("KAFKA_TOPIC").map_err(|_| KetlError::config("KAFKA_TOPIC not set"))?,
        );

        let session_timeout_ms = std::env::var("KAFKA_SESSION_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_TIMEOUT_MS);

        let credentials = match (std::env::var("KAFKA_USERNAME"), std::env::var("KAFKA_PASSWORD")) {
            (Ok(username), Ok(password)) => Some(KafkaCredentials {
                username,
                password,
                security_protocol: std::env::var("KAFKA_SECURITY_PROTOCOL")
                    .unwrap_or_else(|_| DEFAULT_SECURITY_PROTOCOL.to_string()),
                sasl_mechanism: std::env::var("KAFKA_SASL_MECHANISM")
                    .unwrap_or_else(|_| DEFAULT_SASL_MECHANISM.to_string()),
            }),
            (Ok(_), Err(_)) | (Err(_), Ok(_)) => {
                return Err(KetlError::config(
                    "KAFKA_USERNAME and KAFKA_PASSWORD must be set together",
                ));
            },
            _ => None,
        };

        let config = Self {
            brokers,
            topics,
            session_timeout_ms,
            credentials,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.brokers.trim().is_empty() {
            return Err(KetlError::config("Kafka bootstrap servers cannot be empty"));
        }
        if self.topics.is_empty() {
            return Err(KetlError::config("At least one Kafka topic is required"));
        }
        Ok(())
    }

    /// Topic the producer publishes to
    pub fn primary_topic(&self) -> Result<&str> {
        self.topics
            .first()
            .map(String::as_str)
            .ok_or_else(|| KetlError::config("At least one Kafka topic is required"))
    }

    /// Base librdkafka client configuration (brokers, session, security)
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.brokers);
        config.set("session.timeout.ms", self.session_timeout_ms.to_string());

        if let Some(ref credentials) = self.credentials {
            config.set("security.protocol", &credentials.security_protocol);
            config.set("sasl.mechanisms", &credentials.sasl_mechanism);
            config.set("sasl.username", &credentials.username);
            config.set("sasl.password", &credentials.password);
        }

        config
    }
}

/// Split a comma-separated topic list, dropping blanks
pub fn parse_topics(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}
