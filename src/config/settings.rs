use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub worker: WorkerSettings,
    pub auth: AuthSettings,
    pub ingress: IngressSettings,
    pub logging: LoggingSettings,
}

/// Where the ingress HTTP server binds.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Broker connection, queue names, and the publish discipline.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub url: String,
    pub request_queue: String,
    pub response_queue: String,
    pub message_ttl_ms: u64,
    pub publish_timeout_ms: u64,
}

impl BrokerSettings {
    pub fn message_ttl(&self) -> Duration {
        Duration::from_millis(self.message_ttl_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

/// When the worker acknowledges a request message.
///
/// `AfterProcessing` is the default. `OnReceipt` restores at-most-once
/// delivery, where a crash between receipt and publish loses the request.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// The broker treats the message as consumed as soon as it is delivered.
    OnReceipt,
    /// The worker acknowledges once the message reached a terminal state.
    AfterProcessing,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerSettings {
    pub ack_mode: AckPolicy,
}

/// Which credential validator the worker uses.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthBackend {
    Static,
    Remote,
}

/// Credential validator settings. `account`, `password` and `token` only
/// matter for the static backend, `provider_*` only for the remote one.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub backend: AuthBackend,
    pub account: String,
    pub password: String,
    pub token: String,
    pub provider_url: String,
    pub provider_timeout_ms: u64,
}

impl AuthSettings {
    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngressSettings {
    pub reply_timeout_ms: u64,
}

impl IngressSettings {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub worker: Option<PartialWorkerSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub ingress: Option<PartialIngressSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub request_queue: Option<String>,
    pub response_queue: Option<String>,
    pub message_ttl_ms: Option<u64>,
    pub publish_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialWorkerSettings {
    pub ack_mode: Option<AckPolicy>,
}

#[derive(Debug, Deserialize)]
pub struct PartialAuthSettings {
    pub backend: Option<AuthBackend>,
    pub account: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub provider_url: Option<String>,
    pub provider_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialIngressSettings {
    pub reply_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fill every missing value from `default`.
    pub fn merge_onto(self, default: Settings) -> Settings {
        let Settings {
            server,
            broker,
            worker,
            auth,
            ingress,
            logging,
        } = default;

        Settings {
            server: match self.server {
                Some(s) => ServerSettings {
                    host: s.host.unwrap_or(server.host),
                    port: s.port.unwrap_or(server.port),
                },
                None => server,
            },
            broker: match self.broker {
                Some(b) => BrokerSettings {
                    url: b.url.unwrap_or(broker.url),
                    request_queue: b.request_queue.unwrap_or(broker.request_queue),
                    response_queue: b.response_queue.unwrap_or(broker.response_queue),
                    message_ttl_ms: b.message_ttl_ms.unwrap_or(broker.message_ttl_ms),
                    publish_timeout_ms: b.publish_timeout_ms.unwrap_or(broker.publish_timeout_ms),
                },
                None => broker,
            },
            worker: match self.worker {
                Some(w) => WorkerSettings {
                    ack_mode: w.ack_mode.unwrap_or(worker.ack_mode),
                },
                None => worker,
            },
            auth: match self.auth {
                Some(a) => AuthSettings {
                    backend: a.backend.unwrap_or(auth.backend),
                    account: a.account.unwrap_or(auth.account),
                    password: a.password.unwrap_or(auth.password),
                    token: a.token.unwrap_or(auth.token),
                    provider_url: a.provider_url.unwrap_or(auth.provider_url),
                    provider_timeout_ms: a.provider_timeout_ms.unwrap_or(auth.provider_timeout_ms),
                },
                None => auth,
            },
            ingress: match self.ingress {
                Some(i) => IngressSettings {
                    reply_timeout_ms: i.reply_timeout_ms.unwrap_or(ingress.reply_timeout_ms),
                },
                None => ingress,
            },
            logging: match self.logging {
                Some(l) => LoggingSettings {
                    level: l.level.unwrap_or(logging.level),
                },
                None => logging,
            },
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the relay runs end to end with no configuration at all: in-process
/// broker, static credential check, three-minute queue TTL. The worker acks
/// after processing; set `worker.ack_mode = "on_receipt"` for ack-on-delivery.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            broker: BrokerSettings {
                url: "memory://local".to_string(),
                request_queue: "login_req".to_string(),
                response_queue: "login_res".to_string(),
                message_ttl_ms: 180_000,
                publish_timeout_ms: 5_000,
            },
            worker: WorkerSettings {
                ack_mode: AckPolicy::AfterProcessing,
            },
            auth: AuthSettings {
                backend: AuthBackend::Static,
                account: "my_account".to_string(),
                password: "my_password".to_string(),
                token: "generate_a_success_token_for_user".to_string(),
                provider_url: "http://localhost:8081/api/v1/auth/login".to_string(),
                provider_timeout_ms: 5_000,
            },
            ingress: IngressSettings {
                reply_timeout_ms: 10_000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}
