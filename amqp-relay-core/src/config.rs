// amqp-relay-core/src/config.rs
use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use tracing::{info, warn};

use crate::catalog::is_catalog_event;
use crate::RelayError;

/// Value the host uses for "option not set".
pub const OFF: &str = "off";
pub const DEFAULT_ROUTING_PREFIX: &str = "lightningd.message.";
pub const DEFAULT_AMQP_PORT: u16 = 5672;
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Raw option values as delivered by the host at init.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayOptions {
    #[serde(rename = "amqp-host", default = "default_off")]
    pub host: String,
    #[serde(rename = "amqp-auth", default = "default_off")]
    pub auth: String,
    #[serde(rename = "amqp-exchange", default = "default_off")]
    pub exchange: String,
    #[serde(rename = "amqp-prefix", default = "default_off")]
    pub prefix: String,
    #[serde(rename = "amqp-delay", default, deserialize_with = "int_or_numeric_string")]
    pub delay: i64,
    #[serde(rename = "amqp-vhost", default = "default_off")]
    pub vhost: String,
    #[serde(rename = "amqp-notifications", default = "default_off")]
    pub notifications: String,
}

fn default_off() -> String {
    OFF.to_string()
}

fn int_or_numeric_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            host: default_off(),
            auth: default_off(),
            exchange: default_off(),
            prefix: default_off(),
            delay: 0,
            vhost: default_off(),
            notifications: default_off(),
        }
    }
}

/// Event names the relay forwards. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledEventSet(BTreeSet<String>);

impl EnabledEventSet {
    pub fn parse(raw: &str) -> Self {
        if raw == OFF {
            return Self::default();
        }
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn contains(&self, event: &str) -> bool {
        self.0.contains(event)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// Everything needed to reach the broker and shape outbound messages.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub vhost: Option<String>,
    pub exchange_name: String,
    pub routing_prefix: String,
    pub publish_delay_ms: u64,
    pub retry_interval: Duration,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, exchange_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_AMQP_PORT,
            username: None,
            password: None,
            vhost: None,
            exchange_name: exchange_name.into(),
            routing_prefix: DEFAULT_ROUTING_PREFIX.to_string(),
            publish_delay_ms: 0,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Validated relay settings. The relay only runs when [`RelayConfig::connection_config`]
/// yields a value.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub exchange: Option<String>,
    pub routing_prefix: String,
    pub publish_delay_ms: u64,
    pub vhost: Option<String>,
    pub enabled: EnabledEventSet,
}

impl RelayConfig {
    pub fn from_options(opts: &RelayOptions) -> Result<Self, RelayError> {
        let (host, port) = match set(&opts.host) {
            Some(addr) => {
                let (host, port) = parse_host(addr)?;
                (Some(host), port)
            }
            None => (None, None),
        };

        let (username, password) = match set(&opts.auth) {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (Some(user.to_string()), Some(pass.to_string())),
                None => (Some(auth.to_string()), None),
            },
            None => (None, None),
        };

        Ok(Self {
            host,
            port,
            username,
            password,
            exchange: set(&opts.exchange).map(str::to_string),
            routing_prefix: set(&opts.prefix)
                .unwrap_or(DEFAULT_ROUTING_PREFIX)
                .to_string(),
            publish_delay_ms: u64::try_from(opts.delay).unwrap_or(0),
            vhost: set(&opts.vhost).map(str::to_string),
            enabled: EnabledEventSet::parse(&opts.notifications),
        })
    }

    /// Host, exchange and at least one enabled event must all be present.
    pub fn is_eligible(&self) -> bool {
        self.host.is_some() && self.exchange.is_some() && !self.enabled.is_empty()
    }

    pub fn connection_config(&self) -> Option<ConnectionConfig> {
        if !self.is_eligible() {
            return None;
        }
        let host = self.host.clone()?;
        let exchange = self.exchange.clone()?;
        Some(ConnectionConfig {
            port: self.port.unwrap_or(DEFAULT_AMQP_PORT),
            username: self.username.clone(),
            password: self.password.clone(),
            vhost: self.vhost.clone(),
            routing_prefix: self.routing_prefix.clone(),
            publish_delay_ms: self.publish_delay_ms,
            ..ConnectionConfig::new(host, exchange)
        })
    }

    /// Logs the effective settings once. The password is never written out.
    pub fn log_settings(&self) {
        if let Some(host) = &self.host {
            info!(host = %host, port = ?self.port, "AMQP host configured");
        }
        if let Some(user) = &self.username {
            info!(username = %user, password_set = self.password.is_some(), "AMQP credentials configured");
        }
        if let Some(exchange) = &self.exchange {
            info!(exchange = %exchange, "AMQP exchange configured");
        }
        if self.publish_delay_ms > 0 {
            info!(delay_ms = self.publish_delay_ms, "AMQP publish delay configured");
        }
        info!(prefix = %self.routing_prefix, "AMQP routing prefix");
        if let Some(vhost) = &self.vhost {
            info!(vhost = %vhost, "AMQP vhost configured");
        }
        if !self.enabled.is_empty() {
            let names: Vec<&str> = self.enabled.iter().collect();
            info!(events = ?names, "AMQP enabled notifications");
        }
        for unknown in self.enabled.iter().filter(|name| !is_catalog_event(name)) {
            warn!(event = unknown, "enabled notification is not one the relay subscribes to");
        }
    }
}

fn set(value: &str) -> Option<&str> {
    (value != OFF).then_some(value)
}

/// Accepts `host`, `host:port`, `[v6]`, `[v6]:port` and a bare IPv6 literal.
fn parse_host(addr: &str) -> Result<(String, Option<u16>), RelayError> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| RelayError::Config(format!("unterminated '[' in amqp-host '{addr}'")))?;
        if tail.is_empty() {
            (host, None)
        } else {
            let port = tail.strip_prefix(':').ok_or_else(|| {
                RelayError::Config(format!("unexpected text after ']' in amqp-host '{addr}'"))
            })?;
            (host, Some(port))
        }
    } else if addr.matches(':').count() > 1 {
        (addr, None)
    } else {
        match addr.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (addr, None),
        }
    };

    let port = port
        .map(|port| {
            port.parse::<u16>()
                .map_err(|e| RelayError::Config(format!("invalid port in amqp-host '{addr}': {e}")))
        })
        .transpose()?;
    if host.is_empty() {
        return Err(RelayError::Config(format!("amqp-host '{addr}' has no host name")));
    }
    Ok((host.to_string(), port))
}
