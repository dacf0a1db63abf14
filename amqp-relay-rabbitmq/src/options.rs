use amqp_relay_core::ConnectionConfig;
use lapin::uri::{AMQPAuthority, AMQPUri, AMQPUserInfo};
use lapin::ConnectionProperties;

/// Builds the broker URI from the relay settings. Unset credentials and vhost fall
/// back to the client defaults (`guest:guest`, `/`).
pub fn amqp_uri(config: &ConnectionConfig) -> AMQPUri {
    let defaults = AMQPUri::default();
    AMQPUri {
        authority: AMQPAuthority {
            userinfo: AMQPUserInfo {
                username: config
                    .username
                    .clone()
                    .unwrap_or(defaults.authority.userinfo.username),
                password: config
                    .password
                    .clone()
                    .unwrap_or(defaults.authority.userinfo.password),
            },
            host: config.host.clone(),
            port: config.port,
        },
        vhost: config.vhost.clone().unwrap_or(defaults.vhost),
        ..AMQPUri::default()
    }
}

pub fn connection_properties() -> ConnectionProperties {
    ConnectionProperties::default().with_connection_name("amqp-relay".into())
}
