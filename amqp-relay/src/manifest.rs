use amqp_relay_core::config::OFF;
use amqp_relay_core::EVENT_CATALOG;
use serde_json::{json, Value};

struct OptionSpec {
    name: &'static str,
    kind: &'static str,
    default: fn() -> Value,
    description: &'static str,
}

const OPTIONS: [OptionSpec; 7] = [
    OptionSpec {
        name: "amqp-auth",
        kind: "string",
        default: off,
        description: "AMQP service user:pass credentials",
    },
    OptionSpec {
        name: "amqp-host",
        kind: "string",
        default: off,
        description: "AMQP service host:port address",
    },
    OptionSpec {
        name: "amqp-exchange",
        kind: "string",
        default: off,
        description: "AMQP service target exchange",
    },
    OptionSpec {
        name: "amqp-prefix",
        kind: "string",
        default: off,
        description: "AMQP message routing prefix",
    },
    OptionSpec {
        name: "amqp-delay",
        kind: "int",
        default: zero,
        description: "AMQP message relay delay (in ms)",
    },
    OptionSpec {
        name: "amqp-notifications",
        kind: "string",
        default: off,
        description: "AMQP notification relay list",
    },
    OptionSpec {
        name: "amqp-vhost",
        kind: "string",
        default: off,
        description: "AMQP virtual host name",
    },
];

fn off() -> Value {
    json!(OFF)
}

fn zero() -> Value {
    json!(0)
}

/// Reply to the host's `getmanifest`: our options and the full notification catalog.
pub fn manifest() -> Value {
    let options: Vec<Value> = OPTIONS
        .iter()
        .map(|opt| {
            json!({
                "name": opt.name,
                "type": opt.kind,
                "default": (opt.default)(),
                "description": opt.description,
            })
        })
        .collect();

    json!({
        "options": options,
        "rpcmethods": [],
        "subscriptions": EVENT_CATALOG,
        "hooks": [],
        "dynamic": true,
    })
}
