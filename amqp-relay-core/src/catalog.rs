// amqp-relay-core/src/catalog.rs

/// Notifications the relay subscribes to on the host, whether or not they are enabled.
pub const EVENT_CATALOG: [&str; 9] = [
    "channel_opened",
    "connect",
    "disconnect",
    "invoice_payment",
    "invoice_creation",
    "forward_event",
    "sendpay_success",
    "sendpay_failure",
    "coin_movement",
];

pub fn is_catalog_event(name: &str) -> bool {
    EVENT_CATALOG.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lookup() {
        assert!(is_catalog_event("forward_event"));
        assert!(is_catalog_event("coin_movement"));
        assert!(!is_catalog_event("block_added"));
        assert!(!is_catalog_event(""));
    }
}
