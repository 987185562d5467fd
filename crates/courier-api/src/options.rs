use std::collections::HashMap;

pub const IS_SENDER_SYNC: &str = "senderSync";
pub const IS_OFFLINE_PUSH: &str = "offlinePush";
pub const IS_NOT_NOTIFICATION: &str = "notNotification";
pub const HAS_READ_RECEIPT: &str = "hasReadReceipt";

// An absent map or an absent key means the switch is on.
pub fn switch_from_options(options: &HashMap<String, bool>, key: &str) -> bool {
    match options.get(key) {
        Some(flag) => *flag,
        None => true,
    }
}

pub fn options_with(pairs: &[(&str, bool)]) -> HashMap<String, bool> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_key_defaults_on() {
        let options = HashMap::new();
        assert!(switch_from_options(&options, IS_OFFLINE_PUSH));
        let options = options_with(&[(IS_OFFLINE_PUSH, false)]);
        assert!(!switch_from_options(&options, IS_OFFLINE_PUSH));
        assert!(switch_from_options(&options, IS_SENDER_SYNC));
    }
}
