use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Opts {
    pub ios_badge_count: bool,
    pub ios_push_sound: String,
    pub ex: String,
    pub signal: Signal,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Signal {
    pub client_msg_id: String,
}
