#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionType {
    Single,
    ReadGroup,
    Notification,
}

pub const SINGLE_CHAT: i32 = 1;
pub const READ_GROUP_CHAT: i32 = 3;
pub const NOTIFICATION_CHAT: i32 = 4;

impl SessionType {
    pub fn from_i32(value: i32) -> Option<SessionType> {
        match value {
            SINGLE_CHAT => Some(SessionType::Single),
            READ_GROUP_CHAT => Some(SessionType::ReadGroup),
            NOTIFICATION_CHAT => Some(SessionType::Notification),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            SessionType::Single => SINGLE_CHAT,
            SessionType::ReadGroup => READ_GROUP_CHAT,
            SessionType::Notification => NOTIFICATION_CHAT,
        }
    }
}

pub mod content_type {
    pub const TEXT: i32 = 101;
    pub const PICTURE: i32 = 102;
    pub const VOICE: i32 = 103;
    pub const VIDEO: i32 = 104;
    pub const FILE: i32 = 105;
    pub const AT_TEXT: i32 = 106;
    pub const CARD: i32 = 108;
    pub const LOCATION: i32 = 109;
    pub const CUSTOM: i32 = 110;
    pub const TYPING: i32 = 113;
    pub const QUOTE: i32 = 114;

    pub const COMMON: i32 = 200;
    pub const SIGNAL_MSG: i32 = 302;

    pub const MEMBER_QUIT_NOTIFICATION: i32 = 1504;
    pub const MEMBER_KICKED_NOTIFICATION: i32 = 1508;
    pub const GROUP_DISMISSED_NOTIFICATION: i32 = 1511;
    pub const SIGNALING_NOTIFICATION: i32 = 1601;
    pub const HAS_READ_RECEIPT: i32 = 2200;
}

pub type ContentType = i32;

// Default push titles keyed by content type, used when the sender supplied no
// offline push title.
pub fn push_content_for(content_type: i32) -> &'static str {
    use content_type::*;
    match content_type {
        TEXT => "[TEXT]",
        PICTURE => "[PICTURE]",
        VOICE => "[VOICE]",
        VIDEO => "[VIDEO]",
        FILE => "[FILE]",
        AT_TEXT => "[@TEXT]",
        SIGNAL_MSG | SIGNALING_NOTIFICATION => "[SIGNALINVITE]",
        _ => "[NEWMSG]",
    }
}
