use crate::content::SessionType;
use crate::types::MsgData;
use thiserror::Error;

pub const MAX_CONTENT_BYTES: usize = 512 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("field {0}")]
    Field(&'static str),
    #[error("session type {0}")]
    SessionType(i32),
    #[error("content too large")]
    ContentTooLarge,
}

pub fn validate_msg(msg: &MsgData) -> Result<(), ValidationError> {
    let session = SessionType::from_i32(msg.session_type)
        .ok_or(ValidationError::SessionType(msg.session_type))?;
    if msg.send_id.trim().is_empty() {
        return Err(ValidationError::Field("send_id"));
    }
    match session {
        SessionType::Single | SessionType::Notification => {
            if msg.recv_id.trim().is_empty() {
                return Err(ValidationError::Field("recv_id"));
            }
        }
        SessionType::ReadGroup => {
            if msg.group_id.trim().is_empty() {
                return Err(ValidationError::Field("group_id"));
            }
        }
    }
    if msg.seq <= 0 {
        return Err(ValidationError::Field("seq"));
    }
    if msg.send_time <= 0 {
        return Err(ValidationError::Field("send_time"));
    }
    if msg.content.len() > MAX_CONTENT_BYTES {
        return Err(ValidationError::ContentTooLarge);
    }
    Ok(())
}
