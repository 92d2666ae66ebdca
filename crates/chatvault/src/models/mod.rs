pub mod backup;

pub use backup::{
    Assistant, AssistantSessionLink, BackupParseError, BackupPayload, Keyed, Message, MessageRole,
    Session, Topic, parse_backup_payload,
};
