/// Application name
pub const APP_NAME: &str = "TaskComm";

/// Suffix appended to a message's text when it is edited.
pub const EDITED_MARKER: &str = " (edited)";

/// Prefix of client-generated placeholder message identities.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Chat polling interval in milliseconds
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_500;

/// Delay between a remote write and its verification re-read, in milliseconds
pub const DEFAULT_VERIFY_DELAY_MS: u64 = 200;

/// Relational backend tables
pub const TABLE_PROFILES: &str = "profiles";
pub const TABLE_INSTRUCTIONS: &str = "instructions";
pub const TABLE_TASKS: &str = "tasks";
pub const TABLE_CHAT_MESSAGES: &str = "chat_messages";

/// Document store collections
pub const COLLECTION_USERS: &str = "users";
pub const COLLECTION_TASKS: &str = "tasks";

/// Blob storage folder for chat attachments
pub const UPLOAD_PREFIX: &str = "uploads/";

/// Text used for the throwaway row written by permission diagnostics
pub const PROBE_MESSAGE_TEXT: &str = "Test message for write permission";
