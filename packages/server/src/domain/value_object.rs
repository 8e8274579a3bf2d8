//! Value objects shared by every layer.

use uuid::Uuid;

use super::error::ValueObjectError;

const MAX_CONNECTION_ID_LENGTH: usize = 128;
const MAX_ROOM_ID_LENGTH: usize = 128;
const MAX_MESSAGE_CONTENT_LENGTH: usize = 4_000;

fn validate_identifier(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<(), ValueObjectError> {
    if value.trim().is_empty() {
        return Err(ValueObjectError::Empty(field));
    }
    let length = value.chars().count();
    if length > max {
        return Err(ValueObjectError::TooLong {
            field,
            max,
            actual: length,
        });
    }
    if value.chars().any(char::is_control) {
        return Err(ValueObjectError::InvalidCharacter(field));
    }
    Ok(())
}

/// Identity of a live connection.
///
/// This is the authenticated user id resolved before the upgrade, so it is unique among
/// live connections.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        validate_identifier("connection_id", &value, MAX_CONNECTION_ID_LENGTH)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for ConnectionId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a chat room.
///
/// Matches the durably persisted chat-room record; the live room built around it only
/// exists while somebody is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        validate_identifier("chat_room_id", &value, MAX_ROOM_ID_LENGTH)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Chat message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent(String);

impl MessageContent {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        if value.trim().is_empty() {
            return Err(ValueObjectError::Empty("content"));
        }
        let length = value.chars().count();
        if length > MAX_MESSAGE_CONTENT_LENGTH {
            return Err(ValueObjectError::TooLong {
                field: "content",
                max: MAX_MESSAGE_CONTENT_LENGTH,
                actual: length,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for MessageContent {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Identifier of a chat message (server-assigned for live chat).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        validate_identifier("message_id", &value, MAX_ROOM_ID_LENGTH)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates fresh message ids.
pub struct MessageIdFactory;

impl MessageIdFactory {
    pub fn generate() -> MessageId {
        MessageId(Uuid::new_v4().to_string())
    }
}

/// Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_accepts_regular_id() {
        // テスト項目: 通常の ID から ConnectionId を生成できる
        // given (前提条件):
        let raw = "alice".to_string();

        // when (操作):
        let result = ConnectionId::new(raw);

        // then (期待する結果):
        assert_eq!(result.unwrap().as_str(), "alice");
    }

    #[test]
    fn test_connection_id_rejects_blank() {
        // テスト項目: 空白のみの ID は拒否される
        // given (前提条件):
        let raw = "   ".to_string();

        // when (操作):
        let result = ConnectionId::new(raw);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::Empty("connection_id")));
    }

    #[test]
    fn test_room_id_rejects_too_long() {
        // テスト項目: 長すぎる room id は拒否される
        // given (前提条件):
        let raw = "r".repeat(MAX_ROOM_ID_LENGTH + 1);

        // when (操作):
        let result = RoomId::new(raw);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(ValueObjectError::TooLong {
                field: "chat_room_id",
                max: MAX_ROOM_ID_LENGTH,
                actual: MAX_ROOM_ID_LENGTH + 1,
            })
        );
    }

    #[test]
    fn test_room_id_rejects_control_characters() {
        // テスト項目: 制御文字を含む room id は拒否される
        // given (前提条件):
        let raw = "room\n1".to_string();

        // when (操作):
        let result = RoomId::try_from(raw);

        // then (期待する結果):
        assert_eq!(result, Err(ValueObjectError::InvalidCharacter("chat_room_id")));
    }

    #[test]
    fn test_message_content_counts_characters_not_bytes() {
        // テスト項目: メッセージ長はバイトではなく文字数で数える
        // given (前提条件):
        let raw = "あ".repeat(MAX_MESSAGE_CONTENT_LENGTH);

        // when (操作):
        let result = MessageContent::new(raw);

        // then (期待する結果):
        assert!(result.is_ok());
    }

    #[test]
    fn test_message_id_factory_generates_unique_ids() {
        // テスト項目: MessageIdFactory が毎回異なる ID を生成する
        // given (前提条件):

        // when (操作):
        let first = MessageIdFactory::generate();
        let second = MessageIdFactory::generate();

        // then (期待する結果):
        assert_ne!(first, second);
    }
}
