//! Messenger capability and its transports.
//!
//! [`TelegramMessenger`] is the only production transport.
//! [`RecordingMessenger`] is a test fixture shared by the unit and
//! integration tests; the binary never constructs it.

pub mod messenger;
/// Test fixture; not used by the binary.
pub mod recording;
pub mod telegram;

pub use messenger::{
    ChatId, InboundEvent, Keyboard, MessageId, MessageStream, Messenger, RepliedMessage,
    SendOptions, escape_html,
};
pub use recording::{Outgoing, RecordingMessenger};
pub use telegram::{TelegramMessenger, parse_update};
