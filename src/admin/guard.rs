//! Access guard for staff-only commands.

use crate::channels::{ChatId, InboundEvent};
use crate::config::BotConfig;
use crate::error::CommandError;

/// Decides whether a command comes from staff.
///
/// Precedence:
/// 1. configured staff chat and the message is in it;
/// 2. configured staff username and the sender has it (case-insensitive,
///    leading `@` ignored);
/// 3. neither configured: everyone is staff (development mode);
/// 4. otherwise not staff.
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    admin_group_id: Option<ChatId>,
    /// Normalized form; `Some("")` when configured as just "@".
    admin_username: Option<String>,
}

fn normalize_username(username: &str) -> String {
    username.trim().trim_start_matches('@').to_lowercase()
}

impl AccessGuard {
    pub fn new(admin_group_id: Option<ChatId>, admin_username: Option<&str>) -> Self {
        Self {
            admin_group_id,
            admin_username: admin_username.map(normalize_username),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.admin_group_id, config.admin_username.as_deref())
    }

    /// Whether neither a staff chat nor a staff username is configured.
    pub fn is_open(&self) -> bool {
        self.admin_group_id.is_none() && self.admin_username.is_none()
    }

    pub fn is_privileged(&self, chat_id: ChatId, username: Option<&str>) -> bool {
        if self.admin_group_id == Some(chat_id) {
            return true;
        }
        if let Some(ref admin) = self.admin_username {
            let sender = username.map(normalize_username).unwrap_or_default();
            if !admin.is_empty() && sender == *admin {
                return true;
            }
        }
        self.is_open()
    }

    /// Guard a command: `Err(Unauthorized)` for non-staff.
    pub fn check(&self, event: &InboundEvent) -> Result<(), CommandError> {
        if self.is_privileged(event.chat_id, event.sender_username.as_deref()) {
            Ok(())
        } else {
            Err(CommandError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_chat_matches() {
        let guard = AccessGuard::new(Some(-100), Some("boss"));
        assert!(guard.is_privileged(-100, None));
        assert!(guard.is_privileged(-100, Some("random")));
        assert!(!guard.is_privileged(-101, Some("random")));
    }

    #[test]
    fn username_is_case_insensitive_and_ignores_marker() {
        let guard = AccessGuard::new(None, Some("@Boss"));
        assert!(guard.is_privileged(5, Some("boss")));
        assert!(guard.is_privileged(5, Some("@BOSS")));
        assert!(!guard.is_privileged(5, Some("bossy")));
        assert!(!guard.is_privileged(5, None));
    }

    #[test]
    fn open_mode_when_nothing_configured() {
        let guard = AccessGuard::new(None, None);
        assert!(guard.is_open());
        assert!(guard.is_privileged(5, None));
    }

    #[test]
    fn group_only_config_rejects_private_chats() {
        let guard = AccessGuard::new(Some(-100), None);
        assert!(!guard.is_open());
        assert!(!guard.is_privileged(5, Some("anyone")));
    }

    #[test]
    fn bare_marker_username_matches_nobody() {
        let guard = AccessGuard::new(None, Some("@"));
        assert!(!guard.is_privileged(5, Some("")));
        assert!(!guard.is_privileged(5, None));
    }

    #[test]
    fn check_maps_to_unauthorized() {
        let guard = AccessGuard::new(None, Some("boss"));
        let event = InboundEvent::text(5, "/stats").with_username("intruder");
        assert_eq!(guard.check(&event), Err(CommandError::Unauthorized));
        assert_eq!(
            CommandError::Unauthorized.to_string(),
            "This command is available to the administrator only."
        );
        assert!(guard.check(&event.with_username("Boss")).is_ok());
    }
}
