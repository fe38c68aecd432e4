//! Chat command ingestion.
//!
//! Turns raw chat messages into pool admissions: parse the command, check
//! the sender's role and cooldown, then admit or overwrite an idle entity.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::identity::{EntityId, Identifier};
use crate::lifecycle::Simulation;
use crate::pool::Admission;
use crate::service::ViewerPoolService;
use crate::telemetry::LogThrottle;

/// Sender role, ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PermissionLevel {
    #[default]
    Everyone,
    Subscriber,
    Vip,
    Moderator,
    Broadcaster,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "Everyone",
            Self::Subscriber => "Subscriber",
            Self::Vip => "VIP",
            Self::Moderator => "Moderator",
            Self::Broadcaster => "Broadcaster",
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One incoming chat line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatMessage {
    pub username: String,
    pub text: String,
    pub badges: Vec<String>,
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub is_subscriber: bool,
}

impl ChatMessage {
    pub fn new(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badges.push(badge.into());
        self
    }

    fn has_badge(&self, badge: &str) -> bool {
        self.badges.iter().any(|b| b == badge)
    }
}

/// Role of the sender. Flags only count when at least one badge is present,
/// except the broadcaster flag.
pub fn role_of(message: &ChatMessage) -> PermissionLevel {
    if message.is_broadcaster {
        return PermissionLevel::Broadcaster;
    }
    if message.badges.is_empty() {
        return PermissionLevel::Everyone;
    }
    if message.has_badge("moderator") || message.is_moderator {
        PermissionLevel::Moderator
    } else if message.has_badge("vip") {
        PermissionLevel::Vip
    } else if message.has_badge("subscriber") || message.is_subscriber {
        PermissionLevel::Subscriber
    } else {
        PermissionLevel::Everyone
    }
}

/// A prefixed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    /// Lowercased command word.
    pub name: String,
    pub arguments: Vec<String>,
}

impl ChatCommand {
    /// Parse `text` as `<prefix><name> [args...]`. The prefix matches
    /// case-insensitively; an empty prefix never matches.
    pub fn parse(text: &str, prefix: &str) -> Option<Self> {
        if prefix.is_empty() {
            return None;
        }
        let text = text.trim();
        let head = text.get(..prefix.len())?;
        if head.to_lowercase() != prefix.to_lowercase() {
            return None;
        }

        let mut words = text[prefix.len()..].split_whitespace();
        let name = words.next()?.to_lowercase();
        Some(Self {
            name,
            arguments: words.map(str::to_string).collect(),
        })
    }
}

/// Result of handling one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    NotACommand,
    UnknownCommand(String),
    Denied {
        required: PermissionLevel,
        actual: PermissionLevel,
    },
    OnCooldown {
        remaining: Duration,
    },
    Admitted,
    Rejected(Admission),
    OverwroteIdle(EntityId),
    /// The sender name is blank.
    Invalid,
}

pub struct ChatIngest {
    service: Arc<ViewerPoolService>,
    simulation: Arc<dyn Simulation>,
    unknown_commands: LogThrottle,
}

impl ChatIngest {
    pub fn new(service: Arc<ViewerPoolService>, simulation: Arc<dyn Simulation>) -> Self {
        Self {
            service,
            simulation,
            unknown_commands: LogThrottle::new(100),
        }
    }

    pub fn handle(&self, message: &ChatMessage) -> IngestOutcome {
        let config = self.service.config().snapshot();

        let Some(command) = ChatCommand::parse(&message.text, &config.command_prefix) else {
            return IngestOutcome::NotACommand;
        };
        if command.name != config.visit_command.trim().to_lowercase() {
            if let Some(seen) = self.unknown_commands.hit() {
                tracing::debug!(command = %command.name, user = %message.username, seen, "Unknown command");
            }
            return IngestOutcome::UnknownCommand(command.name);
        }

        let Some(identifier) = Identifier::parse(&message.username) else {
            tracing::warn!("Visit command with blank username");
            return IngestOutcome::Invalid;
        };

        let role = role_of(message);
        if role < config.visit_permission {
            tracing::debug!(
                identifier = %identifier,
                role = %role,
                required = %config.visit_permission,
                "Insufficient permission for visit command"
            );
            return IngestOutcome::Denied {
                required: config.visit_permission,
                actual: role,
            };
        }

        if let Some(remaining) = self.service.cooldown_remaining(identifier.as_str()) {
            tracing::debug!(
                identifier = %identifier,
                remaining_secs = remaining.as_secs_f64(),
                "Viewer is on cooldown"
            );
            return IngestOutcome::OnCooldown { remaining };
        }
        self.service.record_use(identifier.as_str());

        if config.overwrite_idle_on_empty
            && !self.service.has_available()
            && let Some(entity) = self
                .service
                .try_overwrite_idle_entity(&identifier, self.simulation.as_ref())
        {
            tracing::info!(entity = %entity, identifier = %identifier, "Viewer took over an idle entity");
            self.simulation.on_assigned(entity, &identifier);
            return IngestOutcome::OverwroteIdle(entity);
        }

        match self.service.admit(identifier.as_str()) {
            Admission::Accepted => IngestOutcome::Admitted,
            rejected => IngestOutcome::Rejected(rejected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PoolConfig;
    use crate::directory::{EntityDirectory, EntityState};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Stage {
        idle: Vec<EntityId>,
        labels: Mutex<Vec<(EntityId, String)>>,
    }

    impl EntityDirectory for Stage {
        fn live_entities(&self) -> Vec<EntityId> {
            self.idle.clone()
        }

        fn is_live(&self, entity: EntityId) -> bool {
            self.idle.contains(&entity)
        }

        fn current_state(&self, entity: EntityId) -> Option<EntityState> {
            self.is_live(entity).then(|| EntityState::new("idle"))
        }
    }

    impl Simulation for Stage {
        fn spawn_entity(&self) -> Option<EntityId> {
            None
        }

        fn on_assigned(&self, entity: EntityId, identifier: &Identifier) {
            self.labels
                .lock()
                .unwrap()
                .push((entity, identifier.to_string()));
        }
    }

    fn ingest(config: PoolConfig, stage: Stage) -> (ChatIngest, Arc<Stage>, ManualClock) {
        let clock = ManualClock::new();
        let service = Arc::new(ViewerPoolService::with_clock(
            config.into(),
            Arc::new(clock.clone()),
        ));
        let stage = Arc::new(stage);
        let ingest = ChatIngest::new(service, Arc::clone(&stage) as Arc<dyn Simulation>);
        (ingest, stage, clock)
    }

    fn visit(user: &str) -> ChatMessage {
        ChatMessage::new(user, "!visit")
    }

    #[test]
    fn roles_follow_badges_and_flags() {
        let plain = ChatMessage::new("a", "");
        assert_eq!(role_of(&plain), PermissionLevel::Everyone);

        let flagged_without_badges = ChatMessage {
            is_moderator: true,
            ..plain.clone()
        };
        assert_eq!(role_of(&flagged_without_badges), PermissionLevel::Everyone);

        let mod_flag = ChatMessage {
            is_moderator: true,
            ..plain.clone().with_badge("premium")
        };
        assert_eq!(role_of(&mod_flag), PermissionLevel::Moderator);

        let vip_sub = plain.clone().with_badge("subscriber").with_badge("vip");
        assert_eq!(role_of(&vip_sub), PermissionLevel::Vip);

        let broadcaster = ChatMessage {
            is_broadcaster: true,
            ..plain
        };
        assert_eq!(role_of(&broadcaster), PermissionLevel::Broadcaster);
    }

    #[test]
    fn permission_levels_are_ordered() {
        assert!(PermissionLevel::Everyone < PermissionLevel::Subscriber);
        assert!(PermissionLevel::Vip < PermissionLevel::Moderator);
        assert_eq!(PermissionLevel::Vip.to_string(), "VIP");
    }

    #[test]
    fn parse_splits_name_and_arguments() {
        let cmd = ChatCommand::parse("  !Visit  now please ", "!").unwrap();
        assert_eq!(cmd.name, "visit");
        assert_eq!(cmd.arguments, vec!["now", "please"]);

        let cmd = ChatCommand::parse("HEY join", "hey").unwrap();
        assert_eq!(cmd.name, "join");
    }

    #[test]
    fn parse_rejects_non_commands() {
        assert_eq!(ChatCommand::parse("hello", "!"), None);
        assert_eq!(ChatCommand::parse("!   ", "!"), None);
        assert_eq!(ChatCommand::parse("", "!"), None);
        assert_eq!(ChatCommand::parse("!visit", ""), None);
    }

    #[test]
    fn visit_admits_then_applies_cooldown() {
        let (ingest, _, clock) = ingest(PoolConfig::default(), Stage::default());

        assert_eq!(ingest.handle(&visit("Bob")), IngestOutcome::Admitted);
        assert!(matches!(
            ingest.handle(&visit("bob")),
            IngestOutcome::OnCooldown { remaining } if remaining == Duration::from_secs(60)
        ));

        clock.advance(Duration::from_secs(60));
        assert_eq!(
            ingest.handle(&visit("bob")),
            IngestOutcome::Rejected(Admission::Duplicate)
        );
    }

    #[test]
    fn chatter_and_other_commands_are_ignored() {
        let (ingest, _, _) = ingest(PoolConfig::default(), Stage::default());

        assert_eq!(ingest.handle(&ChatMessage::new("bob", "hi")), IngestOutcome::NotACommand);
        assert_eq!(
            ingest.handle(&ChatMessage::new("bob", "!dance")),
            IngestOutcome::UnknownCommand("dance".to_string())
        );
        // Ignored messages do not start a cooldown.
        assert_eq!(ingest.handle(&visit("bob")), IngestOutcome::Admitted);
    }

    #[test]
    fn blank_username_is_invalid() {
        let (ingest, _, _) = ingest(PoolConfig::default(), Stage::default());
        assert_eq!(ingest.handle(&visit("   ")), IngestOutcome::Invalid);
    }

    #[test]
    fn permission_gate_denies_before_cooldown() {
        let config = PoolConfig {
            visit_permission: PermissionLevel::Subscriber,
            ..PoolConfig::default()
        };
        let (ingest, _, _) = ingest(config, Stage::default());

        assert_eq!(
            ingest.handle(&visit("pleb")),
            IngestOutcome::Denied {
                required: PermissionLevel::Subscriber,
                actual: PermissionLevel::Everyone,
            }
        );
        let sub = visit("pleb").with_badge("subscriber");
        assert_eq!(ingest.handle(&sub), IngestOutcome::Admitted);
    }

    #[test]
    fn full_pool_rejection_still_records_cooldown() {
        let config = PoolConfig {
            max_pool_size: 1,
            ..PoolConfig::default()
        };
        let (ingest, _, _) = ingest(config, Stage::default());

        assert_eq!(ingest.handle(&visit("a")), IngestOutcome::Admitted);
        assert_eq!(
            ingest.handle(&visit("b")),
            IngestOutcome::Rejected(Admission::Full)
        );
        assert!(matches!(
            ingest.handle(&visit("b")),
            IngestOutcome::OnCooldown { .. }
        ));
    }

    #[test]
    fn empty_pool_overwrites_idle_entity_when_enabled() {
        let config = PoolConfig {
            overwrite_idle_on_empty: true,
            ..PoolConfig::default()
        };
        let stage = Stage {
            idle: vec![EntityId::new(7)],
            ..Stage::default()
        };
        let (ingest, stage, _) = ingest(config, stage);

        assert_eq!(
            ingest.handle(&visit("zed")),
            IngestOutcome::OverwroteIdle(EntityId::new(7))
        );
        assert_eq!(
            *stage.labels.lock().unwrap(),
            vec![(EntityId::new(7), "zed".to_string())]
        );

        // No idle entity left: falls back to admission.
        assert_eq!(ingest.handle(&visit("amy")), IngestOutcome::Admitted);
    }

    #[test]
    fn returning_viewer_already_on_screen_is_not_offered_again() {
        let config = PoolConfig {
            overwrite_idle_on_empty: true,
            ..PoolConfig::default()
        };
        let stage = Stage {
            idle: vec![EntityId::new(7)],
            ..Stage::default()
        };
        let (ingest, _, clock) = ingest(config, stage);

        assert_eq!(
            ingest.handle(&visit("zed")),
            IngestOutcome::OverwroteIdle(EntityId::new(7))
        );
        clock.advance(Duration::from_secs(60));
        assert_eq!(ingest.handle(&visit("zed")), IngestOutcome::Admitted);
        assert!(!ingest.service.has_available());

        assert_eq!(ingest.handle(&visit("amy")), IngestOutcome::Admitted);
        assert!(ingest.service.try_assign(EntityId::new(8), false));
        assert_eq!(
            ingest.service.assigned_identifier(EntityId::new(8)),
            Some(Identifier::parse("amy").unwrap())
        );
    }

    #[test]
    fn overwrite_disabled_always_admits() {
        let stage = Stage {
            idle: vec![EntityId::new(7)],
            ..Stage::default()
        };
        let (ingest, stage, _) = ingest(PoolConfig::default(), stage);

        assert_eq!(ingest.handle(&visit("zed")), IngestOutcome::Admitted);
        assert!(stage.labels.lock().unwrap().is_empty());
    }
}
