//! Admin set and the admin menu's handler bodies.

use super::flow::{ConversationState, Scratch, Slot, Transition};
use super::outbound::{Inbound, Reply};
use super::{lock, Engine, EngineResult};
use crate::bot::texts;
use crate::utils::logging::{log_broadcast, log_send_failure};
use crate::utils::validation::validate_user_id;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("the maintainer cannot be removed from the admin set")]
    Maintainer,
}

/// User ids allowed into the admin menu. The maintainer is always a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSet {
    maintainer: u64,
    members: BTreeSet<u64>,
}

impl AdminSet {
    pub fn new(maintainer: u64) -> Self {
        Self {
            maintainer,
            members: BTreeSet::from([maintainer]),
        }
    }

    pub fn with_members(maintainer: u64, members: impl IntoIterator<Item = u64>) -> Self {
        let mut set = Self::new(maintainer);
        set.members.extend(members);
        set
    }

    pub fn maintainer(&self) -> u64 {
        self.maintainer
    }

    pub fn contains(&self, user_id: u64) -> bool {
        self.members.contains(&user_id)
    }

    /// Returns whether the id was newly added.
    pub fn add(&mut self, user_id: u64) -> bool {
        self.members.insert(user_id)
    }

    /// Returns whether the id was present.
    pub fn remove(&mut self, user_id: u64) -> Result<bool, AdminError> {
        if user_id == self.maintainer {
            return Err(AdminError::Maintainer);
        }
        Ok(self.members.remove(&user_id))
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.members.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Engine {
    fn admin_reply(&self, text: impl Into<String>) -> Reply {
        Reply::plain(text).menu(self.labels.admin_menu(&self.admin_extra))
    }

    fn back_only(&self, text: &str) -> Reply {
        Reply::plain(text).menu(vec![vec![self.labels.back.clone()]])
    }

    pub(super) async fn admin_menu(&self, msg: &Inbound) -> EngineResult<Transition> {
        info!("Admin {} opened the admin menu", msg.user_id);
        self.send(msg.chat_id, self.admin_reply(texts::ADMIN_MENU)).await?;
        Ok(Transition::to(Slot::AdminFunctions))
    }

    pub(super) async fn ask_admin_id(&self, msg: &Inbound, slot: Slot) -> EngineResult<Transition> {
        let prompt = match slot {
            Slot::RemoveAdmin => texts::ASK_REMOVED_ADMIN,
            _ => texts::ASK_NEW_ADMIN,
        };
        self.send(msg.chat_id, self.back_only(prompt)).await?;
        Ok(Transition::to(slot))
    }

    pub(super) async fn add_admin(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Ok(target) = validate_user_id(msg.body()) else {
            return self.reprompt(msg).await;
        };
        let added = lock(&self.admins).add(target);
        let text = if added {
            info!("Admin {} promoted {} to admin", msg.user_id, target);
            self.persist_bot_data();
            texts::admin_added(target)
        } else {
            texts::admin_unchanged(target)
        };
        self.send(msg.chat_id, self.admin_reply(text)).await?;
        Ok(Transition::to(Slot::AdminFunctions))
    }

    pub(super) async fn remove_admin(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Ok(target) = validate_user_id(msg.body()) else {
            return self.reprompt(msg).await;
        };
        let removed = lock(&self.admins).remove(target);
        let text = match removed {
            Ok(true) => {
                info!("Admin {} removed admin {}", msg.user_id, target);
                self.persist_bot_data();
                texts::admin_removed(target)
            }
            Ok(false) => texts::admin_unchanged(target),
            Err(AdminError::Maintainer) => texts::CANNOT_REMOVE_MAINTAINER.to_string(),
        };
        self.send(msg.chat_id, self.admin_reply(text)).await?;
        Ok(Transition::to(Slot::AdminFunctions))
    }

    pub(super) async fn ask_name(&self, msg: &Inbound) -> EngineResult<Transition> {
        self.send(msg.chat_id, self.back_only(texts::ASK_NAME)).await?;
        Ok(Transition::to(Slot::NameToId))
    }

    pub(super) async fn name_to_id(&self, msg: &Inbound) -> EngineResult<Transition> {
        let matches = lock(&self.roster).search_by_name(msg.body());
        let text = if matches.is_empty() {
            texts::NO_MATCHES.to_string()
        } else {
            texts::search_results(&matches)
        };
        self.send(msg.chat_id, self.admin_reply(text)).await?;
        Ok(Transition::to(Slot::AdminFunctions))
    }

    pub(super) async fn choose_audience(&self, msg: &Inbound) -> EngineResult<Transition> {
        let reply = Reply::plain(texts::ASK_AUDIENCE).menu(self.labels.audience_menu());
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Goto(ConversationState::with(
            Slot::GetMessage,
            Scratch::Broadcast { audience: None },
        )))
    }

    pub(super) async fn pick_audience(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Some(audience) = self.labels.parse_audience(msg.body()) else {
            return self.reprompt(msg).await;
        };
        self.send(msg.chat_id, self.back_only(texts::ASK_BROADCAST)).await?;
        Ok(Transition::Goto(ConversationState::with(
            Slot::BroadcastMessage,
            Scratch::Broadcast {
                audience: Some(audience),
            },
        )))
    }

    /// Copies the admin's message to every recipient in the chosen audience.
    /// A failed delivery is logged and skipped.
    pub(super) async fn send_broadcast(&self, msg: &Inbound, scratch: Scratch) -> EngineResult<Transition> {
        let Scratch::Broadcast {
            audience: Some(audience),
        } = scratch
        else {
            return self.choose_audience(msg).await;
        };

        let recipients = lock(&self.roster).recipients(audience);
        let mut sent = 0;
        let mut failed = 0;
        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.send_delay).await;
            }
            let Ok(chat_id) = recipient.parse::<i64>() else {
                failed += 1;
                continue;
            };
            match self.outbound.copy(chat_id, msg.chat_id, msg.message_id).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    log_send_failure("admin_broadcast", chat_id, &e.to_string());
                    failed += 1;
                }
            }
        }

        let audience_label = self.labels.audience_label(audience).to_string();
        log_broadcast(
            "admin_broadcast",
            sent,
            failed,
            Some(&format!("by {} to {}", msg.user_id, audience_label)),
        );
        self.send(msg.chat_id, self.admin_reply(texts::broadcast_done(sent, failed)))
            .await?;
        Ok(Transition::to(Slot::AdminFunctions))
    }
}
