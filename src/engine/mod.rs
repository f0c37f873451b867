//! Conversation engine.
//!
//! Every inbound message is offered to the flows in order. A flow with an
//! active conversation for the sender tries its fallbacks and then the
//! handlers of its current state; an idle flow tries its entry points.
//! Messages no flow takes go to the global handlers. Guards run before the
//! handler body, and any error from the body is logged and answered with a
//! generic failure message. State changes are persisted as they happen.

mod actions;
pub mod admin;
pub mod flow;
mod jobs;
pub mod locks;
pub mod outbound;

pub use admin::{AdminError, AdminSet};
pub use flow::{Action, ConversationState, FlowConfigError, FlowName, Scratch, Slot, Transition};
pub use jobs::{BroadcastReport, SeenSchedule};
pub use outbound::{Inbound, Keyboard, Outbound, OutboundError, Reply};

use crate::bot::commands::MenuLabels;
use crate::bot::texts;
use crate::services::schedule_source::{ScheduleError, ScheduleSource, DEFAULT_WEEK_OFFSETS};
use crate::storage::models::{Grade, Schedule};
use crate::storage::persistence::SnapshotPersistence;
use crate::storage::roster::{Roster, RosterStore};
use crate::storage::sanitize::StateValue;
use crate::storage::StorageError;
use crate::utils::logging::{
    log_flow_transition, log_guard_rejection, log_handler_error, log_persist_skipped, log_send_failure,
    log_system_event,
};
use chrono::{DateTime, Utc, Weekday};
use flow::{Flow, Handler};
use locks::UserLocks;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Outbound(#[from] OutboundError),
    #[error(transparent)]
    Flow(#[from] FlowConfigError),
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Always an admin, never removable.
    pub maintainer_id: u64,
    /// Shown to users when a request fails.
    pub maintainer_contact: String,
    /// Used to accept `/cmd@bot_username` and reject other bots' commands.
    pub bot_username: String,
    /// Pause between sends in a broadcast.
    pub send_delay: Duration,
    /// Day the weekly schedule goes out even when nothing changed.
    pub canonical_weekday: Weekday,
    pub week_offsets: Vec<i64>,
}

impl EngineSettings {
    pub fn new(maintainer_id: u64) -> Self {
        Self {
            maintainer_id,
            maintainer_contact: format!("@{maintainer_id}"),
            bot_username: String::new(),
            send_delay: Duration::from_millis(50),
            canonical_weekday: Weekday::Wed,
            week_offsets: DEFAULT_WEEK_OFFSETS.to_vec(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Route<'a> {
    Flow {
        flow: &'a Flow,
        handler: &'a Handler,
        state: Option<ConversationState>,
    },
    Global(&'a Handler),
}

/// How a guarded handler run ended.
enum Outcome {
    Ran(Transition),
    /// Refused before the body ran; the conversation ends.
    Refused,
    /// Rejected or failed; the conversation is left as it was.
    Untouched,
}

pub struct Engine {
    settings: EngineSettings,
    labels: MenuLabels,
    admin_extra: Vec<String>,
    flows: Vec<Flow>,
    globals: Vec<Handler>,
    roster: Mutex<Roster>,
    roster_store: RosterStore,
    persistence: SnapshotPersistence,
    source: Arc<dyn ScheduleSource>,
    outbound: Arc<dyn Outbound>,
    admins: Mutex<AdminSet>,
    last_seen: Mutex<BTreeMap<Grade, SeenSchedule>>,
    last_fetch: Mutex<Option<DateTime<Utc>>>,
    conversations: Mutex<HashMap<(FlowName, u64), ConversationState>>,
    locks: UserLocks,
}

/// Admin ids from bot data. Ids are stored as text; older snapshots hold
/// integers. Entries that are not a valid user id are dropped.
fn stored_admin_ids(value: Option<&StateValue>) -> Vec<u64> {
    let Some(StateValue::Set(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let id = match item {
                StateValue::Text(id) => id.parse().ok(),
                StateValue::Int(id) => u64::try_from(*id).ok(),
                _ => None,
            };
            if id.is_none() {
                warn!("Ignoring stored admin entry {:?}", item);
            }
            id
        })
        .collect()
}

impl Engine {
    /// Loads the roster, restores persisted state and builds the flow table.
    pub fn new(
        settings: EngineSettings,
        labels: MenuLabels,
        roster_store: RosterStore,
        persistence: SnapshotPersistence,
        source: Arc<dyn ScheduleSource>,
        outbound: Arc<dyn Outbound>,
    ) -> EngineResult<Self> {
        let roster = roster_store.load()?;
        let flows = flow::build_flows(&labels)?;
        let globals = flow::global_handlers(&labels);
        let admin_extra = vec![labels.find_user.clone(), labels.broadcast.clone()];

        let bot_data = persistence.bot_data();
        let stored_admins = stored_admin_ids(bot_data.get("admins"));
        let admins = AdminSet::with_members(settings.maintainer_id, stored_admins);
        let last_seen: BTreeMap<Grade, SeenSchedule> = match bot_data.get("last_seen") {
            Some(value) => value.deserialize_into().unwrap_or_else(|e| {
                warn!("Discarding unreadable last-seen schedule: {}", e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        let mut conversations = HashMap::new();
        for name in FlowName::ALL {
            for (key, value) in persistence.conversations(name.as_str()) {
                match (key.parse::<u64>(), value.deserialize_into::<ConversationState>()) {
                    (Ok(user_id), Ok(state)) => {
                        conversations.insert((name, user_id), state);
                    }
                    _ => warn!("Dropping unreadable {} conversation for key {}", name.as_str(), key),
                }
            }
        }

        let engine = Self {
            settings,
            labels,
            admin_extra,
            flows,
            globals,
            roster: Mutex::new(roster),
            roster_store,
            persistence,
            source,
            outbound,
            admins: Mutex::new(admins),
            last_seen: Mutex::new(last_seen),
            last_fetch: Mutex::new(None),
            conversations: Mutex::new(conversations),
            locks: UserLocks::new(),
        };

        let users: Vec<u64> = lock(&engine.roster)
            .recipients(crate::storage::roster::Audience::Everyone)
            .iter()
            .filter_map(|id| id.parse().ok())
            .collect();
        for user_id in &users {
            engine.refresh_user_data(*user_id);
        }
        engine.persist_bot_data();

        log_system_event(
            "ENGINE_READY",
            Some(&format!(
                "{} subscribers, {} admins, {} open conversations",
                users.len(),
                engine.admin_count(),
                lock(&engine.conversations).len()
            )),
        );
        Ok(engine)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn labels(&self) -> &MenuLabels {
        &self.labels
    }

    pub fn persistence(&self) -> &SnapshotPersistence {
        &self.persistence
    }

    pub fn roster(&self) -> Roster {
        lock(&self.roster).clone()
    }

    pub fn is_signed_up(&self, user_id: u64) -> bool {
        lock(&self.roster).is_signed_up(&user_id.to_string())
    }

    pub fn is_admin(&self, user_id: u64) -> bool {
        lock(&self.admins).contains(user_id)
    }

    pub fn admins(&self) -> AdminSet {
        lock(&self.admins).clone()
    }

    pub fn admin_count(&self) -> usize {
        lock(&self.admins).len()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.roster).subscriber_count()
    }

    pub fn last_fetch(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_fetch)
    }

    pub fn conversation(&self, flow: FlowName, user_id: u64) -> Option<ConversationState> {
        lock(&self.conversations).get(&(flow, user_id)).cloned()
    }

    /// The persisted scratch view of a user, rebuilt from the roster.
    pub fn user_data(&self, user_id: u64) -> Option<StateValue> {
        self.persistence.user_data(user_id)
    }

    /// Handles one inbound message. Never fails; problems are logged and
    /// reported to the sender.
    pub async fn handle(&self, msg: &Inbound) {
        match self.route(msg) {
            Some(Route::Flow { flow, handler, state }) => self.run_in_flow(flow, handler, state, msg).await,
            Some(Route::Global(handler)) => {
                self.run_guarded(handler, msg, Scratch::Empty).await;
            }
            None => debug!("No handler for message from {}", msg.user_id),
        }
    }

    fn route(&self, msg: &Inbound) -> Option<Route<'_>> {
        let username = self.settings.bot_username.as_str();
        for flow in &self.flows {
            let state = self.conversation(flow.name, msg.user_id);
            let found = match &state {
                Some(active) => flow
                    .fallbacks
                    .iter()
                    .chain(flow.handlers_for(active.slot))
                    .find(|h| h.accepts(msg, username)),
                None => flow.entry_points.iter().find(|h| h.accepts(msg, username)),
            };
            if let Some(handler) = found {
                return Some(Route::Flow { flow, handler, state });
            }
        }
        self.globals
            .iter()
            .find(|h| h.accepts(msg, username))
            .map(Route::Global)
    }

    async fn run_in_flow(&self, flow: &Flow, handler: &Handler, state: Option<ConversationState>, msg: &Inbound) {
        if handler.guards.admin && !self.is_admin(msg.user_id) {
            log_guard_rejection("admin", &handler.action.name(), msg.user_id);
            if state.is_some() {
                self.set_conversation(flow.name, msg.user_id, None);
            }
            self.run_fallback_chain(msg).await;
            return;
        }

        let scratch = state.as_ref().map(|s| s.scratch.clone()).unwrap_or_default();
        let transition = match self.run_guarded(handler, msg, scratch).await {
            Outcome::Ran(transition) => transition,
            Outcome::Refused => Transition::End,
            Outcome::Untouched => return,
        };

        let from = state.as_ref().map(|s| s.slot);
        match transition {
            Transition::Stay => {}
            Transition::Goto(next) => {
                log_flow_transition(flow.name.as_str(), msg.user_id, from.map(|s| s.as_str()), Some(next.slot.as_str()));
                self.set_conversation(flow.name, msg.user_id, Some(next));
            }
            Transition::End => {
                if state.is_some() {
                    log_flow_transition(flow.name.as_str(), msg.user_id, from.map(|s| s.as_str()), None);
                    self.set_conversation(flow.name, msg.user_id, None);
                }
            }
        }
    }

    /// Runs the first global handler that accepts the message.
    async fn run_fallback_chain(&self, msg: &Inbound) {
        let username = self.settings.bot_username.as_str();
        if let Some(handler) = self.globals.iter().find(|h| h.accepts(msg, username)) {
            self.run_guarded(handler, msg, Scratch::Empty).await;
        }
    }

    async fn run_guarded(&self, handler: &Handler, msg: &Inbound, scratch: Scratch) -> Outcome {
        let action = handler.action.name();
        let _guard = if handler.guards.signed_up {
            let Some(guard) = self.locks.try_acquire(msg.user_id) else {
                log_guard_rejection("busy", &action, msg.user_id);
                self.notify(msg.chat_id, Reply::plain(texts::PLEASE_WAIT)).await;
                return Outcome::Untouched;
            };
            if !self.is_signed_up(msg.user_id) {
                log_guard_rejection("signed_up", &action, msg.user_id);
                self.notify(msg.chat_id, Reply::plain(texts::SIGN_UP_FIRST).remove_keyboard())
                    .await;
                return Outcome::Refused;
            }
            Some(guard)
        } else {
            None
        };

        match self.dispatch(handler.action, msg, scratch).await {
            Ok(transition) => Outcome::Ran(transition),
            Err(e) => {
                log_handler_error(&action, &msg.display_name, msg.user_id, msg.chat_id, &e.to_string());
                let failure = texts::generic_failure(&self.settings.maintainer_contact);
                self.notify(msg.chat_id, Reply::plain(failure)).await;
                Outcome::Untouched
            }
        }
    }

    async fn dispatch(&self, action: Action, msg: &Inbound, scratch: Scratch) -> EngineResult<Transition> {
        match action {
            Action::SignupStart => self.signup_start(msg).await,
            Action::SignupGrade => self.signup_grade(msg).await,
            Action::SignupWeek => self.signup_week(msg, scratch).await,
            Action::JoinStart => self.join_start(msg).await,
            Action::JoinGrade => self.join_grade(msg).await,
            Action::LeaveStart => self.leave_start(msg).await,
            Action::LeaveGrade => self.leave_grade(msg).await,
            Action::NoticeStart => self.notice_start(msg).await,
            Action::NoticeWeek => self.apply_horizon(msg, msg.body()).await,
            Action::Cancel => self.cancel(msg).await,
            Action::Reprompt => self.reprompt(msg).await,
            Action::Help => self.help(msg).await,
            Action::Update => self.send_update(msg).await,
            Action::StopUpdates => self.set_auto_update(msg, false).await,
            Action::RestartUpdates => self.set_auto_update(msg, true).await,
            Action::Unknown => self.unknown(msg).await,
            Action::AdminMenu => self.admin_menu(msg).await,
            Action::AskNewAdmin => self.ask_admin_id(msg, Slot::AddAdmin).await,
            Action::AddAdmin => self.add_admin(msg).await,
            Action::AskRemovedAdmin => self.ask_admin_id(msg, Slot::RemoveAdmin).await,
            Action::RemoveAdmin => self.remove_admin(msg).await,
            Action::AskName => self.ask_name(msg).await,
            Action::NameToId => self.name_to_id(msg).await,
            Action::ChooseAudience => self.choose_audience(msg).await,
            Action::PickAudience => self.pick_audience(msg).await,
            Action::SendBroadcast => self.send_broadcast(msg, scratch).await,
        }
    }

    fn set_conversation(&self, flow: FlowName, user_id: u64, state: Option<ConversationState>) {
        let key = user_id.to_string();
        match state {
            Some(state) => {
                match StateValue::from_serialize(&state) {
                    Ok(value) => {
                        self.persistence.update_conversation(flow.as_str(), &key, Some(&value));
                    }
                    Err(e) => log_persist_skipped("conversation", &e.to_string()),
                }
                lock(&self.conversations).insert((flow, user_id), state);
            }
            None => {
                lock(&self.conversations).remove(&(flow, user_id));
                self.persistence.update_conversation(flow.as_str(), &key, None);
            }
        }
    }

    /// Sends a reply, remembering the keyboard it leaves the chat with.
    async fn send(&self, chat_id: i64, reply: Reply) -> Result<(), OutboundError> {
        self.remember_keyboard(chat_id, &reply.keyboard);
        self.outbound.send(chat_id, reply).await
    }

    /// Like [`send`](Self::send), but a failure is only logged.
    async fn notify(&self, chat_id: i64, reply: Reply) {
        if let Err(e) = self.send(chat_id, reply).await {
            log_send_failure("notify", chat_id, &e.to_string());
        }
    }

    fn remember_keyboard(&self, chat_id: i64, keyboard: &Keyboard) {
        let rows = match keyboard {
            Keyboard::Keep => return,
            Keyboard::Remove => Vec::new(),
            Keyboard::Menu(rows) => rows
                .iter()
                .map(|row| StateValue::Seq(row.iter().cloned().map(StateValue::Text).collect()))
                .collect(),
        };
        let data = StateValue::map([("keyboard", StateValue::Seq(rows))]);
        self.persistence.update_chat_data(chat_id, &data);
    }

    /// Rebuilds the persisted per-user view from the roster.
    fn refresh_user_data(&self, user_id: u64) {
        let data = {
            let roster = lock(&self.roster);
            let key = user_id.to_string();
            match roster.any_record(&key) {
                Some(record) => StateValue::map([
                    (
                        "grades",
                        StateValue::Set(
                            roster
                                .grades_of(&key)
                                .iter()
                                .map(|grade| StateValue::text(grade.to_string()))
                                .collect(),
                        ),
                    ),
                    ("wantsUpdate", StateValue::Bool(record.wants_update)),
                    ("days", StateValue::Int(i64::from(record.days))),
                    ("name", StateValue::text(record.name.clone())),
                ]),
                None => StateValue::default(),
            }
        };
        self.persistence.update_user_data(user_id, &data);
    }

    fn persist_bot_data(&self) {
        let admins = StateValue::Set(
            lock(&self.admins)
                .iter()
                .map(|id| StateValue::text(id.to_string()))
                .collect(),
        );
        let last_seen = match StateValue::from_serialize(&*lock(&self.last_seen)) {
            Ok(value) => value,
            Err(e) => {
                log_persist_skipped("bot_data", &format!("last-seen schedule: {e}"));
                StateValue::Null
            }
        };
        let data = StateValue::map([("admins", admins), ("last_seen", last_seen)]);
        self.persistence.update_bot_data(&data);
    }

    /// Applies `change` to the roster and saves it if anything changed.
    /// A failed save rolls the in-memory roster back.
    fn update_roster<T>(&self, change: impl FnOnce(&mut Roster) -> T) -> EngineResult<T> {
        let mut roster = lock(&self.roster);
        let before = roster.clone();
        let out = change(&mut roster);
        if *roster == before {
            return Ok(out);
        }
        if let Err(e) = self.roster_store.save(&roster) {
            *roster = before;
            return Err(e.into());
        }
        Ok(out)
    }

    async fn fetch_schedule(&self) -> EngineResult<Schedule> {
        let schedule = self.source.get_schedule(&self.settings.week_offsets).await?;
        *lock(&self.last_fetch) = Some(Utc::now());
        info!("Fetched schedule for {} grades", schedule.iter().count());
        Ok(schedule)
    }

    /// The main menu for signed-up users, no keyboard for everyone else.
    fn home(&self, user_id: u64, reply: Reply) -> Reply {
        if self.is_signed_up(user_id) {
            reply.menu(self.labels.main_menu(self.is_admin(user_id)))
        } else {
            reply.remove_keyboard()
        }
    }
}
