//! Flow table: named state machines built from plain handler values.
//!
//! A handler is an action plus the matchers that select it and the guards
//! that run before it. Guards are flags set once at registration, so a
//! handler shared between several states is never wrapped twice.

use super::outbound::Inbound;
use crate::bot::commands::{Command, MenuLabels};
use crate::storage::models::Grade;
use crate::storage::roster::Audience;
use crate::utils::validation::USER_ID_PATTERN;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::mem::discriminant;
use teloxide::utils::command::BotCommands;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowName {
    Signup,
    JoinGrade,
    LeaveGrade,
    ChangeNotice,
    Admin,
}

impl FlowName {
    pub const ALL: [FlowName; 5] = [
        FlowName::Signup,
        FlowName::JoinGrade,
        FlowName::LeaveGrade,
        FlowName::ChangeNotice,
        FlowName::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowName::Signup => "signup",
            FlowName::JoinGrade => "join_grade",
            FlowName::LeaveGrade => "leave_grade",
            FlowName::ChangeNotice => "change_notice",
            FlowName::Admin => "admin",
        }
    }
}

/// A node in a flow's state graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    Start,
    Grade,
    Week,
    AdminFunctions,
    AddAdmin,
    RemoveAdmin,
    NameToId,
    GetMessage,
    BroadcastMessage,
}

impl Slot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Slot::Start => "start",
            Slot::Grade => "grade",
            Slot::Week => "week",
            Slot::AdminFunctions => "admin_functions",
            Slot::AddAdmin => "add_admin",
            Slot::RemoveAdmin => "remove_admin",
            Slot::NameToId => "name_to_id",
            Slot::GetMessage => "get_message",
            Slot::BroadcastMessage => "broadcast_message",
        }
    }
}

/// Values a flow carries between its steps. Each variant holds only what
/// its flow needs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum Scratch {
    #[default]
    Empty,
    Signup {
        grade: Option<Grade>,
    },
    Broadcast {
        audience: Option<Audience>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub slot: Slot,
    #[serde(default)]
    pub scratch: Scratch,
}

impl ConversationState {
    pub fn at(slot: Slot) -> Self {
        Self {
            slot,
            scratch: Scratch::Empty,
        }
    }

    pub fn with(slot: Slot, scratch: Scratch) -> Self {
        Self { slot, scratch }
    }
}

/// What an action does to its flow's conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Goto(ConversationState),
    End,
}

impl Transition {
    pub fn to(slot: Slot) -> Self {
        Transition::Goto(ConversationState::at(slot))
    }
}

/// Every handler body the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SignupStart,
    SignupGrade,
    SignupWeek,
    JoinStart,
    JoinGrade,
    LeaveStart,
    LeaveGrade,
    NoticeStart,
    NoticeWeek,
    Cancel,
    Reprompt,
    Help,
    Update,
    StopUpdates,
    RestartUpdates,
    Unknown,
    AdminMenu,
    AskNewAdmin,
    AddAdmin,
    AskRemovedAdmin,
    RemoveAdmin,
    AskName,
    NameToId,
    ChooseAudience,
    PickAudience,
    SendBroadcast,
}

impl Action {
    pub fn name(&self) -> String {
        format!("{self:?}")
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Command(Command),
    /// Exact button label, surrounding whitespace ignored.
    Label(String),
    /// Text matching a pattern.
    Pattern(Regex),
    /// Any text that is not a command.
    Text,
    /// Any message that is not a command, text or not.
    NonCommand,
    /// Everything.
    Any,
}

impl Matcher {
    pub fn matches(&self, msg: &Inbound, bot_username: &str) -> bool {
        let text = msg.text.as_deref();
        let is_command = text.is_some_and(|t| t.trim_start().starts_with('/'));
        match self {
            Matcher::Command(cmd) => text
                .and_then(|t| Command::parse(t.trim_start(), bot_username).ok())
                .is_some_and(|found| discriminant(&found) == discriminant(cmd)),
            Matcher::Label(label) => text.is_some_and(|t| t.trim() == label),
            Matcher::Pattern(re) => text.is_some_and(|t| re.is_match(t.trim())),
            Matcher::Text => text.is_some() && !is_command,
            Matcher::NonCommand => !is_command,
            Matcher::Any => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    /// Sender must be in the admin set.
    pub admin: bool,
    /// Sender must have a roster record; the body runs under their lock.
    pub signed_up: bool,
}

#[derive(Debug, Clone)]
pub struct Handler {
    pub matchers: Vec<Matcher>,
    pub action: Action,
    pub guards: Guards,
}

impl Handler {
    pub fn new(action: Action, matchers: impl IntoIterator<Item = Matcher>) -> Self {
        Self {
            matchers: matchers.into_iter().collect(),
            action,
            guards: Guards::default(),
        }
    }

    pub fn admin_only(mut self) -> Self {
        self.guards.admin = true;
        self
    }

    pub fn signed_up(mut self) -> Self {
        self.guards.signed_up = true;
        self
    }

    pub fn accepts(&self, msg: &Inbound, bot_username: &str) -> bool {
        self.matchers.iter().any(|m| m.matches(msg, bot_username))
    }
}

#[derive(Debug, Clone)]
pub struct Flow {
    pub name: FlowName,
    pub entry_points: Vec<Handler>,
    pub states: HashMap<Slot, Vec<Handler>>,
    pub fallbacks: Vec<Handler>,
}

impl Flow {
    pub fn handlers_for(&self, slot: Slot) -> &[Handler] {
        self.states.get(&slot).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum FlowConfigError {
    #[error("state {0:?} is already defined by the admin menu")]
    DuplicateState(Slot),
    #[error("invalid matcher pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn label_matchers<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<Matcher> {
    items.into_iter().cloned().map(Matcher::Label).collect()
}

fn grade_labels(labels: &MenuLabels, with_graduates: bool) -> Vec<Matcher> {
    let mut matchers: Vec<Matcher> = labels
        .grades
        .iter()
        .map(|(_, label)| Matcher::Label(label.clone()))
        .collect();
    if with_graduates {
        matchers.push(Matcher::Label(labels.graduates.clone()));
    }
    matchers
}

fn cancel_handlers(labels: &MenuLabels) -> Vec<Handler> {
    let mut matchers = vec![Matcher::Command(Command::Cancel)];
    matchers.extend(label_matchers([&labels.cancel, &labels.back]));
    vec![Handler::new(Action::Cancel, matchers)]
}

fn reprompt() -> Handler {
    Handler::new(Action::Reprompt, [Matcher::NonCommand])
}

pub fn signup_flow(labels: &MenuLabels) -> Flow {
    let states = HashMap::from([
        (
            Slot::Grade,
            vec![Handler::new(Action::SignupGrade, grade_labels(labels, false)), reprompt()],
        ),
        (
            Slot::Week,
            vec![Handler::new(Action::SignupWeek, [Matcher::Text]), reprompt()],
        ),
    ]);
    Flow {
        name: FlowName::Signup,
        entry_points: vec![Handler::new(Action::SignupStart, [Matcher::Command(Command::Start)])],
        states,
        fallbacks: cancel_handlers(labels),
    }
}

pub fn join_grade_flow(labels: &MenuLabels) -> Flow {
    let entry = Handler::new(
        Action::JoinStart,
        [Matcher::Command(Command::Join), Matcher::Label(labels.join_grade.clone())],
    )
    .signed_up();
    let pick = Handler::new(Action::JoinGrade, grade_labels(labels, false)).signed_up();
    Flow {
        name: FlowName::JoinGrade,
        entry_points: vec![entry],
        states: HashMap::from([(Slot::Grade, vec![pick, reprompt()])]),
        fallbacks: cancel_handlers(labels),
    }
}

pub fn leave_grade_flow(labels: &MenuLabels) -> Flow {
    let entry = Handler::new(
        Action::LeaveStart,
        [Matcher::Command(Command::Leave), Matcher::Label(labels.leave_grade.clone())],
    )
    .signed_up();
    let pick = Handler::new(Action::LeaveGrade, grade_labels(labels, true)).signed_up();
    Flow {
        name: FlowName::LeaveGrade,
        entry_points: vec![entry],
        states: HashMap::from([(Slot::Grade, vec![pick, reprompt()])]),
        fallbacks: cancel_handlers(labels),
    }
}

pub fn change_notice_flow(labels: &MenuLabels) -> Flow {
    let entry = Handler::new(
        Action::NoticeStart,
        [Matcher::Command(Command::Notice(String::new())), Matcher::Label(labels.change_notice.clone())],
    )
    .signed_up();
    let week = Handler::new(Action::NoticeWeek, [Matcher::Text]).signed_up();
    Flow {
        name: FlowName::ChangeNotice,
        entry_points: vec![entry],
        states: HashMap::from([(Slot::Week, vec![week, reprompt()])]),
        fallbacks: cancel_handlers(labels),
    }
}

/// Builds the admin menu flow around its default states.
///
/// `extra_functions` are added to the admin-functions state ahead of the
/// defaults and `extra_states` are merged in; an extra state may not
/// redefine a default one.
pub fn admin_flow(
    labels: &MenuLabels,
    extra_functions: Vec<Handler>,
    extra_states: HashMap<Slot, Vec<Handler>>,
) -> Result<Flow, FlowConfigError> {
    let user_id = Regex::new(USER_ID_PATTERN)?;

    let mut functions: Vec<Handler> = extra_functions.into_iter().map(Handler::admin_only).collect();
    functions.push(Handler::new(Action::AskNewAdmin, [Matcher::Label(labels.add_admin.clone())]).admin_only());
    functions.push(
        Handler::new(Action::AskRemovedAdmin, [Matcher::Label(labels.remove_admin.clone())]).admin_only(),
    );
    functions.push(reprompt().admin_only());

    let mut states = HashMap::from([
        (Slot::AdminFunctions, functions),
        (
            Slot::AddAdmin,
            vec![
                Handler::new(Action::AddAdmin, [Matcher::Pattern(user_id.clone())]).admin_only(),
                reprompt().admin_only(),
            ],
        ),
        (
            Slot::RemoveAdmin,
            vec![
                Handler::new(Action::RemoveAdmin, [Matcher::Pattern(user_id)]).admin_only(),
                reprompt().admin_only(),
            ],
        ),
    ]);

    for (slot, handlers) in extra_states {
        if states.contains_key(&slot) {
            return Err(FlowConfigError::DuplicateState(slot));
        }
        states.insert(slot, handlers.into_iter().map(Handler::admin_only).collect());
    }

    let entry = Handler::new(
        Action::AdminMenu,
        [Matcher::Command(Command::Admin), Matcher::Label(labels.admin_menu.clone())],
    )
    .admin_only();

    Ok(Flow {
        name: FlowName::Admin,
        entry_points: vec![entry],
        states,
        fallbacks: cancel_handlers(labels),
    })
}

/// Name search and broadcast, layered onto the admin menu.
pub fn admin_tools(labels: &MenuLabels) -> (Vec<Handler>, HashMap<Slot, Vec<Handler>>) {
    let functions = vec![
        Handler::new(Action::AskName, [Matcher::Label(labels.find_user.clone())]),
        Handler::new(Action::ChooseAudience, [Matcher::Label(labels.broadcast.clone())]),
    ];

    let mut audiences = label_matchers([&labels.everyone, &labels.graduates]);
    audiences.extend(grade_labels(labels, false));

    let states = HashMap::from([
        (Slot::NameToId, vec![Handler::new(Action::NameToId, [Matcher::Text])]),
        (
            Slot::GetMessage,
            vec![Handler::new(Action::PickAudience, audiences), reprompt()],
        ),
        (
            Slot::BroadcastMessage,
            vec![Handler::new(Action::SendBroadcast, [Matcher::NonCommand])],
        ),
    ]);
    (functions, states)
}

/// All flows, in the order they are offered each message.
pub fn build_flows(labels: &MenuLabels) -> Result<Vec<Flow>, FlowConfigError> {
    let (functions, states) = admin_tools(labels);
    Ok(vec![
        signup_flow(labels),
        join_grade_flow(labels),
        leave_grade_flow(labels),
        change_notice_flow(labels),
        admin_flow(labels, functions, states)?,
    ])
}

/// Handlers tried when no flow takes a message; also the fallback chain
/// for a failed admin check.
pub fn global_handlers(labels: &MenuLabels) -> Vec<Handler> {
    vec![
        Handler::new(
            Action::Help,
            [Matcher::Command(Command::Help), Matcher::Label(labels.help.clone())],
        ),
        Handler::new(
            Action::Update,
            [Matcher::Command(Command::Update), Matcher::Label(labels.update.clone())],
        )
        .signed_up(),
        Handler::new(
            Action::StopUpdates,
            [Matcher::Command(Command::Stop), Matcher::Label(labels.stop_updates.clone())],
        )
        .signed_up(),
        Handler::new(
            Action::RestartUpdates,
            [
                Matcher::Command(Command::Restart),
                Matcher::Label(labels.restart_updates.clone()),
            ],
        )
        .signed_up(),
        Handler::new(Action::Unknown, [Matcher::Any]),
    ]
}
