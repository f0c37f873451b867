//! Subscriber-facing handler bodies: signup, grade membership, notice
//! horizon, and the stand-alone commands.

use super::flow::{ConversationState, Scratch, Slot, Transition};
use super::outbound::{Inbound, Reply};
use super::{lock, Engine, EngineResult};
use crate::bot::commands::Command;
use crate::bot::texts;
use crate::storage::models::{Grade, Subscriber, DEFAULT_NOTICE_DAYS};
use crate::utils::datetime::week_start;
use crate::utils::validation::{parse_horizon, HorizonInput};
use chrono::Utc;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

impl Engine {
    pub(super) async fn signup_start(&self, msg: &Inbound) -> EngineResult<Transition> {
        if self.is_signed_up(msg.user_id) {
            let reply = self.home(msg.user_id, Reply::plain(texts::ALREADY_REGISTERED));
            self.send(msg.chat_id, reply).await?;
            return Ok(Transition::End);
        }

        info!("User {} ({}) started signup", msg.display_name, msg.user_id);
        let reply = Reply::plain(texts::greeting(&msg.display_name))
            .menu(self.labels.grade_menu(Grade::school_years()));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Goto(ConversationState::with(
            Slot::Grade,
            Scratch::Signup { grade: None },
        )))
    }

    pub(super) async fn signup_grade(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Some(grade) = self.labels.parse_grade(msg.body()) else {
            return self.reprompt(msg).await;
        };
        let reply = Reply::plain(texts::CHOOSE_HORIZON).menu(self.labels.horizon_menu());
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Goto(ConversationState::with(
            Slot::Week,
            Scratch::Signup { grade: Some(grade) },
        )))
    }

    pub(super) async fn signup_week(&self, msg: &Inbound, scratch: Scratch) -> EngineResult<Transition> {
        let Scratch::Signup { grade: Some(grade) } = scratch else {
            warn!("Signup for {} reached the week step without a grade", msg.user_id);
            let reply = Reply::plain(texts::CHOOSE_GRADE).menu(self.labels.grade_menu(Grade::school_years()));
            self.send(msg.chat_id, reply).await?;
            return Ok(Transition::Goto(ConversationState::with(
                Slot::Grade,
                Scratch::Signup { grade: None },
            )));
        };

        let (record, done) = match parse_horizon(msg.body(), &self.labels.no_auto_update) {
            HorizonInput::Weeks(weeks) => (
                Subscriber::new(msg.display_name.clone(), true, weeks * 7),
                texts::SIGNUP_DONE,
            ),
            HorizonInput::NoAutoUpdate => (
                Subscriber::new(msg.display_name.clone(), false, DEFAULT_NOTICE_DAYS),
                texts::SIGNUP_DONE_NO_UPDATES,
            ),
            HorizonInput::OutOfRange(_) => {
                let reply = Reply::plain(texts::horizon_out_of_range()).menu(self.labels.horizon_menu());
                self.send(msg.chat_id, reply).await?;
                return Ok(Transition::Stay);
            }
            HorizonInput::NotNumeric => return self.reprompt(msg).await,
        };

        let user = msg.user_id.to_string();
        info!(
            "User {} signed up to grade {} (auto update: {}, {} days)",
            msg.user_id, grade, record.wants_update, record.days
        );
        self.update_roster(|roster| roster.insert(grade, &user, record))?;
        self.refresh_user_data(msg.user_id);

        let reply = self.home(msg.user_id, Reply::plain(done));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::End)
    }

    pub(super) async fn join_start(&self, msg: &Inbound) -> EngineResult<Transition> {
        let joined = lock(&self.roster).grades_of(&msg.user_id.to_string());
        let available: Vec<Grade> = Grade::school_years().filter(|g| !joined.contains(g)).collect();
        if available.is_empty() {
            let reply = self.home(msg.user_id, Reply::plain(texts::JOIN_NOTHING_LEFT));
            self.send(msg.chat_id, reply).await?;
            return Ok(Transition::End);
        }

        let reply = Reply::plain(texts::JOIN_WHICH).menu(self.labels.grade_menu(available));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::to(Slot::Grade))
    }

    pub(super) async fn join_grade(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Some(grade) = self.labels.parse_grade(msg.body()) else {
            return self.reprompt(msg).await;
        };
        let user = msg.user_id.to_string();
        let label = self.labels.grade_label(grade).to_string();

        let joined = self.update_roster(|roster| {
            if roster.get(grade, &user).is_some() {
                return false;
            }
            let record = roster
                .any_record(&user)
                .cloned()
                .unwrap_or_else(|| Subscriber::fresh(msg.display_name.clone()));
            roster.insert(grade, &user, record);
            true
        })?;

        if !joined {
            self.send(msg.chat_id, Reply::plain(texts::already_in_grade(&label))).await?;
            return Ok(Transition::Stay);
        }

        info!("User {} joined grade {}", msg.user_id, grade);
        self.refresh_user_data(msg.user_id);
        let reply = self.home(msg.user_id, Reply::plain(texts::joined(&label)));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::End)
    }

    pub(super) async fn leave_start(&self, msg: &Inbound) -> EngineResult<Transition> {
        let joined = lock(&self.roster).grades_of(&msg.user_id.to_string());
        let reply = Reply::plain(texts::LEAVE_WHICH).menu(self.labels.grade_menu(joined));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::to(Slot::Grade))
    }

    pub(super) async fn leave_grade(&self, msg: &Inbound) -> EngineResult<Transition> {
        let Some(grade) = self.labels.parse_member_grade(msg.body()) else {
            return self.reprompt(msg).await;
        };
        let user = msg.user_id.to_string();
        let label = self.labels.grade_label(grade).to_string();

        let removed = self.update_roster(|roster| roster.remove(grade, &user))?;
        let text = match removed {
            Some(_) => {
                info!("User {} left grade {}", msg.user_id, grade);
                self.refresh_user_data(msg.user_id);
                texts::left(&label)
            }
            None => texts::not_in_grade(&label),
        };
        let reply = self.home(msg.user_id, Reply::plain(text));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::End)
    }

    pub(super) async fn notice_start(&self, msg: &Inbound) -> EngineResult<Transition> {
        if let Ok(Command::Notice(args)) = Command::parse(msg.body().trim_start(), &self.settings.bot_username) {
            if !args.trim().is_empty() {
                return self.apply_horizon(msg, args.trim()).await;
            }
        }
        self.show_horizon(msg).await
    }

    /// Applies a horizon reply across every grade the user belongs to.
    pub(super) async fn apply_horizon(&self, msg: &Inbound, text: &str) -> EngineResult<Transition> {
        let user = msg.user_id.to_string();
        let (updated, reply_text) = match parse_horizon(text, &self.labels.no_auto_update) {
            HorizonInput::Weeks(weeks) => {
                let updated = self.update_roster(|roster| {
                    roster.update_all(&user, |record| {
                        record.wants_update = true;
                        record.days = weeks * 7;
                    })
                })?;
                (updated, texts::horizon_saved(weeks))
            }
            HorizonInput::NoAutoUpdate => {
                let updated = self.update_roster(|roster| roster.update_all(&user, |record| record.wants_update = false))?;
                (updated, texts::STOPPED.to_string())
            }
            HorizonInput::OutOfRange(_) => {
                let reply = Reply::plain(texts::horizon_out_of_range()).menu(self.labels.horizon_menu());
                self.send(msg.chat_id, reply).await?;
                return Ok(Transition::to(Slot::Week));
            }
            HorizonInput::NotNumeric => return self.show_horizon(msg).await,
        };

        info!("User {} changed notice horizon in {} grade(s)", msg.user_id, updated);
        self.refresh_user_data(msg.user_id);
        let reply = self.home(msg.user_id, Reply::plain(reply_text));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::End)
    }

    async fn show_horizon(&self, msg: &Inbound) -> EngineResult<Transition> {
        let record = lock(&self.roster).any_record(&msg.user_id.to_string()).cloned();
        let text = match record {
            Some(record) => texts::current_horizon(&record),
            None => texts::CHOOSE_HORIZON.to_string(),
        };
        let reply = Reply::plain(text).menu(self.labels.horizon_menu());
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::to(Slot::Week))
    }

    pub(super) async fn cancel(&self, msg: &Inbound) -> EngineResult<Transition> {
        let reply = self.home(msg.user_id, Reply::plain(texts::CANCELLED));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::End)
    }

    pub(super) async fn reprompt(&self, msg: &Inbound) -> EngineResult<Transition> {
        self.send(msg.chat_id, Reply::plain(texts::UNKNOWN_INPUT)).await?;
        Ok(Transition::Stay)
    }

    pub(super) async fn help(&self, msg: &Inbound) -> EngineResult<Transition> {
        let reply = self.home(msg.user_id, Reply::plain(texts::HELP_MSG));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Stay)
    }

    pub(super) async fn unknown(&self, msg: &Inbound) -> EngineResult<Transition> {
        let reply = self.home(msg.user_id, Reply::plain(texts::UNKNOWN_COMMAND));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Stay)
    }

    pub(super) async fn set_auto_update(&self, msg: &Inbound, enabled: bool) -> EngineResult<Transition> {
        let user = msg.user_id.to_string();
        self.update_roster(|roster| roster.update_all(&user, |record| record.wants_update = enabled))?;
        self.refresh_user_data(msg.user_id);
        info!("User {} set auto update to {}", msg.user_id, enabled);

        let text = if enabled { texts::RESTARTED } else { texts::STOPPED };
        let reply = self.home(msg.user_id, Reply::plain(text));
        self.send(msg.chat_id, reply).await?;
        Ok(Transition::Stay)
    }

    /// Sends the user their schedule now, one message per grade.
    ///
    /// The banner compares against the last schedule the weekly job sent;
    /// this path only reads that record.
    pub(super) async fn send_update(&self, msg: &Inbound) -> EngineResult<Transition> {
        let schedule = match self.fetch_schedule().await {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!("On-demand schedule fetch for {} failed: {}", msg.user_id, e);
                self.send(msg.chat_id, Reply::plain(texts::FETCH_FAILED)).await?;
                return Ok(Transition::Stay);
            }
        };

        let user = msg.user_id.to_string();
        let memberships: Vec<(Grade, Subscriber)> = {
            let roster = lock(&self.roster);
            roster
                .grades_of(&user)
                .into_iter()
                .filter_map(|grade| roster.get(grade, &user).map(|record| (grade, record.clone())))
                .collect()
        };

        let this_week = week_start(Utc::now().date_naive());
        for (grade, record) in memberships {
            let fresh = schedule.weeks(grade).unwrap_or_default();
            let changed = self.differs_from_last_seen(grade, this_week, fresh);
            let weeks = schedule.upcoming(grade, record.horizon_weeks().max(1));
            let text = texts::format_schedule(self.labels.grade_label(grade), weeks, changed);
            self.send(msg.chat_id, Reply::markdown(text)).await?;
        }
        Ok(Transition::Stay)
    }
}
