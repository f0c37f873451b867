pub mod message;

use crate::engine::Engine;
use std::sync::Arc;
use teloxide::{dispatching::UpdateHandler, prelude::*};

pub struct BotHandler {
    pub engine: Arc<Engine>,
}

impl BotHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }

    /// Every message goes to the engine; it does its own command routing so
    /// slash commands and keyboard labels share one flow table.
    pub fn schema(&self) -> UpdateHandler<Box<dyn std::error::Error + Send + Sync + 'static>> {
        use teloxide::dispatching::UpdateFilterExt;

        let engine = self.engine.clone();

        Update::filter_message().endpoint(move |msg: Message| {
            let engine = engine.clone();
            async move { message::message_handler(msg, engine).await }
        })
    }
}
