// src/control/bot.rs
//! Control bot frontend: long-polls the notification bot for commands.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{Caller, Command, ControlSurface};
use crate::logging::preview;
use crate::telegram::types::Message;
use crate::telegram::BotApi;

pub struct ControlBot {
    api: BotApi,
    surface: Arc<ControlSurface>,
    poll_timeout_secs: u64,
    reply_timeout: Duration,
}

impl ControlBot {
    pub fn new(api: BotApi, surface: Arc<ControlSurface>, poll_timeout_secs: u64) -> Self {
        Self {
            api,
            surface,
            poll_timeout_secs,
            reply_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Commands are handled one at a time so replies keep their order.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut offset = 0i64;
        info!("control bot listening for commands");

        loop {
            let polled = tokio::select! {
                _ = &mut shutdown => break,
                res = self.api.get_updates(offset, self.poll_timeout_secs, &["message"]) => res,
            };
            let batch = match polled {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "control bot poll failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                    continue;
                }
            };
            if let Some(next) = batch.next_offset {
                offset = offset.max(next);
            }
            for upd in batch.updates {
                if let Some(msg) = upd.message {
                    self.handle(msg).await;
                }
            }
        }
        info!("control bot stopped");
    }

    async fn handle(&self, msg: Message) {
        let Some(text) = msg.text.as_deref() else {
            return;
        };
        let caller = caller_of(&msg);
        info!(
            chat_id = caller.chat_id,
            from = %caller.display_name,
            text = %preview(text),
            "control message"
        );
        let reply = self.surface.execute(Command::parse(text), &caller).await;
        let chat_id = msg.chat.id.to_string();
        if let Err(e) = self.api.send_text(&chat_id, &reply, self.reply_timeout).await {
            warn!(chat_id = caller.chat_id, error = %e, "failed to send control reply");
        }
    }
}

fn caller_of(msg: &Message) -> Caller {
    match &msg.from {
        Some(u) => Caller {
            chat_id: msg.chat.id,
            user_id: u.id,
            username: u.username.clone(),
            display_name: u
                .username
                .clone()
                .unwrap_or_else(|| u.first_name.clone()),
        },
        None => Caller {
            chat_id: msg.chat.id,
            user_id: msg.chat.id,
            username: msg.chat.username.clone(),
            display_name: msg.chat.descriptor().display_name().to_string(),
        },
    }
}
