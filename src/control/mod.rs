// src/control/mod.rs
//! Chat-style control surface: parse a command, run it against the stores,
//! produce reply text. Shared by the control bot frontend.

pub mod bot;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, warn};

use crate::ingest::types::SourceDescriptor;
use crate::oracle::{AnalysisRequest, RelevanceOracle};
use crate::store::{normalize_source_name, QueryRegister, SourceRegistry};
use crate::transport::{ChatDirectory, Transport};

pub use bot::ControlBot;

pub const ANALYSIS_FAILED_REPLY: &str = "Sorry, I couldn't analyze that message.";

pub const LIST_CHANNELS_UNAVAILABLE: &str =
    "Listing every channel of an account needs the user-account transport. \
     Use /listmonitored to see what is being watched.";

static COMMAND: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*))?$").expect("command regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    GetMyId,
    SetQuery(String),
    ShowQuery,
    AddChannel(String),
    RemoveChannel(String),
    ListMonitored,
    ListChannels,
    Unknown(String),
    /// Not a command: free text for the analysis reply.
    Text(String),
}

impl Command {
    /// `/cmd@botname args`; the argument is trimmed, empty means absent.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let Some(caps) = COMMAND.captures(input) else {
            return Command::Text(input.to_string());
        };
        let name = caps[1].to_ascii_lowercase();
        let arg = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        match name.as_str() {
            "start" | "help" => Command::Start,
            "getmyid" => Command::GetMyId,
            "setquery" => Command::SetQuery(arg),
            "showquery" => Command::ShowQuery,
            "addchannel" => Command::AddChannel(arg),
            "removechannel" => Command::RemoveChannel(arg),
            "listmonitored" => Command::ListMonitored,
            "listchannels" => Command::ListChannels,
            _ => Command::Unknown(name),
        }
    }

    /// Commands that change state or expose the account's chats.
    fn owner_only(&self) -> bool {
        matches!(
            self,
            Command::SetQuery(_)
                | Command::AddChannel(_)
                | Command::RemoveChannel(_)
                | Command::ListChannels
        )
    }
}

/// Who sent the command.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub display_name: String,
}

pub struct ControlSurface {
    sources: Arc<dyn SourceRegistry>,
    query: Arc<dyn QueryRegister>,
    oracle: RelevanceOracle,
    /// Only this chat may change state, when set.
    owner: Option<String>,
    /// Turns `@handle` arguments into the title posts arrive under.
    resolver: Option<Arc<dyn Transport>>,
    directory: Option<Arc<dyn ChatDirectory>>,
}

impl ControlSurface {
    pub fn new(
        sources: Arc<dyn SourceRegistry>,
        query: Arc<dyn QueryRegister>,
        oracle: RelevanceOracle,
        owner: Option<String>,
    ) -> Self {
        Self {
            sources,
            query,
            oracle,
            owner,
            resolver: None,
            directory: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Transport>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_directory(mut self, directory: Option<Arc<dyn ChatDirectory>>) -> Self {
        self.directory = directory;
        self
    }

    pub fn is_authorized(&self, caller: &Caller) -> bool {
        let Some(owner) = self.owner.as_deref() else {
            return true;
        };
        owner == caller.chat_id.to_string()
            || owner == caller.user_id.to_string()
            || caller
                .username
                .as_deref()
                .is_some_and(|u| owner.trim_start_matches('@') == u)
    }

    /// Run one command and return the reply text.
    pub async fn execute(&self, cmd: Command, caller: &Caller) -> String {
        if cmd.owner_only() && !self.is_authorized(caller) {
            warn!(chat_id = caller.chat_id, ?cmd, "rejected command from non-owner");
            return "⛔ Only the configured recipient can change the relay settings.".to_string();
        }

        match cmd {
            Command::Start => self.help(),
            Command::GetMyId => format!(
                "Your Telegram user ID is: {}\n\nAdd this to your .env file as:\nUSER_CHAT_ID={}",
                caller.user_id, caller.chat_id
            ),
            Command::SetQuery(q) => self.set_query(&q),
            Command::ShowQuery => format!("Current search query:\n{}", self.query.get()),
            Command::AddChannel(name) => self.add_channel(&name).await,
            Command::RemoveChannel(name) => self.remove_channel(&name),
            Command::ListMonitored => self.list_monitored(),
            Command::ListChannels => self.list_channels(caller).await,
            Command::Unknown(name) => format!("Unknown command /{name}.\n\n{}", self.help()),
            Command::Text(text) => self.analyze(&text, caller).await,
        }
    }

    fn help(&self) -> String {
        let list_line = if self.directory.is_some() {
            "/listchannels - List all your Telegram channels\n"
        } else {
            ""
        };
        format!(
            "Available commands:\n\
             /start - Show this help message\n\
             /getmyid - Get your Telegram user ID for configuration\n\
             {list_line}\
             /setquery <text> - Set a new search query for filtering messages\n\
             /showquery - Show current search query\n\
             /addchannel <name> - Add a channel to monitor (its title, or @handle)\n\
             /removechannel <name> - Remove a channel from monitoring\n\
             /listmonitored - Show currently monitored channels\n\n\
             Current search query: {}",
            self.query.get()
        )
    }

    fn set_query(&self, q: &str) -> String {
        if q.trim().is_empty() {
            return "❌ Please provide a search query after /setquery\n\
                    Example: /setquery find messages about tech news"
                .to_string();
        }
        match self.query.set(q) {
            Ok(()) => {
                info!(query = q, "search query updated");
                format!(
                    "✅ Search query updated!\n\nNew query: {q}\n\n\
                     The monitor will now filter messages based on this query."
                )
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to save query");
                "❌ Failed to update search query. Please try again.".to_string()
            }
        }
    }

    async fn add_channel(&self, raw: &str) -> String {
        let Ok(name) = normalize_source_name(raw) else {
            return "❌ Please provide a channel name after /addchannel\n\
                    Example: /addchannel @channelname or /addchannel Channel Title"
                .to_string();
        };
        let (name, note) = if raw.trim().starts_with('@') {
            self.title_for_handle(name).await
        } else {
            (name, String::new())
        };
        match self.sources.add(&name) {
            Ok(true) => {
                info!(channel = %name, "channel added to monitoring");
                format!(
                    "✅ Channel '{name}' added to monitoring list.\n\n{note}{}",
                    self.current_list_line()
                )
            }
            Ok(false) => format!("ℹ️ Channel '{name}' is already being monitored."),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to add channel");
                format!("❌ Failed to add channel '{name}'.")
            }
        }
    }

    /// Posts are matched by display name, so a handle is stored as the title
    /// it resolves to. Returns the name to store and a note for the reply.
    async fn title_for_handle(&self, handle: String) -> (String, String) {
        let Some(resolver) = &self.resolver else {
            return (
                handle.clone(),
                format!(
                    "ℹ️ Posts are matched by channel title. If @{handle} has a different title, add the title instead.\n\n"
                ),
            );
        };
        match resolver.resolve_entity(&handle).await {
            Ok(found) if found.display_name() != handle => {
                let title = found.display_name().to_string();
                info!(handle = %handle, title = %title, "resolved handle to channel title");
                let note = format!("Resolved @{handle} to '{title}'.\n\n");
                (title, note)
            }
            Ok(_) => (handle, String::new()),
            Err(e) => {
                warn!(handle = %handle, error = %e, "could not resolve handle");
                let note = format!(
                    "⚠️ Could not look up @{handle}. Posts are matched by channel title; add the title if it differs.\n\n"
                );
                (handle, note)
            }
        }
    }

    async fn list_channels(&self, caller: &Caller) -> String {
        let Some(directory) = &self.directory else {
            return LIST_CHANNELS_UNAVAILABLE.to_string();
        };
        let requester = caller
            .username
            .as_deref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| caller.display_name.clone());
        match directory.list_chats().await {
            Ok(chats) if chats.is_empty() => format!("{requester}: No channels found in your account."),
            Ok(chats) => {
                let lines: Vec<String> = chats.iter().map(chat_line).collect();
                format!(
                    "{requester}: Found {} channels.\n\n{}\n\n💡 Tip: Use /addchannel <title> to monitor any of these channels!",
                    chats.len(),
                    lines.join("\n")
                )
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to list channels");
                format!("❌ Failed to list channels: {e}")
            }
        }
    }

    fn remove_channel(&self, raw: &str) -> String {
        let Ok(name) = normalize_source_name(raw) else {
            return "❌ Please provide a channel name after /removechannel\n\
                    Example: /removechannel @channelname or /removechannel Channel Title"
                .to_string();
        };
        match self.sources.remove(&name) {
            Ok(true) => {
                info!(channel = %name, "channel removed from monitoring");
                format!(
                    "✅ Channel '{name}' removed from monitoring list.\n\n{}",
                    self.current_list_line()
                )
            }
            Ok(false) => format!("❌ Channel '{name}' was not in the monitoring list."),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to remove channel");
                format!("❌ Failed to remove channel '{name}'.")
            }
        }
    }

    fn current_list_line(&self) -> String {
        match self.sources.list() {
            Ok(list) if list.is_empty() => "Current monitored channels: none".to_string(),
            Ok(list) => format!("Current monitored channels:\n{}", list.join(", ")),
            Err(_) => "Current monitored channels: unavailable".to_string(),
        }
    }

    fn list_monitored(&self) -> String {
        match self.sources.list() {
            Ok(list) if list.is_empty() => "ℹ️ No channels are currently being monitored.\n\
                                             Use /addchannel to start monitoring a channel."
                .to_string(),
            Ok(list) => {
                let lines: Vec<String> = list.iter().map(|c| format!("- {c}")).collect();
                format!("📺 Currently monitored channels:\n\n{}", lines.join("\n"))
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "failed to read channel list");
                "❌ Could not read the monitored channel list.".to_string()
            }
        }
    }

    async fn analyze(&self, text: &str, caller: &Caller) -> String {
        if text.is_empty() {
            return "Sorry, I can only process text messages.".to_string();
        }
        let req = AnalysisRequest {
            channel_name: "Direct message".to_string(),
            sender_name: caller.display_name.clone(),
            message_date: chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            message_text: text.to_string(),
            user_query: self.query.get(),
        };
        self.oracle
            .analyze(&req)
            .await
            .unwrap_or_else(|| ANALYSIS_FAILED_REPLY.to_string())
    }
}

fn chat_line(chat: &SourceDescriptor) -> String {
    match chat.public_handle() {
        Some(handle) => format!("{} (@{handle}) - ID: {}", chat.display_name(), chat.id),
        None => format!("{} - ID: {}", chat.display_name(), chat.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(Command::parse("/start"), Command::Start);
        assert_eq!(
            Command::parse("/setquery@relay_bot  rockets in the north "),
            Command::SetQuery("rockets in the north".into())
        );
        assert_eq!(
            Command::parse("/addchannel Gaza Now"),
            Command::AddChannel("Gaza Now".into())
        );
        assert_eq!(Command::parse("/addchannel"), Command::AddChannel(String::new()));
        assert_eq!(Command::parse("/SHOWQUERY"), Command::ShowQuery);
        assert_eq!(Command::parse("/nope"), Command::Unknown("nope".into()));
        assert_eq!(Command::parse("hello there"), Command::Text("hello there".into()));
    }

    #[test]
    fn multiline_argument_is_kept() {
        assert_eq!(
            Command::parse("/setquery line one\nline two"),
            Command::SetQuery("line one\nline two".into())
        );
    }
}
