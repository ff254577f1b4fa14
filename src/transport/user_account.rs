// src/transport/user_account.rs
//! User-account transport over MTProto: sees every channel the account has
//! joined, lists its dialogs, and forwards to the account's Saved Messages.
//!
//! The first run asks for the login code (and 2FA password) on the terminal;
//! the session file keeps the login afterwards.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use grammers_client::types::{Chat, Media, Message, PackedChat};
use grammers_client::{Client, Config, InitParams, SignInError, Update};
use grammers_session::Session;
use grammers_tl_types as tl;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::peer::{basic_group_chat_id, channel_chat_id, looks_like_handle, media_from_mime};
use super::{ChatDirectory, Forwarder, SelfIdentity, Transport};
use crate::config::TransportConfig;
use crate::ingest::types::{
    ForwardOrigin, InboundMessage, MediaDescriptor, SenderDescriptor, SourceDescriptor,
};
use crate::store::normalize_source_name;

/// Dialogs scanned for `/listchannels` and name lookups.
const DIALOG_LIMIT: usize = 500;

pub struct UserAccountTransport {
    api_id: i32,
    api_hash: String,
    phone: Option<String>,
    session_path: PathBuf,
    poll_timeout: Duration,
    client: OnceCell<Client>,
    /// The account's own chat (Saved Messages).
    me: Mutex<Option<PackedChat>>,
    /// Chats seen on this connection, keyed by Bot-API-style id.
    chats: Mutex<HashMap<i64, PackedChat>>,
}

impl UserAccountTransport {
    pub fn from_config(cfg: &TransportConfig) -> Result<Self> {
        let api_id = cfg
            .api_id
            .ok_or_else(|| anyhow!("TELEGRAM_API_ID is required for the user-account transport"))?;
        let api_hash = cfg
            .api_hash
            .clone()
            .ok_or_else(|| anyhow!("TELEGRAM_API_HASH is required for the user-account transport"))?;
        Ok(Self {
            api_id,
            api_hash,
            phone: cfg.phone.clone(),
            session_path: cfg.session_path.clone(),
            poll_timeout: Duration::from_secs(cfg.poll_timeout_secs),
            client: OnceCell::new(),
            me: Mutex::new(None),
            chats: Mutex::new(HashMap::new()),
        })
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .get()
            .ok_or_else(|| anyhow!("user-account transport is not connected yet"))
    }

    async fn sign_in(&self) -> Result<Client> {
        if let Some(dir) = self.session_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating session directory {}", dir.display()))?;
        }
        let session = Session::load_file_or_create(&self.session_path)
            .with_context(|| format!("opening session {}", self.session_path.display()))?;
        let client = Client::connect(Config {
            session,
            api_id: self.api_id,
            api_hash: self.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .map_err(|e| anyhow!("connecting to Telegram: {e}"))?;

        let authorized = client
            .is_authorized()
            .await
            .map_err(|e| anyhow!("checking authorization: {e}"))?;
        if !authorized {
            info!("first login for this session; a code will be sent to the account");
            let phone = match &self.phone {
                Some(p) => p.clone(),
                None => prompt("Enter your phone number (international format): ").await?,
            };
            let token = client
                .request_login_code(&phone)
                .await
                .map_err(|e| anyhow!("requesting login code: {e}"))?;
            let code = prompt("Enter the verification code from Telegram: ").await?;
            match client.sign_in(&token, &code).await {
                Ok(_) => {}
                Err(SignInError::PasswordRequired(password_token)) => {
                    let password = prompt("Enter your 2FA password: ").await?;
                    client
                        .check_password(password_token, password.as_str())
                        .await
                        .map_err(|e| anyhow!("2FA check failed: {e}"))?;
                }
                Err(e) => bail!("sign-in failed: {e}"),
            }
            client
                .session()
                .save_to_file(&self.session_path)
                .with_context(|| format!("saving session {}", self.session_path.display()))?;
            info!(session = %self.session_path.display(), "login saved");
        }
        Ok(client)
    }

    fn remember(&self, chat: &Chat) {
        if let Ok(mut chats) = self.chats.lock() {
            chats.insert(chat_id(chat), chat.pack());
        }
    }

    fn packed(&self, id: i64) -> Option<PackedChat> {
        self.chats.lock().ok()?.get(&id).cloned()
    }

    async fn scan_dialogs(&self) -> Result<Vec<SourceDescriptor>> {
        let client = self.client()?;
        let mut dialogs = client.iter_dialogs();
        let mut out = Vec::new();
        while let Some(dialog) = dialogs
            .next()
            .await
            .map_err(|e| anyhow!("listing dialogs: {e}"))?
        {
            let chat = dialog.chat();
            if matches!(chat, Chat::User(_)) {
                continue;
            }
            self.remember(chat);
            out.push(descriptor(chat));
            if out.len() >= DIALOG_LIMIT {
                break;
            }
        }
        Ok(out)
    }
}

async fn prompt(label: &'static str) -> Result<String> {
    let line = tokio::task::spawn_blocking(move || {
        use std::io::{BufRead, Write};
        let mut out = std::io::stdout();
        out.write_all(label.as_bytes())?;
        out.flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok::<_, std::io::Error>(line)
    })
    .await
    .context("terminal prompt")??;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("no input given for login prompt");
    }
    Ok(line)
}

fn chat_id(chat: &Chat) -> i64 {
    match chat {
        Chat::User(_) => chat.id(),
        Chat::Channel(_) => channel_chat_id(chat.id()),
        Chat::Group(group) => match &group.raw {
            tl::enums::Chat::Chat(_) | tl::enums::Chat::Forbidden(_) | tl::enums::Chat::Empty(_) => {
                basic_group_chat_id(chat.id())
            }
            _ => channel_chat_id(chat.id()),
        },
    }
}

fn descriptor(chat: &Chat) -> SourceDescriptor {
    SourceDescriptor {
        id: chat_id(chat),
        title: Some(chat.name().trim().to_string()).filter(|t| !t.is_empty()),
        handle: chat.username().map(str::to_string),
    }
}

fn sender_of(chat: &Chat) -> SenderDescriptor {
    match chat {
        Chat::User(user) => SenderDescriptor {
            first_name: Some(user.first_name().to_string()),
            last_name: user.last_name().map(str::to_string),
            title: None,
            handle: user.username().map(str::to_string),
        },
        other => SenderDescriptor {
            title: Some(other.name().to_string()),
            handle: other.username().map(str::to_string),
            ..Default::default()
        },
    }
}

fn media_of(media: &Media) -> MediaDescriptor {
    match media {
        Media::Photo(_) => MediaDescriptor::Photo,
        Media::Sticker(_) => MediaDescriptor::Sticker { emoji: None },
        Media::Document(doc) => media_from_mime(doc.mime_type(), doc.name()),
        _ => MediaDescriptor::Other {
            label: "Other".to_string(),
        },
    }
}

fn inbound(message: &Message) -> InboundMessage {
    let text = message.text();
    InboundMessage {
        id: i64::from(message.id()),
        source: descriptor(&message.chat()),
        sender: message.sender().map(|s| sender_of(&s)),
        text: (!text.is_empty()).then(|| text.to_string()),
        date: message.date(),
        media: message.media().map(|m| media_of(&m)),
        forward: message.forward_header().map(|header| {
            let tl::enums::MessageFwdHeader::Header(h) = header;
            ForwardOrigin {
                from_name: h.from_name,
            }
        }),
    }
}

#[async_trait]
impl Transport for UserAccountTransport {
    async fn connect(&self) -> Result<SelfIdentity> {
        let client = self.client.get_or_try_init(|| self.sign_in()).await?;
        let me = client
            .get_me()
            .await
            .map_err(|e| anyhow!("fetching own account: {e}"))?;
        let me = Chat::User(me);
        if let Ok(mut slot) = self.me.lock() {
            *slot = Some(me.pack());
        }
        Ok(SelfIdentity {
            id: me.id(),
            username: me.username().map(str::to_string),
            display_name: me.name().to_string(),
        })
    }

    async fn poll_events(&self) -> Result<Vec<InboundMessage>> {
        let client = self.client()?;
        let update = match tokio::time::timeout(self.poll_timeout, client.next_update()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(res) => res.map_err(|e| anyhow!("receiving updates: {e}"))?,
        };
        let Update::NewMessage(message) = update else {
            return Ok(Vec::new());
        };
        let chat = message.chat();
        if matches!(chat, Chat::User(_)) {
            debug!(chat_id = chat.id(), "skipping private chat message");
            return Ok(Vec::new());
        }
        self.remember(&chat);
        Ok(vec![inbound(&message)])
    }

    async fn resolve_entity(&self, name: &str) -> Result<SourceDescriptor> {
        let name = normalize_source_name(name)?;
        let matches = |d: &SourceDescriptor| d.display_name() == name || d.public_handle() == Some(&name);
        if let Some(found) = self.scan_dialogs().await?.into_iter().find(|d| matches(d)) {
            return Ok(found);
        }
        if looks_like_handle(&name) {
            let client = self.client()?;
            if let Some(chat) = client
                .resolve_username(&name)
                .await
                .map_err(|e| anyhow!("resolving @{name}: {e}"))?
            {
                self.remember(&chat);
                return Ok(descriptor(&chat));
            }
        }
        bail!("'{name}' is not among this account's chats and is not a public handle")
    }
}

#[async_trait]
impl Forwarder for UserAccountTransport {
    async fn forward_to_self(&self, source: &SourceDescriptor, message_id: i64) -> Result<()> {
        let client = self.client()?;
        let me = self
            .me
            .lock()
            .map_err(|_| anyhow!("self chat lock poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("own account not known yet"))?;
        let from = self
            .packed(source.id)
            .ok_or_else(|| anyhow!("source {} not seen on this connection", source.id))?;
        let id = i32::try_from(message_id).context("message id out of range")?;
        client
            .forward_messages(me, &[id], from)
            .await
            .map_err(|e| anyhow!("forwarding to Saved Messages: {e}"))?;
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for UserAccountTransport {
    async fn list_chats(&self) -> Result<Vec<SourceDescriptor>> {
        self.scan_dialogs().await
    }
}
