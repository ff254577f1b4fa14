// src/oracle/prompts.rs
//! Prompt templates and slot rendering.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;

/// Relevance instruction. Slots: `user_query`, `message_text`.
pub const RELEVANCE_TEMPLATE: &str = "\
You are an expert at analyzing Telegram channel messages. Your task is to identify and extract messages that are related to a user's query.
Given the user's query and a message, determine if the message is relevant to the query.
Respond with \"RELEVANT\" if the message is related to the query, otherwise respond with \"NOT RELEVANT\".
The user's query is: {user_query}
The message to analyze is: {message_text}
";

/// Free-form analysis. Slots: `channel_name`, `sender_name`, `message_date`,
/// `message_text`, `user_query`.
pub const DEFAULT_ANALYSIS_TEMPLATE: &str = "\
You are an intelligent message analyzer. Analyze the following Telegram message and provide insights:

Message Details:
Channel: {channel_name}
Sender: {sender_name}
Date: {message_date}
Text: {message_text}

Please provide:
1. A brief summary
2. Key topics or themes
3. Sentiment analysis
4. Any important entities mentioned
5. Overall assessment

Keep your response concise and informative.";

static SLOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_]+)\}").expect("slot regex"));

/// Substitute `{name}` slots in one pass, so text inserted for one slot is
/// never scanned for another. Unknown slots are left as written.
pub fn render<'a>(template: &'a str, slots: &[(&str, &str)]) -> Cow<'a, str> {
    SLOT.replace_all(template, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        slots
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| (*v).to_string())
            .unwrap_or_else(|| caps[0].to_string())
    })
}

pub fn relevance_prompt(message_text: &str, user_query: &str) -> String {
    render(
        RELEVANCE_TEMPLATE,
        &[("user_query", user_query), ("message_text", message_text)],
    )
    .into_owned()
}
