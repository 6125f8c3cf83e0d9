//! Serializes a buffered conversation into a completion request.

use vivi_agent::{Content, ContentPart, Message};
use vivi_core::{Author, MessageRecord};

/// System persona first, then one message per record in arrival order.
///
/// Bot records become `assistant` turns, everyone else `user`. Each turn
/// is attributed (`-sent by name`) so the model can tell speakers apart.
pub fn build(persona: &str, persona_name: &str, records: &[MessageRecord]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(records.len() + 1);
    messages.push(Message::system(persona));

    for record in records {
        let content = to_content(record, persona_name);
        messages.push(match record.author {
            Author::Bot => Message::assistant(content),
            Author::External { .. } => Message::user(content),
        });
    }

    messages
}

fn to_content(record: &MessageRecord, persona_name: &str) -> Content {
    let text = attributed_text(record, persona_name);
    if record.attachment_refs.is_empty() {
        return Content::Text(text);
    }

    let mut parts = Vec::with_capacity(record.attachment_refs.len() + 1);
    parts.push(ContentPart::Text { text });
    parts.extend(
        record
            .attachment_refs
            .iter()
            .map(|img| ContentPart::image(img.url())),
    );
    Content::Parts(parts)
}

fn attributed_text(record: &MessageRecord, persona_name: &str) -> String {
    let speaker = match &record.author {
        Author::Bot => persona_name,
        Author::External { name, .. } => name.as_str(),
    };
    let mut text = format!("{} -sent by {}", record.content, speaker);
    if let Some(target) = &record.reply_target {
        text.push_str(&format!(" (replying to \"{}\")", target));
    }
    text
}
