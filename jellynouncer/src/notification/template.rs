//! Rendering of queue entries into chat payloads.

use serde_json::{Value, json};

use super::entry::NotificationEntry;
use crate::domain::{ChangeSet, NotificationCategory};
use crate::quality::{format_file_size, summarize};
use crate::Result;

/// Discord accepts at most this many embeds per message.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;

const COLOR_NEW_ITEM: u32 = 0x66CC33;
const COLOR_UPGRADE: u32 = 0x3498DB;
const COLOR_DELETION: u32 = 0xE74C3C;

/// Turns one or more entries into a single payload.
pub trait NotificationTemplate: Send + Sync {
    fn render(&self, entries: &[NotificationEntry]) -> Result<Value>;
}

/// Discord embed rendering.
#[derive(Debug, Clone, Default)]
pub struct DiscordEmbedTemplate {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

impl DiscordEmbedTemplate {
    pub fn new(username: Option<String>, avatar_url: Option<String>) -> Self {
        Self {
            username,
            avatar_url,
        }
    }

    fn get_color(category: NotificationCategory) -> u32 {
        match category {
            NotificationCategory::NewItem => COLOR_NEW_ITEM,
            NotificationCategory::Upgrade => COLOR_UPGRADE,
            NotificationCategory::Deletion => COLOR_DELETION,
        }
    }

    fn title(entry: &NotificationEntry) -> String {
        let kind = entry
            .kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "Item".to_string());
        match entry.category {
            NotificationCategory::NewItem => format!("New {} Added", kind),
            NotificationCategory::Upgrade => format!("{} Upgraded", kind),
            NotificationCategory::Deletion => format!("{} Deleted", kind),
        }
    }

    fn build_embed(entry: &NotificationEntry) -> Value {
        let mut description = format!("**{}**", entry.item_name);
        if let Some(overview) = entry.item.as_ref().and_then(|i| i.overview.as_deref()) {
            description.push_str("\n\n");
            description.push_str(&truncate(overview, 300));
        }

        let mut fields = Vec::new();
        if let Some(item) = &entry.item
            && entry.category != NotificationCategory::Deletion
        {
            let p = &item.profile;
            if let Some(res) = &p.resolution {
                fields.push(field("Resolution", res));
            }
            if let Some(codec) = &p.video_codec {
                fields.push(field("Video", codec));
            }
            if let Some(codec) = &p.audio_codec {
                let audio = match &p.audio_channels {
                    Some(ch) => format!("{} {}", codec, ch),
                    None => codec.clone(),
                };
                fields.push(field("Audio", &audio));
            }
            if p.hdr {
                fields.push(field("HDR", "Yes"));
            }
            if let Some(size) = item.size {
                fields.push(field("Size", &format_file_size(size)));
            }
            if !item.genres.is_empty() {
                fields.push(field("Genres", &item.genres.join(", ")));
            }
        }
        if let Some(changes) = &entry.changes {
            fields.extend(change_fields(changes));
        }

        json!({
            "title": Self::title(entry),
            "description": description,
            "color": Self::get_color(entry.category),
            "timestamp": entry.enqueued_at.to_rfc3339(),
            "fields": fields,
            "footer": { "text": format!("Jellynouncer | {}", entry.item_id) }
        })
    }

    /// Embed closing a grouped message whose entries did not all fit.
    fn overflow_embed(rest: &[NotificationEntry]) -> Value {
        let names: Vec<&str> = rest.iter().map(|e| e.item_name.as_str()).collect();
        json!({
            "title": format!("...and {} more", rest.len()),
            "description": truncate(&names.join("\n"), 4000),
            "color": Self::get_color(rest[0].category),
        })
    }
}

impl NotificationTemplate for DiscordEmbedTemplate {
    fn render(&self, entries: &[NotificationEntry]) -> Result<Value> {
        if entries.is_empty() {
            return Err(crate::Error::validation("nothing to render"));
        }

        let embeds: Vec<Value> = if entries.len() <= MAX_EMBEDS_PER_MESSAGE {
            entries.iter().map(Self::build_embed).collect()
        } else {
            let (head, rest) = entries.split_at(MAX_EMBEDS_PER_MESSAGE - 1);
            head.iter()
                .map(Self::build_embed)
                .chain(std::iter::once(Self::overflow_embed(rest)))
                .collect()
        };

        let mut payload = json!({ "embeds": embeds });
        if entries.len() > 1 {
            payload["content"] = json!(format!("{} library updates", entries.len()));
        }
        if let Some(username) = &self.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        Ok(payload)
    }
}

fn field(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value, "inline": true })
}

fn change_fields(changes: &ChangeSet) -> Vec<Value> {
    let mut fields: Vec<Value> = changes
        .values()
        .map(|c| {
            let arrow = if c.is_upgrade { "⬆" } else { "→" };
            json!({
                "name": c.kind.label(),
                "value": format!(
                    "{} {} {}",
                    c.old_value.as_deref().unwrap_or("unknown"),
                    arrow,
                    c.new_value.as_deref().unwrap_or("unknown"),
                ),
                "inline": false
            })
        })
        .collect();
    fields.push(json!({ "name": "Summary", "value": truncate(&summarize(changes), 1024), "inline": false }));
    fields
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
