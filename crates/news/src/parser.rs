//! Parses RSS/Atom bytes into normalised news items.

use campusnet_config::NewsSourceConfig;
use campusnet_database::format_timestamp;
use tracing::debug;
use url::Url;

use crate::NewsError;

pub const MAX_SUMMARY_CHARS: usize = 500;
const MAX_TITLE_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsItem {
    pub source: String,
    pub category: Option<String>,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
}

/// Parse a feed document. Entries without a title or a usable http(s) link
/// are dropped; relative links are resolved against the source url.
pub fn parse_feed(bytes: &[u8], source: &NewsSourceConfig) -> Result<Vec<NewsItem>, NewsError> {
    let feed = feed_rs::parser::parse(bytes).map_err(|e| NewsError::Parse(e.to_string()))?;
    let base = Url::parse(&source.url).ok();

    let mut items = Vec::with_capacity(feed.entries.len());
    let mut dropped = 0usize;

    for entry in feed.entries {
        let title = entry
            .title
            .as_ref()
            .map(|text| truncate_chars(&strip_html(&text.content), MAX_TITLE_CHARS))
            .filter(|title| !title.is_empty());

        let link = entry
            .links
            .iter()
            .find_map(|link| absolute_http_url(&link.href, base.as_ref()))
            .or_else(|| absolute_http_url(&entry.id, None));

        let (Some(title), Some(link)) = (title, link) else {
            dropped += 1;
            continue;
        };

        let summary = entry
            .summary
            .as_ref()
            .map(|text| text.content.clone())
            .or_else(|| entry.content.as_ref().and_then(|content| content.body.clone()))
            .map(|raw| truncate_chars(&strip_html(&raw), MAX_SUMMARY_CHARS))
            .filter(|summary| !summary.is_empty());

        let image_url = entry
            .media
            .iter()
            .flat_map(|media| {
                media
                    .content
                    .iter()
                    .filter_map(|content| content.url.as_ref().map(|url| url.to_string()))
                    .chain(media.thumbnails.iter().map(|thumb| thumb.image.uri.clone()))
            })
            .find_map(|candidate| absolute_http_url(&candidate, base.as_ref()));

        let category = source
            .category
            .clone()
            .or_else(|| entry.categories.first().map(|category| category.term.clone()));

        let published_at = entry.published.or(entry.updated).map(format_timestamp);

        items.push(NewsItem {
            source: source.name.clone(),
            category,
            title,
            link,
            summary,
            image_url,
            published_at,
        });
    }

    debug!(source = %source.name, kept = items.len(), dropped, "parsed feed");
    Ok(items)
}

fn absolute_http_url(candidate: &str, base: Option<&Url>) -> Option<String> {
    let candidate = candidate.trim();
    if candidate.is_empty() {
        return None;
    }

    let parsed = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(candidate).ok()?,
        Err(_) => return None,
    };

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed.to_string()),
        _ => None,
    }
}

/// Remove markup, decode common entities and collapse whitespace.
pub fn strip_html(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut in_tag = false;

    for ch in input.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }

    decode_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('&') {
        output.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let decoded = after.find(';').filter(|end| *end <= 10).and_then(|end| {
            decode_entity(&after[..end]).map(|ch| (ch, end))
        });

        match decoded {
            Some((ch, end)) => {
                output.push(ch);
                rest = &after[end + 1..];
            }
            None => {
                output.push('&');
                rest = after;
            }
        }
    }

    output.push_str(rest);
    output
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let cut: String = value.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}
