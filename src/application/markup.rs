//! Markup export extraction.
//!
//! Platforms that export HTML are read with an ordered cascade of
//! structural selectors. When no selector matches, generic block elements
//! whose text length falls in a plausible message range are taken instead.
//! That fallback is a heuristic and can over- or under-match unusual markup.

use scraper::{ElementRef, Html, Selector};

use crate::domain::{ExportRecord, Platform};

use super::parser::parse_timestamp_str;

/// Inclusive text length bounds for the block fallback.
const FALLBACK_MIN_CHARS: usize = 10;
const FALLBACK_MAX_CHARS: usize = 1000;

const FALLBACK_BLOCKS: &str = "p, div, li, article, section, blockquote, td";

/// One structural layout: a message block and its parts.
#[derive(Debug, Clone, Copy)]
pub struct MessageLayout {
    pub block: &'static str,
    pub sender: Option<&'static str>,
    pub text: Option<&'static str>,
    pub time: Option<&'static str>,
}

const FACEBOOK_LAYOUTS: &[MessageLayout] = &[
    MessageLayout {
        block: "div._a6-g",
        sender: Some("div._a6-h"),
        text: Some("div._a6-p"),
        time: Some("div._a6-o"),
    },
    MessageLayout {
        block: "div.pam._3-95._2pi0._2lej.uiBoxWhite.noborder",
        sender: Some("div._3-96._2pio._2lek._2lel"),
        text: Some("div._3-96._2let"),
        time: Some("div._3-94._2lem"),
    },
    MessageLayout {
        block: "div.message",
        sender: Some("span.user"),
        text: Some("p"),
        time: Some("span.meta"),
    },
];

const TWITTER_LAYOUTS: &[MessageLayout] = &[
    MessageLayout {
        block: "div.tweet",
        sender: Some(".username"),
        text: Some(".tweet-text"),
        time: Some("time"),
    },
    MessageLayout {
        block: "article",
        sender: None,
        text: Some("p"),
        time: Some("time"),
    },
];

const GENERIC_LAYOUTS: &[MessageLayout] = &[MessageLayout {
    block: "div.message",
    sender: Some(".sender"),
    text: Some(".text"),
    time: Some("time"),
}];

/// Selector cascade for a platform, most specific first.
#[must_use]
pub const fn layouts_for(platform: Platform) -> &'static [MessageLayout] {
    match platform {
        Platform::Facebook => FACEBOOK_LAYOUTS,
        Platform::Twitter => TWITTER_LAYOUTS,
        _ => GENERIC_LAYOUTS,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn first_text(block: ElementRef<'_>, selector: Option<&str>) -> Option<String> {
    let selector = Selector::parse(selector?).ok()?;
    block
        .select(&selector)
        .map(element_text)
        .find(|t| !t.is_empty())
}

fn time_of(block: ElementRef<'_>, selector: Option<&str>) -> Option<chrono::DateTime<chrono::Utc>> {
    let selector = Selector::parse(selector?).ok()?;
    let element = block.select(&selector).next()?;
    element
        .value()
        .attr("datetime")
        .and_then(parse_timestamp_str)
        .or_else(|| parse_timestamp_str(&element_text(element)))
}

fn record_from_block(block: ElementRef<'_>, layout: &MessageLayout, index: usize) -> Option<ExportRecord> {
    let text = first_text(block, layout.text).or_else(|| {
        let all = element_text(block);
        (!all.is_empty()).then_some(all)
    })?;

    Some(ExportRecord {
        id: block
            .value()
            .attr("id")
            .map_or_else(|| format!("msg{}", index + 1), str::to_string),
        timestamp: time_of(block, layout.time),
        sender: first_text(block, layout.sender),
        text: Some(text),
        ..Default::default()
    })
}

/// Applies one layout, returning nothing when its block selector misses.
#[must_use]
pub fn apply_layout(document: &Html, layout: &MessageLayout) -> Vec<ExportRecord> {
    let Ok(selector) = Selector::parse(layout.block) else {
        return Vec::new();
    };
    document
        .select(&selector)
        .enumerate()
        .filter_map(|(i, block)| record_from_block(block, layout, i))
        .collect()
}

fn has_block_child(element: ElementRef<'_>, blocks: &Selector) -> bool {
    element
        .children()
        .filter_map(ElementRef::wrap)
        .any(|child| blocks.matches(&child))
}

/// Scans innermost block elements with plausible message-sized text.
#[must_use]
pub fn fallback_blocks(document: &Html) -> Vec<ExportRecord> {
    let Ok(blocks) = Selector::parse(FALLBACK_BLOCKS) else {
        return Vec::new();
    };

    document
        .select(&blocks)
        .filter(|el| !has_block_child(*el, &blocks))
        .map(element_text)
        .filter(|text| (FALLBACK_MIN_CHARS..=FALLBACK_MAX_CHARS).contains(&text.chars().count()))
        .enumerate()
        .map(|(i, text)| ExportRecord {
            id: format!("block{}", i + 1),
            text: Some(text),
            ..Default::default()
        })
        .collect()
}

/// Extracts message records from an HTML export.
#[must_use]
pub fn extract_records(markup: &str, platform: Platform) -> Vec<ExportRecord> {
    let document = Html::parse_document(markup);

    for layout in layouts_for(platform) {
        let records = apply_layout(&document, layout);
        if !records.is_empty() {
            tracing::debug!(selector = layout.block, count = records.len(), "Markup layout matched");
            return records;
        }
    }

    let records = fallback_blocks(&document);
    tracing::debug!(count = records.len(), "Markup fallback scan");
    records
}

/// The document's `<title>`, or its first `<h1>`.
#[must_use]
pub fn document_title(markup: &str) -> Option<String> {
    let document = Html::parse_document(markup);
    ["title", "h1"].iter().find_map(|tag| {
        let selector = Selector::parse(tag).ok()?;
        document
            .select(&selector)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSENGER: &str = r#"<html><head><title>Alex Doe</title></head><body>
        <div class="message"><span class="user">Alex</span><span class="meta">Jan 5, 2020, 3:04 PM</span><p>See you tomorrow</p></div>
        <div class="message"><span class="user">Sam</span><span class="meta">Jan 5, 2020, 3:10 PM</span><p>Sounds good</p></div>
    </body></html>"#;

    #[test]
    fn test_structural_selector() {
        let records = extract_records(MESSENGER, Platform::Facebook);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sender.as_deref(), Some("Alex"));
        assert_eq!(records[1].text.as_deref(), Some("Sounds good"));
        assert_eq!(
            records[0].timestamp.map(|t| t.to_rfc3339()).as_deref(),
            Some("2020-01-05T15:04:00+00:00")
        );
    }

    #[test]
    fn test_fallback_length_bounds() {
        let longest = "y".repeat(1000);
        let too_long = "x".repeat(1001);
        let markup = format!(
            "<body><p>nine char</p><p>ten chars!</p><p>{longest}</p><p>{too_long}</p>\
             <div><p>a nested paragraph</p></div></body>"
        );
        let records = extract_records(&markup, Platform::Facebook);
        let texts = records
            .iter()
            .filter_map(|r| r.text.as_deref())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["ten chars!", longest.as_str(), "a nested paragraph"]);
    }

    #[test]
    fn test_document_title() {
        assert_eq!(document_title(MESSENGER).as_deref(), Some("Alex Doe"));
        assert_eq!(document_title("<p>no title here</p>"), None);
    }
}
