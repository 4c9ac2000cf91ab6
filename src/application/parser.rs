//! Field extraction for heterogeneous export records.
//!
//! Export schemas drift between platforms and export versions, so every
//! canonical field is read from an ordered list of candidate keys.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::domain::{
    ExportRecord, GeoLocation, ImageOverlay, MediaKind, OverlayDirective, OverlaySource, Position,
    TextOverlay,
};

/// Keys that identify a record.
pub const ID_KEYS: &[&str] = &[
    "id",
    "id_str",
    "MemoryKey",
    "Memory Key",
    "Media Id",
    "media_id",
    "key",
    "Key",
    "pk",
    "ID",
    "uuid",
];

const TIMESTAMP_KEYS: &[&str] = &[
    "Date",
    "date",
    "timestamp",
    "timestamp_ms",
    "created_at",
    "creation_timestamp",
    "taken_at",
    "Date Created",
    "Created",
    "time",
    "date_time",
];

const MEDIA_PATH_KEYS: &[&str] = &[
    "media_path",
    "Media Path",
    "path",
    "uri",
    "file",
    "filename",
    "Link",
    "Download Link",
    "media_url",
];

const CAPTION_KEYS: &[&str] = &["caption", "Caption", "title", "Title", "description", "Desc"];

const TEXT_KEYS: &[&str] = &["full_text", "text", "content", "body", "message", "Content"];

const SENDER_KEYS: &[&str] = &["sender_name", "sender", "from", "From", "author", "screen_name", "user"];

const REPLY_KEYS: &[&str] = &[
    "in_reply_to_status_id_str",
    "in_reply_to_status_id",
    "reply_to",
    "in_reply_to",
    "reply_to_id",
    "parent_id",
];

const KIND_KEYS: &[&str] = &["Media Type", "media_type", "type", "kind"];

const OVERLAY_KEYS: &[&str] = &["overlays", "Overlays", "stickers", "Stickers", "overlay", "Overlay"];

const LOCATION_KEYS: &[&str] = &["Location", "location", "place", "geo"];

/// Millisecond timestamps are above this magnitude.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// First non-empty string (or number rendered as string) under `keys`.
#[must_use]
pub fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match obj.get(*key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Whether an object carries an id-like field.
#[must_use]
pub fn has_id_field(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| ID_KEYS.iter().any(|k| obj.contains_key(*k)))
}

/// Parses a timestamp from the formats seen across exports.
#[must_use]
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(from_epoch),
        Value::String(s) => parse_timestamp_str(s),
        _ => None,
    }
}

fn from_epoch(value: i64) -> Option<DateTime<Utc>> {
    if value.abs() >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(value)
    } else {
        DateTime::from_timestamp(value, 0)
    }
}

/// Parses a timestamp string.
#[must_use]
pub fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Twitter: "Wed Oct 10 20:19:24 +0000 2018"
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }

    // Snapchat: "2020-01-01 12:00:00 UTC"
    let naive_source = s.strip_suffix(" UTC").unwrap_or(s);
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y:%m:%d %H:%M:%S",
        "%b %d, %Y, %I:%M %p",
        "%b %d, %Y %I:%M:%S %p",
        "%b %d, %Y, %I:%M:%S %p",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_source, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(naive_source, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }

    s.parse::<i64>().ok().and_then(from_epoch)
}

/// Parses a location object or Snapchat's `"Latitude, Longitude: a, b"`.
#[must_use]
pub fn parse_location(value: &Value) -> Option<GeoLocation> {
    match value {
        Value::String(s) => {
            let coords = s.rsplit(':').next()?;
            let mut parts = coords.split(',').map(|p| p.trim().parse::<f64>());
            let latitude = parts.next()?.ok()?;
            let longitude = parts.next()?.ok()?;
            valid_location(latitude, longitude)
        }
        Value::Object(obj) => {
            let latitude = number_of(obj, &["latitude", "lat", "Latitude"])?;
            let longitude = number_of(obj, &["longitude", "lng", "lon", "Longitude"])?;
            valid_location(latitude, longitude)
        }
        _ => None,
    }
}

fn valid_location(latitude: f64, longitude: f64) -> Option<GeoLocation> {
    let in_range = (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude);
    // 0,0 is what exports write when location is unknown
    let is_null_island = latitude == 0.0 && longitude == 0.0;
    (in_range && !is_null_island).then_some(GeoLocation {
        latitude,
        longitude,
    })
}

fn number_of(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match obj.get(*k)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn parse_kind(obj: &Map<String, Value>) -> Option<MediaKind> {
    let raw = first_string(obj, KIND_KEYS)?.to_ascii_lowercase();
    if raw.contains("video") {
        Some(MediaKind::Video)
    } else if raw.contains("image") || raw.contains("photo") || raw.contains("picture") {
        Some(MediaKind::Image)
    } else {
        None
    }
}

/// Reads an overlay position, preferring nested `position.{x,y}` over
/// flat `x`/`y`.
fn parse_position(obj: &Map<String, Value>) -> (f32, f32) {
    let nested = obj.get("position").and_then(Value::as_object);
    let x = nested
        .and_then(|p| number_of(p, &["x", "left"]))
        .or_else(|| number_of(obj, &["x", "left"]))
        .unwrap_or(0.0);
    let y = nested
        .and_then(|p| number_of(p, &["y", "top"]))
        .or_else(|| number_of(obj, &["y", "top"]))
        .unwrap_or(0.0);
    (x as f32, y as f32)
}

/// Fractional values inside the unit range mean "relative to the base".
fn is_relative(values: &[f32]) -> bool {
    values.iter().all(|v| (0.0..=1.0).contains(v)) && values.iter().any(|v| v.fract() != 0.0)
}

fn parse_overlay(value: &Value, default_font_size: f32) -> Option<OverlayDirective> {
    if let Value::String(reference) = value {
        return Some(full_frame_overlay(reference));
    }
    let obj = value.as_object()?;
    let (x, y) = parse_position(obj);
    let width = number_of(obj, &["width", "w"]).map(|v| v as f32);
    let height = number_of(obj, &["height", "h"]).map(|v| v as f32);

    let mut dims = vec![x, y];
    dims.extend(width);
    dims.extend(height);
    let position = Position {
        x,
        y,
        relative: is_relative(&dims),
    };

    if let Some(text) = first_string(obj, &["text", "caption", "label"]) {
        return Some(OverlayDirective::Text(TextOverlay {
            text,
            position,
            font_size: number_of(obj, &["font_size", "fontSize", "size"])
                .map_or(default_font_size, |v| v as f32),
            color: first_string(obj, &["color", "colour", "fill"])
                .unwrap_or_else(|| "#FFFFFF".to_string()),
            max_width: number_of(obj, &["max_width", "maxWidth"]).map(|v| v as f32),
        }));
    }

    let reference = first_string(obj, &["url", "src", "path", "uri", "image", "data"])?;
    Some(OverlayDirective::Image(ImageOverlay {
        source: OverlaySource::from_reference(&reference),
        position,
        width,
        height,
        opacity: number_of(obj, &["opacity", "alpha"]).map_or(1.0, |v| v as f32),
    }))
}

/// Image overlay covering the whole base.
#[must_use]
pub fn full_frame_overlay(reference: &str) -> OverlayDirective {
    OverlayDirective::Image(ImageOverlay {
        source: OverlaySource::from_reference(reference),
        position: Position {
            x: 0.0,
            y: 0.0,
            relative: true,
        },
        width: Some(1.0),
        height: Some(1.0),
        opacity: 1.0,
    })
}

fn parse_overlays(obj: &Map<String, Value>, default_font_size: f32) -> Vec<OverlayDirective> {
    let parse = |v: &Value| parse_overlay(v, default_font_size);
    OVERLAY_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .flat_map(|v| match v {
            Value::Array(items) => items.iter().filter_map(parse).collect::<Vec<_>>(),
            other => parse(other).into_iter().collect(),
        })
        .collect()
}

/// Pulls an id out of a Snapchat-style download link query (`sid`/`mid`).
fn id_from_link(link: &str) -> Option<String> {
    let query = link.split_once('?')?.1;
    ["sid", "mid"].iter().find_map(|name| {
        query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == *name && !v.is_empty()).then(|| v.to_string())
        })
    })
}

fn is_remote(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// Converts one raw JSON element into an export record.
///
/// Elements without any id-like field get `fallback_id`. Text overlays
/// that do not specify a size use `default_font_size`.
#[must_use]
pub fn record_from_value(value: &Value, fallback_id: &str, default_font_size: f32) -> ExportRecord {
    let Some(obj) = value.as_object() else {
        return ExportRecord {
            id: fallback_id.to_string(),
            text: value.as_str().map(str::to_string),
            ..Default::default()
        };
    };

    let media_reference = first_string(obj, MEDIA_PATH_KEYS);
    let id = first_string(obj, ID_KEYS)
        .or_else(|| media_reference.as_deref().and_then(id_from_link))
        .unwrap_or_else(|| fallback_id.to_string());

    let timestamp = TIMESTAMP_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(parse_timestamp);

    let location = LOCATION_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .find_map(parse_location)
        .or_else(|| parse_location(value));

    ExportRecord {
        id,
        timestamp,
        media_path: media_reference.filter(|r| !is_remote(r)),
        media_kind: parse_kind(obj),
        caption: first_string(obj, CAPTION_KEYS),
        overlays: parse_overlays(obj, default_font_size),
        location,
        sender: first_string(obj, SENDER_KEYS),
        reply_to: first_string(obj, REPLY_KEYS),
        text: first_string(obj, TEXT_KEYS),
        source: None,
    }
}
