//! Supported export platforms.
//!
//! The platform set is closed: every platform has exactly one processor,
//! chosen by `match` rather than by name lookup at runtime.

use serde::{Deserialize, Serialize};

/// How a platform's restored output is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Restored media items packed into a new archive.
    MediaArchive,
    /// One generated HTML document.
    Document,
}

/// A social platform whose exports can be restored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Snapchat,
    Instagram,
    TikTok,
    Facebook,
    Twitter,
    WhatsApp,
}

impl Platform {
    /// All platforms, in catalog order.
    pub const ALL: [Self; 6] = [
        Self::Snapchat,
        Self::Instagram,
        Self::WhatsApp,
        Self::Facebook,
        Self::TikTok,
        Self::Twitter,
    ];

    /// Human-readable platform name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Snapchat => "Snapchat",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Facebook => "Facebook",
            Self::Twitter => "Twitter/X",
            Self::WhatsApp => "WhatsApp",
        }
    }

    /// Prefix used for generated filenames.
    #[must_use]
    pub const fn file_prefix(self) -> &'static str {
        match self {
            Self::Snapchat => "snap",
            Self::Instagram => "insta",
            Self::TikTok => "tiktok",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
            Self::WhatsApp => "whatsapp",
        }
    }

    /// Keys that hold the record array in this platform's JSON exports.
    #[must_use]
    pub const fn record_keys(self) -> &'static [&'static str] {
        match self {
            Self::Snapchat => &["Saved Media", "Memories", "memories", "Media", "media"],
            Self::Instagram => &[
                "ig_stories",
                "stories",
                "ig_posts",
                "posts",
                "media",
                "photos",
                "videos",
            ],
            Self::TikTok => &["VideoList", "Videos", "videos", "ItemFavoriteList", "posts"],
            Self::Facebook => &["messages", "posts", "status_updates"],
            Self::Twitter => &["tweets", "tweet", "statuses", "data"],
            Self::WhatsApp => &["messages"],
        }
    }

    /// Archive folders where this platform conventionally stores media.
    #[must_use]
    pub const fn media_folders(self) -> &'static [&'static str] {
        match self {
            Self::Snapchat => &["memories", "chat_media", "snap_media", "media"],
            Self::Instagram => &["media/stories", "media/posts", "stories", "posts", "media"],
            Self::TikTok => &["videos", "video", "media"],
            Self::Facebook => &["photos", "videos", "gifs", "files"],
            Self::Twitter => &["tweets_media", "tweet_media", "media"],
            Self::WhatsApp => &["media", "WhatsApp Images", "WhatsApp Video"],
        }
    }

    /// Whether an archive file name is one of this platform's well-known
    /// metadata documents.
    #[must_use]
    pub fn is_metadata_document(self, file_name: &str) -> bool {
        let name = file_name.to_ascii_lowercase();
        match self {
            Self::Snapchat => name == "memories_history.json",
            Self::Instagram => {
                ["stories.json", "reels.json", "media.json"].contains(&name.as_str())
                    || (name.starts_with("posts") && name.ends_with(".json"))
            }
            Self::TikTok => name.starts_with("user_data") && name.ends_with(".json"),
            Self::Facebook => {
                name.starts_with("message_") && (name.ends_with(".json") || name.ends_with(".html"))
            }
            Self::Twitter => ["tweets.js", "tweet.js", "tweets.json"].contains(&name.as_str()),
            Self::WhatsApp => false,
        }
    }

    /// Output delivered by this platform's processor.
    #[must_use]
    pub const fn output_mode(self) -> OutputMode {
        match self {
            Self::Facebook | Self::Twitter => OutputMode::Document,
            _ => OutputMode::MediaArchive,
        }
    }

    /// Whether a working processor exists.
    #[must_use]
    pub const fn is_available(self) -> bool {
        !matches!(self, Self::WhatsApp)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "snapchat" | "snap" => Ok(Self::Snapchat),
            "instagram" | "insta" => Ok(Self::Instagram),
            "tiktok" => Ok(Self::TikTok),
            "facebook" | "messenger" => Ok(Self::Facebook),
            "twitter" | "x" => Ok(Self::Twitter),
            "whatsapp" => Ok(Self::WhatsApp),
            _ => Err(format!(
                "Unknown platform: {s}. Use: snapchat, instagram, tiktok, facebook, twitter, whatsapp"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_str() {
        assert_eq!("snap".parse::<Platform>(), Ok(Platform::Snapchat));
        assert_eq!("X".parse::<Platform>(), Ok(Platform::Twitter));
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_output_modes() {
        assert_eq!(Platform::Twitter.output_mode(), OutputMode::Document);
        assert_eq!(Platform::Snapchat.output_mode(), OutputMode::MediaArchive);
        assert!(!Platform::WhatsApp.is_available());
    }

    #[test]
    fn test_metadata_documents() {
        assert!(Platform::Snapchat.is_metadata_document("memories_history.json"));
        assert!(Platform::Instagram.is_metadata_document("posts_1.json"));
        assert!(Platform::Facebook.is_metadata_document("message_1.html"));
        assert!(!Platform::Twitter.is_metadata_document("account.js"));
    }
}
