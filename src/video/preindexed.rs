//! Override table for demo content.
//!
//! Some showcase videos live on YouTube, which the video service cannot
//! ingest by URL. They were indexed ahead of time and are analyzed directly
//! by their indexed id. This is a demo affordance, not production routing:
//! an empty table turns it off.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreindexedVideo {
    pub url: &'static str,
    pub video_id: &'static str,
    pub label: &'static str,
}

pub const DEMO_VIDEOS: &[PreindexedVideo] = &[PreindexedVideo {
    url: "https://www.youtube.com/watch?v=KhLensmQfEQ",
    video_id: "696c12c8684c0432bbde7e69",
    label: "walmart",
}];

/// Indexed id used for any other YouTube link.
pub const DEMO_YOUTUBE_FALLBACK: PreindexedVideo = PreindexedVideo {
    url: "",
    video_id: "696c0736058486b3c418d29d",
    label: "arcteryx",
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreindexedMatch {
    pub video_id: String,
    pub label: String,
    pub exact: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PreindexedTable {
    entries: Vec<PreindexedVideo>,
    youtube_fallback: Option<PreindexedVideo>,
}

impl PreindexedTable {
    pub fn demo() -> Self {
        Self {
            entries: DEMO_VIDEOS.to_vec(),
            youtube_fallback: Some(DEMO_YOUTUBE_FALLBACK),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        if crate::config::parse_env_bool("DISABLE_PREINDEXED_VIDEOS") {
            Self::empty()
        } else {
            Self::demo()
        }
    }

    pub fn lookup(&self, source_url: &str) -> Option<PreindexedMatch> {
        let url = source_url.trim();
        if let Some(entry) = self.entries.iter().find(|entry| entry.url == url) {
            return Some(PreindexedMatch {
                video_id: entry.video_id.to_string(),
                label: entry.label.to_string(),
                exact: true,
            });
        }
        let fallback = self.youtube_fallback.as_ref()?;
        is_youtube(url).then(|| PreindexedMatch {
            video_id: fallback.video_id.to_string(),
            label: fallback.label.to_string(),
            exact: false,
        })
    }
}

fn is_youtube(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.contains("youtube.com") || lower.contains("youtu.be")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_entry_wins_over_fallback() {
        let table = PreindexedTable::demo();
        let hit = table
            .lookup("https://www.youtube.com/watch?v=KhLensmQfEQ")
            .expect("listed");
        assert_eq!(hit.video_id, "696c12c8684c0432bbde7e69");
        assert!(hit.exact);
    }

    #[test]
    fn other_youtube_links_use_fallback() {
        let table = PreindexedTable::demo();
        let hit = table.lookup("https://YOUTU.BE/abc123").expect("fallback");
        assert_eq!(hit.video_id, "696c0736058486b3c418d29d");
        assert!(!hit.exact);
    }

    #[test]
    fn regular_urls_and_empty_table_miss() {
        assert!(PreindexedTable::demo()
            .lookup("https://cdn.example.com/clip.mp4")
            .is_none());
        assert!(PreindexedTable::empty()
            .lookup("https://www.youtube.com/watch?v=KhLensmQfEQ")
            .is_none());
    }
}
