//! Video library state
//!
//! Mirrors the relay's list of uploaded videos and the room's current
//! selection. The upload endpoint itself is a collaborator; only filenames
//! and progress events cross into the client.

/// Available videos and the active selection
#[derive(Debug, Default)]
pub struct VideoLibrary {
    videos: Vec<String>,
    selected: Option<String>,
}

impl VideoLibrary {
    /// Empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list from an `available-videos` event
    pub fn set_videos(&mut self, videos: Vec<String>) {
        self.videos = videos;
    }

    /// Record a selection (local action or `video-selected` event)
    pub fn select(&mut self, filename: impl Into<String>) {
        let filename = filename.into();
        if !self.videos.contains(&filename) {
            self.videos.push(filename.clone());
        }
        self.selected = Some(filename);
    }

    /// Apply a `video-deleted` event; returns whether the active selection
    /// was deleted
    pub fn delete(&mut self, filename: &str) -> bool {
        self.videos.retain(|v| v != filename);
        if self.selected.as_deref() == Some(filename) {
            self.selected = None;
            return true;
        }
        false
    }

    /// Current video list
    pub fn videos(&self) -> &[String] {
        &self.videos
    }

    /// Currently selected video, if any
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }
}
