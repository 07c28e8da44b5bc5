//! # Tracks
//!
//! The slice of a library track the playback core consumes: its duration,
//! whether the native backend can play it, and its prepared playback context.

use crate::config::SchedulingConfig;
use crate::context::{GenericPlaybackContext, NativePlaybackContext, PlaybackContext};
use crate::error::Result;
use crate::traits::AudioContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A playable track.
#[derive(Debug)]
pub struct Track {
    id: String,
    title: String,
    file: PathBuf,
    duration: f64,
    context: Option<PlaybackContext>,
}

impl Track {
    /// Create a track without a playback context.
    ///
    /// Such a track is known to the library but cannot be played.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        file: impl Into<PathBuf>,
        duration: f64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            file: file.into(),
            duration: duration.max(0.0),
            context: None,
        }
    }

    /// Attach a prepared playback context. A missing duration is taken from it.
    pub fn with_playback_context(mut self, context: PlaybackContext) -> Self {
        if self.duration <= 0.0 {
            self.duration = context.duration();
        }
        self.context = Some(context);
        self
    }

    /// Open `file` for playback, preferring the native backend and falling
    /// back to the generic one when the native backend refuses the format.
    ///
    /// Errors from the generic backend are returned as-is so the caller can
    /// tell a missing audio stream from a DRM-protected one.
    #[instrument(skip(id, title, config), fields(file = %file.as_ref().display()))]
    pub fn prepare(
        id: impl Into<String>,
        title: impl Into<String>,
        file: impl AsRef<Path>,
        config: &SchedulingConfig,
    ) -> Result<Self> {
        let file = file.as_ref();
        let context = match NativePlaybackContext::open_file(file) {
            Ok(native) => PlaybackContext::Native(Arc::new(native)),
            Err(error) if error.needs_generic_fallback() => {
                debug!(%error, "Native backend refused file, using generic decoder");
                PlaybackContext::Generic(Arc::new(GenericPlaybackContext::open_file(
                    file, config,
                )?))
            }
            Err(error) => return Err(error),
        };

        Ok(Self::new(id, title, file, 0.0).with_playback_context(context))
    }

    /// Library identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Path of the audio file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// The prepared playback context, if any.
    pub fn playback_context(&self) -> Option<&PlaybackContext> {
        self.context.as_ref()
    }

    /// Returns `true` if the native backend plays this track.
    pub fn is_natively_supported(&self) -> bool {
        matches!(self.context, Some(PlaybackContext::Native(_)))
    }
}
