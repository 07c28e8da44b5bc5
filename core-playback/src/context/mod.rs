//! # Playback Contexts
//!
//! Opened audio resources, one per track. A track is played by the native
//! backend when its file can be read frame by frame, and by the generic
//! decoder otherwise.

mod generic;
mod native;

pub use generic::GenericPlaybackContext;
pub use native::NativePlaybackContext;

use crate::error::Result;
use crate::traits::{AudioContext, AudioFormat};
use std::path::Path;
use std::sync::Arc;

/// The playback context of a track, tagged by backend.
#[derive(Debug, Clone)]
pub enum PlaybackContext {
    /// Frame-addressable file played through segments.
    Native(Arc<NativePlaybackContext>),
    /// Demuxer/codec pair played through decoded buffers.
    Generic(Arc<GenericPlaybackContext>),
}

impl PlaybackContext {
    /// The native context, if this is one.
    pub fn as_native(&self) -> Option<&Arc<NativePlaybackContext>> {
        match self {
            PlaybackContext::Native(context) => Some(context),
            PlaybackContext::Generic(_) => None,
        }
    }

    /// The generic context, if this is one.
    pub fn as_generic(&self) -> Option<&Arc<GenericPlaybackContext>> {
        match self {
            PlaybackContext::Generic(context) => Some(context),
            PlaybackContext::Native(_) => None,
        }
    }

    fn inner(&self) -> &dyn AudioContext {
        match self {
            PlaybackContext::Native(context) => context.as_ref(),
            PlaybackContext::Generic(context) => context.as_ref(),
        }
    }
}

impl AudioContext for PlaybackContext {
    fn open(&self) -> Result<()> {
        self.inner().open()
    }

    fn close(&self) {
        self.inner().close()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn file(&self) -> &Path {
        self.inner().file()
    }

    fn duration(&self) -> f64 {
        self.inner().duration()
    }

    fn sample_rate(&self) -> u32 {
        self.inner().sample_rate()
    }

    fn frame_count(&self) -> u64 {
        self.inner().frame_count()
    }

    fn audio_format(&self) -> &AudioFormat {
        self.inner().audio_format()
    }
}
