//! Host audio device driving a [`PlayerNode`] through cpal.

use super::PlayerNode;
use crate::decoder::SampleConverter;
use crate::error::{PlaybackError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

enum DeviceCommand {
    /// Rebuild the stream with the node's current format.
    Restart(Sender<Result<()>>),
    Shutdown,
}

/// Default output device pulling audio from a [`PlayerNode`].
///
/// The cpal stream is not `Send` on every platform, so it lives on a
/// dedicated thread that receives commands over a channel.
pub struct CpalDevice {
    commands: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl CpalDevice {
    /// Open the default output device and start pulling from `node`.
    pub fn open(node: Arc<PlayerNode>) -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| PlaybackError::OutputDevice("No output device available".to_string()))?;
        info!(
            device = device.name().unwrap_or_else(|_| "unknown".to_string()),
            "Opening output device"
        );

        let (commands, receiver) = bounded::<DeviceCommand>(8);
        let thread = thread::Builder::new()
            .name("playback-device".to_string())
            .spawn(move || run_device_thread(device, node, receiver))?;

        let this = Self {
            commands,
            thread: Some(thread),
        };
        this.restart()?;
        Ok(this)
    }

    /// Rebuild the output stream, e.g. after the node was reconnected with
    /// a new format or the system switched devices.
    pub fn restart(&self) -> Result<()> {
        let (reply, outcome) = bounded(1);
        self.commands
            .send(DeviceCommand::Restart(reply))
            .map_err(|_| PlaybackError::OutputDevice("Device thread has exited".to_string()))?;
        outcome
            .recv()
            .map_err(|_| PlaybackError::OutputDevice("Device thread has exited".to_string()))?
    }
}

fn run_device_thread(device: Device, node: Arc<PlayerNode>, commands: Receiver<DeviceCommand>) {
    let mut stream: Option<Stream> = None;

    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Restart(reply) => {
                stream.take();
                let outcome = build_stream(&device, Arc::clone(&node)).map(|built| {
                    stream = Some(built);
                });
                let _ = reply.send(outcome);
            }
            DeviceCommand::Shutdown => break,
        }
    }

    debug!("Output device thread exiting");
}

fn build_stream(device: &Device, node: Arc<PlayerNode>) -> Result<Stream> {
    let format = node.format();
    let config = StreamConfig {
        channels: format.channels,
        sample_rate: format.sample_rate,
        buffer_size: BufferSize::Default,
    };

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                node.render(data);
                SampleConverter::clamp_samples(data);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::OutputDevice(format!("Failed to build stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| PlaybackError::OutputDevice(format!("Failed to start stream: {}", e)))?;
    debug!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "Output stream running"
    );
    Ok(stream)
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        if self.commands.send(DeviceCommand::Shutdown).is_err() {
            warn!("Output device thread already exited");
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
