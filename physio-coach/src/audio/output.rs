//! Audio output using cpal
//!
//! The narrator plays short speech clips, one at a time. cpal streams are not
//! `Send`, so every stream lives on a dedicated audio thread that owns the
//! device; callers talk to it over a command channel and get back a
//! [`PlaybackHandle`] that is safe to move between tasks.
//!
//! The [`AudioSink`] trait is the seam the narrator depends on, so channel
//! logic can be tested without a sound card.

use crate::audio::{AudioClip, Resampler};
use crate::error::{Error, Result};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// How often the audio thread checks for finished streams
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A started playback
///
/// `finished` resolves when the clip has played to the end. If the playback
/// is stopped or the backend goes away first, the sender is dropped and the
/// receiver yields an error instead; both mean the resource is gone.
pub struct ActivePlayback {
    pub handle: Box<dyn PlaybackHandle>,
    pub finished: oneshot::Receiver<()>,
}

/// Ownership token for one live playback resource
///
/// Dropping the handle releases the resource.
pub trait PlaybackHandle: Send {
    /// Stop playback and release the device stream
    fn stop(&mut self);
}

/// Audio backend able to play one decoded clip
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn start(&self, clip: AudioClip) -> Result<ActivePlayback>;
}

enum OutputCommand {
    Play {
        id: u64,
        clip: AudioClip,
        started: oneshot::Sender<Result<()>>,
        finished: oneshot::Sender<()>,
    },
    Stop {
        id: u64,
    },
    Shutdown,
}

/// cpal-backed [`AudioSink`]
pub struct CpalAudioSink {
    commands: mpsc::Sender<OutputCommand>,
    next_id: AtomicU64,
    device_name: String,
}

impl CpalAudioSink {
    /// Open an output device and start the audio thread
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    ///
    /// If the requested device is not found, falls back to the default device.
    pub fn open(device_name: Option<String>) -> Result<Self> {
        let (commands, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        thread::Builder::new()
            .name("narrator-audio".to_string())
            .spawn(move || audio_thread(device_name, rx, ready_tx))
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Audio thread exited during startup".to_string()))??;

        Ok(Self {
            commands,
            next_id: AtomicU64::new(1),
            device_name,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[async_trait]
impl AudioSink for CpalAudioSink {
    async fn start(&self, clip: AudioClip) -> Result<ActivePlayback> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (started_tx, started_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();

        self.commands
            .send(OutputCommand::Play {
                id,
                clip,
                started: started_tx,
                finished: finished_tx,
            })
            .map_err(|_| Error::AudioOutput("Audio thread is not running".to_string()))?;

        started_rx
            .await
            .map_err(|_| Error::AudioOutput("Audio thread dropped play request".to_string()))??;

        Ok(ActivePlayback {
            handle: Box::new(CpalPlayback {
                id,
                commands: self.commands.clone(),
                stopped: false,
            }),
            finished: finished_rx,
        })
    }
}

impl Drop for CpalAudioSink {
    fn drop(&mut self) {
        let _ = self.commands.send(OutputCommand::Shutdown);
    }
}

struct CpalPlayback {
    id: u64,
    commands: mpsc::Sender<OutputCommand>,
    stopped: bool,
}

impl PlaybackHandle for CpalPlayback {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            // Audio thread may already be gone at shutdown
            let _ = self.commands.send(OutputCommand::Stop { id: self.id });
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Stream currently owned by the audio thread
struct PlayingStream {
    id: u64,
    _stream: Stream,
    done: Arc<AtomicBool>,
    finished: oneshot::Sender<()>,
}

fn audio_thread(
    device_name: Option<String>,
    commands: mpsc::Receiver<OutputCommand>,
    ready: mpsc::Sender<Result<String>>,
) {
    let output = match OutputDevice::open(device_name) {
        Ok(output) => {
            let _ = ready.send(Ok(output.name.clone()));
            output
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut current: Option<PlayingStream> = None;

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(OutputCommand::Play {
                id,
                clip,
                started,
                finished,
            }) => {
                // Only one stream at a time; dropping the old one stops it
                current = None;
                match output.play(clip) {
                    Ok((stream, done)) => {
                        let _ = started.send(Ok(()));
                        current = Some(PlayingStream {
                            id,
                            _stream: stream,
                            done,
                            finished,
                        });
                    }
                    Err(e) => {
                        error!("Failed to start speech playback: {}", e);
                        let _ = started.send(Err(e));
                    }
                }
            }
            Ok(OutputCommand::Stop { id }) => {
                if current.as_ref().is_some_and(|p| p.id == id) {
                    debug!(playback_id = id, "Stopping speech playback");
                    current = None;
                }
            }
            Ok(OutputCommand::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if current
            .as_ref()
            .is_some_and(|p| p.done.load(Ordering::Acquire))
        {
            if let Some(playing) = current.take() {
                debug!(playback_id = playing.id, "Speech playback finished");
                let _ = playing.finished.send(());
            }
        }
    }

    debug!("Audio thread exiting");
}

/// Opened cpal device plus its stream configuration
struct OutputDevice {
    name: String,
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
}

impl OutputDevice {
    fn open(device_name: Option<String>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name.as_ref() {
            Some(name) => {
                let mut devices = host.output_devices().map_err(|e| {
                    Error::AudioOutput(format!("Failed to enumerate devices: {}", e))
                })?;
                match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                    Some(dev) => dev,
                    None => {
                        warn!(
                            "Requested device '{}' not found, falling back to default device",
                            name
                        );
                        host.default_output_device().ok_or_else(|| {
                            Error::AudioOutput(format!(
                                "Device '{}' not found and no default device available",
                                name
                            ))
                        })?
                    }
                }
            }
            None => host
                .default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?,
        };

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;
        let sample_format = supported.sample_format();
        let config = supported.config();

        info!(
            device = %name,
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            format = ?sample_format,
            "Opened audio output"
        );

        Ok(Self {
            name,
            device,
            config,
            sample_format,
        })
    }

    /// Convert a clip to the device format and start a stream for it
    fn play(&self, clip: AudioClip) -> Result<(Stream, Arc<AtomicBool>)> {
        let clip = Resampler::resample(&clip, self.config.sample_rate.0)?
            .remap_channels(self.config.channels);
        let done = Arc::new(AtomicBool::new(false));

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(clip.samples, Arc::clone(&done))?,
            SampleFormat::I16 => self.build_stream::<i16>(clip.samples, Arc::clone(&done))?,
            SampleFormat::U16 => self.build_stream::<u16>(clip.samples, Arc::clone(&done))?,
            sample_format => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    sample_format
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        Ok((stream, done))
    }

    fn build_stream<T>(&self, samples: Vec<f32>, done: Arc<AtomicBool>) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut position = 0usize;

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    for out in data.iter_mut() {
                        let sample = samples.get(position).copied().unwrap_or(0.0);
                        *out = T::from_sample(sample.clamp(-1.0, 1.0));
                        position += 1;
                    }
                    if position >= samples.len() {
                        done.store(true, Ordering::Release);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }
}
