//! Audio source abstraction (component C).
//!
//! A concrete source (microphone capture, a system-audio tap) is an external
//! collaborator out of scope for this crate; this module defines the
//! contract and a channel-backed in-memory fake used by tests.

use tokio::sync::mpsc;

use crate::error::Result;
use crate::repository::SourceKind;

/// Format of the buffers yielded by a started `AudioSource`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
        }
    }
}

/// One buffer of mono 32-bit float PCM frames at 16 kHz.
pub type AudioBuffer = Vec<f32>;

/// A finite-lifetime, single-consumer stream of audio buffers.
pub type AudioStream = mpsc::Receiver<AudioBuffer>;

/// Contract for a producer of mono 16 kHz float PCM buffer streams.
///
/// Implementations are responsible for resampling/downmixing to the
/// contracted format; `start` fails terminally on setup errors and `stop`
/// must be idempotent and release underlying OS resources on every exit
/// path.
pub trait AudioSource: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;

    /// Begin capture, returning a stream of buffers plus the format they are
    /// encoded in.
    fn start(&mut self) -> Result<(AudioStream, AudioFormat)>;

    /// Stop capture. Idempotent; closes the stream so the consumer observes
    /// end-of-stream.
    fn stop(&mut self);
}

/// An in-memory `AudioSource` fed by a test-controlled channel.
///
/// `ChannelAudioSource::feed()` yields the sending half so tests can push
/// buffers (or drop it to simulate end-of-stream) without a real device.
pub struct ChannelAudioSource {
    name: String,
    kind: SourceKind,
    format: AudioFormat,
    tx: Option<mpsc::Sender<AudioBuffer>>,
    rx: Option<AudioStream>,
}

impl ChannelAudioSource {
    pub fn new(name: impl Into<String>, kind: SourceKind, format: AudioFormat) -> Self {
        let (tx, rx) = mpsc::channel(64);
        Self {
            name: name.into(),
            kind,
            format,
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// A sender clone usable to push buffers into the stream returned by
    /// a prior `start()` call, before the source is started.
    pub fn feed(&self) -> mpsc::Sender<AudioBuffer> {
        self.tx
            .clone()
            .expect("feed() called after ChannelAudioSource was started")
    }
}

impl AudioSource for ChannelAudioSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn start(&mut self) -> Result<(AudioStream, AudioFormat)> {
        let rx = self
            .rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("ChannelAudioSource already started").into())?;
        Ok((rx, self.format))
    }

    fn stop(&mut self) {
        self.tx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_yields_fed_buffers_and_stop_closes_the_stream() {
        let mut source =
            ChannelAudioSource::new("test-mic", SourceKind::Microphone, AudioFormat::default());
        let feed = source.feed();
        let (mut stream, format) = source.start().unwrap();
        assert_eq!(format.sample_rate, 16_000);

        feed.send(vec![0.0; 160]).await.unwrap();
        let buf = stream.recv().await.unwrap();
        assert_eq!(buf.len(), 160);

        source.stop();
        assert!(stream.recv().await.is_none());
    }
}
