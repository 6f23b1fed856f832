//! Signal decoder
//!
//! Turns container/codec bytes into mono f32 PCM at the embedding model's
//! sample rate. Format detection is symphonia's probe, helped by the file
//! extension of the object path. Multi-channel audio is averaged to mono;
//! resampling is a single rubato pass over the whole signal so identical
//! input always yields identical output.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use crate::error::DecodeError;
use crate::models::{extension_hint, AudioBlob, AudioSignal};

/// Decodes audio blobs to mono PCM at `target_rate`
#[derive(Debug, Clone, Copy)]
pub struct SignalDecoder {
    target_rate: u32,
}

impl SignalDecoder {
    pub fn new(target_rate: u32) -> Self {
        Self { target_rate }
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Decode a blob on the blocking thread pool, bounded by `timeout`
    ///
    /// Consumes the blob; its bytes are freed when decoding finishes. On
    /// timeout the blocking task is told to stop at the next packet, which
    /// drops its buffers and frees the pool thread.
    pub async fn decode_blob(
        &self,
        blob: AudioBlob,
        timeout: Duration,
    ) -> Result<AudioSignal, DecodeError> {
        let target_rate = self.target_rate;
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = Arc::clone(&cancel);
        let task = tokio::task::spawn_blocking(move || {
            let hint = extension_hint(&blob.path);
            decode_cancellable(blob.bytes, hint.as_deref(), target_rate, &task_cancel)
        });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DecodeError::Malformed(format!(
                "decoder task failed: {}",
                join_err
            ))),
            Err(_) => {
                cancel.store(true, Ordering::Relaxed);
                Err(DecodeError::Timeout(timeout))
            }
        }
    }
}

/// Decode `bytes` to mono f32 PCM resampled to `target_rate`
///
/// **Algorithm:**
/// 1. Probe the container (extension hint optional)
/// 2. Pick the first track with a real codec
/// 3. Decode every packet, averaging channels to mono
/// 4. Resample to `target_rate` if the source rate differs
///
/// Packets the codec rejects are skipped with a warning. If nothing
/// decodes at all the result is [`DecodeError::Empty`].
pub fn decode(
    bytes: Vec<u8>,
    hint: Option<&str>,
    target_rate: u32,
) -> Result<AudioSignal, DecodeError> {
    decode_cancellable(bytes, hint, target_rate, &AtomicBool::new(false))
}

/// [`decode`] that gives up with [`DecodeError::Cancelled`] once `cancel`
/// is set; checked before every packet and before resampling
pub fn decode_cancellable(
    bytes: Vec<u8>,
    hint: Option<&str>,
    target_rate: u32,
    cancel: &AtomicBool,
) -> Result<AudioSignal, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if target_rate == 0 {
        return Err(DecodeError::Resample("target sample rate is zero".to_string()));
    }

    let byte_len = bytes.len();
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut probe_hint = Hint::new();
    if let Some(extension) = hint {
        probe_hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &probe_hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Malformed(format!("unrecognized audio container: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::UnsupportedCodec("no decodable audio track".to_string()))?;

    let track_id = track.id;
    let mut source_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| match e {
            SymphoniaError::Unsupported(what) => DecodeError::UnsupportedCodec(what.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        })?;

    tracing::debug!(
        bytes = byte_len,
        hint = hint.unwrap_or(""),
        source_rate = source_rate.unwrap_or(0),
        "Decoding audio"
    );

    let mut mono: Vec<f32> = Vec::new();
    let mut skipped_packets = 0usize;

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(DecodeError::Cancelled);
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(DecodeError::Malformed(format!("error reading packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if source_rate.is_none() {
                    source_rate = Some(decoded.spec().rate);
                }
                downmix_into(&decoded, &mut mono);
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                skipped_packets += 1;
                tracing::warn!(reason, "Skipping corrupt audio packet");
            }
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) => {
                return Err(DecodeError::Malformed(format!("error decoding packet: {}", e)));
            }
        }
    }

    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    let source_rate = source_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| DecodeError::Malformed("sample rate unknown".to_string()))?;

    if skipped_packets > 0 {
        tracing::warn!(skipped_packets, "Decoded audio with corrupt packets skipped");
    }

    if cancel.load(Ordering::Relaxed) {
        return Err(DecodeError::Cancelled);
    }

    let samples = resample_mono(mono, source_rate, target_rate)?;

    tracing::debug!(
        source_rate,
        target_rate,
        samples = samples.len(),
        "Audio decoding complete"
    );

    Ok(AudioSignal::new(samples, target_rate))
}

/// Append the channel mean of every frame in `decoded` to `out`
fn downmix_into(decoded: &AudioBufferRef<'_>, out: &mut Vec<f32>) {
    match decoded {
        AudioBufferRef::U8(buf) => append_mono(buf, out),
        AudioBufferRef::U16(buf) => append_mono(buf, out),
        AudioBufferRef::U24(buf) => append_mono(buf, out),
        AudioBufferRef::U32(buf) => append_mono(buf, out),
        AudioBufferRef::S8(buf) => append_mono(buf, out),
        AudioBufferRef::S16(buf) => append_mono(buf, out),
        AudioBufferRef::S24(buf) => append_mono(buf, out),
        AudioBufferRef::S32(buf) => append_mono(buf, out),
        AudioBufferRef::F32(buf) => append_mono(buf, out),
        AudioBufferRef::F64(buf) => append_mono(buf, out),
    }
}

fn append_mono<S>(buf: &AudioBuffer<S>, out: &mut Vec<f32>)
where
    S: Sample,
    f32: FromSample<S>,
{
    let num_channels = buf.spec().channels.count();
    if num_channels == 0 {
        return;
    }

    let num_frames = buf.frames();
    out.reserve(num_frames);

    for frame_idx in 0..num_frames {
        let mut sum = 0.0f32;
        for ch in 0..num_channels {
            sum += f32::from_sample(buf.chan(ch)[frame_idx]);
        }
        out.push(sum / num_channels as f32);
    }
}

/// Resample a mono signal in one pass
fn resample_mono(
    samples: Vec<f32>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, DecodeError> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_rate as f64 / source_rate as f64;
    let num_frames = samples.len();
    let expected_len = (num_frames as f64 * ratio).round() as usize;

    // Chunk size = input length for single-pass processing
    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, num_frames, 1)
        .map_err(|e| DecodeError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();

    let mut resampled = resampler
        .process(&[samples], None)
        .map_err(|e| DecodeError::Resample(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();

    // Flush the filter delay still held by the resampler
    while resampled.len() < delay + expected_len {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| DecodeError::Resample(e.to_string()))?
            .into_iter()
            .next()
            .unwrap_or_default();
        if tail.is_empty() {
            break;
        }
        resampled.extend(tail);
    }

    resampled.drain(..delay.min(resampled.len()));
    resampled.truncate(expected_len);

    tracing::debug!(
        "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
        num_frames,
        source_rate,
        resampled.len(),
        target_rate
    );

    Ok(resampled)
}
