//! Handling of inbound ACS media frames (§ ingress).

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::Engine;

use crate::downmix::stereo16_to_mono16;
use crate::resample::resample;

use super::protocol::{AcsIncoming, AudioContract};
use super::Session;
use crate::supervisor;

/// Parses and dispatches one inbound ACS frame. Malformed JSON and
/// unrecognized `kind` values are ignored rather than treated as errors -
/// a single bad frame must never end the call.
pub async fn handle_incoming(session: &Arc<Session>, raw: &str) {
    let parsed: AcsIncoming = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("ignoring malformed ACS frame: {e}");
            return;
        }
    };

    match parsed {
        AcsIncoming::AudioMetadata { audioMetadata } => {
            let contract = AudioContract {
                sample_rate: audioMetadata.sampleRate,
                channels: audioMetadata.channels,
                encoding: audioMetadata.encoding,
            };
            log::info!(
                "call {}: audio contract latched (rate={}, channels={}, encoding={})",
                session.call_connection_id,
                contract.sample_rate,
                contract.channels,
                contract.encoding,
            );
            session.buffers.lock().await.audio = Some(contract);

            if session.config.aoai.enabled
                && session
                    .supervisor_started
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                tokio::spawn(supervisor::run(session.clone()));
            }
        }
        AcsIncoming::AudioData { audioData } => {
            if audioData.silent {
                return;
            }
            handle_audio_data(session, &audioData.data).await;
        }
        AcsIncoming::DtmfData { dtmfData } => {
            log::info!(
                "call {}: dtmf received ({:?})",
                session.call_connection_id,
                dtmfData.data
            );
        }
        AcsIncoming::Unknown => {}
    }
}

async fn handle_audio_data(session: &Arc<Session>, data_b64: &str) {
    let pcm = match base64::engine::general_purpose::STANDARD.decode(data_b64) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("ignoring AudioData with invalid base64: {e}");
            return;
        }
    };
    session
        .bytes_in
        .fetch_add(pcm.len() as u64, Ordering::Relaxed);

    let contract = {
        let buffers = session.buffers.lock().await;
        match buffers.audio.clone() {
            Some(c) => c,
            None => return,
        }
    };

    let mono = if contract.channels == 2 {
        stereo16_to_mono16(&pcm)
    } else {
        pcm
    };

    let target_rate = session.config.resample.target_rate;
    let resampled = {
        let mut buffers = session.buffers.lock().await;
        resample(
            &mono,
            contract.sample_rate,
            target_rate,
            session.config.resample.quality,
            session.config.resample.soxr_quality,
            &mut buffers.acs_to_aoai_resampler,
            false,
        )
    };
    if resampled.is_empty() {
        return;
    }

    if !session.aoai.is_ready() {
        // Zero-timeout readiness probe: never block the ingress path
        // waiting for a reconnect. Drop this chunk and keep going.
        return;
    }

    let mut guard = session.aoai.client.lock().await;
    if let Some(client) = guard.as_mut() {
        if let Err(e) = client.append_audio(&resampled).await {
            log::debug!(
                "call {}: append_audio failed, dropping chunk: {e}",
                session.call_connection_id
            );
        }
    }
}
