//! The AOAI event pump: consumes decoded server events for one connection
//! and drives egress audio, barge-in, the fallback response timer, and
//! grounding dispatch. Spawned as a child task of the AOAI supervisor for
//! as long as the current connection stays alive.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::Engine;

use crate::aoai::ServerMessage;
use crate::resample::resample;

use super::{now_ms, Session};

/// Drains events from the current AOAI connection until it closes or the
/// session is torn down. Returns when there is nothing left to pump - the
/// supervisor decides whether to reconnect.
pub async fn run(session: Arc<Session>) {
    loop {
        if session.is_closed() {
            return;
        }
        let event = {
            let mut guard = session.aoai.client.lock().await;
            match guard.as_mut() {
                Some(client) => client.next_event().await,
                None => None,
            }
        };
        match event {
            Some(msg) => handle_event(&session, msg).await,
            None => return,
        }
    }
}

async fn handle_event(session: &Arc<Session>, msg: ServerMessage) {
    match msg {
        ServerMessage::SessionCreated { .. }
        | ServerMessage::SessionUpdated { .. }
        | ServerMessage::ConversationCreated { .. } => {
            log::debug!("call {}: aoai session event", session.call_connection_id);
        }
        ServerMessage::ResponseCreated { .. } => {
            session.aoai_inflight.store(true, Ordering::SeqCst);
            session.drop_aoai_audio_until_ms.store(0, Ordering::SeqCst);
        }
        ServerMessage::SpeechStarted { .. } => {
            if session.config.barge_in.on_speech_started
                && session.aoai_inflight.load(Ordering::SeqCst)
            {
                barge_in_cancel(session).await;
            }
        }
        ServerMessage::SpeechStopped { .. } | ServerMessage::InputAudioBufferCommitted { .. } => {
            arm_fallback_timer(session).await;
        }
        ServerMessage::TranscriptionCompleted { transcript } => {
            session.cancel_fallback_timer().await;
            if phrase_matches_barge_in(session, &transcript) {
                barge_in_cancel(session).await;
                return;
            }
            dispatch_transcription(session, transcript).await;
        }
        ServerMessage::TranscriptionFailed { raw } => {
            log::debug!(
                "call {}: transcription failed: {raw}",
                session.call_connection_id
            );
        }
        ServerMessage::Error { error } => {
            log::warn!(
                "call {}: aoai reported error: {} ({:?})",
                session.call_connection_id,
                error.message,
                error.code
            );
        }
        ServerMessage::AudioDelta { delta } | ServerMessage::AudioDeltaLegacy { delta } => {
            egress_audio(session, &delta).await;
        }
        ServerMessage::AudioDone { .. } | ServerMessage::AudioDoneLegacy { .. } => {
            if session.config.aoai.acs_send_flush_on_done {
                flush_egress(session, true).await;
            }
        }
        ServerMessage::TranscriptDelta { delta } => {
            session.buffers.lock().await.transcript.push_str(&delta);
        }
        ServerMessage::TranscriptDone { .. } => {}
        ServerMessage::ResponseDone { .. } => {
            session.aoai_inflight.store(false, Ordering::SeqCst);
            flush_egress(session, true).await;
            let transcript = {
                let mut buffers = session.buffers.lock().await;
                std::mem::take(&mut buffers.transcript)
            };
            if !transcript.is_empty() {
                log::info!(
                    "call {}: response transcript: {transcript}",
                    session.call_connection_id
                );
            }
        }
        ServerMessage::Other => {}
    }
}

fn phrase_matches_barge_in(session: &Session, transcript: &str) -> bool {
    let stripped: String = transcript.chars().filter(|c| !c.is_whitespace()).collect();
    session
        .config
        .barge_in
        .phrases
        .iter()
        .any(|phrase| stripped.contains(phrase.as_str()))
}

/// Cancels the in-flight response and silences egress audio for the
/// configured drop window.
async fn barge_in_cancel(session: &Arc<Session>) {
    let drop_until = now_ms() + session.config.barge_in.drop_ms as i64;
    session
        .drop_aoai_audio_until_ms
        .store(drop_until, Ordering::SeqCst);

    {
        let mut buffers = session.buffers.lock().await;
        buffers.out_buf.clear();
        buffers.aoai_to_acs_resampler = None;
    }

    let event_id = format!("cancel-{}", uuid::Uuid::new_v4());
    let mut guard = session.aoai.client.lock().await;
    if let Some(client) = guard.as_mut() {
        client.cancel_response(&event_id).await;
    }
    session.aoai_inflight.store(false, Ordering::SeqCst);
}

/// Re-arms the "no transcription arrived" fallback timer. Re-arming
/// always cancels whatever timer was previously pending.
async fn arm_fallback_timer(session: &Arc<Session>) {
    session.cancel_fallback_timer().await;
    if !session.config.aoai.auto_create_response {
        return;
    }
    let session = session.clone();
    let delay = session.config.aoai.response_fallback_delay;
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if session.aoai_inflight.load(Ordering::SeqCst) {
            return;
        }
        let event_id = format!("fallback-{}", uuid::Uuid::new_v4());
        let mut guard = session.aoai.client.lock().await;
        if let Some(client) = guard.as_mut() {
            if let Err(e) = client.create_response(&event_id, None, None).await {
                log::debug!("fallback response.create failed: {e}");
            }
        }
    });
    *session.fallback_timer.lock().await = Some(handle);
}

async fn dispatch_transcription(session: &Arc<Session>, transcript: String) {
    if session.aoai_inflight.load(Ordering::SeqCst) {
        return;
    }
    let Some(agent) = session.grounding.clone() else {
        create_plain_response(session).await;
        return;
    };
    if session.agent_inflight.swap(true, Ordering::SeqCst) {
        // Already running a grounding lookup for a prior turn; don't stack.
        return;
    }

    let session = session.clone();
    let correlation = session.correlation_id.clone();
    tokio::spawn(async move {
        let result = agent.run(&transcript, &correlation).await;
        session.agent_inflight.store(false, Ordering::SeqCst);
        let event_id = format!("agent-{}", uuid::Uuid::new_v4());
        let mut guard = session.aoai.client.lock().await;
        let Some(client) = guard.as_mut() else { return };
        match result {
            Some(answer) => {
                let instructions = format!(
                    "以下の内容をそのまま自然な日本語で読み上げてください: {answer}"
                );
                let _ = client.create_response(&event_id, Some(instructions), None).await;
            }
            None => {
                let instructions = format!(
                    "{}一般的な知識の範囲で簡潔に答えてください。",
                    session.config.agent.fallback_prefix
                );
                let _ = client.create_response(&event_id, Some(instructions), None).await;
            }
        }
    });
}

async fn create_plain_response(session: &Arc<Session>) {
    let event_id = format!("response-{}", uuid::Uuid::new_v4());
    let mut guard = session.aoai.client.lock().await;
    if let Some(client) = guard.as_mut() {
        let _ = client.create_response(&event_id, None, None).await;
    }
}

async fn egress_audio(session: &Arc<Session>, delta_b64: &str) {
    if !session.config.aoai.send_audio_to_acs {
        return;
    }
    if now_ms() < session.drop_aoai_audio_until_ms.load(Ordering::SeqCst) {
        return;
    }
    let contract = {
        let buffers = session.buffers.lock().await;
        buffers.audio.clone()
    };
    let Some(contract) = contract else { return };
    if !contract.is_supported_for_egress() {
        return;
    }

    let pcm = match base64::engine::general_purpose::STANDARD.decode(delta_b64) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("ignoring malformed audio.delta: {e}");
            return;
        }
    };

    let target_rate = session.config.resample.target_rate;
    let resampled = {
        let mut buffers = session.buffers.lock().await;
        let out = resample(
            &pcm,
            target_rate,
            contract.sample_rate,
            session.config.resample.quality,
            session.config.resample.soxr_quality,
            &mut buffers.aoai_to_acs_resampler,
            false,
        );
        buffers.out_buf.extend_from_slice(&out);
        buffers.out_buf.len()
    };

    if resampled >= session.config.aoai.acs_send_min_chunk_bytes {
        drain_egress_buffer(session).await;
    }
}

async fn flush_egress(session: &Arc<Session>, final_flush: bool) {
    if final_flush {
        let contract = {
            let buffers = session.buffers.lock().await;
            buffers.audio.clone()
        };
        if let Some(contract) = contract {
            let target_rate = session.config.resample.target_rate;
            let mut buffers = session.buffers.lock().await;
            let tail = resample(
                &[],
                target_rate,
                contract.sample_rate,
                session.config.resample.quality,
                session.config.resample.soxr_quality,
                &mut buffers.aoai_to_acs_resampler,
                true,
            );
            buffers.out_buf.extend_from_slice(&tail);
        }
    }
    drain_egress_buffer(session).await;
}

async fn drain_egress_buffer(session: &Arc<Session>) {
    let drained = {
        let mut buffers = session.buffers.lock().await;
        if buffers.out_buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut buffers.out_buf))
        }
    };
    if let Some(pcm) = drained {
        let _ = session
            .acs_sink
            .send(super::AcsOutgoing::audio(&pcm));
    }
}

/// Cancels everything owned by this call's egress path: the pending
/// fallback timer, and any buffered-but-undrained audio.
pub async fn shutdown(session: &Arc<Session>) {
    session.cancel_fallback_timer().await;
    session.buffers.lock().await.out_buf.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn barge_in_phrase_matches_ignoring_whitespace() {
        let cfg = crate::config::Config {
            barge_in: crate::config::BargeInConfig {
                phrases: vec!["ちょっと待って".to_string()],
                drop_ms: 1500,
                on_speech_started: true,
            },
            ..Default::default()
        };
        let transcript = "あの、  ちょっと 待って ください";
        let stripped: String = transcript.chars().filter(|c| !c.is_whitespace()).collect();
        assert!(cfg.barge_in.phrases.iter().any(|p| stripped.contains(p.as_str())));
    }
}
