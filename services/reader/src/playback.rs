//! services/reader/src/playback.rs
//!
//! Continuous playback: speaks the chapter paragraph by paragraph from the
//! reader's speech cursor.

use archive_reader_core::{PortResult, ReaderSession, SpeechEngine};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Speaks from the cursor to the end of the chapter, advancing the cursor after
/// each paragraph. Returns how many paragraphs were spoken.
///
/// Cancelling the token stops the engine and returns promptly; the cursor then
/// still points at the interrupted paragraph.
pub async fn speak_chapter(
    reader: &ReaderSession,
    engine: Arc<dyn SpeechEngine>,
    cancellation_token: CancellationToken,
) -> PortResult<usize> {
    info!("Playback started.");
    let mut spoken = 0;

    loop {
        if cancellation_token.is_cancelled() {
            info!("Playback cancelled.");
            engine.stop().await?;
            return Ok(spoken);
        }

        let Some((index, text)) = reader.current_paragraph().await else {
            break;
        };

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Playback cancelled during paragraph {}.", index);
                engine.stop().await?;
                return Ok(spoken);
            }
            result = engine.speak(&text) => result?,
        }
        spoken += 1;

        if !reader.advance_speech().await {
            break;
        }
    }

    info!("Playback finished after {} paragraphs.", spoken);
    Ok(spoken)
}
