use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use crate::overlay::{StickerState, StickerStates};
use crate::result::TranslationResult;

/// Identity of one submission: the image content key and the target language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubmissionKey {
    pub image: String,
    pub target_lang: String,
}

impl SubmissionKey {
    pub fn new(image: impl Into<String>, target_lang: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            target_lang: target_lang.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    key: SubmissionKey,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Applied(Arc<TranslationResult>),
    /// A newer submission started before this one finished.
    Stale,
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied(_))
    }
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    pending: Option<SubmissionKey>,
    applied: Option<(SubmissionKey, Arc<TranslationResult>)>,
    stickers: StickerStates,
}

/// Last-request-wins holder for the result on display.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, key: SubmissionKey) -> Ticket {
        let mut state = self.lock();
        state.generation += 1;
        state.pending = Some(key.clone());
        debug!(
            "submission {} started for {} -> {}",
            state.generation, key.image, key.target_lang
        );
        Ticket {
            generation: state.generation,
            key,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.lock().generation == ticket.generation
    }

    /// Applies `result` if `ticket` is still the latest submission.
    pub fn complete(&self, ticket: &Ticket, result: TranslationResult) -> bool {
        self.finish(ticket, result).is_applied()
    }

    pub fn current(&self) -> Option<Arc<TranslationResult>> {
        self.lock()
            .applied
            .as_ref()
            .map(|(_, result)| Arc::clone(result))
    }

    pub fn current_key(&self) -> Option<SubmissionKey> {
        self.lock().applied.as_ref().map(|(key, _)| key.clone())
    }

    pub fn pending_key(&self) -> Option<SubmissionKey> {
        self.lock().pending.clone()
    }

    pub fn toggle_sticker(&self, index: usize) -> StickerState {
        self.lock().stickers.toggle_expanded(index)
    }

    pub fn stickers(&self) -> StickerStates {
        self.lock().stickers.clone()
    }

    /// Starts a submission now and applies its result when `work` resolves.
    ///
    /// The ticket is taken before the returned future is first polled, so
    /// call order decides which submission is latest. Errors from a stale
    /// submission are swallowed.
    pub fn submit<F, E>(
        &self,
        key: SubmissionKey,
        work: F,
    ) -> impl Future<Output = Result<Outcome, E>> + Send + 'static
    where
        F: Future<Output = Result<TranslationResult, E>> + Send + 'static,
        E: Send + 'static,
    {
        let ticket = self.begin(key);
        let session = self.clone();
        async move {
            match work.await {
                Ok(result) => Ok(session.finish(&ticket, result)),
                Err(err) if session.is_current(&ticket) => Err(err),
                Err(_) => {
                    debug!("dropping failure of stale submission {}", ticket.generation);
                    Ok(Outcome::Stale)
                }
            }
        }
    }

    fn finish(&self, ticket: &Ticket, result: TranslationResult) -> Outcome {
        let mut state = self.lock();
        if state.generation != ticket.generation {
            debug!(
                "dropping stale result {} (latest is {})",
                ticket.generation, state.generation
            );
            return Outcome::Stale;
        }
        let result = Arc::new(result);
        state.pending = None;
        state.applied = Some((ticket.key.clone(), Arc::clone(&result)));
        state.stickers.reset();
        Outcome::Applied(result)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
