//! Place selection and question routing.
//!
//! [`PlaceExplorer`] ties the pipeline together: selecting a place runs the
//! read-through review fetch, gets or builds the place's index, and starts a
//! fresh [`RetrievalSession`]. Questions go to the current session.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::ReviewCache;
use crate::errors::NoPlaceSelected;
use crate::index::IndexBuilder;
use crate::llm::AnswerSynthesizer;
use crate::models::{ConversationHistory, PlaceId};
use crate::session::RetrievalSession;

/// What a successful selection produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub place_id: PlaceId,
    /// Indexed snippets, i.e. reviews with text.
    pub documents: usize,
    /// Set when the review fetch was cut short by an upstream error.
    pub upstream_error: Option<String>,
}

pub struct PlaceExplorer {
    cache: Arc<ReviewCache>,
    builder: Arc<IndexBuilder>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    top_k: usize,
    session: Option<RetrievalSession>,
}

impl PlaceExplorer {
    pub fn new(
        cache: Arc<ReviewCache>,
        builder: Arc<IndexBuilder>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        top_k: usize,
    ) -> Self {
        Self {
            cache,
            builder,
            synthesizer,
            top_k,
            session: None,
        }
    }

    /// Bind a new session to `place_id`.
    ///
    /// If any step fails the current session, and its history, is kept.
    pub async fn select_place(&mut self, place_id: &PlaceId) -> Result<Selection> {
        let mut upstream_error = None;
        let cache = &self.cache;
        let noted = &mut upstream_error;
        let index = self
            .builder
            .get_or_build(place_id, || async move {
                let lookup = cache.get_or_fetch(place_id).await?;
                *noted = lookup.upstream_error;
                Ok(lookup.reviews)
            })
            .await?;

        let selection = Selection {
            place_id: place_id.clone(),
            documents: index.len(),
            upstream_error,
        };
        self.session = Some(RetrievalSession::new(
            Arc::new(index),
            self.builder.embedder().clone(),
            self.synthesizer.clone(),
            self.top_k,
        ));
        tracing::info!(place = %place_id, docs = selection.documents, "place selected");
        Ok(selection)
    }

    pub async fn ask(&mut self, question: &str) -> Result<String> {
        match self.session.as_mut() {
            Some(session) => session.ask(question).await,
            None => Err(NoPlaceSelected.into()),
        }
    }

    /// Drop the current session. The next question needs a new selection.
    pub fn reset(&mut self) {
        self.session = None;
    }

    pub fn current_place(&self) -> Option<&PlaceId> {
        self.session.as_ref().map(RetrievalSession::place_id)
    }

    pub fn history(&self) -> Option<&ConversationHistory> {
        self.session.as_ref().map(RetrievalSession::history)
    }

    pub fn session(&self) -> Option<&RetrievalSession> {
        self.session.as_ref()
    }
}
