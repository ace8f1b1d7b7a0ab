//! Per-place conversational retrieval.
//!
//! A [`RetrievalSession`] is bound to one [`VectorIndex`] for its whole
//! lifetime and owns the conversation history. Switching places means
//! creating a new session.

use std::sync::Arc;

use anyhow::Result;

use crate::embedding::{embed_query, EmbeddingProvider};
use crate::index::{ScoredSnippet, VectorIndex};
use crate::llm::AnswerSynthesizer;
use crate::models::{ConversationHistory, PlaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Bound to an index, no completed exchange yet.
    Ready,
    /// At least one exchange completed.
    Active,
}

pub struct RetrievalSession {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    synthesizer: Arc<dyn AnswerSynthesizer>,
    top_k: usize,
    history: ConversationHistory,
}

impl RetrievalSession {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        synthesizer: Arc<dyn AnswerSynthesizer>,
        top_k: usize,
    ) -> Self {
        Self {
            index,
            embedder,
            synthesizer,
            top_k,
            history: ConversationHistory::new(),
        }
    }

    pub fn place_id(&self) -> &PlaceId {
        &self.index.place_id
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        if self.history.is_empty() {
            SessionState::Ready
        } else {
            SessionState::Active
        }
    }

    /// Answer `question` from the bound index.
    ///
    /// History gains exactly one user turn and one assistant turn when this
    /// returns `Ok`, and is left unchanged when it returns `Err`.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        let query = if self.history.is_empty() {
            question.to_string()
        } else {
            self.synthesizer
                .condense_question(question, &self.history)
                .await?
        };

        let snippets = self.retrieve(&query).await?;
        tracing::debug!(
            place = %self.index.place_id,
            hits = snippets.len(),
            "retrieved review snippets"
        );

        let context: Vec<String> = snippets.into_iter().map(|s| s.text).collect();
        let answer = self
            .synthesizer
            .synthesize(&context, question, &self.history)
            .await?;

        self.history.push_exchange(question, answer.clone());
        Ok(answer)
    }

    /// Top-k snippets for `query`. A zero-document index yields no
    /// snippets without calling the embedding model.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredSnippet>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder.as_ref(), query).await?;
        Ok(self.index.search(&vector, self.top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexEntry;
    use crate::models::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        fn model_name(&self) -> &str {
            "axis"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("offline")) {
                anyhow::bail!("embedding endpoint unreachable");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("parking") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    /// Records what it was asked. Fails synthesis when `fail` is set and
    /// condensing for questions that mention "garbled".
    #[derive(Default)]
    struct RecordingSynth {
        fail: bool,
        condensed: Mutex<Vec<String>>,
        contexts: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl AnswerSynthesizer for RecordingSynth {
        async fn condense_question(&self, q: &str, _: &ConversationHistory) -> Result<String> {
            self.condensed.lock().unwrap().push(q.to_string());
            if q.contains("garbled") {
                anyhow::bail!("condense call rejected");
            }
            Ok(format!("standalone: {} parking", q))
        }

        async fn synthesize(
            &self,
            context: &[String],
            question: &str,
            _: &ConversationHistory,
        ) -> Result<String> {
            if self.fail {
                anyhow::bail!("model unavailable");
            }
            self.contexts.lock().unwrap().push(context.to_vec());
            Ok(format!("answer to {}", question))
        }
    }

    fn index(texts: &[&str]) -> Arc<VectorIndex> {
        Arc::new(VectorIndex {
            place_id: PlaceId::new("ChIJ-session").unwrap(),
            model: "axis".into(),
            dims: 2,
            source_hash: String::new(),
            built_at: 0,
            entries: texts
                .iter()
                .map(|t| IndexEntry {
                    text: t.to_string(),
                    vector: if t.contains("parking") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    },
                })
                .collect(),
        })
    }

    #[tokio::test]
    async fn test_two_asks_alternate_roles() {
        let synth = Arc::new(RecordingSynth::default());
        let mut session = RetrievalSession::new(
            index(&["parking is tight", "great coffee"]),
            Arc::new(AxisEmbedder),
            synth.clone(),
            1,
        );
        assert_eq!(session.state(), SessionState::Ready);

        session.ask("Is there parking?").await.unwrap();
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.state(), SessionState::Active);

        session.ask("And on weekends?").await.unwrap();
        let roles: Vec<Role> = session.history().turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );

        // Only the follow-up is condensed.
        assert_eq!(*synth.condensed.lock().unwrap(), vec!["And on weekends?"]);
        let contexts = synth.contexts.lock().unwrap();
        assert_eq!(contexts[0], vec!["parking is tight".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_ask_leaves_history_untouched() {
        let synth = Arc::new(RecordingSynth {
            fail: true,
            ..RecordingSynth::default()
        });
        let mut session =
            RetrievalSession::new(index(&["parking"]), Arc::new(AxisEmbedder), synth, 4);

        assert!(session.ask("Is there parking?").await.is_err());
        assert!(session.history().is_empty());
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn test_failed_condense_keeps_prior_exchange() {
        let synth = Arc::new(RecordingSynth::default());
        let mut session =
            RetrievalSession::new(index(&["parking"]), Arc::new(AxisEmbedder), synth.clone(), 4);
        session.ask("Is there parking?").await.unwrap();

        assert!(session.ask("garbled follow-up").await.is_err());
        assert_eq!(session.history().len(), 2);
        assert_eq!(synth.contexts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_query_embedding_keeps_prior_exchange() {
        let synth = Arc::new(RecordingSynth::default());
        let mut session =
            RetrievalSession::new(index(&["parking"]), Arc::new(AxisEmbedder), synth.clone(), 4);
        session.ask("Is there parking?").await.unwrap();

        assert!(session.ask("open when the wifi is offline?").await.is_err());
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(synth.contexts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_index_passes_empty_context() {
        let synth = Arc::new(RecordingSynth::default());
        let mut session = RetrievalSession::new(index(&[]), Arc::new(AxisEmbedder), synth.clone(), 4);

        let answer = session.ask("Anything good here?").await.unwrap();
        assert_eq!(answer, "answer to Anything good here?");
        assert!(synth.contexts.lock().unwrap()[0].is_empty());
    }

    #[tokio::test]
    async fn test_original_question_is_synthesized() {
        let synth = Arc::new(RecordingSynth::default());
        let mut session =
            RetrievalSession::new(index(&["parking ok"]), Arc::new(AxisEmbedder), synth, 4);
        session.ask("first?").await.unwrap();
        let answer = session.ask("what about it?").await.unwrap();
        assert_eq!(answer, "answer to what about it?");
        assert_eq!(session.history().turns()[2].content, "what about it?");
    }
}
