//! Prompt templates for question condensing and grounded answering.

use crate::models::ConversationHistory;

/// Render history as `Human:`/`Assistant:` lines, oldest first.
pub fn format_history(history: &ConversationHistory) -> String {
    history
        .exchanges()
        .map(|(q, a)| format!("Human: {}\nAssistant: {}", q, a))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the model to turn a follow-up into a standalone question.
pub fn condense_prompt(question: &str, history: &ConversationHistory) -> String {
    format!(
        "Given the following conversation and a follow up question, rephrase the follow up \
         question to be a standalone question, in its original language.\n\n\
         Chat History:\n{}\nFollow Up Input: {}\nStandalone question:",
        format_history(history),
        question
    )
}

/// Prompt restricting the answer to the retrieved review snippets.
///
/// An empty context still produces a well-formed prompt; the instruction
/// steers the model to say it does not know.
pub fn answer_prompt(context: &[String], question: &str, max_words: usize) -> String {
    format!(
        "Use the following pieces of context to answer the question at the end within {} words. \
         If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
         {}\n\nQuestion: {}\nAnswer:",
        max_words,
        context.join("\n\n"),
        question
    )
}
