use crate::models::{ConversationMessage, Intent};
use crate::services::ai::{LlmProvider, Message};

const SYSTEM_PROMPT: &str = r#"You are an intent classifier for a barbershop booking assistant. Classify the customer's latest message, using the conversation history for context, into exactly one of:

- "booking": wants to schedule an appointment
- "customer_info": is supplying their name, email or phone number
- "availability_query": asks when a barber is free or about open slots
- "rescheduling": wants to move an existing appointment
- "cancellation": wants to cancel an existing appointment
- "general": anything else (services, prices, smalltalk)

Return ONLY the label, nothing else."#;

/// Best-effort classification. Any collaborator failure or unrecognized
/// label degrades to `General` rather than failing the turn.
pub async fn classify(
    llm: &dyn LlmProvider,
    history: &[ConversationMessage],
    latest_message: &str,
) -> Intent {
    let mut messages: Vec<Message> = history
        .iter()
        .map(|m| Message {
            role: m.role.clone(),
            content: m.content.clone(),
        })
        .collect();
    messages.push(Message {
        role: "user".to_string(),
        content: latest_message.to_string(),
    });

    match llm.chat(SYSTEM_PROMPT, &messages).await {
        Ok(label) => Intent::parse_label(&label),
        Err(e) => {
            tracing::warn!(error = %e, "intent classification failed, treating as general");
            Intent::General
        }
    }
}
