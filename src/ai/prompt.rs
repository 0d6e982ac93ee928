/// Instruction used when no prompt is stored and none is supplied.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a professional content summarization assistant. Summarize the content following these guidelines:

1. Structure the core content as 3-5 key points.
2. For technical content, include the specific technologies and concepts by name.
3. State any practical information or action items clearly.
4. Focus on the essentials rather than incidental detail.
5. Write clearly and concisely in Korean.

Format the summary as readable, well-structured Markdown."#;

/// Wrap extracted text in the user turn sent to every provider.
pub fn user_message(content: &str) -> String {
    format!("Please summarize the following content:\n\n{}", content)
}

/// Cut `text` to at most `max_chars` characters without splitting a char.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
