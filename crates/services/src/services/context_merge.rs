//! Renders selected contexts into the two prompt artifacts a chat turn
//! carries: a sentinel-wrapped system-prompt prefix and a synthetic first
//! user message restating the same content. The redundancy is deliberate;
//! some models weight the most recent user turn more heavily than the system
//! prompt.
//!
//! Pure transformations: byte-identical output for identical input rows.

use db::models::context::Context;

/// Hard cap on the rendered system-prompt block, regardless of how large the
/// stored contexts are.
pub const MAX_CONTEXT_CHARS: usize = 120_000;

pub const CONTEXT_START_MARKER: &str = "[[CONTEXTUALIZE START]]";
pub const CONTEXT_END_MARKER: &str = "[[CONTEXTUALIZE END]]";
pub const TRUNCATION_MARKER: &str = "\n[truncated]";

const SECTION_SEPARATOR: &str = "\n\n---\n\n";

/// The `{name, content}` pair the merge operates on. Practically 0 or 1 per
/// turn, though any number is tolerated.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedContext {
    pub name: String,
    pub content: String,
}

impl From<&Context> for MergedContext {
    fn from(context: &Context) -> Self {
        Self {
            name: context.name.clone(),
            content: context.content.clone(),
        }
    }
}

/// System-prompt prefix: one markdown section per context, sentinel-wrapped,
/// hard-truncated at [`MAX_CONTEXT_CHARS`]. `None` when no contexts are
/// selected.
pub fn render_system_prompt(contexts: &[MergedContext]) -> Option<String> {
    if contexts.is_empty() {
        return None;
    }

    let sections = contexts
        .iter()
        .map(|context| format!("## {}\n\n{}", context.name, context.content))
        .collect::<Vec<_>>()
        .join(SECTION_SEPARATOR);

    let block = format!("{CONTEXT_START_MARKER}\n{sections}\n{CONTEXT_END_MARKER}");

    if block.chars().count() > MAX_CONTEXT_CHARS {
        let mut truncated: String = block.chars().take(MAX_CONTEXT_CHARS).collect();
        truncated.push_str(TRUNCATION_MARKER);
        Some(truncated)
    } else {
        Some(block)
    }
}

/// Content for the synthetic user message injected ahead of the history.
/// `None` when no contexts are selected.
pub fn synthetic_context_message(contexts: &[MergedContext]) -> Option<String> {
    if contexts.is_empty() {
        return None;
    }

    let mut body = String::from(
        "The following context documents must be applied when answering:\n",
    );
    for context in contexts {
        body.push_str(&format!(
            "\n### {}\n```text\n{}\n```\n",
            context.name, context.content
        ));
    }
    Some(body)
}
