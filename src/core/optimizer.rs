use crate::core::usage::{count_message_tokens, count_tokens};
use crate::domain::model::{ChatMessage, Role};
use crate::utils::error::{BoostError, Result};

const MESSAGE_OVERHEAD: usize = 4;

fn truncation_note(discarded_words: usize) -> String {
    format!(
        "\n\n[Truncated input, discarded ~{} words]",
        discarded_words
    )
}

/// Fit `messages` into `budget` tokens by dropping trailing words from the
/// latest non-system messages. System messages are never touched.
///
/// Returns the (possibly) shortened messages and the number of words dropped.
pub fn optimize_messages(
    messages: Vec<ChatMessage>,
    budget: usize,
) -> Result<(Vec<ChatMessage>, usize)> {
    let mut total = count_message_tokens(&messages);
    if total <= budget {
        return Ok((messages, 0));
    }

    let system_tokens: usize = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| count_tokens(&m.content) + MESSAGE_OVERHEAD)
        .sum();
    if system_tokens >= budget {
        return Err(BoostError::bad_request(format!(
            "Error: system prompts need {} tokens, which exceeds the input budget of {} tokens",
            system_tokens, budget
        )));
    }

    let mut slots: Vec<Option<ChatMessage>> = messages.into_iter().map(Some).collect();
    let mut discarded = 0;

    for slot in slots.iter_mut().rev() {
        if total <= budget {
            break;
        }
        let Some(message) = slot.as_mut() else {
            continue;
        };
        if message.role == Role::System {
            continue;
        }

        let own = count_tokens(&message.content) + MESSAGE_OVERHEAD;
        let others = total - own;
        let room = budget.saturating_sub(others);

        match truncate_to_fit(&message.content, room) {
            Some((kept, dropped)) => {
                message.content = kept;
                discarded += dropped;
                total = others + count_tokens(&message.content) + MESSAGE_OVERHEAD;
            }
            None => {
                discarded += message.content.split_whitespace().count();
                *slot = None;
                total = others;
            }
        }
    }

    let optimized: Vec<ChatMessage> = slots.into_iter().flatten().collect();
    tracing::debug!(
        "Truncated input to {} tokens, discarded ~{} words",
        count_message_tokens(&optimized),
        discarded
    );
    Ok((optimized, discarded))
}

/// Keep the longest word prefix of `content` that, with the truncation note,
/// fits `room` tokens. `None` when not even one word fits.
fn truncate_to_fit(content: &str, room: usize) -> Option<(String, usize)> {
    let spans = word_spans(content);
    let reserve = count_tokens(&truncation_note(spans.len())) + MESSAGE_OVERHEAD;
    let available = room.checked_sub(reserve)?;

    // 字詞連同前面的空白一起計算，與整段編碼時的切分一致
    let mut used = 0;
    let mut kept = 0;
    let mut previous_end = 0;
    for &(_, end) in &spans {
        let cost = count_tokens(&content[previous_end..end]);
        previous_end = end;
        if used + cost > available {
            break;
        }
        used += cost;
        kept += 1;
    }

    if kept == 0 {
        return None;
    }

    let cut = spans[kept - 1].1;
    let dropped = spans.len() - kept;
    Some((
        format!("{}{}", &content[..cut], truncation_note(dropped)),
        dropped,
    ))
}

pub(crate) fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push((s, i));
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }

    spans
}
