use crate::core::usage::count_tokens;
use crate::utils::error::{BoostError, Result};

/// Split `text` into pieces of at most `budget` tokens each.
///
/// Splits at line boundaries first, then at word boundaries for oversized
/// lines, then by characters for oversized words. Concatenating the chunks
/// yields `text` again.
pub fn chunk_input(text: &str, budget: usize) -> Result<Vec<String>> {
    if budget == 0 {
        return Err(BoostError::bad_request(
            "Error: the prompt leaves no room for the input; please shorten the request",
        ));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0;

    for line in text.split_inclusive('\n') {
        let line_tokens = count_tokens(line);

        if line_tokens > budget {
            flush(&mut chunks, &mut current, &mut current_tokens);
            for piece in split_line(line, budget) {
                let piece_tokens = count_tokens(&piece);
                if current_tokens + piece_tokens > budget {
                    flush(&mut chunks, &mut current, &mut current_tokens);
                }
                current.push_str(&piece);
                current_tokens += piece_tokens;
            }
            continue;
        }

        if current_tokens + line_tokens > budget {
            flush(&mut chunks, &mut current, &mut current_tokens);
        }
        current.push_str(line);
        current_tokens += line_tokens;
    }
    flush(&mut chunks, &mut current, &mut current_tokens);

    Ok(chunks)
}

fn flush(chunks: &mut Vec<String>, current: &mut String, tokens: &mut usize) {
    if !current.is_empty() {
        chunks.push(std::mem::take(current));
    }
    *tokens = 0;
}

/// Word-with-trailing-whitespace pieces; words over budget are cut by characters.
fn split_line(line: &str, budget: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_space = false;

    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            pieces.push(&line[start..i]);
            start = i;
            in_space = false;
        }
    }
    if start < line.len() {
        pieces.push(&line[start..]);
    }

    pieces
        .into_iter()
        .flat_map(|piece| {
            if count_tokens(piece) <= budget {
                vec![piece.to_string()]
            } else {
                split_chars(piece, budget)
            }
        })
        .collect()
}

fn split_chars(word: &str, budget: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for c in word.chars() {
        current.push(c);
        if count_tokens(&current) > budget {
            current.pop();
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}
