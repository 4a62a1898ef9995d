//! Completion of truncated JSON documents.
//!
//! A model streaming JSON produces a growing prefix of the final
//! document. [`complete_json`] turns such a prefix into a valid JSON
//! document by closing every open object and array, so the prefix can
//! be parsed into a best-effort snapshot.
//!
//! A prefix is only completed at a clean boundary. When it ends in the
//! middle of a string (key or value) or a bare literal (`12`, `tru`)
//! there is no way to know what the token will turn into, so `None` is
//! returned and the caller should wait for more text.

#[derive(Debug, Clone, Copy, PartialEq)]
enum Frame {
    /// Expecting a key or `}`
    ObjectKey,
    /// Seen a key, expecting `:`
    ObjectColon,
    /// Seen `:`, expecting a value
    ObjectValue,
    /// Seen a value, expecting `,` or `}`
    ObjectNext,
    /// Expecting a value or `]`
    ArrayValue,
    /// Seen a value, expecting `,` or `]`
    ArrayNext,
}

impl Frame {
    fn closer(&self) -> char {
        match self {
            Frame::ArrayValue | Frame::ArrayNext => ']',
            _ => '}',
        }
    }
}

/// Marks that a value finished in the innermost frame.
fn value_done(stack: &mut [Frame]) -> Option<()> {
    if let Some(top) = stack.last_mut() {
        *top = match top {
            Frame::ObjectValue => Frame::ObjectNext,
            Frame::ArrayValue => Frame::ArrayNext,
            _ => return None,
        };
    }
    Some(())
}

fn expects_value(stack: &[Frame], top_level_done: bool) -> bool {
    match stack.last() {
        Some(Frame::ObjectValue) | Some(Frame::ArrayValue) => true,
        Some(_) => false,
        None => !top_level_done,
    }
}

fn is_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.')
}

/// Returns a complete JSON document for a prefix of one, or `None` if
/// the prefix is malformed or stops inside a token.
pub fn complete_json(prefix: &str) -> Option<String> {
    let mut stack: Vec<Frame> = Vec::new();
    let mut top_level_done = false;
    let mut in_string = false;
    let mut escaped = false;
    let mut in_literal = false;
    // Byte offset of a trailing `,` that has to be dropped
    let mut dangling_comma: Option<usize> = None;

    for (idx, c) in prefix.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                match stack.last_mut() {
                    Some(top @ Frame::ObjectKey) => *top = Frame::ObjectColon,
                    Some(_) => value_done(&mut stack)?,
                    None => top_level_done = true,
                }
            }
            continue;
        }

        if in_literal {
            if is_literal_char(c) {
                continue;
            }
            in_literal = false;
            match stack.last() {
                Some(_) => value_done(&mut stack)?,
                None => top_level_done = true,
            }
        }

        if c.is_whitespace() {
            continue;
        }

        dangling_comma = None;
        match c {
            '{' | '[' => {
                if !expects_value(&stack, top_level_done) {
                    return None;
                }
                stack.push(if c == '{' {
                    Frame::ObjectKey
                } else {
                    Frame::ArrayValue
                });
            }
            '}' | ']' => {
                let top = stack.pop()?;
                let closes = match top {
                    Frame::ObjectKey | Frame::ObjectNext => '}',
                    Frame::ArrayValue | Frame::ArrayNext => ']',
                    _ => return None,
                };
                if closes != c {
                    return None;
                }
                match stack.last() {
                    Some(_) => value_done(&mut stack)?,
                    None => top_level_done = true,
                }
            }
            '"' => {
                match stack.last() {
                    Some(Frame::ObjectKey) => {}
                    _ if expects_value(&stack, top_level_done) => {}
                    _ => return None,
                }
                in_string = true;
            }
            ':' => match stack.last_mut() {
                Some(top @ Frame::ObjectColon) => *top = Frame::ObjectValue,
                _ => return None,
            },
            ',' => {
                match stack.last_mut() {
                    Some(top @ Frame::ObjectNext) => *top = Frame::ObjectKey,
                    Some(top @ Frame::ArrayNext) => *top = Frame::ArrayValue,
                    _ => return None,
                }
                dangling_comma = Some(idx);
            }
            c if is_literal_char(c) => {
                if !expects_value(&stack, top_level_done) {
                    return None;
                }
                in_literal = true;
            }
            _ => return None,
        }
    }

    if in_string || in_literal {
        return None;
    }
    if stack.is_empty() {
        return top_level_done.then(|| prefix.trim().to_string());
    }

    let mut completed = match dangling_comma {
        Some(idx) => prefix[..idx].to_string(),
        None => prefix.trim_end().to_string(),
    };

    // Only the innermost frame can be waiting on something. Every
    // outer frame is in the middle of the value being closed.
    match stack.last() {
        Some(Frame::ObjectColon) => completed.push_str(": null"),
        Some(Frame::ObjectValue) => completed.push_str(" null"),
        _ => {}
    }
    for frame in stack.iter().rev() {
        completed.push(frame.closer());
    }

    Some(completed)
}
