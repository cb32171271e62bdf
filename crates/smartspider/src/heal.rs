//! Bounded, deterministic repair of near-valid JSON replies.
//!
//! A reply is first parsed strictly. If that fails, exactly one heal pass runs:
//! Markdown code fences are stripped, surrounding commentary is cut away by
//! locating the first balanced JSON object or array, and trailing commas
//! before a closing bracket are removed. Anything still unparsable after that
//! is left to the retry-with-diagnostics loop.

use crate::error::Violation;
use serde_json::Value;

/// A parsed reply and whether the heal pass was needed.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub value: Value,
    pub healed: bool,
}

/// Parse a raw model reply, running the heal pass once on failure.
pub fn parse_reply(raw: &str) -> Result<ParsedReply, Violation> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Violation::new("$", "empty reply"));
    }

    let strict_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => {
            return Ok(ParsedReply {
                value,
                healed: false,
            })
        }
        Err(e) => e,
    };

    let Some(candidate) = heal(trimmed) else {
        return Err(Violation::new(
            "$",
            format!("reply is not JSON ({strict_err}) and contains no JSON object"),
        ));
    };

    serde_json::from_str::<Value>(&candidate)
        .map(|value| ParsedReply {
            value,
            healed: true,
        })
        .map_err(|e| Violation::new("$", format!("reply is not valid JSON after repair: {e}")))
}

/// Produce a repaired candidate string, or `None` when no JSON body is present.
pub fn heal(raw: &str) -> Option<String> {
    let unfenced = strip_code_fence(raw);
    let body = first_balanced(unfenced)?;
    Some(strip_trailing_commas(body))
}

/// Return the inside of the first Markdown code fence, or the input unchanged.
fn strip_code_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw;
    };
    let after_open = &raw[open + 3..];
    // Skip the info string (`json`, `JSON`, ...) up to the end of the line.
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Slice out the first balanced `{...}` or `[...]`, honouring string literals.
fn first_balanced(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop commas that directly precede `}` or `]` outside string literals.
fn strip_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}
