//! Command template rendering.
//!
//! Step commands may reference caller parameters as `{name}`. Literal braces
//! are written `{{` and `}}`. Any placeholder without a matching parameter
//! fails rendering, which fails the step.

use thiserror::Error;

use super::pipeline::Params;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("Missing template parameter '{0}'")]
    MissingParameter(String),

    #[error("Empty placeholder '{{}}' at byte {0}; placeholders must be named")]
    EmptyPlaceholder(usize),

    #[error("Unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("Single '}}' at byte {0}; write '}}}}' for a literal brace")]
    UnmatchedClose(usize),
}

/// Fill `{name}` placeholders in `template` from `params`
pub fn render(template: &str, params: &Params) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(TemplateError::Unclosed(pos));
                }

                let key = name.trim();
                if key.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder(pos));
                }
                let value = params
                    .get(key)
                    .ok_or_else(|| TemplateError::MissingParameter(key.to_string()))?;
                out.push_str(value);
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    out.push('}');
                } else {
                    return Err(TemplateError::UnmatchedClose(pos));
                }
            }
            c => out.push(c),
        }
    }

    Ok(out)
}

/// Names referenced by a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        if let Some(stripped) = after.strip_prefix('{') {
            rest = stripped;
            continue;
        }
        match after.find('}') {
            Some(end) => {
                let name = after[..end].trim();
                if !name.is_empty() {
                    names.push(name.to_string());
                }
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}
