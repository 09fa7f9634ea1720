//! Line tokenizer.
//!
//! Splits one line of script into raw tokens:
//!
//! | Input            | Token                                             |
//! |------------------|---------------------------------------------------|
//! | whitespace       | separator                                         |
//! | `"a b"`          | one token `a b` (quotes removed, `\"` and `\\`)   |
//! | `""`             | a null token                                      |
//! | `{A {B 1}}`      | one token, braces kept, inner text untouched      |
//! | `{{name}}`       | one token, braces kept                            |
//!
//! Once a token opens a `{`, it runs until the braces balance (or the line
//! ends), whitespace and quotes included.  No evaluation happens here.

/// A raw token; `None` marks an empty position (an empty quoted span).
pub type RawToken = Option<String>;

/// Split `line` into raw tokens.
pub fn tokenize(line: &str) -> Vec<RawToken> {
    let mut tokens: Vec<RawToken> = Vec::new();
    let mut cur = String::new();
    // `true` once the current token has begun, even if it is still empty
    // (an opening quote starts a token).
    let mut started = false;
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut chars = line.chars();

    while let Some(ch) = chars.next() {
        if depth > 0 {
            // Inside braces: copy verbatim, only track nesting.
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
            cur.push(ch);
            continue;
        }

        if in_quotes {
            match ch {
                '"' => in_quotes = false,
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        cur.push(escaped);
                    }
                }
                c => cur.push(c),
            }
            continue;
        }

        match ch {
            '"' => {
                in_quotes = true;
                started = true;
            }
            '{' => {
                depth = 1;
                started = true;
                cur.push(ch);
            }
            c if c.is_whitespace() => {
                if started {
                    push_token(&mut tokens, &mut cur);
                    started = false;
                }
            }
            c => {
                started = true;
                cur.push(c);
            }
        }
    }
    if started {
        push_token(&mut tokens, &mut cur);
    }
    tokens
}

fn push_token(tokens: &mut Vec<RawToken>, cur: &mut String) {
    if cur.is_empty() {
        tokens.push(None);
    } else {
        tokens.push(Some(std::mem::take(cur)));
    }
}

/// If `token` is wrapped as `{{name}}`, return `name`.
pub fn variable_ref(token: &str) -> Option<&str> {
    token
        .strip_prefix("{{")
        .and_then(|rest| rest.strip_suffix("}}"))
}

/// If `token` is wrapped as `{line}` (and is not a `{{name}}`), return `line`.
pub fn nested_line(token: &str) -> Option<&str> {
    if variable_ref(token).is_some() {
        return None;
    }
    token.strip_prefix('{').and_then(|rest| rest.strip_suffix('}'))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
