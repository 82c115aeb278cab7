//! Source line counting for benchmark inputs
//!
//! A line counts when it holds at least one character outside comments and
//! whitespace. String and template literals are skipped so that `//` or `/*`
//! inside them is not taken for a comment.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    BlockComment,
    Literal(char),
}

/// Non-blank, non-comment lines of a JavaScript source text
pub fn count_source_lines(contents: &str) -> usize {
    let mut state = State::Code;
    let mut count = 0;

    for line in contents.lines() {
        let mut has_code = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match state {
                State::BlockComment => {
                    if c == '*' && chars.peek() == Some(&'/') {
                        chars.next();
                        state = State::Code;
                    }
                }
                State::Literal(quote) => {
                    has_code = true;
                    if c == '\\' {
                        chars.next();
                    } else if c == quote {
                        state = State::Code;
                    }
                }
                State::Code => match c {
                    '/' if chars.peek() == Some(&'/') => break,
                    '/' if chars.peek() == Some(&'*') => {
                        chars.next();
                        state = State::BlockComment;
                    }
                    '"' | '\'' | '`' => {
                        has_code = true;
                        state = State::Literal(c);
                    }
                    c if !c.is_whitespace() => has_code = true,
                    _ => {}
                },
            }
        }
        // Only template literals span lines
        if matches!(state, State::Literal(q) if q != '`') {
            state = State::Code;
        }
        if has_code {
            count += 1;
        }
    }
    count
}

/// Total source lines of `files`, each resolved against `dir`
pub fn count_files(dir: &Path, files: &[String]) -> Result<usize> {
    let mut total = 0;
    for file in files {
        let path = dir.join(file);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read benchmark source: {:?}", path))?;
        total += count_source_lines(&contents);
    }
    Ok(total)
}
