/// ANSI escape code stripping
///
/// Training frameworks colour their console loggers (detectron2 wraps the
/// logger name in green, warnings in red). The escape bytes can land between
/// a label and its value, so they are removed before pattern matching.

use std::borrow::Cow;

const ESC: char = '\x1b';

/// Strip ANSI escape codes from a line
///
/// Handles:
/// - CSI sequences: `\x1b[...m`
/// - OSC sequences: `\x1b]...` terminated by BEL or `ESC \`
/// - Simple Fe sequences (`ESC` + one char in `@`..=`_`)
///
/// Returns Cow::Borrowed if no codes were found.
pub fn strip_ansi_codes(input: &str) -> Cow<'_, str> {
    if !input.contains(ESC) {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != ESC {
            output.push(c);
            continue;
        }

        match chars.peek().copied() {
            // Lone trailing ESC
            None => {}
            Some('[') => {
                chars.next();
                // Parameters run until the final byte (0x40-0x7E)
                for b in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&b) {
                        break;
                    }
                }
            }
            Some(']') => {
                chars.next();
                while let Some(b) = chars.next() {
                    if b == '\x07' {
                        break;
                    }
                    if b == ESC && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            Some(next) if ('\x40'..='\x5f').contains(&next) => {
                chars.next();
            }
            // Not an escape sequence we know; drop the ESC, keep the rest
            Some(_) => {}
        }
    }

    Cow::Owned(output)
}
