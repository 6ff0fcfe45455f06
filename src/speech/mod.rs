//! Spoken-fragment preparation for the external voice sink.
//!
//! Assistant replies are split into sentence fragments, numerals are expanded
//! (see [`normalize`]), and each fragment is emitted in order. Exactly one
//! fragment per turn carries `finish = true`.

pub mod normalize;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub use normalize::normalize_numbers;

/// One text fragment for the voice sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechFragment {
    /// Text to speak.
    pub content: String,
    /// Whether this is the last fragment of the turn.
    pub finish: bool,
}

/// External consumer that speaks fragments in emission order.
pub trait VoiceSink: Send + Sync {
    /// Deliver one fragment.
    fn speak(&self, fragment: SpeechFragment);
}

/// Voice sink that forwards fragments over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelVoiceSink {
    tx: mpsc::UnboundedSender<SpeechFragment>,
}

impl ChannelVoiceSink {
    /// Create a sink and the receiver the playback side reads from.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SpeechFragment>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl VoiceSink for ChannelVoiceSink {
    fn speak(&self, fragment: SpeechFragment) {
        if self.tx.send(fragment).is_err() {
            debug!("voice sink receiver dropped, fragment discarded");
        }
    }
}

fn is_cjk_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？')
}

fn is_ascii_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn is_closing_quote(c: char) -> bool {
    matches!(c, '"' | '\'' | ')' | '\u{201D}' | '\u{2019}' | '」' | '』')
}

/// Split `text` into sentence fragments.
///
/// ASCII `.`/`!`/`?` end a sentence only when followed by whitespace or end of
/// text, so decimals such as `3.5` stay intact; a `.` after a bare list number
/// (`"1. "`) does not end a sentence. CJK `。！？` always end a sentence.
/// Newlines always split. Runs of terminal punctuation and closing quotes stay
/// attached to their sentence. Empty fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut fragments = Vec::new();
    let mut start = 0;

    for (idx, &(pos, c)) in chars.iter().enumerate() {
        if c == '\n' {
            push_fragment(&text[start..pos], &mut fragments);
            start = pos + 1;
            continue;
        }

        let prev = idx.checked_sub(1).map(|p| chars[p].1);
        let prev_terminal = prev.is_some_and(|p| is_ascii_terminal(p) || is_cjk_terminal(p));
        let ends_here = is_ascii_terminal(c)
            || is_cjk_terminal(c)
            || (is_closing_quote(c) && prev_terminal);
        if !ends_here {
            continue;
        }

        let next = chars.get(idx + 1).map(|&(_, n)| n);
        if let Some(n) = next
            && (is_ascii_terminal(n) || is_cjk_terminal(n) || is_closing_quote(n))
        {
            // Let the run finish first.
            continue;
        }

        let cjk_run =
            is_cjk_terminal(c) || (is_closing_quote(c) && prev.is_some_and(is_cjk_terminal));
        if !cjk_run {
            let followed_by_break = match next {
                None => true,
                Some(n) => n.is_whitespace() || is_cjk_char(n),
            };
            if !followed_by_break {
                continue;
            }
            if c == '.' && is_list_marker(&text[start..pos]) {
                continue;
            }
        }

        let end = pos + c.len_utf8();
        push_fragment(&text[start..end], &mut fragments);
        start = end;
    }

    if start < text.len() {
        push_fragment(&text[start..], &mut fragments);
    }
    fragments
}

fn push_fragment(fragment: &str, fragments: &mut Vec<String>) {
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        fragments.push(trimmed.to_owned());
    }
}

fn is_cjk_char(c: char) -> bool {
    matches!(c as u32, 0x3000..=0x303F | 0x3040..=0x30FF | 0x4E00..=0x9FFF | 0xFF00..=0xFFEF)
}

fn is_list_marker(segment: &str) -> bool {
    let trimmed = segment.trim();
    !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit())
}

/// Remove embedded image markup (`![alt](url)` and `<img ...>` tags).
pub fn strip_image_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    loop {
        let md = rest.find("![");
        let html = find_ascii_case_insensitive(rest, "<img");
        let next = match (md, html) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let Some(pos) = next else {
            out.push_str(rest);
            break;
        };

        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let consumed = if tail.starts_with("![") {
            markdown_image_len(tail)
        } else {
            tail.find('>').map(|end| end + 1)
        };
        match consumed {
            Some(n) => rest = &tail[n..],
            None => {
                // Unterminated markup: keep the opening char and move on.
                let first = tail.chars().next().map_or(1, char::len_utf8);
                out.push_str(&tail[..first]);
                rest = &tail[first..];
            }
        }
    }

    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Byte length of a `![alt](url)` construct at the start of `text`.
fn markdown_image_len(text: &str) -> Option<usize> {
    let close_alt = text.find("](")?;
    let close_url = text[close_alt + 2..].find(')')?;
    Some(close_alt + 2 + close_url + 1)
}

fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - pat.len()).find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

/// Build the fragments for one reply.
///
/// When `finish_turn` is set the last fragment is marked final; if the text
/// yields no fragments, a single empty final fragment still closes the turn.
pub fn fragments_for(text: &str, finish_turn: bool) -> Vec<SpeechFragment> {
    let sentences = split_sentences(text);
    let count = sentences.len();
    let mut fragments: Vec<SpeechFragment> = sentences
        .into_iter()
        .enumerate()
        .map(|(i, sentence)| SpeechFragment {
            content: normalize_numbers(&sentence),
            finish: finish_turn && i + 1 == count,
        })
        .collect();
    if finish_turn && fragments.is_empty() {
        fragments.push(SpeechFragment {
            content: String::new(),
            finish: true,
        });
    }
    fragments
}
