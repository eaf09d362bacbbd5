//! Post body parser.

use std::collections::HashSet;

use regex::Regex;
use url::Url;

use crate::nodes::{Mention, Node, NodeKind};

// Regex patterns - these are valid static patterns that cannot fail
#[allow(clippy::unwrap_used)]
static MENTION_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"@([a-zA-Z0-9_]+)(?:@([a-zA-Z0-9][a-zA-Z0-9.-]*[a-zA-Z0-9](?::[0-9]+)?))?")
        .unwrap()
});

#[allow(clippy::unwrap_used)]
static HASHTAG_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"#(\w+)").unwrap());

#[allow(clippy::unwrap_used)]
static URL_RE: std::sync::LazyLock<Regex> =
    std::sync::LazyLock::new(|| Regex::new(r"https?://[^\s<>\[\]()]+").unwrap());

#[allow(clippy::unwrap_used)]
static LINK_RE: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
    Regex::new(r"\[([^\[\]\n]+)\]\((https?://[^\s()]+)\)").unwrap()
});

/// Punctuation that ends a sentence rather than a URL.
const URL_TRAILING: &[char] = &['.', ',', ';', ':', '!', '?', '\'', '"'];

/// Whether the character before `start` allows a mention or hashtag to begin
/// there. Rules out e-mail addresses and `foo#bar`.
fn at_word_boundary(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .is_none_or(|c| !(c.is_alphanumeric() || c == '_' || c == '@' || c == '#'))
}

fn is_web_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

/// Parse a post body into nodes.
///
/// Overlapping matches resolve to the one that starts first, so a `#fragment`
/// inside a URL stays part of the URL and a URL inside a link stays part of
/// the link.
#[must_use]
#[allow(clippy::unwrap_used)] // Regex capture groups are guaranteed to exist
pub fn parse(text: &str) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut pos = 0;

    // Collect all matches with their positions
    let mut matches: Vec<(usize, usize, NodeKind)> = Vec::new();

    // Find markdown links
    for cap in LINK_RE.captures_iter(text) {
        let m = cap.get(0).unwrap();
        let url = cap.get(2).unwrap().as_str();
        if !is_web_url(url) {
            continue;
        }
        matches.push((
            m.start(),
            m.end(),
            NodeKind::Link {
                url: url.to_string(),
                text: cap.get(1).unwrap().as_str().to_string(),
            },
        ));
    }

    // Find URLs
    for m in URL_RE.find_iter(text) {
        let url = m.as_str().trim_end_matches(URL_TRAILING);
        if !is_web_url(url) {
            continue;
        }
        matches.push((
            m.start(),
            m.start() + url.len(),
            NodeKind::Url {
                url: url.to_string(),
            },
        ));
    }

    // Find mentions
    for cap in MENTION_RE.captures_iter(text) {
        let m = cap.get(0).unwrap();
        if !at_word_boundary(text, m.start()) {
            continue;
        }
        let username = cap.get(1).unwrap().as_str().to_string();
        let host = cap.get(2).map(|h| h.as_str().to_string());
        matches.push((
            m.start(),
            m.end(),
            NodeKind::Mention(Mention {
                username,
                host,
                acct: m.as_str().to_string(),
            }),
        ));
    }

    // Find hashtags
    for cap in HASHTAG_RE.captures_iter(text) {
        let m = cap.get(0).unwrap();
        if !at_word_boundary(text, m.start()) {
            continue;
        }
        let tag = cap.get(1).unwrap().as_str();
        // "#1" is an ordinal, not a tag
        if tag.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        matches.push((
            m.start(),
            m.end(),
            NodeKind::Hashtag {
                tag: tag.to_string(),
            },
        ));
    }

    // Sort matches by position, longest first on ties
    matches.sort_by_key(|(start, end, _)| (*start, std::cmp::Reverse(*end)));

    // Remove overlapping matches (keep first)
    let mut filtered_matches: Vec<(usize, usize, NodeKind)> = Vec::new();
    for m in matches {
        if filtered_matches.is_empty() || m.0 >= filtered_matches.last().unwrap().1 {
            filtered_matches.push(m);
        }
    }

    // Build nodes from matches
    for (start, end, kind) in filtered_matches {
        // Add text before this match
        if start > pos {
            nodes.push(Node::new(
                NodeKind::Text {
                    text: text[pos..start].to_string(),
                },
                pos,
                start,
            ));
        }

        nodes.push(Node::new(kind, start, end));
        pos = end;
    }

    // Add remaining text
    if pos < text.len() {
        nodes.push(Node::new(
            NodeKind::Text {
                text: text[pos..].to_string(),
            },
            pos,
            text.len(),
        ));
    }

    nodes
}

/// Extract mentions in order of appearance, deduplicated by acct
/// (case-insensitive).
#[must_use]
pub fn extract_mentions(text: &str) -> Vec<Mention> {
    let mut seen = HashSet::new();
    parse(text)
        .into_iter()
        .filter_map(|node| match node.kind {
            NodeKind::Mention(mention) => Some(mention),
            _ => None,
        })
        .filter(|m| seen.insert(m.acct.to_lowercase()))
        .collect()
}

/// Extract hashtags (without `#`) in order of appearance, deduplicated
/// case-insensitively. The first spelling wins.
#[must_use]
pub fn extract_hashtags(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    parse(text)
        .into_iter()
        .filter_map(|node| match node.kind {
            NodeKind::Hashtag { tag } => Some(tag),
            _ => None,
        })
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}
