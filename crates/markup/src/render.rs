//! HTML rendering.

use std::collections::HashMap;

use crate::nodes::{Node, NodeKind};

/// Link targets the renderer cannot derive from the text alone.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Prefix for hashtag links; the lowercased tag is appended.
    pub tag_base: String,
    /// Resolved mentions, keyed by lowercased acct (`@user@host`) to the
    /// actor URL. Mentions missing from the map render as plain text.
    pub mentions: HashMap<String, String>,
}

impl RenderOptions {
    /// Options for a local domain with no resolved mentions.
    #[must_use]
    pub fn for_domain(domain: &str) -> Self {
        Self {
            tag_base: format!("https://{domain}/tags/"),
            mentions: HashMap::new(),
        }
    }

    /// Register the actor URL a mention links to.
    #[must_use]
    pub fn with_mention(mut self, acct: &str, href: impl Into<String>) -> Self {
        self.mentions.insert(acct.to_lowercase(), href.into());
        self
    }
}

/// Render a post body to HTML.
///
/// Blank lines separate `<p>` paragraphs, single newlines become `<br>`, and
/// every piece of source text is escaped.
#[must_use]
pub fn to_html(text: &str, options: &RenderOptions) -> String {
    let normalized = text.replace("\r\n", "\n");
    split_paragraphs(&normalized)
        .map(|para| format!("<p>{}</p>", nodes_to_html(&crate::parse(para), options)))
        .collect()
}

fn split_paragraphs(text: &str) -> impl Iterator<Item = &str> {
    text.split("\n\n")
        .map(|p| p.trim_matches('\n'))
        .filter(|p| !p.trim().is_empty())
}

/// Convert nodes to HTML.
fn nodes_to_html(nodes: &[Node], options: &RenderOptions) -> String {
    nodes.iter().map(|n| node_to_html(n, options)).collect()
}

/// Convert a single node to HTML.
fn node_to_html(node: &Node, options: &RenderOptions) -> String {
    match &node.kind {
        NodeKind::Text { text } => html_escape(text).replace('\n', "<br>"),
        NodeKind::Mention(mention) => match options.mentions.get(&mention.acct.to_lowercase()) {
            Some(href) => format!(
                "<span class=\"h-card\"><a href=\"{}\" class=\"u-url mention\">@<span>{}</span></a></span>",
                html_escape(href),
                html_escape(&mention.username)
            ),
            None => html_escape(&mention.acct),
        },
        NodeKind::Hashtag { tag } => {
            format!(
                "<a href=\"{}{}\" class=\"mention hashtag\" rel=\"tag\">#<span>{}</span></a>",
                html_escape(&options.tag_base),
                html_escape(&tag.to_lowercase()),
                html_escape(tag)
            )
        }
        NodeKind::Url { url } => {
            format!(
                "<a href=\"{}\" rel=\"nofollow noopener noreferrer\" target=\"_blank\">{}</a>",
                html_escape(url),
                html_escape(url)
            )
        }
        NodeKind::Link { url, text } => {
            format!(
                "<a href=\"{}\" rel=\"nofollow noopener noreferrer\" target=\"_blank\">{}</a>",
                html_escape(url),
                html_escape(text)
            )
        }
    }
}

/// Escape HTML special characters.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
