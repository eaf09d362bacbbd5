//! Markup AST nodes.

/// A node in the parsed post body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The type of node.
    pub kind: NodeKind,
    /// Start byte offset in the source text.
    pub start: usize,
    /// End byte offset in the source text.
    pub end: usize,
}

impl Node {
    /// Create a new node.
    #[must_use]
    pub const fn new(kind: NodeKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }
}

/// Types of nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Plain text, possibly containing single newlines.
    Text { text: String },

    /// Mention (@user or @user@host).
    Mention(Mention),

    /// Hashtag (#tag), without the leading `#`.
    Hashtag { tag: String },

    /// Bare http(s) URL.
    Url { url: String },

    /// Markdown link `[text](url)`.
    Link { url: String, text: String },
}

/// Mention information.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mention {
    /// Username.
    pub username: String,
    /// Host (if written).
    pub host: Option<String>,
    /// Full acct string as written (@user or @user@host).
    pub acct: String,
}

impl Mention {
    /// `user@host` form used for `WebFinger`, or bare `user`.
    #[must_use]
    pub fn handle(&self) -> String {
        self.host.as_ref().map_or_else(
            || self.username.clone(),
            |h| format!("{}@{h}", self.username),
        )
    }
}
