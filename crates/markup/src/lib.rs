//! Post body markup for tern.
//!
//! Post bodies are plain text with a few recognized constructs:
//! markdown links `[text](url)`, bare http(s) URLs, `#hashtags`, and
//! `@user` / `@user@host` mentions. Everything else is escaped.
//!
//! # Example
//!
//! ```
//! use tern_markup::{RenderOptions, extract_hashtags, extract_mentions, to_html};
//!
//! let text = "Hello @bob@remote.example #rust";
//! let mentions = extract_mentions(text);
//! let hashtags = extract_hashtags(text);
//! let options = RenderOptions::for_domain("example.com")
//!     .with_mention(&mentions[0].acct, "https://remote.example/users/bob");
//! let html = to_html(text, &options);
//! assert!(html.contains("https://example.com/tags/rust"));
//! assert_eq!(hashtags, vec!["rust".to_string()]);
//! ```

#![allow(clippy::missing_panics_doc)]

mod nodes;
mod parser;
mod render;

pub use nodes::{Mention, Node, NodeKind};
pub use parser::{extract_hashtags, extract_mentions, parse};
pub use render::{RenderOptions, to_html};
