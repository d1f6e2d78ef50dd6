use std::collections::HashSet;

use masa_client::PostRecord;

use crate::seen_store::SeenStore;

pub const RETWEET_MARKER: &str = "RT ";
pub const REPLY_MARKER: &str = "@";

/// Permalink base used when the API gives no link of its own.
pub const STATUS_URL: &str = "https://twitter.com/i/status/";

/// Selects the posts of a batch that should be relayed.
#[derive(Debug, Clone)]
pub struct PostFilter {
    handle: Option<String>,
    match_author: bool,
}

impl PostFilter {
    pub fn new(handle: Option<String>, match_author: bool) -> Self {
        Self {
            handle,
            match_author,
        }
    }

    /// Original posts only: no retweets, no replies/mentions, and, when the
    /// query can return other authors, only the watched handle's own posts.
    pub fn is_authentic(&self, post: &PostRecord) -> bool {
        if post.body.starts_with(RETWEET_MARKER) || post.body.starts_with(REPLY_MARKER) {
            return false;
        }
        match (&self.handle, self.match_author) {
            (Some(handle), true) => post.author.eq_ignore_ascii_case(handle),
            _ => true,
        }
    }

    /// Filter a newest-first batch down to unseen authentic posts, oldest first.
    pub fn select_new(&self, posts: Vec<PostRecord>, seen: &SeenStore) -> Vec<PostRecord> {
        let mut in_batch = HashSet::new();
        posts
            .into_iter()
            .rev()
            .filter(|p| self.is_authentic(p))
            .filter(|p| !seen.contains(&p.id))
            .filter(|p| in_batch.insert(p.id.clone()))
            .collect()
    }
}

pub fn permalink(post: &PostRecord) -> String {
    post.permalink
        .clone()
        .unwrap_or_else(|| format!("{STATUS_URL}{}", post.id))
}

/// Notification text for one post. `fallback_author` is used when the API
/// did not report an author.
pub fn render_notification(post: &PostRecord, fallback_author: &str) -> String {
    let author = if post.author.is_empty() {
        fallback_author
    } else {
        post.author.as_str()
    };
    format!("𝕏 : [New Post from @{author}]({})", permalink(post))
}
