//! Hiring pipeline logic shared by the HTTP handlers and the worker.

pub mod monitor;
pub mod outreach;
pub mod screening;
pub mod slots;

use uuid::Uuid;

/// Public link slug: up to six words of the title plus a random suffix.
pub fn public_link_for(title: &str) -> String {
    let prefix = title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .take(6)
        .collect::<Vec<_>>()
        .join("-");
    let suffix = Uuid::new_v4().simple().to_string();
    if prefix.is_empty() {
        suffix[..12].to_string()
    } else {
        format!("{}-{}", prefix, &suffix[..8])
    }
}
