//! trail-agent/crates/ta-core/src/lib.rs
//!
//! The central domain logic and interface definitions for trail-agent.

pub mod analytics;
pub mod clock;
pub mod dedupe;
pub mod error;
pub mod exif;
pub mod filter;
pub mod gpx;
pub mod models;
pub mod notices;
pub mod review;
pub mod roles;
pub mod submission;
pub mod traits;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use roles::{Capability, Role};
pub use traits::*;

/// Areas every installation starts with.
pub const DEFAULT_AREAS: [&str; 7] = [
    "Aspen",
    "Snowmass",
    "The Crown",
    "Red Hill",
    "Glenwood Springs",
    "South Canyon",
    "New Castle",
];

/// Lowercase, ASCII-alphanumeric runs joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugs_collapse_punctuation() {
        assert_eq!(slugify("Glenwood Springs"), "glenwood-springs");
        assert_eq!(slugify("  Hunter Creek -- Upper* "), "hunter-creek-upper");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn default_areas_have_distinct_slugs() {
        let mut slugs: Vec<_> = DEFAULT_AREAS.iter().map(|a| slugify(a)).collect();
        slugs.sort();
        slugs.dedup();
        assert_eq!(slugs.len(), DEFAULT_AREAS.len());
    }
}
