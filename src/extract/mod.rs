//! Article extraction strategies.
//!
//! Three interchangeable strategies turn a fetched document into canonical
//! [`Article`](crate::models::Article) records:
//!
//! | Strategy | Module | Input | Notes |
//! |----------|----------|-----------------------|-------|
//! | Markup | [`markup`] | HTML listing page | Selector-driven, per-source config |
//! | Feed | [`feed`] | WP-JSON post array | Filters on the GMT publish date |
//! | Reader | [`reader`] | Proxy Markdown render | Last resort; fragile line heuristics |
//!
//! All three share the same contract: anomalies (no containers matched, a
//! record missing its headline or link) shrink the result list, they never
//! raise. A record with no resolvable absolute link has no identity and is
//! dropped; a record with neither description nor image is still valid —
//! text-only delivery is fine.

pub mod feed;
pub mod markup;
pub mod reader;
