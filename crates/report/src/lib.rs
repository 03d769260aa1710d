//! HTML drill-down reports: one dated directory per run, an index page and
//! one page per presentation family, reachable through HMAC-signed URLs.

pub mod pages;
pub mod presentation;
pub mod sign;
pub mod slug;

pub use pages::{FamilyReport, ReportError, ReportIndex, ReportWriter};
pub use presentation::{effective_rules, presentation_family, FALLBACK_FAMILY};
pub use sign::{UrlSigner, TOKEN_TTL_SECS};
pub use slug::slugify;
