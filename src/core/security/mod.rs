// Security module for outbound URL validation
//
// Every URL a protocol declares, and every URL a protocol is fetched from,
// is checked here: HTTPS only, no embedded credentials, no local or private
// hosts, and an optional domain allow-list.

pub mod url_policy;

pub use url_policy::{UrlSecurityError, is_allowed_domain, url_violations, validate_url};
