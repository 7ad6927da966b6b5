//! Read-time presentation of vault items.
//!
//! Display metadata is computed by pure functions when the typed view is
//! materialized; nothing here is stored back into the document.

use url::Url;

use crate::schema::{ItemOrigin, LoginItem};

/// Subdomain prefixes stripped when deriving a display name from a host.
const STRIPPED_PREFIXES: [&str; 5] = ["www.", "app.", "mobile.", "account.", "accounts."];

/// A login annotated for the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginView {
    /// Whether this login matched the known-service catalog.
    pub matches_catalog: bool,
    /// Pretty display name.
    pub display_name: String,
    /// The underlying item.
    pub item: LoginItem,
}

impl LoginView {
    /// Annotate a login item.
    pub fn from_item(item: LoginItem) -> Self {
        Self {
            matches_catalog: item.origin == ItemOrigin::Matched,
            display_name: login_display_name(&item),
            item,
        }
    }
}

fn strip_subdomain_prefixes(host: &str) -> &str {
    let mut host = host;
    loop {
        let Some(stripped) = STRIPPED_PREFIXES
            .iter()
            .find_map(|prefix| host.strip_prefix(prefix))
        else {
            return host;
        };
        host = stripped;
    }
}

/// Derive the display name for a login.
///
/// Catalog-matched items get the parsed URL host with typical subdomain
/// prefixes stripped; manual items keep the user-entered name (or host)
/// verbatim.
pub fn login_display_name(item: &LoginItem) -> String {
    match item.origin {
        ItemOrigin::Matched => {
            let host = item
                .url
                .as_deref()
                .and_then(|raw| Url::parse(raw).ok())
                .and_then(|url| url.host_str().map(str::to_string));
            match host {
                Some(host) => strip_subdomain_prefixes(&host).to_string(),
                None => item
                    .name
                    .clone()
                    .or_else(|| item.url.clone())
                    .unwrap_or_default(),
            }
        }
        ItemOrigin::Manual => item
            .name
            .clone()
            .or_else(|| item.url.clone())
            .unwrap_or_default(),
    }
}
