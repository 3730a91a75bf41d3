//! Mail server discovery from account domains.
//!
//! Both directions of the watch need a host: IMAP to read the mailbox and SMTP
//! submission to send the replies. Well-known providers are looked up in a
//! built-in table; anything else falls back to `imap.<domain>` and
//! `smtp.<domain>`.
//!
//! # Example
//!
//! ```
//! use idle_reply::known_servers::{discover, ServerRegistry, MailServers};
//!
//! assert_eq!(discover("user@gmail.com").imap, "imap.gmail.com");
//! assert_eq!(discover("user@gmail.com").smtp, "smtp.gmail.com");
//!
//! let mut registry = ServerRegistry::with_defaults();
//! registry.register("mycompany.com", MailServers::new("mail.mycompany.com", "relay.mycompany.com"));
//! assert_eq!(registry.discover("user@mycompany.com").smtp, "relay.mycompany.com");
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

/// Built-in `domain → (imap host, smtp host)` table.
static KNOWN_SERVERS: LazyLock<HashMap<&'static str, (&'static str, &'static str)>> =
    LazyLock::new(|| {
        let mut m = HashMap::new();

        m.insert("gmail.com", ("imap.gmail.com", "smtp.gmail.com"));
        m.insert("googlemail.com", ("imap.gmail.com", "smtp.gmail.com"));

        m.insert("yahoo.com", ("imap.mail.yahoo.com", "smtp.mail.yahoo.com"));

        for domain in ["hotmail.com", "outlook.com", "live.com"] {
            m.insert(domain, ("outlook.office365.com", "smtp.office365.com"));
        }

        m.insert("aol.com", ("imap.aol.com", "smtp.aol.com"));

        for domain in ["icloud.com", "me.com", "mac.com"] {
            m.insert(domain, ("imap.mail.me.com", "smtp.mail.me.com"));
        }

        for domain in ["mail.ru", "internet.ru", "bk.ru", "inbox.ru", "list.ru"] {
            m.insert(domain, ("imap.mail.ru", "smtp.mail.ru"));
        }

        m.insert("yandex.ru", ("imap.yandex.ru", "smtp.yandex.ru"));
        m.insert("yandex.com", ("imap.yandex.com", "smtp.yandex.com"));

        m.insert("web.de", ("imap.web.de", "smtp.web.de"));
        for domain in ["gmx.de", "gmx.at", "gmx.ch", "gmx.net", "gmx.com"] {
            m.insert(domain, ("imap.gmx.net", "mail.gmx.net"));
        }
        m.insert("t-online.de", ("secureimap.t-online.de", "securesmtp.t-online.de"));

        m.insert("fastmail.com", ("imap.fastmail.com", "smtp.fastmail.com"));

        m
    });

/// IMAP and SMTP hosts for one account domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailServers {
    /// Host serving IMAP over TLS.
    pub imap: String,
    /// Host accepting SMTP submission.
    pub smtp: String,
}

impl MailServers {
    /// Creates a host pair.
    #[must_use]
    pub fn new(imap: impl Into<String>, smtp: impl Into<String>) -> Self {
        Self {
            imap: imap.into(),
            smtp: smtp.into(),
        }
    }

    fn fallback(domain: &str) -> Self {
        Self::new(format!("imap.{domain}"), format!("smtp.{domain}"))
    }
}

/// Runtime-extensible host discovery.
///
/// Custom entries take precedence over the built-in table, which is only
/// consulted when the registry was created with [`ServerRegistry::with_defaults`].
#[derive(Debug, Clone, Default)]
pub struct ServerRegistry {
    custom: HashMap<String, MailServers>,
    use_defaults: bool,
}

impl ServerRegistry {
    /// Creates an empty registry without the built-in table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry backed by the built-in table.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            custom: HashMap::new(),
            use_defaults: true,
        }
    }

    /// Adds or replaces the hosts for `domain` (case-insensitive).
    pub fn register(&mut self, domain: impl Into<String>, servers: MailServers) {
        self.custom.insert(domain.into().to_lowercase(), servers);
    }

    /// Returns `true` if `domain` resolves without the fallback.
    #[must_use]
    pub fn is_known(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.custom.contains_key(&domain)
            || (self.use_defaults && KNOWN_SERVERS.contains_key(domain.as_str()))
    }

    /// Resolves the hosts for an email address.
    ///
    /// Resolution order: custom entries, built-in table (if enabled),
    /// `imap.<domain>` / `smtp.<domain>`.
    #[must_use]
    pub fn discover(&self, email: &str) -> MailServers {
        let domain = domain_of(email);

        if let Some(servers) = self.custom.get(&domain) {
            return servers.clone();
        }
        if self.use_defaults {
            if let Some(&(imap, smtp)) = KNOWN_SERVERS.get(domain.as_str()) {
                return MailServers::new(imap, smtp);
            }
        }
        MailServers::fallback(&domain)
    }
}

/// Resolves the hosts for an email address using the built-in table.
#[must_use]
pub fn discover(email: &str) -> MailServers {
    ServerRegistry::with_defaults().discover(email)
}

fn domain_of(email: &str) -> String {
    email
        .rsplit_once('@')
        .map_or(email, |(_, domain)| domain)
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gmail() {
        assert_eq!(
            discover("jsmith@gmail.com"),
            MailServers::new("imap.gmail.com", "smtp.gmail.com")
        );
    }

    #[test]
    fn test_shared_provider_hosts() {
        assert_eq!(discover("user@hotmail.com"), discover("user@outlook.com"));
        assert_eq!(discover("user@gmx.de").smtp, "mail.gmx.net");
    }

    #[test]
    fn test_unknown_domain_fallback() {
        assert_eq!(
            discover("jsmith@example.com"),
            MailServers::new("imap.example.com", "smtp.example.com")
        );
    }

    #[test]
    fn test_domain_is_case_insensitive() {
        assert_eq!(discover("user@GMAIL.Com").imap, "imap.gmail.com");
    }

    #[test]
    fn test_registry_without_defaults() {
        let registry = ServerRegistry::new();
        assert!(!registry.is_known("gmail.com"));
        assert_eq!(registry.discover("user@gmail.com").imap, "imap.gmail.com");
        assert_eq!(registry.discover("user@yahoo.com").imap, "imap.yahoo.com");
    }

    #[test]
    fn test_custom_entry_overrides_table() {
        let mut registry = ServerRegistry::with_defaults();
        registry.register("Gmail.com", MailServers::new("imap.proxy.local", "smtp.proxy.local"));

        assert!(registry.is_known("GMAIL.COM"));
        assert_eq!(registry.discover("user@gmail.com").imap, "imap.proxy.local");
    }
}
