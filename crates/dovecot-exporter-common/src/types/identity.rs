//! MailboxIdentity - the (email, domain) label pair of every quota series

use crate::error::KeyError;

/// Identity of a mailbox as seen in a quota key
///
/// `domain` is always the part of `email` after the first `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MailboxIdentity {
    /// Full mailbox address, e.g. `jedrzej@example.org`
    pub email: String,
    /// Domain part of the address
    pub domain: String,
}

impl MailboxIdentity {
    /// Parse an identity from `<local-part>@<domain>`
    ///
    /// The split is limited to two parts, so any further `@` stays in the
    /// domain. Input without an `@` is rejected.
    ///
    /// # Example
    /// ```
    /// use dovecot_exporter_common::MailboxIdentity;
    ///
    /// let id = MailboxIdentity::parse("jan@example.org").unwrap();
    /// assert_eq!(id.domain, "example.org");
    /// ```
    pub fn parse(email: &str) -> Result<Self, KeyError> {
        let mut parts = email.splitn(2, '@');
        match (parts.next(), parts.next()) {
            (Some(_local), Some(domain)) => Ok(Self {
                email: email.to_string(),
                domain: domain.to_string(),
            }),
            _ => Err(KeyError::MalformedIdentity(email.to_string())),
        }
    }

    /// Label values in series order (`email`, `domain`)
    pub fn label_values(&self) -> [&str; 2] {
        [self.email.as_str(), self.domain.as_str()]
    }
}

impl std::fmt::Display for MailboxIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.email)
    }
}
