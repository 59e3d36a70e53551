//! Company derivation from contact records.
//!
//! An explicit company field always wins. Otherwise a corporate email domain
//! is reduced to its registrable label (`jane@mail.acme.co.uk` -> `acme`).
//! Free-mail providers never produce a company.

use serde::{Deserialize, Serialize};

use rapport_common::Contact;

/// Confidence attached to a company taken from the record itself.
pub const EXPLICIT_COMPANY_CONFIDENCE: f64 = 1.0;

/// Confidence attached to a company guessed from the email domain.
pub const DOMAIN_COMPANY_CONFIDENCE: f64 = 0.7;

/// Free-mail and consumer ISP domains matched exactly.
const PUBLIC_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "live.com",
    "msn.com",
    "icloud.com",
    "me.com",
    "mac.com",
    "aol.com",
    "protonmail.com",
    "proton.me",
    "pm.me",
    "mail.com",
    "zoho.com",
    "hey.com",
    "fastmail.com",
    "gmx.com",
    "gmx.net",
    "gmx.de",
    "web.de",
    "t-online.de",
    "orange.fr",
    "free.fr",
    "laposte.net",
    "wanadoo.fr",
    "sfr.fr",
    "qq.com",
    "163.com",
    "126.com",
    "naver.com",
    "tutanota.com",
];

/// Providers that exist under many country TLDs (`yahoo.fr`, `hotmail.co.uk`).
const PUBLIC_EMAIL_PROVIDERS: &[&str] = &["yahoo", "hotmail", "ymail", "yandex", "libero", "rocketmail"];

/// Second-level public suffixes under which the registrable label sits one
/// level deeper.
const SECOND_LEVEL_SUFFIXES: &[&str] = &[
    "co", "com", "org", "net", "ac", "gov", "edu", "ne", "or", "gouv",
];

const LEGAL_SUFFIXES: &[&str] = &[
    "inc", "inc.", "llc", "ltd", "ltd.", "limited", "gmbh", "sa", "sas", "sarl", "corp", "corp.",
    "co.", "plc", "ag", "bv", "oy",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanySource {
    Explicit,
    EmailDomain,
}

impl CompanySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanySource::Explicit => "explicit",
            CompanySource::EmailDomain => "email_domain",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivedCompany {
    /// Normalized dedup key, unique per tenant.
    pub key: String,
    /// Display name.
    pub name: String,
    pub confidence: f64,
    pub source: CompanySource,
}

/// Derive the company a contact works at, if any.
pub fn derive_company(contact: &Contact) -> Option<DerivedCompany> {
    if let Some(explicit) = contact.company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        let key = normalize_company(explicit);
        if !key.is_empty() {
            return Some(DerivedCompany {
                key,
                name: explicit.to_string(),
                confidence: EXPLICIT_COMPANY_CONFIDENCE,
                source: CompanySource::Explicit,
            });
        }
    }

    let domain = email_domain(contact.email.as_deref()?)?;
    if is_public_email_domain(&domain) {
        return None;
    }
    let label = registrable_label(&domain)?;
    Some(DerivedCompany {
        key: label.clone(),
        name: capitalize(&label),
        confidence: DOMAIN_COMPANY_CONFIDENCE,
        source: CompanySource::EmailDomain,
    })
}

/// Lowercase, collapse whitespace and drop trailing legal-form suffixes.
pub fn normalize_company(name: &str) -> String {
    let cleaned = name.to_lowercase().replace(',', " ");
    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

/// Lowercased domain part of an email address.
pub fn email_domain(email: &str) -> Option<String> {
    let (local, domain) = email.trim().rsplit_once('@')?;
    let domain = domain.trim_end_matches('.').to_lowercase();
    if local.is_empty() || !domain.contains('.') {
        return None;
    }
    Some(domain)
}

pub fn is_public_email_domain(domain: &str) -> bool {
    if PUBLIC_EMAIL_DOMAINS.contains(&domain) {
        return true;
    }
    domain
        .split('.')
        .next()
        .is_some_and(|first| PUBLIC_EMAIL_PROVIDERS.contains(&first))
}

fn registrable_label(domain: &str) -> Option<String> {
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    if n < 2 {
        return None;
    }
    // `acme.co.uk`: the second-to-last label is itself a public suffix.
    let idx = if n >= 3 && labels[n - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) {
        n - 3
    } else {
        n - 2
    };
    Some(labels[idx].to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact(email: Option<&str>, company: Option<&str>) -> Contact {
        Contact {
            email: email.map(String::from),
            company: company.map(String::from),
            ..Contact::new("c-1", "Jane")
        }
    }

    #[test]
    fn explicit_company_wins_with_full_confidence() {
        let derived = derive_company(&contact(Some("jane@gmail.com"), Some("Acme, Inc."))).unwrap();
        assert_eq!(derived.key, "acme");
        assert_eq!(derived.name, "Acme, Inc.");
        assert_eq!(derived.confidence, EXPLICIT_COMPANY_CONFIDENCE);
        assert_eq!(derived.source, CompanySource::Explicit);
    }

    #[test]
    fn corporate_domain_yields_heuristic_company() {
        let derived = derive_company(&contact(Some("jane@mail.acme.co.uk"), None)).unwrap();
        assert_eq!(derived.key, "acme");
        assert_eq!(derived.name, "Acme");
        assert_eq!(derived.confidence, DOMAIN_COMPANY_CONFIDENCE);
        assert_eq!(derived.source, CompanySource::EmailDomain);

        let derived = derive_company(&contact(Some("bob@Globex.com"), None)).unwrap();
        assert_eq!(derived.key, "globex");
    }

    #[test]
    fn public_mail_domains_yield_nothing() {
        assert!(derive_company(&contact(Some("jane@gmail.com"), None)).is_none());
        assert!(derive_company(&contact(Some("jane@yahoo.fr"), None)).is_none());
        assert!(derive_company(&contact(Some("jane@hotmail.co.uk"), None)).is_none());
    }

    #[test]
    fn blank_company_falls_back_to_domain() {
        let derived = derive_company(&contact(Some("x@initech.io"), Some("   "))).unwrap();
        assert_eq!(derived.source, CompanySource::EmailDomain);
        assert_eq!(derived.key, "initech");
    }

    #[test]
    fn malformed_emails_are_ignored() {
        assert!(derive_company(&contact(Some("not-an-email"), None)).is_none());
        assert!(derive_company(&contact(Some("@acme.com"), None)).is_none());
        assert!(derive_company(&contact(Some("a@localhost"), None)).is_none());
        assert!(derive_company(&contact(None, None)).is_none());
    }

    #[test]
    fn normalization_dedupes_legal_forms() {
        assert_eq!(normalize_company("Acme Corp."), "acme");
        assert_eq!(normalize_company("  ACME   GmbH "), "acme");
        assert_eq!(normalize_company("Big  Blue Co."), "big blue");
        assert_eq!(normalize_company("Inc"), "inc");
    }
}
