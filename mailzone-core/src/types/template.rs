//! Declarative record templates

use std::collections::{BTreeMap, HashMap};

use mailzone_provider::{
    canonical_hostname, relative_to_full_name, DnsRecord, RecordData, RecordKey,
};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// One desired record. String fields may contain `{{var}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    /// Relative (`@`, `mail`) or absolute name.
    pub name: String,
    /// Falls back to the configured default TTL.
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(flatten)]
    pub data: RecordData,
    /// `None` leaves the live proxy setting alone.
    #[serde(default)]
    pub proxied: Option<bool>,
}

impl TemplateRecord {
    pub fn new(name: impl Into<String>, data: RecordData) -> Self {
        Self {
            name: name.into(),
            ttl: None,
            data,
            proxied: None,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    #[must_use]
    pub fn with_proxied(mut self, proxied: bool) -> Self {
        self.proxied = Some(proxied);
        self
    }
}

fn default_prune() -> bool {
    true
}

/// Desired record set for one domain.
///
/// The template owns every `(type, name)` pair it declares. With `prune` on, live
/// records in an owned pair that the template does not list are removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub domain: String,
    #[serde(default)]
    pub records: Vec<TemplateRecord>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default = "default_prune")]
    pub prune: bool,
}

/// Inputs for [`Template::mail_domain`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailTemplateParams {
    /// IPv4 address of the mail host.
    pub mail_server_ip: String,
    #[serde(default = "MailTemplateParams::default_mx_priority")]
    pub mx_priority: u16,
    /// SPF policy; defaults to `v=spf1 mx a ip4:{{mail_ip}} ~all`.
    #[serde(default)]
    pub spf: Option<String>,
    /// DMARC policy; defaults to `p=none` with aggregate reports to `dmarc@{{domain}}`.
    #[serde(default)]
    pub dmarc: Option<String>,
    #[serde(default)]
    pub dkim_selector: Option<String>,
    /// Value of the DKIM TXT record (e.g. `v=DKIM1; k=rsa; p=...`).
    #[serde(default)]
    pub dkim_value: Option<String>,
}

impl MailTemplateParams {
    const fn default_mx_priority() -> u16 {
        10
    }

    pub fn new(mail_server_ip: impl Into<String>) -> Self {
        Self {
            mail_server_ip: mail_server_ip.into(),
            mx_priority: Self::default_mx_priority(),
            spf: None,
            dmarc: None,
            dkim_selector: None,
            dkim_value: None,
        }
    }

    #[must_use]
    pub fn with_dkim(mut self, selector: impl Into<String>, value: impl Into<String>) -> Self {
        self.dkim_selector = Some(selector.into());
        self.dkim_value = Some(value.into());
        self
    }
}

impl Template {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            records: Vec::new(),
            variables: HashMap::new(),
            prune: true,
        }
    }

    #[must_use]
    pub fn with_record(mut self, record: TemplateRecord) -> Self {
        self.records.push(record);
        self
    }

    #[must_use]
    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// 标准邮件域名记录集：mail A、apex MX、SPF、DMARC，以及可选的 DKIM
    pub fn mail_domain(domain: impl Into<String>, params: MailTemplateParams) -> Self {
        let spf = params
            .spf
            .unwrap_or_else(|| "v=spf1 mx a ip4:{{mail_ip}} ~all".to_string());
        let dmarc = params
            .dmarc
            .unwrap_or_else(|| "v=DMARC1; p=none; rua=mailto:dmarc@{{domain}}".to_string());

        let mut template = Self::new(domain)
            .with_variable("mail_ip", params.mail_server_ip)
            .with_record(TemplateRecord::new(
                "mail",
                RecordData::A {
                    address: "{{mail_ip}}".to_string(),
                },
            ))
            .with_record(TemplateRecord::new(
                "@",
                RecordData::MX {
                    priority: params.mx_priority,
                    exchange: "mail.{{domain}}".to_string(),
                },
            ))
            .with_record(TemplateRecord::new("@", RecordData::TXT { text: spf }))
            .with_record(TemplateRecord::new("_dmarc", RecordData::TXT { text: dmarc }));

        if let (Some(selector), Some(value)) = (params.dkim_selector, params.dkim_value) {
            template = template.with_record(TemplateRecord::new(
                format!("{selector}._domainkey"),
                RecordData::TXT { text: value },
            ));
        }
        template
    }

    /// Zone-relative domain, lower-case, no trailing dot.
    pub fn canonical_domain(&self) -> String {
        canonical_hostname(&self.domain)
    }

    /// Substitutes variables, qualifies names and validates every record.
    ///
    /// `{{domain}}` is always defined. Identical duplicates collapse into one record;
    /// duplicates that disagree on TTL, priority or proxy setting are rejected.
    pub fn render(&self, default_ttl: u32) -> CoreResult<Vec<DnsRecord>> {
        let domain = self.canonical_domain();
        if domain.is_empty() {
            return Err(CoreError::Validation("template domain is empty".to_string()));
        }

        let mut variables = self.variables.clone();
        variables
            .entry("domain".to_string())
            .or_insert_with(|| domain.clone());

        let mut rendered: BTreeMap<RecordKey, DnsRecord> = BTreeMap::new();
        for (index, entry) in self.records.iter().enumerate() {
            let name = substitute(&entry.name, &variables)?;
            let full_name = relative_to_full_name(&name, &domain);
            if full_name != domain && !full_name.ends_with(&format!(".{domain}")) {
                return Err(CoreError::Validation(format!(
                    "record #{index} name '{full_name}' is outside {domain}"
                )));
            }

            let data = entry
                .data
                .try_map_strings(|value| substitute(value, &variables))?;
            let record = DnsRecord::new(&full_name, entry.ttl.unwrap_or(default_ttl), data)
                .with_proxied(entry.proxied);
            record.validate().map_err(|e| {
                CoreError::Validation(format!("record #{index} ({full_name}): {e}"))
            })?;

            let key = record.key();
            match rendered.get(&key) {
                Some(existing) if same_attributes(existing, &record) => {}
                Some(_) => {
                    return Err(CoreError::Validation(format!(
                        "conflicting definitions for {key}"
                    )));
                }
                None => {
                    rendered.insert(key, record);
                }
            }
        }

        Ok(rendered.into_values().collect())
    }
}

fn same_attributes(a: &DnsRecord, b: &DnsRecord) -> bool {
    a.ttl == b.ttl && a.data.priority() == b.data.priority() && a.proxied == b.proxied
}

/// Replaces every `{{name}}` (inner whitespace allowed) with its value.
fn substitute(input: &str, variables: &HashMap<String, String>) -> CoreResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(CoreError::Template(format!(
                "unterminated placeholder in '{input}'"
            )));
        };
        let name = after[..end].trim();
        let value = variables
            .get(name)
            .ok_or_else(|| CoreError::Template(format!("undefined variable '{name}'")))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use mailzone_provider::DnsRecordType;

    #[test]
    fn renders_relative_names_and_variables() {
        let template = Template::new("Example.com.")
            .with_variable("ip", "192.0.2.10")
            .with_record(TemplateRecord::new(
                "mail",
                RecordData::A {
                    address: "{{ ip }}".into(),
                },
            ))
            .with_record(
                TemplateRecord::new(
                    "@",
                    RecordData::MX {
                        priority: 10,
                        exchange: "mail.{{domain}}".into(),
                    },
                )
                .with_ttl(3600),
            );

        let records = template.render(300).unwrap();
        assert_eq!(records.len(), 2);
        let a = records
            .iter()
            .find(|r| r.record_type() == DnsRecordType::A)
            .unwrap();
        assert_eq!(a.name, "mail.example.com");
        assert_eq!(a.ttl, 300);
        assert_eq!(a.data.content(), "192.0.2.10");

        let mx = records
            .iter()
            .find(|r| r.record_type() == DnsRecordType::Mx)
            .unwrap();
        assert_eq!(mx.name, "example.com");
        assert_eq!(mx.ttl, 3600);
        assert_eq!(mx.data.content(), "mail.example.com");
    }

    #[test]
    fn undefined_variable_is_a_template_error() {
        let template = Template::new("example.com").with_record(TemplateRecord::new(
            "@",
            RecordData::TXT {
                text: "{{missing}}".into(),
            },
        ));
        assert!(matches!(template.render(300), Err(CoreError::Template(_))));
    }

    #[test]
    fn unterminated_placeholder_is_a_template_error() {
        let vars = HashMap::new();
        assert!(matches!(
            substitute("v={{oops", &vars),
            Err(CoreError::Template(_))
        ));
        assert_eq!(substitute("plain", &vars).unwrap(), "plain");
    }

    #[test]
    fn invalid_records_are_rejected() {
        let template = Template::new("example.com").with_record(TemplateRecord::new(
            "mail",
            RecordData::A {
                address: "999.1.1.1".into(),
            },
        ));
        assert!(matches!(template.render(300), Err(CoreError::Validation(_))));

        let bad_ttl = Template::new("example.com").with_record(
            TemplateRecord::new(
                "mail",
                RecordData::A {
                    address: "192.0.2.1".into(),
                },
            )
            .with_ttl(5),
        );
        assert!(matches!(bad_ttl.render(300), Err(CoreError::Validation(_))));
    }

    #[test]
    fn names_outside_the_domain_are_rejected() {
        let template = Template::new("example.com").with_record(TemplateRecord::new(
            "mail.other.org.",
            RecordData::A {
                address: "192.0.2.1".into(),
            },
        ));
        assert!(matches!(template.render(300), Err(CoreError::Validation(_))));
    }

    #[test]
    fn duplicates_collapse_or_conflict() {
        let record = TemplateRecord::new(
            "mail",
            RecordData::A {
                address: "192.0.2.1".into(),
            },
        );
        let same = Template::new("example.com")
            .with_record(record.clone())
            .with_record(record.clone());
        assert_eq!(same.render(300).unwrap().len(), 1);

        let conflicting = Template::new("example.com")
            .with_record(record.clone())
            .with_record(record.with_ttl(600));
        assert!(matches!(
            conflicting.render(300),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn mail_domain_template_has_standard_records() {
        let template = Template::mail_domain(
            "example.com",
            MailTemplateParams::new("192.0.2.10").with_dkim("s1", "v=DKIM1; k=rsa; p=MIGf"),
        );
        let records = template.render(300).unwrap();
        let names: Vec<_> = records
            .iter()
            .map(|r| format!("{} {}", r.record_type(), r.name))
            .collect();
        assert_eq!(records.len(), 5);
        assert!(names.contains(&"A mail.example.com".to_string()));
        assert!(names.contains(&"MX example.com".to_string()));
        assert!(names.contains(&"TXT _dmarc.example.com".to_string()));
        assert!(names.contains(&"TXT s1._domainkey.example.com".to_string()));

        let spf = records
            .iter()
            .find(|r| r.data.content().starts_with("v=spf1"))
            .unwrap();
        assert_eq!(spf.data.content(), "v=spf1 mx a ip4:192.0.2.10 ~all");
    }

    #[test]
    fn deserializes_from_toml() {
        let template: Template = toml::from_str(
            r#"
            domain = "example.com"

            [[records]]
            name = "mail"
            type = "A"
            content = { address = "192.0.2.10" }
            "#,
        )
        .unwrap();
        assert!(template.prune);
        assert_eq!(template.render(300).unwrap()[0].name, "mail.example.com");
    }
}
