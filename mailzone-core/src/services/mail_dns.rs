//! 邮件 DNS 在线检查
//!
//! 与 [`super::mail_audit`] 不同，这里不读取提供商的记录，而是通过解析器面板查询
//! 公网上实际可见的 SPF / DKIM / DMARC / MX / PTR 记录并打分。

use std::net::IpAddr;

use mailzone_provider::{canonical_hostname, DnsRecordType};
use mailzone_verifier::PropagationVerifier;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const SPF_SCORE: u32 = 20;
const DKIM_SCORE: u32 = 20;
const DMARC_SCORE: u32 = 15;
const MX_SCORE: u32 = 25;
const PTR_SCORE: u32 = 10;

/// Longest SPF record accepted in one string.
const MAX_SPF_LEN: usize = 255;
/// DNS lookups allowed by SPF evaluation.
const MAX_SPF_INCLUDES: usize = 10;
const HIGH_MX_PRIORITY: u16 = 50;

/// What to check besides the domain itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailDnsOptions {
    pub dkim_selector: String,
    /// Mail server address whose PTR record is checked.
    pub server_ip: Option<IpAddr>,
    /// Name the PTR record must point to; the domain when unset.
    pub ptr_hostname: Option<String>,
}

impl Default for MailDnsOptions {
    fn default() -> Self {
        Self {
            dkim_selector: "default".to_string(),
            server_ip: None,
            ptr_hostname: None,
        }
    }
}

/// Result of one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailCheck {
    /// The name that was queried.
    pub name: String,
    pub found: bool,
    pub valid: bool,
    pub records: Vec<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl MailCheck {
    fn new(name: &str, records: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            found: !records.is_empty(),
            valid: true,
            records,
            ..Self::default()
        }
    }

    fn unresolved(name: &str, error: &CoreError) -> Self {
        Self {
            name: name.to_string(),
            errors: vec![error.to_string()],
            ..Self::default()
        }
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.valid = false;
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailHealth {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl MailHealth {
    fn from_score(score: u32, max_score: u32) -> Self {
        let percent = if max_score == 0 { 0 } else { score * 100 / max_score };
        match percent {
            90.. => Self::Excellent,
            70..=89 => Self::Good,
            50..=69 => Self::Fair,
            _ => Self::Poor,
        }
    }
}

/// 邮件 DNS 在线检查结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailDnsReport {
    pub domain: String,
    pub spf: MailCheck,
    pub dkim: MailCheck,
    pub dmarc: MailCheck,
    /// `p=` tag of the DMARC record.
    pub dmarc_policy: Option<String>,
    pub mx: MailCheck,
    /// Present when a server address was given.
    pub ptr: Option<MailCheck>,
    pub score: u32,
    pub max_score: u32,
    pub health: MailHealth,
}

/// `tag=value` pairs of a `;`-separated record such as DMARC.
fn tag_value<'a>(record: &'a str, tag: &str) -> Option<&'a str> {
    record.split(';').find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim().eq_ignore_ascii_case(tag).then_some(value.trim())
    })
}

pub fn check_spf(name: &str, txt: Vec<String>) -> MailCheck {
    let spf: Vec<String> = txt.into_iter().filter(|r| r.starts_with("v=spf1")).collect();
    let mut check = MailCheck::new(name, spf.clone());
    match spf.as_slice() {
        [] => check.error("No SPF record found"),
        [record] => {
            if record.len() > MAX_SPF_LEN {
                check.error(format!("SPF record too long (>{MAX_SPF_LEN} characters)"));
            }
            if record.matches("include:").count() > MAX_SPF_INCLUDES {
                check.warn("Too many includes in SPF record");
            }
            let ends_with_all = ["~all", "-all", "?all", "+all"]
                .iter()
                .any(|all| record.ends_with(all));
            if !ends_with_all {
                check.warn("SPF record should end with an all mechanism");
            }
            if !record.contains("ip4:") && !record.contains("ip6:") {
                check.warn("No IP addresses specified in SPF record");
            }
        }
        _ => check.error("Multiple SPF records found"),
    }
    check
}

pub fn check_dkim(name: &str, selector: &str, txt: Vec<String>) -> MailCheck {
    let dkim: Vec<String> = txt.into_iter().filter(|r| r.contains("v=DKIM1")).collect();
    let mut check = MailCheck::new(name, dkim);
    let Some(record) = check.records.first().cloned() else {
        check.error(format!("No DKIM record found for selector {selector}"));
        return check;
    };
    if tag_value(&record, "k").is_none() {
        check.warn("Key type not specified, assuming RSA");
    }
    match tag_value(&record, "p") {
        None => check.error("Public key not found in DKIM record"),
        Some(key) if key.eq_ignore_ascii_case("PLACEHOLDER") => {
            check.warn("DKIM record contains placeholder public key");
        }
        Some(_) => {}
    }
    check
}

pub fn check_dmarc(name: &str, txt: Vec<String>) -> (MailCheck, Option<String>) {
    let dmarc: Vec<String> = txt.into_iter().filter(|r| r.starts_with("v=DMARC1")).collect();
    let mut check = MailCheck::new(name, dmarc.clone());
    let record = match dmarc.as_slice() {
        [] => {
            check.error("No DMARC record found");
            return (check, None);
        }
        [record] => record,
        _ => {
            check.error("Multiple DMARC records found");
            return (check, None);
        }
    };

    let policy = tag_value(record, "p").map(ToString::to_string);
    if policy.is_none() {
        check.error("No policy found in DMARC record");
    }
    if tag_value(record, "rua").is_none() {
        check.warn("No aggregate reporting address specified");
    }
    if tag_value(record, "ruf").is_none() {
        check.warn("No forensic reporting address specified");
    }
    if let Some(pct) = tag_value(record, "pct").and_then(|p| p.parse::<u8>().ok()) {
        if pct < 100 {
            check.warn(format!("DMARC policy applied to only {pct}% of messages"));
        }
    }
    (check, policy)
}

/// `unreachable` lists exchanges without an address record.
pub fn check_mx(name: &str, mx: Vec<String>, unreachable: &[String]) -> MailCheck {
    let mut check = MailCheck::new(name, mx);
    if check.records.is_empty() {
        check.error("No MX records found");
        return check;
    }

    let mut priorities = Vec::new();
    for record in check.records.clone() {
        match record
            .split_once(' ')
            .and_then(|(priority, _)| priority.parse::<u16>().ok())
        {
            Some(priority) => priorities.push(priority),
            None => check.error(format!("Invalid MX record format: {record}")),
        }
    }
    for exchange in unreachable {
        check.warn(format!("MX target {exchange} may not be reachable"));
    }
    if priorities.len() == 1 {
        check.warn("Only one MX record found, consider adding backup");
    }
    if priorities.iter().min().is_some_and(|p| *p > HIGH_MX_PRIORITY) {
        check.warn("MX priorities seem high, consider lower values");
    }
    check
}

pub fn check_ptr(ip: IpAddr, expected: &str, names: Vec<String>) -> MailCheck {
    let expected = canonical_hostname(expected);
    let mut check = MailCheck::new(&ip.to_string(), names);
    if check.records.is_empty() {
        check.error(format!("No PTR record found for {ip}"));
    } else if !check.records.contains(&expected) {
        let got = check.records.join(", ");
        check.error(format!("PTR record mismatch. Expected: {expected}, Got: {got}"));
    }
    check
}

async fn txt(verifier: &PropagationVerifier, name: &str) -> CoreResult<Vec<String>> {
    Ok(verifier.lookup(name, DnsRecordType::Txt).await?)
}

/// Queries the public view of the mail records of `domain` and scores it.
pub async fn check_mail_dns(
    verifier: &PropagationVerifier,
    domain: &str,
    options: &MailDnsOptions,
) -> CoreResult<MailDnsReport> {
    let domain = canonical_hostname(domain);
    if domain.is_empty() {
        return Err(CoreError::Validation("domain is required".to_string()));
    }

    let spf = match txt(verifier, &domain).await {
        Ok(records) => check_spf(&domain, records),
        Err(e) => MailCheck::unresolved(&domain, &e),
    };

    let dkim_name = format!("{}._domainkey.{domain}", options.dkim_selector);
    let dkim = match txt(verifier, &dkim_name).await {
        Ok(records) => check_dkim(&dkim_name, &options.dkim_selector, records),
        Err(e) => MailCheck::unresolved(&dkim_name, &e),
    };

    let dmarc_name = format!("_dmarc.{domain}");
    let (dmarc, dmarc_policy) = match txt(verifier, &dmarc_name).await {
        Ok(records) => check_dmarc(&dmarc_name, records),
        Err(e) => (MailCheck::unresolved(&dmarc_name, &e), None),
    };

    let mx = match verifier.lookup(&domain, DnsRecordType::Mx).await {
        Ok(records) => {
            let mut unreachable = Vec::new();
            for record in &records {
                let Some((_, exchange)) = record.split_once(' ') else {
                    continue;
                };
                let reachable = verifier
                    .lookup(exchange, DnsRecordType::A)
                    .await
                    .is_ok_and(|addresses| !addresses.is_empty());
                if !reachable {
                    unreachable.push(exchange.to_string());
                }
            }
            check_mx(&domain, records, &unreachable)
        }
        Err(e) => MailCheck::unresolved(&domain, &CoreError::from(e)),
    };

    let ptr = match options.server_ip {
        Some(ip) => {
            let expected = options.ptr_hostname.as_deref().unwrap_or(&domain);
            Some(match verifier.reverse_lookup(ip).await {
                Ok(names) => check_ptr(ip, expected, names),
                Err(e) => MailCheck::unresolved(&ip.to_string(), &CoreError::from(e)),
            })
        }
        None => None,
    };

    let mut score = 0;
    let mut max_score = SPF_SCORE + DKIM_SCORE + DMARC_SCORE + MX_SCORE;
    for (check, points) in [
        (&spf, SPF_SCORE),
        (&dkim, DKIM_SCORE),
        (&dmarc, DMARC_SCORE),
        (&mx, MX_SCORE),
    ] {
        if check.valid {
            score += points;
        }
    }
    if let Some(ptr) = &ptr {
        max_score += PTR_SCORE;
        if ptr.valid {
            score += PTR_SCORE;
        }
    }
    let health = MailHealth::from_score(score, max_score);
    log::info!("[mail-dns] {domain}: score {score}/{max_score} ({health:?})");

    Ok(MailDnsReport {
        domain,
        spf,
        dkim,
        dmarc,
        dmarc_policy,
        mx,
        ptr,
        score,
        max_score,
        health,
    })
}
