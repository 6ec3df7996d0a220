//! 邮件记录审计
//!
//! 检查域名下是否具备收发邮件所需的 MX / SPF / DMARC / DKIM / A 记录，并给出 TTL 建议。

use mailzone_provider::{DnsRecord, DnsRecordType, TTL_AUTOMATIC};
use serde::{Deserialize, Serialize};

/// Smallest TTL not flagged by the audit.
pub const RECOMMENDED_MIN_TTL: u32 = 300;

/// 邮件记录审计结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailAuditReport {
    pub domain: String,
    /// `false` when any error was found.
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

fn txt_content(record: &DnsRecord) -> Option<String> {
    (record.record_type() == DnsRecordType::Txt).then(|| record.data.content())
}

/// Audits the records at or below `domain`.
pub fn audit_records(domain: &str, records: &[DnsRecord]) -> MailAuditReport {
    let suffix = format!(".{domain}");
    let records: Vec<&DnsRecord> = records
        .iter()
        .filter(|r| r.name == domain || r.name.ends_with(&suffix))
        .collect();
    let count = |t: DnsRecordType| records.iter().filter(|r| r.record_type() == t).count();

    let mut report = MailAuditReport {
        domain: domain.to_string(),
        valid: true,
        ..MailAuditReport::default()
    };

    match count(DnsRecordType::Mx) {
        0 => report.errors.push("No MX records found".to_string()),
        1 => report
            .warnings
            .push("Only one MX record found, consider adding backup".to_string()),
        _ => {}
    }

    let spf = records
        .iter()
        .filter_map(|r| txt_content(r))
        .filter(|text| text.starts_with("v=spf1"))
        .count();
    match spf {
        0 => report.errors.push("No SPF record found".to_string()),
        1 => {}
        _ => report.errors.push("Multiple SPF records found".to_string()),
    }

    let txt_names = || {
        records
            .iter()
            .filter(|r| r.record_type() == DnsRecordType::Txt)
            .map(|r| r.name.as_str())
    };
    if !txt_names().any(|name| name.starts_with("_dmarc")) {
        report.warnings.push("No DMARC record found".to_string());
    }
    if !txt_names().any(|name| name.contains("_domainkey")) {
        report.warnings.push("No DKIM records found".to_string());
    }
    if count(DnsRecordType::A) == 0 {
        report.warnings.push("No A records found".to_string());
    }

    for record in &records {
        if record.ttl != TTL_AUTOMATIC && record.ttl < RECOMMENDED_MIN_TTL {
            report.recommendations.push(format!(
                "Consider increasing TTL for {} ({}) from {} to {RECOMMENDED_MIN_TTL}+",
                record.name,
                record.record_type(),
                record.ttl
            ));
        }
    }

    report.valid = report.errors.is_empty();
    report
}
