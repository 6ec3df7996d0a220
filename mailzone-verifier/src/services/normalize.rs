//! Canonical forms used to compare resolver answers with the expected value.

use mailzone_provider::{canonical_hostname, canonical_ip, canonical_txt, DnsRecordType};

/// Normalises one presentation-form value of `record_type`.
pub(crate) fn normalize_value(record_type: DnsRecordType, value: &str) -> String {
    match record_type {
        DnsRecordType::A | DnsRecordType::Aaaa => canonical_ip(value),
        DnsRecordType::Cname | DnsRecordType::Ns => canonical_hostname(value),
        DnsRecordType::Txt => normalize_txt(value),
        DnsRecordType::Mx => normalize_prefixed(value, 1),
        DnsRecordType::Srv => normalize_prefixed(value, 3),
        DnsRecordType::Caa => normalize_caa(value),
    }
}

/// Normalises and sorts a resolver answer, dropping duplicates.
pub(crate) fn normalize_answer(record_type: DnsRecordType, values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = values
        .iter()
        .map(|v| normalize_value(record_type, v))
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Quotes stripped, chunks joined, whitespace collapsed. Case is preserved.
fn normalize_txt(value: &str) -> String {
    collapse_whitespace(&canonical_txt(value))
}

/// `numeric_fields` leading integers followed by a hostname.
///
/// `"010 MX.example.com."` becomes `"10 mx.example.com"`. Values that do not have this
/// shape are only whitespace-collapsed and case-folded.
fn normalize_prefixed(value: &str, numeric_fields: usize) -> String {
    let parts: Vec<&str> = value.split_whitespace().collect();
    if parts.len() == numeric_fields + 1 {
        let numbers: Option<Vec<u32>> = parts[..numeric_fields]
            .iter()
            .map(|p| p.parse::<u32>().ok())
            .collect();
        if let Some(numbers) = numbers {
            let mut out: Vec<String> = numbers.iter().map(ToString::to_string).collect();
            out.push(canonical_hostname(parts[numeric_fields]));
            return out.join(" ");
        }
    }
    collapse_whitespace(value).to_ascii_lowercase()
}

/// `flags tag "value"` with a lower-case tag and a quoted value.
fn normalize_caa(value: &str) -> String {
    let mut parts = value.trim().splitn(3, char::is_whitespace);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(flags), Some(tag), Some(rest)) => {
            let flags = flags.parse::<u8>().map_or_else(|_| flags.to_string(), |f| f.to_string());
            format!(
                "{flags} {} \"{}\"",
                tag.to_ascii_lowercase(),
                rest.trim().trim_matches('"')
            )
        }
        _ => collapse_whitespace(value),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mx_priority_is_numeric() {
        assert_eq!(
            normalize_value(DnsRecordType::Mx, "010 MX.Example.com."),
            "10 mx.example.com"
        );
        assert_eq!(
            normalize_value(DnsRecordType::Mx, "10 mx.example.com"),
            normalize_value(DnsRecordType::Mx, "10   mx.example.com.")
        );
    }

    #[test]
    fn srv_has_three_numbers() {
        assert_eq!(
            normalize_value(DnsRecordType::Srv, "05 010 5060 SIP.example.com."),
            "5 10 5060 sip.example.com"
        );
    }

    #[test]
    fn txt_chunks_and_whitespace() {
        assert_eq!(
            normalize_value(DnsRecordType::Txt, "\"v=spf1  include:_spf.example.com \" \"-all\""),
            "v=spf1 include:_spf.example.com -all"
        );
        assert_eq!(
            normalize_value(DnsRecordType::Txt, "v=DKIM1; k=rsa"),
            "v=DKIM1; k=rsa"
        );
    }

    #[test]
    fn ip_and_hostname_forms() {
        assert_eq!(
            normalize_value(DnsRecordType::Aaaa, "2001:0db8:0000:0000:0000:0000:0000:0001"),
            "2001:db8::1"
        );
        assert_eq!(
            normalize_value(DnsRecordType::Cname, "Target.Example.NET."),
            "target.example.net"
        );
    }

    #[test]
    fn caa_tag_is_case_folded() {
        assert_eq!(
            normalize_value(DnsRecordType::Caa, "0 ISSUE \"letsencrypt.org\""),
            "0 issue \"letsencrypt.org\""
        );
    }

    #[test]
    fn answers_are_sorted_and_deduplicated() {
        let answer = normalize_answer(
            DnsRecordType::A,
            &["203.0.113.10".into(), "192.0.2.1".into(), "203.0.113.10".into()],
        );
        assert_eq!(answer, ["192.0.2.1", "203.0.113.10"]);
    }
}
