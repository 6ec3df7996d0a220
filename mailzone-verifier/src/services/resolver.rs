//! Resolver abstraction and the hickory-backed implementation.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::{
    config::{NameServerConfigGroup, ResolverConfig, ResolverOpts},
    name_server::TokioConnectionProvider,
    proto::rr::{RData, RecordType},
    ResolveError, TokioResolver,
};
use mailzone_provider::DnsRecordType;

use crate::error::LookupError;
use crate::types::ResolverEndpoint;

/// One recursive resolver that can answer record queries.
///
/// Answers are returned in presentation form; the verifier normalises them.
/// NXDOMAIN and NODATA must be reported as `Ok(vec![])`.
#[async_trait]
pub trait RecordResolver: Send + Sync {
    fn endpoint(&self) -> &ResolverEndpoint;

    async fn query(
        &self,
        name: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<String>, LookupError>;

    /// PTR names of `ip`.
    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError>;
}

/// The default panel of public resolvers.
pub fn default_panel() -> Vec<ResolverEndpoint> {
    let v4 = |a, b, c, d| IpAddr::V4(Ipv4Addr::new(a, b, c, d));
    vec![
        ResolverEndpoint::new("Google DNS", v4(8, 8, 8, 8), "Global"),
        ResolverEndpoint::new("Google DNS (secondary)", v4(8, 8, 4, 4), "Global"),
        ResolverEndpoint::new("Cloudflare DNS", v4(1, 1, 1, 1), "Global"),
        ResolverEndpoint::new("Cloudflare DNS (secondary)", v4(1, 0, 0, 1), "Global"),
        ResolverEndpoint::new("OpenDNS", v4(208, 67, 222, 222), "North America"),
        ResolverEndpoint::new("OpenDNS (secondary)", v4(208, 67, 220, 220), "North America"),
        ResolverEndpoint::new("Quad9 DNS", v4(9, 9, 9, 9), "Europe"),
        ResolverEndpoint::new("Quad9 DNS (secondary)", v4(149, 112, 112, 112), "Europe"),
        ResolverEndpoint::new("Alternate DNS", v4(76, 76, 19, 19), "North America"),
        ResolverEndpoint::new("Alternate DNS (secondary)", v4(76, 223, 100, 101), "North America"),
    ]
}

/// Build a resolver that talks only to `ns_ip` on port 53 (UDP, TCP fallback).
///
/// Answer caching is disabled so that consecutive passes see fresh data.
pub(crate) fn build_resolver_for_ns(ns_ip: IpAddr, query_timeout: Duration) -> TokioResolver {
    let config = ResolverConfig::from_parts(
        None,
        vec![],
        NameServerConfigGroup::from_ips_clear(&[ns_ip], 53, true),
    );
    let provider = TokioConnectionProvider::default();
    let mut opts = ResolverOpts::default();
    opts.timeout = query_timeout;
    opts.attempts = 1;
    opts.cache_size = 0;
    TokioResolver::builder_with_config(config, provider)
        .with_options(opts)
        .build()
}

/// [`RecordResolver`] backed by a hickory resolver pinned to one nameserver.
pub struct HickoryRecordResolver {
    endpoint: ResolverEndpoint,
    resolver: TokioResolver,
}

impl HickoryRecordResolver {
    pub fn new(endpoint: ResolverEndpoint, query_timeout: Duration) -> Self {
        let resolver = build_resolver_for_ns(endpoint.ip, query_timeout);
        Self { endpoint, resolver }
    }

    /// One resolver per panel entry.
    pub fn panel(
        endpoints: &[ResolverEndpoint],
        query_timeout: Duration,
    ) -> Vec<Arc<dyn RecordResolver>> {
        endpoints
            .iter()
            .map(|e| Arc::new(Self::new(e.clone(), query_timeout)) as Arc<dyn RecordResolver>)
            .collect()
    }
}

fn to_record_type(record_type: DnsRecordType) -> RecordType {
    match record_type {
        DnsRecordType::A => RecordType::A,
        DnsRecordType::Aaaa => RecordType::AAAA,
        DnsRecordType::Cname => RecordType::CNAME,
        DnsRecordType::Mx => RecordType::MX,
        DnsRecordType::Txt => RecordType::TXT,
        DnsRecordType::Ns => RecordType::NS,
        DnsRecordType::Srv => RecordType::SRV,
        DnsRecordType::Caa => RecordType::CAA,
    }
}

/// Renders rdata of the queried type; other types in the answer (e.g. a CNAME chain) are skipped.
fn render(record_type: DnsRecordType, rdata: &RData) -> Option<String> {
    match record_type {
        DnsRecordType::A => rdata.as_a().map(ToString::to_string),
        DnsRecordType::Aaaa => rdata.as_aaaa().map(ToString::to_string),
        DnsRecordType::Cname => rdata.as_cname().map(|c| c.0.to_string()),
        DnsRecordType::Ns => rdata.as_ns().map(|ns| ns.0.to_string()),
        DnsRecordType::Mx => rdata
            .as_mx()
            .map(|mx| format!("{} {}", mx.preference(), mx.exchange())),
        DnsRecordType::Txt => rdata.as_txt().map(|txt| {
            txt.iter()
                .map(|data| String::from_utf8_lossy(data).to_string())
                .collect::<String>()
        }),
        DnsRecordType::Srv => rdata.as_srv().map(|srv| {
            format!(
                "{} {} {} {}",
                srv.priority(),
                srv.weight(),
                srv.port(),
                srv.target()
            )
        }),
        DnsRecordType::Caa => rdata.as_caa().map(|caa| {
            format!(
                "{} {} \"{}\"",
                if caa.issuer_critical() { 128 } else { 0 },
                caa.tag().as_str(),
                String::from_utf8_lossy(caa.raw_value())
            )
        }),
    }
}

fn is_empty_answer(err: &ResolveError) -> bool {
    err.is_no_records_found() || err.is_nx_domain()
}

#[async_trait]
impl RecordResolver for HickoryRecordResolver {
    fn endpoint(&self) -> &ResolverEndpoint {
        &self.endpoint
    }

    async fn query(
        &self,
        name: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<String>, LookupError> {
        // 使用绝对名称，避免 search 域拼接
        let fqdn = if name.ends_with('.') {
            name.to_string()
        } else {
            format!("{name}.")
        };

        match self
            .resolver
            .lookup(fqdn.as_str(), to_record_type(record_type))
            .await
        {
            Ok(lookup) => Ok(lookup
                .iter()
                .filter_map(|rdata| render(record_type, rdata))
                .collect()),
            Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
            Err(e) => Err(LookupError(e.to_string())),
        }
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => Ok(lookup.iter().map(|ptr| ptr.0.to_string()).collect()),
            Err(e) if is_empty_answer(&e) => Ok(Vec::new()),
            Err(e) => Err(LookupError(e.to_string())),
        }
    }
}
