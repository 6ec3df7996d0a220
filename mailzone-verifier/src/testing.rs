//! Scripted resolvers for tests.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use mailzone_provider::DnsRecordType;

use crate::error::LookupError;
use crate::services::resolver::RecordResolver;
use crate::types::ResolverEndpoint;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Answer(Vec<String>),
    Fail(String),
    /// Never answers; the caller's timeout fires.
    Hang,
}

impl ScriptedReply {
    pub fn answer(values: &[&str]) -> Self {
        Self::Answer(values.iter().map(ToString::to_string).collect())
    }
}

/// Replays a list of replies, repeating the last one once the list is exhausted.
#[derive(Debug)]
pub struct ScriptedResolver {
    endpoint: ResolverEndpoint,
    replies: Mutex<Vec<ScriptedReply>>,
    calls: AtomicUsize,
}

/// `198.51.100.n`
pub fn test_endpoint(n: u8) -> ResolverEndpoint {
    ResolverEndpoint::new(
        format!("resolver-{n}"),
        IpAddr::V4(Ipv4Addr::new(198, 51, 100, n)),
        "Test",
    )
}

impl ScriptedResolver {
    pub fn scripted(n: u8, replies: Vec<ScriptedReply>) -> Self {
        Self {
            endpoint: test_endpoint(n),
            replies: Mutex::new(replies),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(n: u8, values: &[&str]) -> Self {
        Self::scripted(n, vec![ScriptedReply::answer(values)])
    }

    pub fn failing(n: u8, message: &str) -> Self {
        Self::scripted(n, vec![ScriptedReply::Fail(message.to_string())])
    }

    pub fn hanging(n: u8) -> Self {
        Self::scripted(n, vec![ScriptedReply::Hang])
    }

    /// Replaces the script and restarts it from the first reply.
    pub fn set_replies(&self, replies: Vec<ScriptedReply>) {
        *self.replies.lock().unwrap_or_else(PoisonError::into_inner) = replies;
        self.calls.store(0, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordResolver for ScriptedResolver {
    fn endpoint(&self) -> &ResolverEndpoint {
        &self.endpoint
    }

    async fn query(
        &self,
        _name: &str,
        _record_type: DnsRecordType,
    ) -> Result<Vec<String>, LookupError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = {
            let replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
            replies
                .get(call)
                .or_else(|| replies.last())
                .cloned()
                .unwrap_or(ScriptedReply::Answer(Vec::new()))
        };
        match reply {
            ScriptedReply::Answer(values) => Ok(values),
            ScriptedReply::Fail(message) => Err(LookupError(message)),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }

    async fn reverse(&self, _ip: IpAddr) -> Result<Vec<String>, LookupError> {
        Ok(Vec::new())
    }
}

/// Answers from a fixed table keyed by name and type; anything else is NODATA.
#[derive(Debug)]
pub struct FixtureResolver {
    endpoint: ResolverEndpoint,
    answers: HashMap<(String, DnsRecordType), Vec<String>>,
    ptr: HashMap<IpAddr, Vec<String>>,
}

impl FixtureResolver {
    pub fn new(n: u8) -> Self {
        Self {
            endpoint: test_endpoint(n),
            answers: HashMap::new(),
            ptr: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_answer(mut self, name: &str, record_type: DnsRecordType, values: &[&str]) -> Self {
        self.answers.insert(
            (name.to_ascii_lowercase(), record_type),
            values.iter().map(ToString::to_string).collect(),
        );
        self
    }

    #[must_use]
    pub fn with_ptr(mut self, ip: IpAddr, names: &[&str]) -> Self {
        self.ptr
            .insert(ip, names.iter().map(ToString::to_string).collect());
        self
    }
}

#[async_trait]
impl RecordResolver for FixtureResolver {
    fn endpoint(&self) -> &ResolverEndpoint {
        &self.endpoint
    }

    async fn query(
        &self,
        name: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<String>, LookupError> {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        Ok(self
            .answers
            .get(&(name, record_type))
            .cloned()
            .unwrap_or_default())
    }

    async fn reverse(&self, ip: IpAddr) -> Result<Vec<String>, LookupError> {
        Ok(self.ptr.get(&ip).cloned().unwrap_or_default())
    }
}
