//! Iterative resolution: walk the referral chain from a root server down to
//! an authoritative answer.

use std::future::Future;
use std::net::Ipv4Addr;
use std::pin::Pin;

use rand::Rng;
use tracing::{error, warn};

use crate::name::Name;
use crate::packet::{Header, Packet, ResponseCode};
use crate::records::{RData, RecordType};
use crate::upstream::Exchanger;

/// Referral hops allowed within a single lookup.
const MAX_REFERRALS: usize = 16;
/// Nested NS-address lookups allowed before giving up.
const MAX_NS_DEPTH: usize = 8;

/// Resolves `query` by iterating from a randomly chosen root. The query is
/// forwarded unchanged at every hop; the reply that terminates the walk is
/// returned as-is.
pub async fn resolve<X: Exchanger>(exchanger: &X, roots: &[Ipv4Addr], query: &Packet) -> Packet {
    resolve_at(exchanger, roots, query, 0).await
}

/// Locally constructed SERVFAIL reply carrying the client's id and
/// questions.
pub fn servfail_response(query: &Packet) -> Packet {
    Packet {
        header: Header {
            id: query.header.id,
            rcode: ResponseCode::ServFail,
            qd_count: query.header.qd_count,
            ..Header::default()
        },
        questions: query.questions.clone(),
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
    }
}

fn query_name(query: &Packet) -> String {
    query
        .questions
        .first()
        .map(|q| q.name.to_string())
        .unwrap_or_else(|| String::from("<no question>"))
}

fn resolve_at<'a, X: Exchanger>(
    exchanger: &'a X,
    roots: &'a [Ipv4Addr],
    query: &'a Packet,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Packet> + Send + 'a>> {
    Box::pin(async move {
        if depth > MAX_NS_DEPTH {
            warn!(
                "Nameserver lookup chain too deep while resolving {}",
                query_name(query)
            );
            return servfail_response(query);
        }

        let payload = match query.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Could not serialize query for {}: {e}", query_name(query));
                return servfail_response(query);
            }
        };

        // Start with a lookup on a random root server.
        let mut server = roots[rand::rng().random_range(0..roots.len())];

        for _ in 0..MAX_REFERRALS {
            let reply_bytes = exchanger.exchange(&payload, server).await;
            if reply_bytes.is_empty() {
                return servfail_response(query);
            }
            let reply = match Packet::parse(&reply_bytes) {
                Ok(packet) => packet,
                Err(e) => {
                    warn!("Discarding unparseable reply from {server}: {e}");
                    return servfail_response(query);
                }
            };

            // Errors and answers both end the walk; the reply is surfaced
            // to the caller unchanged.
            if reply.header.rcode != ResponseCode::NoError {
                return reply;
            }
            if !reply.answers.is_empty() {
                return reply;
            }
            if reply.authority.is_empty() {
                return reply;
            }
            if !query.header.recursion_desired {
                return reply;
            }

            let ns_names: Vec<&Name> = reply
                .authority
                .iter()
                .filter_map(|rec| match &rec.rdata {
                    RData::NS(name) => Some(name),
                    _ => None,
                })
                .collect();

            if !reply.additional.is_empty() {
                // Glue fast path: an A record in the additional section
                // owned by one of the NS names. Matching is IPv4-only; AAAA
                // glue does not steer the lookup.
                let glue = reply.additional.iter().find_map(|rec| match &rec.rdata {
                    RData::A(addr) if ns_names.iter().any(|name| **name == rec.name) => {
                        Some(*addr)
                    }
                    _ => None,
                });
                match glue {
                    Some(addr) => server = addr,
                    // An additional section with no usable glue ends the
                    // walk with the referral itself.
                    None => return reply,
                }
            } else {
                if ns_names.is_empty() {
                    return reply;
                }
                // No glue at all: resolve the address of a random NS and
                // retry the lookup there.
                let target = ns_names[rand::rng().random_range(0..ns_names.len())].clone();
                let sub_query = Packet::query(rand::rng().random(), target, RecordType::A);
                let sub_reply = resolve_at(exchanger, roots, &sub_query, depth + 1).await;

                let addresses: Vec<Ipv4Addr> = sub_reply
                    .answers
                    .iter()
                    .filter_map(|rec| match rec.rdata {
                        RData::A(addr) => Some(addr),
                        _ => None,
                    })
                    .collect();
                if addresses.is_empty() {
                    return reply;
                }
                server = addresses[rand::rng().random_range(0..addresses.len())];
            }
        }

        warn!(
            "Referral limit reached while resolving {}",
            query_name(query)
        );
        servfail_response(query)
    })
}
