//! Per-connection protocol handling.
//!
//! Grounded on `kumod::smtp_server::SmtpServer::read_line`'s
//! read-buffer-and-scan idiom (adapted here to netstring frames via
//! `sts_protocol::Decoder`) and on the `tokio::sync::mpsc` FIFO idiom used
//! elsewhere in the workspace for ordered delivery. Each parsed request is
//! handed to its own task tracked in a `JoinSet`; the task's `oneshot`
//! receiver is pushed onto the FIFO in parse order, and a single sender
//! task drains the FIFO strictly in order, so replies reach the wire in
//! the order their requests arrived even though resolution runs
//! concurrently. On connection teardown the `JoinSet` is aborted so that
//! no resolution keeps running (or writes to the cache) on behalf of a
//! connection that is already gone.

use bytes::Bytes;
use dns_resolver::Resolver;
use mta_sts::{resolve, Domain, FetchResult, HttpGetter, PolicyMode};
use std::sync::Arc;
use sts_cache::{Cache, CacheEntry};
use sts_protocol::Decoder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::shutdown::{Activity, ShutdownSubscription};
use crate::zones::ZoneRegistry;

const READ_CHUNK: usize = 4096;
const FIFO_DEPTH: usize = 256;

pub struct AppState {
    pub cache: Cache,
    pub zones: ZoneRegistry,
    pub resolver: Arc<dyn Resolver>,
    pub getter: Arc<dyn HttpGetter>,
}

enum Pending {
    Reply(oneshot::Receiver<Bytes>),
    Terminate,
}

pub async fn handle_connection(
    socket: TcpStream,
    state: Arc<AppState>,
    mut shutdown: ShutdownSubscription,
) {
    let _activity = Activity::get_opt();
    let (fifo_tx, fifo_rx) = mpsc::channel::<Pending>(FIFO_DEPTH);
    let (mut read_half, write_half) = socket.into_split();

    let sender = tokio::spawn(run_sender(write_half, fifo_rx));

    let mut decoder = Decoder::new(sts_protocol::DEFAULT_MAX_FRAME_LEN);
    let mut buf = [0u8; READ_CHUNK];
    let mut tasks = tokio::task::JoinSet::new();

    'reader: loop {
        tokio::select! {
            _ = shutdown.shutting_down() => {
                break 'reader;
            }
            result = read_half.read(&mut buf) => {
                let n = match result {
                    Ok(0) => break 'reader,
                    Ok(n) => n,
                    Err(err) => {
                        tracing::debug!(%err, "connection read error");
                        break 'reader;
                    }
                };

                decoder.push(&buf[..n]);
                loop {
                    match decoder.next_frame() {
                        Ok(Some(frame)) => {
                            let (tx, rx) = oneshot::channel();
                            let state = state.clone();
                            tasks.spawn(async move {
                                let reply = process_request(&frame, &state).await;
                                let _ = tx.send(reply);
                            });
                            if fifo_tx.send(Pending::Reply(rx)).await.is_err() {
                                break 'reader;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            tracing::debug!(%err, "protocol error, terminating connection");
                            let _ = fifo_tx.send(Pending::Terminate).await;
                            break 'reader;
                        }
                    }
                }
            }
        }
    }

    // Cancel any resolution still in flight for this connection before
    // draining the sender: an aborted task is cancelled at its next await
    // point, which frees its DNS/HTTPS sockets and drops it out of its
    // `cache::get_or_compute` closure before any cache write, and its
    // queued oneshot resolves to `Err`, which the sender discards as a
    // dropped reply rather than hanging on it.
    tasks.abort_all();
    drop(fifo_tx);
    let _ = sender.await;
}

async fn run_sender(
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut fifo_rx: mpsc::Receiver<Pending>,
) {
    while let Some(pending) = fifo_rx.recv().await {
        match pending {
            Pending::Reply(rx) => {
                let Ok(bytes) = rx.await else {
                    // resolution task panicked or was dropped; treat as a
                    // fail-closed NOTFOUND rather than desync the stream.
                    continue;
                };
                if write_half.write_all(&bytes).await.is_err() {
                    break;
                }
            }
            Pending::Terminate => break,
        }
    }
}

async fn process_request(frame: &[u8], state: &AppState) -> Bytes {
    let request = latin1_to_string(frame);
    let (zone_name, domain_raw) = match request.split_once(' ') {
        Some((zone, domain)) => (zone, domain),
        None => ("", request.as_str()),
    };

    let Some(domain) = Domain::parse(domain_raw) else {
        return encode_reply("NOTFOUND ");
    };

    let zone = state.zones.lookup(zone_name);
    tracing::debug!(
        domain = domain.as_str(),
        zone = zone_name,
        timeout = %humantime::format_duration(zone.timeout),
        "resolving mta-sts policy"
    );

    // The get-resolve-store cycle runs inside `get_or_compute` so that
    // concurrent requests for the same domain (on this connection or any
    // other) coalesce onto a single in-flight resolution.
    let cache = &state.cache;
    let resolver = state.resolver.clone();
    let getter = state.getter.clone();
    let timeout = zone.timeout;
    let compute_domain = domain.clone();

    let entry = cache
        .get_or_compute(domain.clone(), move || async move {
            let cached = cache.get(&compute_domain);
            let latest_pol_id = cached.as_ref().map(|entry| entry.pol_id.as_str());

            let fetch_result = resolve(
                compute_domain.as_str(),
                latest_pol_id,
                &*resolver,
                &*getter,
                timeout,
            )
            .await;

            match fetch_result {
                FetchResult::Valid(pol_id, pol_body) => {
                    let entry = CacheEntry::new(pol_id, pol_body);
                    cache.set(compute_domain.clone(), entry.clone());
                    Some(entry)
                }
                FetchResult::NotChanged => match cached {
                    Some(entry) => {
                        let refreshed = entry.refreshed();
                        cache.set(compute_domain.clone(), refreshed.clone());
                        Some(refreshed)
                    }
                    None => {
                        // The resolver only returns NotChanged when it was
                        // handed a latest_pol_id, which only happens when
                        // `cached` was Some. Seeing this combination means a
                        // bug upstream.
                        tracing::error!(
                            domain = compute_domain.as_str(),
                            "resolver returned NotChanged with no cached entry"
                        );
                        None
                    }
                },
                FetchResult::None | FetchResult::FetchError => cached,
            }
        })
        .await;

    let Some(entry) = entry else {
        return encode_reply("NOTFOUND ");
    };

    if !entry.is_live(std::time::Instant::now()) {
        return encode_reply("NOTFOUND ");
    }

    match entry.pol_body.mode {
        PolicyMode::None => encode_reply("NOTFOUND "),
        PolicyMode::Testing if !zone.strict_testing => encode_reply("NOTFOUND "),
        PolicyMode::Testing | PolicyMode::Enforce => {
            let mut mx: Vec<&str> = entry
                .pol_body
                .mx
                .iter()
                .map(|m| m.strip_prefix('*').unwrap_or(m))
                .collect();
            mx.sort_unstable();
            mx.dedup();
            encode_reply(&format!("OK secure match={}", mx.join(":")))
        }
    }
}

fn latin1_to_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn encode_reply(payload: &str) -> Bytes {
    Bytes::from(sts_protocol::encode(payload.as_bytes()))
}
