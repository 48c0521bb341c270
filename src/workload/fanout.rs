//! Fan-out aggregation
//!
//! List and Watch run one task per bound kind. Tasks share a child of the
//! caller's cancellation token and push records into a single rendezvous
//! channel read by the caller. Every send also waits on cancellation, so a
//! torn-down group never blocks on a consumer that has gone away.

use super::collection::{QueryOptions, RecordStream, RequestContext};
use super::record::Record;
use super::registry::{BindingTable, Schema};
use crate::error::{Error, Result};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// What happens to the aggregate watch when one kind's stream ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisconnectPolicy {
    /// The first ended or failed subscription cancels every other kind
    #[default]
    TearDown,
    /// Each kind ends on its own; the merged stream closes after the last
    Isolate,
}

impl std::str::FromStr for DisconnectPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tear_down" | "teardown" | "tear-down" => Ok(Self::TearDown),
            "isolate" => Ok(Self::Isolate),
            _ => Err(Error::Config(format!("unknown disconnect policy {:?}", s))),
        }
    }
}

impl DisconnectPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TearDown => "tear_down",
            Self::Isolate => "isolate",
        }
    }
}

// =============================================================================
// List
// =============================================================================

/// List every bound kind concurrently and merge the results.
///
/// Arrival order across kinds is unspecified. If any kind fails, its
/// siblings are cancelled and, once all tasks have finished, the first
/// failure is returned with no partial results.
pub async fn list_all(
    table: &BindingTable,
    ctx: &RequestContext,
    opts: &QueryOptions,
) -> Result<Vec<Record>> {
    let group = ctx.child();
    let (tx, mut rx) = mpsc::channel::<Record>(1);
    let mut tasks = JoinSet::new();

    for schema in table.schemas() {
        let schema = schema.clone();
        let ctx = group.clone();
        let opts = opts.clone();
        let tx = tx.clone();
        let span = tracing::debug_span!(parent: group.span(), "list_kind", kind = %schema.kind);

        tasks.spawn(
            async move {
                let result = list_kind(&schema, &ctx, &opts, &tx).await;
                if let Err(ref err) = result {
                    tracing::debug!(error = %err, "list failed, cancelling siblings");
                    ctx.cancellation().cancel();
                }
                result
            }
            .instrument(span),
        );
    }
    drop(tx);

    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }

    let mut failure: Option<Error> = None;
    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err,
            Err(join_err) => Error::Backend(anyhow::anyhow!("list task failed: {}", join_err)),
        };
        // Siblings observing the cancellation report `Cancelled`; keep the
        // error that caused it.
        failure = match failure {
            None => Some(err),
            Some(Error::Cancelled) if !matches!(err, Error::Cancelled) => Some(err),
            Some(first) => {
                tracing::debug!(error = %err, "dropping later list error");
                Some(first)
            }
        };
    }

    match failure {
        Some(err) => Err(err),
        None => {
            tracing::debug!(count = items.len(), kinds = table.len(), "listed workloads");
            Ok(items)
        }
    }
}

async fn list_kind(
    schema: &Schema,
    ctx: &RequestContext,
    opts: &QueryOptions,
    tx: &mpsc::Sender<Record>,
) -> Result<()> {
    let cancel = ctx.cancellation();

    let items = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        result = schema.store.list(ctx, schema.kind, opts) => result?,
    };

    for item in items {
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            sent = tx.send(item) => {
                if sent.is_err() {
                    return Err(Error::Cancelled);
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Watch
// =============================================================================

/// Subscribe to every bound kind and merge their events.
///
/// The returned stream closes once every per-kind task has finished. A kind
/// whose collection has nothing to watch finishes immediately without
/// affecting the others. Dropping the stream cancels all subscriptions.
pub fn watch_all(
    table: &BindingTable,
    ctx: &RequestContext,
    opts: &QueryOptions,
    policy: DisconnectPolicy,
) -> RecordStream {
    let group = ctx.child();
    let (tx, rx) = mpsc::channel::<Record>(1);
    let mut tasks = JoinSet::new();

    for schema in table.schemas() {
        let schema = schema.clone();
        let ctx = group.clone();
        let opts = opts.clone();
        let tx = tx.clone();
        let span = tracing::debug_span!(parent: group.span(), "watch_kind", kind = %schema.kind);

        tasks.spawn(
            async move {
                let result = stream_store(&schema, &ctx, &opts, &tx).await;
                if result.is_err() && policy == DisconnectPolicy::TearDown {
                    ctx.cancellation().cancel();
                }
                result
            }
            .instrument(span),
        );
    }
    drop(tx);

    let reaper_span = group.span().clone();
    tokio::spawn(
        async move {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => tracing::debug!(error = %err, "watch task ended"),
                    Err(join_err) => tracing::warn!(error = %join_err, "watch task aborted"),
                }
            }
            tracing::debug!("aggregate watch closed");
        }
        .instrument(reaper_span),
    );

    let guard = group.cancellation().clone().drop_guard();
    futures::stream::unfold((rx, guard), |(mut rx, guard)| async move {
        rx.recv().await.map(|event| (event, (rx, guard)))
    })
    .boxed()
}

/// Relay one kind's events until its stream ends or the group is cancelled.
///
/// A natural stream end is reported as [`Error::Disconnect`].
async fn stream_store(
    schema: &Schema,
    ctx: &RequestContext,
    opts: &QueryOptions,
    tx: &mpsc::Sender<Record>,
) -> Result<()> {
    let cancel = ctx.cancellation();

    let subscribed = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        result = schema.store.watch(ctx, schema.kind, opts) => result,
    };

    let mut events = match subscribed {
        Ok(Some(events)) => events,
        Ok(None) => {
            tracing::debug!("nothing to watch");
            return Ok(());
        },
        Err(err) => {
            tracing::error!(error = %err, "failed on subscribe");
            return Err(err);
        },
    };

    tracing::debug!("watching");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            next = events.next() => match next {
                Some(event) => event,
                None => break,
            },
        };

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            sent = tx.send(event) => {
                if sent.is_err() {
                    return Ok(());
                }
            }
        }
    }

    tracing::debug!("watch stream ended");
    Err(Error::Disconnect {
        kind: schema.kind.schema_id().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_policy_from_str() {
        assert_eq!("isolate".parse::<DisconnectPolicy>().unwrap(), DisconnectPolicy::Isolate);
        assert_eq!("ISOLATE".parse::<DisconnectPolicy>().unwrap(), DisconnectPolicy::Isolate);
        assert_eq!("tear_down".parse::<DisconnectPolicy>().unwrap(), DisconnectPolicy::TearDown);
        let err = "bogus".parse::<DisconnectPolicy>().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_disconnect_policy_serde() {
        let policy: DisconnectPolicy = serde_json::from_str("\"isolate\"").unwrap();
        assert_eq!(policy, DisconnectPolicy::Isolate);
        assert_eq!(
            serde_json::to_string(&DisconnectPolicy::TearDown).unwrap(),
            "\"tear_down\""
        );
        assert_eq!(DisconnectPolicy::default().as_str(), "tear_down");
    }
}
