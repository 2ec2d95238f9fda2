//! Line-delimited JSON server
//!
//! Reads one request per line and writes one reply per line. Loads stream
//! their events as they are produced, tagged with the session id, so several
//! sessions can interleave on the same output.
//!
//! ```text
//! > {"id":1,"command":"load","request":{"repoPath":"/repo","limit":100}}
//! < {"type":"accepted","id":1,"sessionId":"9c1e..."}
//! < {"type":"event","sessionId":"9c1e...","event":{"type":"start",...}}
//! < {"type":"event","sessionId":"9c1e...","event":{"type":"data",...}}
//! < {"type":"finished","sessionId":"9c1e...","outcome":{"outcome":"completed","totalLoaded":100}}
//! > {"id":2,"command":"cancel","sessionId":"9c1e..."}
//! < {"type":"result","id":2,"result":{"cancelled":false}}
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::gateway::{OperationRequest, OperationRouter};
use crate::models::{LoadRequest, ProgressEvent};
use crate::session::{LoadHandle, SessionId, SessionManager, SessionOutcome};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Value,
    #[serde(flatten)]
    command: Command,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
enum Command {
    Load {
        request: LoadRequest,
    },
    #[serde(rename_all = "camelCase")]
    Cancel {
        session_id: SessionId,
    },
    #[serde(rename_all = "camelCase")]
    Branches {
        repo_path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    Diff {
        repo_path: PathBuf,
        commit: String,
    },
    #[serde(rename_all = "camelCase")]
    Attribute {
        repo_path: PathBuf,
        commit: String,
    },
    Exec {
        request: OperationRequest,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Reply {
    #[serde(rename_all = "camelCase")]
    Accepted { id: Value, session_id: SessionId },
    #[serde(rename_all = "camelCase")]
    Event {
        session_id: SessionId,
        event: ProgressEvent,
    },
    #[serde(rename_all = "camelCase")]
    Finished {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
    Result { id: Value, result: Value },
    Error { id: Value, kind: String, message: String },
}

impl Reply {
    fn from_result(id: Value, result: EngineResult<Value>) -> Self {
        match result {
            Ok(result) => Reply::Result { id, result },
            Err(e) => Reply::Error {
                id,
                kind: e.kind().to_string(),
                message: e.to_string(),
            },
        }
    }
}

/// Serve stdin/stdout until stdin closes.
pub fn run_stdio(config: EngineConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let manager = SessionManager::new(config.clone());
        let router = Arc::new(OperationRouter::new(&config));
        serve(
            manager,
            router,
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
        .await
    })
}

/// Serve requests from `input` until it is exhausted, then wait for running
/// loads to finish.
pub async fn serve<R, W>(
    manager: SessionManager,
    router: Arc<OperationRouter>,
    input: R,
    output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // Bounded so a slow reader stalls the sessions instead of queueing history
    let (tx, rx) = mpsc::channel::<Reply>(manager.config().load.event_buffer.max(1));
    let writer = tokio::spawn(write_replies(rx, output));
    let mut tasks = JoinSet::new();

    info!("Listening for requests on stdin");
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("Rejecting malformed request: {}", e);
                reply_later(
                    &mut tasks,
                    &tx,
                    Reply::Error {
                        id: Value::Null,
                        kind: "InvalidRequest".to_string(),
                        message: e.to_string(),
                    },
                );
                continue;
            }
        };
        dispatch(envelope, &manager, &router, &tx, &mut tasks);
    }

    debug!("Input closed; waiting for {} tasks", tasks.len());
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!("Request task failed: {}", e);
        }
    }
    drop(tx);
    writer.await??;
    Ok(())
}

fn dispatch(
    envelope: Envelope,
    manager: &SessionManager,
    router: &Arc<OperationRouter>,
    tx: &mpsc::Sender<Reply>,
    tasks: &mut JoinSet<()>,
) {
    let Envelope { id, command } = envelope;
    match command {
        Command::Load { request } => {
            let handle = manager.start_load(request);
            tasks.spawn(forward_events(id, handle, tx.clone()));
        }
        Command::Cancel { session_id } => {
            let cancelled = manager.cancel(&session_id);
            reply_later(
                tasks,
                tx,
                Reply::Result {
                    id,
                    result: json!({ "cancelled": cancelled }),
                },
            );
        }
        Command::Branches { repo_path } => {
            let manager = manager.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = manager.list_branches(repo_path).await.and_then(to_value);
                let _ = tx.send(Reply::from_result(id, result)).await;
            });
        }
        Command::Diff { repo_path, commit } => {
            let manager = manager.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = manager.diff_commit(repo_path, commit).await.and_then(to_value);
                let _ = tx.send(Reply::from_result(id, result)).await;
            });
        }
        Command::Attribute { repo_path, commit } => {
            let manager = manager.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = manager.attribute(repo_path, commit).await.and_then(to_value);
                let _ = tx.send(Reply::from_result(id, result)).await;
            });
        }
        Command::Exec { request } => {
            let router = Arc::clone(router);
            let tx = tx.clone();
            tasks.spawn(async move {
                let result = tokio::task::spawn_blocking(move || router.invoke(&request))
                    .await
                    .map_err(|e| EngineError::TaskFailed(e.to_string()))
                    .and_then(|result| result)
                    .and_then(to_value);
                let _ = tx.send(Reply::from_result(id, result)).await;
            });
        }
    }
}

/// Send `reply` from a task so the request loop keeps reading while output is stalled.
fn reply_later(tasks: &mut JoinSet<()>, tx: &mpsc::Sender<Reply>, reply: Reply) {
    let tx = tx.clone();
    tasks.spawn(async move {
        let _ = tx.send(reply).await;
    });
}

async fn forward_events(request_id: Value, handle: LoadHandle, tx: mpsc::Sender<Reply>) {
    let LoadHandle {
        id,
        mut events,
        outcome,
    } = handle;

    let accepted = Reply::Accepted {
        id: request_id,
        session_id: id.clone(),
    };
    if tx.send(accepted).await.is_err() {
        return;
    }

    // Dropping `events` on a dead writer makes the session see a gone consumer
    while let Some(event) = events.recv().await {
        let reply = Reply::Event {
            session_id: id.clone(),
            event,
        };
        if tx.send(reply).await.is_err() {
            warn!("Output closed; abandoning session {}", id);
            return;
        }
    }

    let outcome = match outcome.await {
        Ok(outcome) => outcome,
        Err(e) => SessionOutcome::Failed {
            kind: "Internal".to_string(),
            message: e.to_string(),
        },
    };
    let _ = tx
        .send(Reply::Finished {
            session_id: id,
            outcome,
        })
        .await;
}

async fn write_replies<W>(mut rx: mpsc::Receiver<Reply>, mut output: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(reply) = rx.recv().await {
        let mut line = serde_json::to_string(&reply)?;
        line.push('\n');
        output.write_all(line.as_bytes()).await?;
        output.flush().await?;
    }
    Ok(())
}

fn to_value<T: Serialize>(value: T) -> EngineResult<Value> {
    serde_json::to_value(value)
        .map_err(|e| EngineError::InvalidArgument(format!("unserializable result: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    async fn exchange(input: String) -> anyhow::Result<Vec<Value>> {
        let config = EngineConfig::default();
        let manager = SessionManager::new(config.clone());
        let router = Arc::new(OperationRouter::new(&config));
        let (mut client, server_side) = tokio::io::duplex(1 << 16);

        let reader = tokio::spawn(async move {
            let mut out = String::new();
            client.read_to_string(&mut out).await.map(|_| out)
        });
        serve(manager, router, input.as_bytes(), server_side).await?;
        let out = reader.await??;

        out.lines()
            .map(|line| serde_json::from_str(line).map_err(Into::into))
            .collect()
    }

    #[tokio::test]
    async fn test_load_streams_tagged_events() -> anyhow::Result<()> {
        let t = TestRepo::new()?;
        t.commit("main", &[("a.txt", Some("a\n"))], "one")?;
        t.commit("main", &[("b.txt", Some("b\n"))], "two")?;

        let request = json!({
            "id": 7,
            "command": "load",
            "request": { "repoPath": t.path(), "batchSize": 1 }
        });
        let replies = exchange(format!("{}\n", request)).await?;

        assert_eq!(replies[0]["type"], "accepted");
        assert_eq!(replies[0]["id"], 7);
        let session = replies[0]["sessionId"].clone();

        let events: Vec<&str> = replies
            .iter()
            .filter(|r| r["type"] == "event")
            .map(|r| r["event"]["type"].as_str().unwrap_or_default())
            .collect();
        assert_eq!(events, vec!["start", "data", "data", "end"]);
        assert!(replies.iter().all(|r| r["type"] == "accepted" || r["sessionId"] == session));

        let finished = replies.last().cloned().unwrap_or_default();
        assert_eq!(finished["type"], "finished");
        assert_eq!(finished["outcome"]["totalLoaded"], 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_queries_and_errors() -> anyhow::Result<()> {
        let t = TestRepo::new()?;
        t.commit("main", &[("a.txt", Some("a\n"))], "one")?;

        let input = [
            json!({ "id": "b", "command": "branches", "repoPath": t.path() }).to_string(),
            "not json".to_string(),
            json!({ "id": "c", "command": "cancel", "sessionId": "nope" }).to_string(),
            json!({ "id": "d", "command": "diff", "repoPath": t.path(), "commit": "nope" })
                .to_string(),
        ]
        .join("\n");
        let replies = exchange(input).await?;
        assert_eq!(replies.len(), 4);

        let by_id = |id: &str| replies.iter().find(|r| r["id"] == id).cloned();
        assert_eq!(by_id("b").map(|r| r["result"][0]["name"].clone()), Some(json!("main")));
        assert_eq!(by_id("c").map(|r| r["result"]["cancelled"].clone()), Some(json!(false)));
        assert_eq!(by_id("d").map(|r| r["kind"].clone()), Some(json!("CorruptedObject")));
        assert!(replies
            .iter()
            .any(|r| r["id"].is_null() && r["kind"] == "InvalidRequest"));
        Ok(())
    }

    #[tokio::test]
    async fn test_unread_output_pauses_load() -> anyhow::Result<()> {
        let t = TestRepo::new()?;
        for i in 0..200 {
            let name = format!("f{}.txt", i);
            t.commit("main", &[(name.as_str(), Some("x\n"))], &format!("commit {}", i))?;
        }

        let mut config = EngineConfig::default();
        config.load.event_buffer = 1;
        let manager = SessionManager::new(config.clone());
        let router = Arc::new(OperationRouter::new(&config));
        let (client, server_side) = tokio::io::duplex(64);

        let request = json!({
            "id": 1,
            "command": "load",
            "request": { "repoPath": t.path(), "batchSize": 1 }
        });
        let input = std::io::Cursor::new(format!("{}\n", request).into_bytes());
        let server = tokio::spawn(serve(manager.clone(), router, input, server_side));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(manager.active_sessions().len(), 1);

        // Closing the client breaks the writer and releases the session
        drop(client);
        let served = tokio::time::timeout(Duration::from_secs(10), server).await??;
        assert!(served.is_err());

        for _ in 0..100 {
            if manager.active_sessions().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(manager.active_sessions().is_empty());
        Ok(())
    }
}
