// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Engine harness plus a minimal HTTP server for web step scenarios

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tributary::engine::{DefaultHttpClientFactory, Executor};
use tributary::model::{Dataflow, DataflowRun, RunId};
use tributary::queue::MemoryQueue;
use tributary::storage::{MemoryStorage, Storage};

pub struct TestHarness {
    pub executor: Arc<Executor>,
    pub storage: Arc<MemoryStorage>,
    pub queue: Arc<MemoryQueue>,
}

pub fn harness(workers: usize) -> TestHarness {
    let storage = Arc::new(MemoryStorage::new());
    let queue = Arc::new(MemoryQueue::new(workers));
    let executor = Executor::new(
        Arc::new(DefaultHttpClientFactory::new().unwrap()),
        storage.clone(),
        queue.clone(),
    );
    TestHarness {
        executor,
        storage,
        queue,
    }
}

impl TestHarness {
    /// Decode, start and drive a dataflow to its terminal state.
    pub async fn run_to_completion(&self, dataflow_json: &str) -> DataflowRun {
        let dataflow = Dataflow::from_json(dataflow_json).unwrap();
        let run = self.executor.start(dataflow).await.unwrap();
        self.wait_for_terminal(&run.id).await
    }

    /// Poll storage until the run reaches a terminal state.
    pub async fn wait_for_terminal(&self, run_id: &RunId) -> DataflowRun {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let run = self
                .storage
                .retrieve_runs(std::slice::from_ref(run_id))
                .await
                .remove(run_id)
                .expect("run disappeared from storage");
            if run.state.is_terminal() {
                return run;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("run {} did not reach a terminal state", run_id);
            }
        }
    }
}

/// How the test server answers requests.
#[derive(Clone)]
pub enum ServerMode {
    /// 200, echoing the request body back as application/json.
    Echo,
    /// A fixed status and plain-text body.
    Fixed { status: u16, body: &'static str },
}

/// A minimal HTTP/1.1 responder recording every request body it sees.
pub struct TestServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub async fn spawn(mode: ServerMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let mode = mode.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = serve_connection(socket, mode, recorded).await;
                });
            }
        });

        Self {
            url: format!("http://{}", addr),
            requests,
        }
    }

    /// Request bodies received so far.
    pub fn request_bodies(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_connection(
    mut socket: TcpStream,
    mode: ServerMode,
    recorded: Arc<Mutex<Vec<String>>>,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];

    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let body = buf[header_end..(header_end + content_length).min(buf.len())].to_vec();
    recorded
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&body).into_owned());

    let (status_line, content_type, response_body) = match mode {
        ServerMode::Echo => ("200 OK".to_string(), "application/json", body),
        ServerMode::Fixed { status, body } => {
            let reason = match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                _ => "Status",
            };
            (
                format!("{} {}", status, reason),
                "text/plain",
                body.as_bytes().to_vec(),
            )
        }
    };

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status_line,
        content_type,
        response_body.len()
    );
    socket.write_all(response.as_bytes()).await?;
    socket.write_all(&response_body).await?;
    socket.flush().await?;
    Ok(())
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
