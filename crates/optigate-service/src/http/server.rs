use std::io;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tiny_http::{Request, Server};

use crate::gateway::GatewayState;
use crate::ServerHandle;

const HTTP_WORKER_FACTOR: usize = 4;
const HTTP_WORKER_MIN: usize = 8;
const HTTP_QUEUE_FACTOR: usize = 4;
const HTTP_QUEUE_MIN: usize = 32;

fn http_worker_count() -> usize {
    // 中文注释：策略请求会长时间占用处理线程；固定 worker 上限，避免并发时无限 spawn 拖垮进程。
    let cpus = thread::available_parallelism()
        .map(|value| value.get())
        .unwrap_or(4);
    (cpus * HTTP_WORKER_FACTOR).max(HTTP_WORKER_MIN)
}

fn http_queue_size(worker_count: usize) -> usize {
    // 中文注释：使用有界队列给入口施加背压；不这样做会在峰值流量下无限堆积请求并放大内存抖动。
    worker_count.saturating_mul(HTTP_QUEUE_FACTOR).max(HTTP_QUEUE_MIN)
}

fn spawn_request_workers(
    worker_count: usize,
    rx: mpsc::Receiver<Request>,
    state: Arc<GatewayState>,
) {
    let shared_rx = Arc::new(Mutex::new(rx));
    for _ in 0..worker_count {
        let worker_rx = Arc::clone(&shared_rx);
        let worker_state = Arc::clone(&state);
        let _ = thread::spawn(move || loop {
            let request = {
                let Ok(guard) = worker_rx.lock() else {
                    break;
                };
                match guard.recv() {
                    Ok(request) => request,
                    Err(_) => break,
                }
            };
            crate::http::endpoints::route_request(request, &worker_state);
        });
    }
}

fn run_server(server: Server, state: Arc<GatewayState>) {
    let worker_count = http_worker_count();
    let queue_size = http_queue_size(worker_count);
    let (tx, rx) = mpsc::sync_channel::<Request>(queue_size);
    spawn_request_workers(worker_count, rx, state);

    for request in server.incoming_requests() {
        if crate::shutdown_requested() || request.url() == "/__shutdown" {
            let _ = request.respond(tiny_http::Response::from_string("shutdown"));
            break;
        }
        if tx.send(request).is_err() {
            break;
        }
    }
}

pub(crate) fn start_http(state: Arc<GatewayState>) -> io::Result<ServerHandle> {
    let server = Server::http(state.config.addr.as_str())
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    let addr = server
        .server_addr()
        .to_ip()
        .map(|addr| addr.to_string())
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "server addr missing"))?;
    let join = thread::spawn(move || run_server(server, state));
    Ok(ServerHandle { addr, join })
}
