//! Binary entry point: loads configuration, starts one Telnet listener per
//! configured line, and drives the scheduler on a fixed tick (spec §5, §6).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use bbsd::config::Config;
use bbsd::scheduler::{FsScriptSource, Scheduler};
use bbsd::store::fileobj::FileBaseStore;
use bbsd::store::UserStore;
use bbsd::transport::telnet::TelnetFilter;

const TICK: Duration = Duration::from_millis(50);

fn load_config() -> Config {
    let path = std::env::args().nth(1).unwrap_or_else(|| "bbsd.toml".to_string());
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| {
        log::warn!("could not read {path}: {e}, falling back to a single local line");
        String::new()
    });
    if text.is_empty() {
        return Config {
            root: std::env::current_dir().unwrap_or_default(),
            bbs_name: "bbsd".to_string(),
            telnet_port: bbsd::transport::telnet::DEFAULT_PORT,
            lines: vec![],
            akas: vec![],
            uplinks: vec![],
            downlinks: vec![],
            binkp_port: 24554,
            origin_lines: vec![],
        };
    }
    match Config::from_toml_str(&text) {
        Ok(c) => c,
        Err(e) => {
            log::error!("failed to parse {path}: {e}");
            std::process::exit(1);
        }
    }
}

/// Pumps bytes between a Telnet socket and the pipe plane for `line`
/// until the socket closes or the scheduler tears the line down.
async fn run_connection(
    scheduler: Arc<Mutex<Scheduler>>,
    line: usize,
    mut socket: tokio::net::TcpStream,
    peer: SocketAddr,
) {
    let mut filter = TelnetFilter::new();
    {
        let sched = scheduler.lock().await;
        for offer in TelnetFilter::initial_offers() {
            let _ = sched.plane.enqueue_output(line, &offer.encode());
        }
        drop(sched);
    }

    let mut read_buf = [0u8; 4096];
    let mut drain_buf = [0u8; 4096];
    loop {
        tokio::select! {
            result = socket.read(&mut read_buf) => {
                match result {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        let mut clean = Vec::new();
                        let mut replies = Vec::new();
                        {
                            let sched = scheduler.lock().await;
                            filter.transfer_override = sched.line(line).transfer_active;
                        }
                        filter.feed_inbound(&read_buf[..n], &mut clean, &mut replies);
                        let sched = scheduler.lock().await;
                        if !clean.is_empty() {
                            let _ = sched.plane.enqueue_input(line, &clean);
                        }
                        for reply in &replies {
                            let _ = sched.plane.enqueue_output(line, &reply.encode());
                        }
                        drop(sched);
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        let (outbound, disconnected) = {
            let sched = scheduler.lock().await;
            let n = sched.plane.dequeue_output_block(line, &mut drain_buf).unwrap_or(0);
            let disconnected = sched.line(line).state == bbsd::session::LineState::Disconnected;
            filter.transfer_override = sched.line(line).transfer_active;
            (drain_buf[..n].to_vec(), disconnected)
        };
        if !outbound.is_empty() {
            let encoded = filter.encode_outbound(&outbound);
            if socket.write_all(&encoded).await.is_err() {
                break;
            }
        }
        if disconnected {
            break;
        }
    }

    let mut sched = scheduler.lock().await;
    sched.request_disconnect(line);
    drop(sched);
    log::info!("line {line} ({peer}) connection closed");
}

async fn accept_loop(scheduler: Arc<Mutex<Scheduler>>, listener: TcpListener, line_count: usize) {
    let next_line = std::sync::atomic::AtomicUsize::new(0);
    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let line = next_line.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % line_count;
        {
            let mut sched = scheduler.lock().await;
            if !sched.is_accepting() || sched.line(line).state != bbsd::session::LineState::Disconnected {
                drop(sched);
                log::info!("rejecting connection from {peer}: line {line} busy or closed for new calls");
                continue;
            }
            sched.connect(line, &peer.to_string(), Instant::now(), "logon.scr");
        }
        tokio::spawn(run_connection(scheduler.clone(), line, socket, peer));
    }
}

/// Advances every line once per tick; cheaper than a task per line since
/// most lines are idle most of the time (spec §5 "single poll loop").
async fn scheduler_tick_loop(scheduler: Arc<Mutex<Scheduler>>, line_count: usize) {
    loop {
        tokio::time::sleep(TICK).await;
        let now = Instant::now();
        let mut sched = scheduler.lock().await;
        for line in 0..line_count {
            while sched.visit(line, now) {}
            for mail in sched.drain_pending_mail(line) {
                log::info!("line {line} queued mail: {mail:?}");
            }
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = load_config();
    let line_count = config.lines.len().max(1);

    let users = Arc::new(UserStore::new(&config.data_dir()));
    let files = Arc::new(FileBaseStore::new(&config.data_dir()));
    let scripts = Arc::new(FsScriptSource { root: config.root.join("Scripts") });
    let call_log_path = config.logs_dir().join("Calls");

    let scheduler = Arc::new(Mutex::new(Scheduler::new(
        line_count,
        Duration::from_secs(300),
        users,
        files,
        scripts,
        call_log_path,
        Instant::now(),
    )));

    let addr: SocketAddr = ([0, 0, 0, 0], config.telnet_port).into();
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            log::error!("could not bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    log::info!("{} listening on {addr} with {line_count} line(s)", config.bbs_name);

    tokio::spawn(scheduler_tick_loop(scheduler.clone(), line_count));
    accept_loop(scheduler, listener, line_count).await;
}
