//! Alert sender → dashboard server round trip over a real socket

mod common;

use cert_walker::alert::Alert;
use cert_walker::cert::CertParser;
use cert_walker::error::SenderError;
use cert_walker::sender::AlertSender;
use cert_walker::server::{build_router, serve_on, AppState};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;
use tokio::sync::oneshot;

/// Dashboard running on its own runtime thread
struct TestServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    fn start(alerts_file: &Path, static_dir: &Path) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();

        let state = Arc::new(AppState::new(alerts_file));
        let router = build_router(Arc::clone(&state), static_dir);
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                serve_on(listener, router, async {
                    let _ = stopped.await;
                })
                .await
                .unwrap();
            });
        });

        Self {
            addr,
            state,
            stop: Some(stop),
            handle: Some(handle),
        }
    }

    fn alerts_url(&self) -> String {
        format!("http://{}/alerts", self.addr)
    }

    fn stored(&self) -> Vec<Alert> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(self.state.store.load())
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn test_sender_to_server_round_trip() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("store").join("alerts.json"), dir.path());

    let certs = tempdir().unwrap();
    let path = common::write_chain(certs.path(), "expiring.pem", &[7]);
    let records = CertParser::new(true, 30).parse_file(&path).unwrap();
    let record = &records[0];
    assert!(record.is_expiring_soon);

    let sender = AlertSender::new(Some(server.alerts_url()), "node-7").unwrap();
    sender.send_alert(record).unwrap();
    // Same host and path again: replaces instead of appending
    sender.send_alert(record).unwrap();

    let stored = server.stored();
    assert_eq!(stored.len(), 1);

    let alert = &stored[0];
    assert_eq!(alert.host, "node-7");
    assert_eq!(alert.path, path.display().to_string());
    assert_eq!(alert.level, "WARN");
    assert_eq!(alert.message, "Certificate expiring soon");
    assert_eq!(alert.expiration_date, Some(record.expiration_date));
    assert_eq!(alert.days_until_expiry, record.days_until_expiry);
    assert!(alert.subject.as_deref().unwrap().contains("cert-0"));
    assert!(alert.timestamp.is_some());
}

#[test]
fn test_sender_sees_rejection_status() {
    let dir = tempdir().unwrap();
    let server = TestServer::start(&dir.path().join("alerts.json"), dir.path());

    // The dashboard only accepts POST on /alerts; /api/alerts rejects it
    let url = format!("http://{}/api/alerts", server.addr);
    let sender = AlertSender::new(Some(url), "node-7").unwrap();

    let certs = tempdir().unwrap();
    let path = common::write_chain(certs.path(), "expiring.pem", &[3]);
    let record = CertParser::new(false, 30).parse_file(&path).unwrap().remove(0);

    assert!(matches!(
        sender.send_alert(&record),
        Err(SenderError::Status(405))
    ));
    assert!(server.stored().is_empty());
}
