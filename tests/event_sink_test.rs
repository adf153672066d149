//! Integration tests for event delivery against a local HTTP endpoint

use bytes::Bytes;
use dock_vision::domain::event::{DockEvent, EventKind};
use dock_vision::domain::types::PalletId;
use dock_vision::infra::Metrics;
use dock_vision::io::{create_event_sink, SinkSettings};
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// Captured request: (path, JSON body)
type Captured = (String, serde_json::Value);

/// Start a local endpoint answering every POST with `status`
async fn start_capture_server(status: StatusCode) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else { break };
            let tx = tx.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let tx = tx.clone();
                    async move {
                        let path = req.uri().path().to_string();
                        let body = req.into_body().collect().await.unwrap().to_bytes();
                        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                        let _ = tx.send((path, json));
                        Ok::<_, Infallible>(
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from("{}")))
                                .unwrap(),
                        )
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
            });
        }
    });

    (format!("http://{addr}/api/"), rx)
}

fn settings(url: String) -> SinkSettings {
    SinkSettings {
        url,
        warehouse: "WH001".into(),
        camera: "Camera01".into(),
        timeout: Duration::from_secs(2),
        workers: 2,
        queue_size: 16,
    }
}

#[tokio::test]
async fn test_events_posted_per_category() {
    let (url, mut rx) = start_capture_server(StatusCode::OK).await;
    let metrics = Arc::new(Metrics::new());
    let (mut emitter, workers) = create_event_sink(settings(url), metrics.clone()).unwrap();
    let handles: Vec<_> = workers.into_iter().map(|w| tokio::spawn(w.run())).collect();

    let id = PalletId::mint();
    assert!(emitter.emit(DockEvent::door(EventKind::Open, 0)));
    assert!(emitter.emit(DockEvent::pallet(EventKind::Unload, id)));
    assert!(emitter.emit(DockEvent::pallet(EventKind::StageOut, id)));
    drop(emitter);
    for h in handles {
        tokio::time::timeout(Duration::from_secs(5), h).await.unwrap().unwrap();
    }

    let mut captured = Vec::new();
    while let Ok(item) = rx.try_recv() {
        captured.push(item);
    }
    // Two workers: delivery order across categories is not guaranteed
    captured.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(captured.len(), 3);

    let (path, door) = &captured[1];
    assert_eq!(path, "/api/Door");
    assert_eq!(door["DocType"], "Open");
    assert_eq!(door["DoorNO"], "Door0");
    assert!(door["PAK_ID"].is_null());
    assert_eq!(door["WHNUM"], "WH001");
    assert_eq!(door["CameraNO"], "Camera01");

    let (path, unload) = &captured[0];
    assert_eq!(path, "/api/Dock");
    assert_eq!(unload["DocCat"], "Dock");
    assert_eq!(unload["DocType"], "UOD");
    assert_eq!(unload["PAK_ID"], id.to_string());

    let (path, out) = &captured[2];
    assert_eq!(path, "/api/Stage");
    assert_eq!(out["DocType"], "Out");

    assert_eq!(metrics.events_delivered(), 3);
    assert_eq!(metrics.events_failed(), 0);
}

#[tokio::test]
async fn test_non_success_status_counts_as_failure() {
    let (url, mut rx) = start_capture_server(StatusCode::INTERNAL_SERVER_ERROR).await;
    let metrics = Arc::new(Metrics::new());
    let (mut emitter, workers) = create_event_sink(settings(url), metrics.clone()).unwrap();
    let handles: Vec<_> = workers.into_iter().map(|w| tokio::spawn(w.run())).collect();

    emitter.emit(DockEvent::pallet(EventKind::StageIn, PalletId::mint()));
    drop(emitter);
    for h in handles {
        tokio::time::timeout(Duration::from_secs(5), h).await.unwrap().unwrap();
    }

    // Delivered once, never retried
    assert!(rx.try_recv().is_ok());
    assert!(rx.try_recv().is_err());
    assert_eq!(metrics.events_failed(), 1);
    assert_eq!(metrics.events_delivered(), 0);
}
