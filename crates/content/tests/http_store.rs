//! Integration tests for `HttpContentStore` against a local gateway and
//! pinning API.
#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use shelfchain_content::{ContentConfig, HttpContentStore};
use shelfchain_library::{
    Address, BookDraft, ContentError, ContentResolver, ContentStore, CoverSource, LibraryConfig,
    LibraryService, MemoryLedger, MockWallet, Session,
};

// ---------------------------------------------------------------------------
// Mock gateway and pinning API
// ---------------------------------------------------------------------------

const API_KEY: &str = "test-key";
const API_SECRET: &str = "test-secret";

#[derive(Default)]
struct Pins {
    objects: HashMap<String, Vec<u8>>,
    file_names: Vec<String>,
    next: u32,
}

impl Pins {
    fn pin(&mut self, bytes: Vec<u8>) -> String {
        self.next += 1;
        let cid = format!("bafy{:04}", self.next);
        self.objects.insert(cid.clone(), bytes);
        cid
    }
}

type Shared = Arc<Mutex<Pins>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("pinata_api_key").is_some_and(|v| v == API_KEY)
        && headers.get("pinata_secret_api_key").is_some_and(|v| v == API_SECRET)
}

async fn gateway(State(pins): State<Shared>, Path(cid): Path<String>) -> Response {
    match pins.lock().unwrap().objects.get(&cid) {
        Some(bytes) => Bytes::from(bytes.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn pin_json(
    State(pins): State<Shared>,
    headers: HeaderMap,
    Json(document): Json<Value>,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let cid = pins.lock().unwrap().pin(serde_json::to_vec(&document).unwrap());
    Json(json!({ "IpfsHash": cid, "PinSize": 1, "Timestamp": "2026-01-01T00:00:00Z" }))
        .into_response()
}

async fn pin_file(
    State(pins): State<Shared>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let file_name = field.file_name().unwrap_or_default().to_owned();
            let bytes = field.bytes().await.unwrap();
            let mut pins = pins.lock().unwrap();
            pins.file_names.push(file_name);
            let cid = pins.pin(bytes.to_vec());
            return Json(json!({ "IpfsHash": cid })).into_response();
        }
    }
    StatusCode::BAD_REQUEST.into_response()
}

async fn broken_pin() -> impl IntoResponse {
    Json(json!({ "error": "quota exceeded" }))
}

struct MockPinningServer {
    addr: SocketAddr,
    pins: Shared,
}

impl MockPinningServer {
    async fn start() -> Self {
        let pins = Shared::default();
        let app = Router::new()
            .route("/ipfs/:cid", get(gateway))
            .route("/pinning/pinJSONToIPFS", post(pin_json))
            .route("/pinning/pinFileToIPFS", post(pin_file))
            .route("/broken/pinJSONToIPFS", post(broken_pin))
            .route("/slow/doc", get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "{}"
            }))
            .with_state(Arc::clone(&pins));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve") });
        Self { addr, pins }
    }

    fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn store(&self) -> HttpContentStore {
        self.store_with(|b| b)
    }

    fn store_with(
        &self,
        configure: impl FnOnce(ContentConfigOverrides) -> ContentConfigOverrides,
    ) -> HttpContentStore {
        let o = configure(ContentConfigOverrides {
            pinning_url: format!("{}/pinning", self.base()),
            api_secret: API_SECRET.to_owned(),
            timeout: Duration::from_secs(2),
        });
        let config = ContentConfig::builder()
            .gateway_url(self.base())
            .pinning_url(o.pinning_url)
            .api_key(API_KEY)
            .api_secret(o.api_secret)
            .timeout(o.timeout)
            .build()
            .expect("valid config");
        HttpContentStore::new(config).expect("store")
    }

    fn insert(&self, bytes: &[u8]) -> String {
        self.pins.lock().unwrap().pin(bytes.to_vec())
    }
}

struct ContentConfigOverrides {
    pinning_url: String,
    api_secret: String,
    timeout: Duration,
}

// ---------------------------------------------------------------------------
// Fetch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_rewrites_ipfs_uri_to_gateway() {
    let server = MockPinningServer::start().await;
    let cid = server.insert(br#"{"title":"Dune"}"#);

    let bytes = server.store().fetch(&format!("ipfs://{cid}")).await.expect("fetch");
    assert_eq!(&bytes[..], br#"{"title":"Dune"}"#);
}

#[tokio::test]
async fn fetch_reads_http_uri_as_is() {
    let server = MockPinningServer::start().await;
    let cid = server.insert(b"cover");

    let uri = format!("{}/ipfs/{cid}", server.base());
    let bytes = server.store().fetch(&uri).await.expect("fetch");
    assert_eq!(&bytes[..], b"cover");
}

#[tokio::test]
async fn fetch_missing_document_is_unavailable() {
    let server = MockPinningServer::start().await;

    let err = server.store().fetch("ipfs://bafymissing").await.unwrap_err();
    assert_eq!(err, ContentError::unavailable("ipfs://bafymissing", "HTTP status 404"));
}

#[tokio::test]
async fn fetch_rejects_unsupported_scheme() {
    let server = MockPinningServer::start().await;

    let err = server.store().fetch("ar://tx").await.unwrap_err();
    assert_eq!(err, ContentError::InvalidUri { uri: "ar://tx".into() });
}

#[tokio::test]
async fn fetch_times_out() {
    let server = MockPinningServer::start().await;
    let store = server.store_with(|o| ContentConfigOverrides {
        timeout: Duration::from_millis(100),
        ..o
    });

    let err = store.fetch(&format!("{}/slow/doc", server.base())).await.unwrap_err();
    assert!(matches!(err, ContentError::Unavailable { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// Publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publish_json_returns_gateway_uri() {
    let server = MockPinningServer::start().await;
    let store = server.store();

    let uri = store.publish_json(&json!({ "title": "Dune" })).await.expect("publish");
    assert!(uri.starts_with(&format!("{}/ipfs/bafy", server.base())), "got {uri}");

    let fetched: Value = serde_json::from_slice(&store.fetch(&uri).await.expect("fetch")).unwrap();
    assert_eq!(fetched, json!({ "title": "Dune" }));
}

#[tokio::test]
async fn publish_bytes_sends_multipart_file() {
    let server = MockPinningServer::start().await;
    let store = server.store();

    let uri = store
        .publish_bytes("cover.png", Bytes::from_static(b"\x89PNG"))
        .await
        .expect("publish");

    assert_eq!(server.pins.lock().unwrap().file_names, ["cover.png"]);
    assert_eq!(&store.fetch(&uri).await.expect("fetch")[..], b"\x89PNG");
}

#[tokio::test]
async fn publish_with_wrong_secret_fails() {
    let server = MockPinningServer::start().await;
    let store = server.store_with(|o| ContentConfigOverrides { api_secret: "nope".into(), ..o });

    let err = store.publish_json(&json!({})).await.unwrap_err();
    assert_eq!(err, ContentError::publish("HTTP status 401"));
}

#[tokio::test]
async fn publish_without_ipfs_hash_fails() {
    let server = MockPinningServer::start().await;
    let store = server.store_with(|o| ContentConfigOverrides {
        pinning_url: format!("{}/broken", server.base()),
        ..o
    });

    let err = store.publish_json(&json!({})).await.unwrap_err();
    assert!(matches!(err, ContentError::Publish { .. }), "got {err:?}");
}

// ---------------------------------------------------------------------------
// With the library
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resolver_reads_published_document() {
    let server = MockPinningServer::start().await;
    let resolver = ContentResolver::new(Arc::new(server.store()));
    let cid = server.insert(br#"{"title":"Dune","author":"Frank Herbert"}"#);

    let resolution = resolver.resolve(Some(&format!("ipfs://{cid}"))).await;
    let doc = resolution.document().expect("document");
    assert_eq!(doc.title.as_deref(), Some("Dune"));

    assert!(resolver.resolve(Some("ipfs://bafymissing")).await.is_unavailable());
}

#[tokio::test]
async fn added_book_round_trips_through_pinning() {
    let server = MockPinningServer::start().await;
    let owner = Address::parse("0x00000000000000000000000000000000000000aa");
    let service = LibraryService::new(
        Arc::new(MemoryLedger::new(owner.clone())),
        Arc::new(server.store()),
        LibraryConfig::default(),
    );
    let session = Session::new(Arc::new(MockWallet::new(vec![owner], "0x7a69")));
    session.connect().await.expect("connect");

    let draft = BookDraft::builder()
        .title("Dune")
        .author("Frank Herbert")
        .quantity(3)
        .cover(CoverSource::Upload { file_name: "dune.png".into(), bytes: b"png".to_vec() })
        .build();
    service.add_book(&session, draft).await.expect("add_book");

    let report = service.get_books().await.expect("get_books");
    assert_eq!(report.books.len(), 1);
    let book = &report.books[0];
    assert_eq!(book.title, "Dune");
    assert_eq!(book.author, "Frank Herbert");
    assert!(book.cover_image.starts_with(&format!("{}/ipfs/", server.base())));
    assert_eq!(server.pins.lock().unwrap().file_names, ["dune.png"]);
}
