//! End-to-end tests for the hub server.
//!
//! Each test loads spaces into a registry, boots the router on an ephemeral
//! port, and talks to it as a client would: WebSocket queries per space and
//! HTTP metadata requests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use atomspace_hub::atom::AtomSpace;
use atomspace_hub::atom::sexpr::decode_str;
use atomspace_hub::config::ServerConfig;
use atomspace_hub::server;
use atomspace_hub::server::meta::{SpaceInfo, SpaceListResponse};
use atomspace_hub::space::SpaceRegistry;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ZOO: &str = r#"
    (InheritanceLink (ConceptNode "cat") (ConceptNode "mammal"))
    (InheritanceLink (ConceptNode "dog") (ConceptNode "mammal"))
    (InheritanceLink (ConceptNode "trout") (ConceptNode "fish"))
"#;

const GENES: &str = r#"
    (MemberLink (GeneNode "BRCA1") (ConceptNode "dna-repair"))
    (MemberLink (GeneNode "TP53") (ConceptNode "dna-repair"))
"#;

const MAMMALS: &str = r#"(GetLink (InheritanceLink (VariableNode "$x") (ConceptNode "mammal")))"#;

fn registry() -> Arc<SpaceRegistry> {
    let registry = SpaceRegistry::new();
    for (id, source) in [("zoo", ZOO), ("genes", GENES)] {
        let store = AtomSpace::new();
        decode_str(source, id, &store).unwrap();
        registry.create_space(id, store).unwrap();
    }
    Arc::new(registry)
}

async fn start(registry: Arc<SpaceRegistry>, config: ServerConfig) -> SocketAddr {
    let app = server::router(registry, config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, app, std::future::pending()));
    addr
}

async fn connect(addr: SocketAddr, id: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/{id}"))
        .await
        .unwrap();
    client
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::Text(text.into())).await.unwrap();
}

/// Read text messages up to and including the next `eof`.
async fn read_until_eof(client: &mut Client) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), client.next())
            .await
            .expect("timed out waiting for results");
        match msg {
            Some(Ok(Message::Text(text))) => {
                let text = text.as_str().to_string();
                let done = text == "eof";
                out.push(text);
                if done {
                    return out;
                }
            }
            Some(Ok(_)) => {}
            other => panic!("connection ended early: {other:?}"),
        }
    }
}

async fn query(client: &mut Client, text: &str) -> Vec<String> {
    send(client, text).await;
    read_until_eof(client).await
}

async fn space_info(addr: SocketAddr, id: &str) -> SpaceInfo {
    reqwest::get(format!("http://{addr}/atomspace/{id}"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn realized_results_stream_in_order_then_eof() {
    let addr = start(registry(), ServerConfig::default()).await;
    let mut client = connect(addr, "zoo").await;

    let out = query(&mut client, MAMMALS).await;
    assert_eq!(
        out,
        vec![r#"(ConceptNode "cat")"#, r#"(ConceptNode "dog")"#, "eof"]
    );
}

#[tokio::test]
async fn deferred_results_have_the_same_shape() {
    let addr = start(registry(), ServerConfig::default()).await;
    let mut client = connect(addr, "zoo").await;

    let out = query(
        &mut client,
        r#"(MeetLink (InheritanceLink (VariableNode "$x") (ConceptNode "mammal")))"#,
    )
    .await;
    assert_eq!(
        out,
        vec![r#"(ConceptNode "cat")"#, r#"(ConceptNode "dog")"#, "eof"]
    );
}

#[tokio::test]
async fn non_query_yields_only_eof_and_keeps_counts() {
    let addr = start(registry(), ServerConfig::default()).await;
    let before = space_info(addr, "zoo").await;
    let mut client = connect(addr, "zoo").await;

    let out = query(
        &mut client,
        r#"(InheritanceLink (ConceptNode "newt") (ConceptNode "amphibian"))"#,
    )
    .await;
    assert_eq!(out, vec!["eof"]);

    let after = space_info(addr, "zoo").await;
    assert_eq!(before, after);
}

#[tokio::test]
async fn errors_are_reported_and_connection_stays_open() {
    let addr = start(registry(), ServerConfig::default()).await;
    let mut client = connect(addr, "zoo").await;

    let out = query(&mut client, "(GetLink (InheritanceLink").await;
    assert_eq!(out.len(), 2);
    assert!(out[0].starts_with("error: "), "{out:?}");
    assert_eq!(out[1], "eof");

    let out = query(&mut client, MAMMALS).await;
    assert_eq!(out.len(), 3);
}

#[tokio::test]
async fn back_to_back_queries_do_not_interleave() {
    let addr = start(registry(), ServerConfig::default()).await;
    let mut client = connect(addr, "zoo").await;

    send(&mut client, MAMMALS).await;
    send(
        &mut client,
        r#"(GetLink (InheritanceLink (VariableNode "$x") (ConceptNode "fish")))"#,
    )
    .await;

    let first = read_until_eof(&mut client).await;
    let second = read_until_eof(&mut client).await;
    assert_eq!(
        first,
        vec![r#"(ConceptNode "cat")"#, r#"(ConceptNode "dog")"#, "eof"]
    );
    assert_eq!(second, vec![r#"(ConceptNode "trout")"#, "eof"]);
}

#[tokio::test]
async fn spaces_are_independent_endpoints() {
    let addr = start(registry(), ServerConfig::default()).await;
    let mut zoo = connect(addr, "zoo").await;
    let mut genes = connect(addr, "genes").await;

    let gene_query = r#"(GetLink (MemberLink (VariableNode "$g") (ConceptNode "dna-repair")))"#;
    send(&mut zoo, gene_query).await;
    send(&mut genes, gene_query).await;

    assert_eq!(read_until_eof(&mut zoo).await, vec!["eof"]);
    assert_eq!(
        read_until_eof(&mut genes).await,
        vec![r#"(GeneNode "BRCA1")"#, r#"(GeneNode "TP53")"#, "eof"]
    );
}

#[tokio::test]
async fn removed_space_reports_not_found_on_its_endpoint() {
    let registry = registry();
    let addr = start(Arc::clone(&registry), ServerConfig::default()).await;
    let mut client = connect(addr, "genes").await;

    assert!(registry.remove_space("genes"));
    let out = query(&mut client, MAMMALS).await;
    assert_eq!(out.len(), 2);
    assert!(out[0].contains("unknown atomspace"), "{out:?}");
}

#[tokio::test]
async fn unknown_endpoint_is_not_upgraded() {
    let addr = start(registry(), ServerConfig::default()).await;
    let result = tokio_tungstenite::connect_async(format!("ws://{addr}/ghost")).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn metadata_lists_and_counts() {
    let addr = start(registry(), ServerConfig::default()).await;

    let list: SpaceListResponse = reqwest::get(format!("http://{addr}/atomspaces"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.atomspaces, vec!["zoo", "genes"]);

    let info = space_info(addr, "zoo").await;
    assert_eq!(
        info,
        SpaceInfo {
            id: "zoo".into(),
            num_nodes: 5,
            num_links: 3,
            total: 8,
        }
    );

    let missing = reqwest::get(format!("http://{addr}/atomspace/ghost"))
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    assert!(missing.text().await.unwrap().contains("ghost"));
}

#[tokio::test]
async fn idle_connections_are_closed() {
    let config = ServerConfig {
        idle_timeout: Some(Duration::from_millis(200)),
        ..ServerConfig::default()
    };
    let addr = start(registry(), config).await;
    let mut client = connect(addr, "zoo").await;

    let end = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "server did not close the idle connection");
}

/// A space holding `n0 -> n1 -> ... -> n{len}` as inheritance links.
fn chain_registry(len: usize) -> Arc<SpaceRegistry> {
    let store = AtomSpace::new();
    for i in 0..len {
        let from = store.add_node("ConceptNode", &format!("n{i}"));
        let to = store.add_node("ConceptNode", &format!("n{}", i + 1));
        store.add_link("InheritanceLink", vec![from, to]);
    }
    let registry = SpaceRegistry::new();
    registry.create_space("chain", store).unwrap();
    Arc::new(registry)
}

#[tokio::test]
async fn queries_on_one_space_run_one_at_a_time() {
    let addr = start(chain_registry(1000), ServerConfig::default()).await;
    let mut slow = connect(addr, "chain").await;
    let mut fast = connect(addr, "chain").await;

    // Two-step paths ending at n5: a full pass over every candidate pair.
    send(
        &mut slow,
        r#"(MeetLink
             (VariableList (VariableNode "$a") (VariableNode "$b"))
             (AndLink
               (InheritanceLink (VariableNode "$a") (VariableNode "$b"))
               (InheritanceLink (VariableNode "$b") (ConceptNode "n5"))))"#,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let fast_sent = Instant::now();
    send(
        &mut fast,
        r#"(GetLink (InheritanceLink (ConceptNode "n0") (VariableNode "$x")))"#,
    )
    .await;

    let (slow_out, fast_out) = tokio::join!(
        async {
            let out = read_until_eof(&mut slow).await;
            (out, Instant::now())
        },
        async {
            let out = read_until_eof(&mut fast).await;
            (out, Instant::now())
        },
    );
    let (slow_out, slow_done) = slow_out;
    let (fast_out, fast_done) = fast_out;

    assert_eq!(
        slow_out,
        vec![
            r#"(ListLink (ConceptNode "n3") (ConceptNode "n4"))"#,
            "eof"
        ]
    );
    assert_eq!(fast_out, vec![r#"(ConceptNode "n1")"#, "eof"]);
    // The cheap query waited for the expensive one on the same store.
    assert!(
        fast_done + Duration::from_millis(50) >= slow_done,
        "fast query finished {:?} after sending, before the slow one",
        fast_done - fast_sent
    );
}

#[tokio::test]
async fn client_that_stops_reading_is_disconnected() {
    const RECORDS: usize = 2000;
    const NAME_LEN: usize = 16 * 1024;

    let store = AtomSpace::new();
    let bulk = store.add_node("ConceptNode", "bulk");
    for i in 0..RECORDS {
        let name = format!("{i:05}{}", "x".repeat(NAME_LEN));
        let member = store.add_node("ConceptNode", &name);
        store.add_link("MemberLink", vec![member, bulk]);
    }
    let registry = SpaceRegistry::new();
    registry.create_space("bulk", store).unwrap();

    let config = ServerConfig {
        max_backpressure: 1024,
        drain_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let addr = start(Arc::new(registry), config).await;
    let mut client = connect(addr, "bulk").await;

    send(
        &mut client,
        r#"(GetLink (MemberLink (VariableNode "$m") (ConceptNode "bulk")))"#,
    )
    .await;
    // Fill the socket buffers and let the server give up on us.
    tokio::time::sleep(Duration::from_secs(3)).await;

    let mut received = 0;
    let mut saw_eof = false;
    let ended = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => {
                    received += 1;
                    saw_eof |= text.as_str() == "eof";
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;

    assert!(ended.is_ok(), "server kept the stalled connection open");
    assert!(!saw_eof, "all {received} records were delivered");
    assert!(received < RECORDS);
}
