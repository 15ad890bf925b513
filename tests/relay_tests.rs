//! End-to-end tests over loopback TCP

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chat_relay::message::{EXIT_DIRECTIVE, FAREWELL_NOTICE};
use chat_relay::{ChatRelay, Connection, RelayError, RouterHandle, ServerConfig, UiCallback};
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(3);

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
}

impl UiCallback for Recorder {
    fn on_message(&self, tagged: &str) {
        self.messages.lock().push(tagged.to_string());
    }

    fn rename_client(&self, _old_name: &str, requested: &str) -> Option<String> {
        Some(requested.to_string())
    }

    fn on_removed(&self, name: &str) {
        self.removed.lock().push(name.to_string());
    }
}

fn test_config() -> ServerConfig {
    ServerConfig::default().with_port(0)
}

async fn start() -> (ChatRelay, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let relay = ChatRelay::start(test_config(), recorder.clone())
        .await
        .unwrap();
    (relay, recorder)
}

async fn connect(addr: SocketAddr) -> Connection {
    let stream = TcpStream::connect(addr).await.unwrap();
    Connection::from_tcp(stream, 1024)
}

async fn read(client: &mut Connection) -> Option<String> {
    timeout(WAIT, client.read_line())
        .await
        .expect("timed out waiting for a line")
        .unwrap()
}

/// Wait until the router has exactly `n` sessions registered
async fn wait_for_clients(router: &RouterHandle, n: usize) {
    timeout(WAIT, async {
        while router.clients().await.unwrap().len() != n {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("client count never settled");
}

#[tokio::test]
async fn test_late_joiner_sees_only_later_messages() {
    let (relay, recorder) = start().await;
    let router = relay.router();

    let mut alice = connect(relay.local_addr()).await;
    wait_for_clients(&router, 1).await;

    alice.write_line("hello").await.unwrap();
    assert_eq!(read(&mut alice).await.as_deref(), Some("Guest1: hello"));

    let mut bob = connect(relay.local_addr()).await;
    wait_for_clients(&router, 2).await;

    alice.write_line("hi").await.unwrap();

    assert_eq!(read(&mut bob).await.as_deref(), Some("Guest1: hi"));
    assert_eq!(read(&mut alice).await.as_deref(), Some("Guest1: hi"));
    assert_eq!(
        *recorder.messages.lock(),
        vec!["Guest1: hello".to_string(), "Guest1: hi".to_string()]
    );

    relay.shutdown().await;
}

#[tokio::test]
async fn test_rename_then_private_message() {
    let (relay, _) = start().await;
    let router = relay.router();

    let mut alice = connect(relay.local_addr()).await;
    wait_for_clients(&router, 1).await;
    let mut bob = connect(relay.local_addr()).await;
    wait_for_clients(&router, 2).await;

    bob.write_line("!RENAME Bob").await.unwrap();
    assert_eq!(read(&mut bob).await.as_deref(), Some("Your chat name is: Bob"));

    alice.write_line("!PRIVATE Bob just between us").await.unwrap();
    assert_eq!(
        read(&mut bob).await.as_deref(),
        Some("Guest1 (private): just between us")
    );

    let names: Vec<String> = router
        .clients()
        .await
        .unwrap()
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(names, vec!["Guest1", "Bob"]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_exit_directive_disconnects_client() {
    let (relay, recorder) = start().await;
    let router = relay.router();

    let mut alice = connect(relay.local_addr()).await;
    wait_for_clients(&router, 1).await;

    alice.write_line("!EXIT").await.unwrap();

    assert_eq!(read(&mut alice).await.as_deref(), Some(FAREWELL_NOTICE));
    assert_eq!(read(&mut alice).await.as_deref(), Some(EXIT_DIRECTIVE));
    assert_eq!(read(&mut alice).await, None);
    wait_for_clients(&router, 0).await;
    assert_eq!(*recorder.removed.lock(), vec!["Guest1".to_string()]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_invalid_utf8_keeps_session() {
    let (relay, recorder) = start().await;
    let router = relay.router();

    let mut stream = TcpStream::connect(relay.local_addr()).await.unwrap();
    wait_for_clients(&router, 1).await;

    stream.write_all(b"caf\xe9\n").await.unwrap();
    stream.write_all(b"still here\n").await.unwrap();
    let mut alice = Connection::from_tcp(stream, 1024);

    assert_eq!(read(&mut alice).await.as_deref(), Some("Guest1: caf\u{FFFD}"));
    assert_eq!(read(&mut alice).await.as_deref(), Some("Guest1: still here"));
    assert_eq!(router.clients().await.unwrap().len(), 1);
    assert!(recorder.removed.lock().is_empty());

    relay.shutdown().await;
}

#[tokio::test]
async fn test_kicked_client_gets_farewell() {
    let (relay, recorder) = start().await;
    let router = relay.router();

    let mut alice = connect(relay.local_addr()).await;
    wait_for_clients(&router, 1).await;

    router.remove_client_by_name("Guest1").await.unwrap();

    assert_eq!(read(&mut alice).await.as_deref(), Some(FAREWELL_NOTICE));
    assert_eq!(read(&mut alice).await.as_deref(), Some(EXIT_DIRECTIVE));
    assert_eq!(read(&mut alice).await, None);
    wait_for_clients(&router, 0).await;
    assert_eq!(*recorder.removed.lock(), vec!["Guest1".to_string()]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_hangup_leaves_no_orphans() {
    let (relay, recorder) = start().await;
    let router = relay.router();

    let alice = connect(relay.local_addr()).await;
    wait_for_clients(&router, 1).await;
    let _bob = connect(relay.local_addr()).await;
    wait_for_clients(&router, 2).await;

    drop(alice);

    wait_for_clients(&router, 1).await;
    assert_eq!(*recorder.removed.lock(), vec!["Guest1".to_string()]);

    relay.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_twice_closes_everything() {
    let (relay, recorder) = start().await;
    let router = relay.router();
    let addr = relay.local_addr();

    let mut alice = connect(addr).await;
    wait_for_clients(&router, 1).await;
    let mut bob = connect(addr).await;
    wait_for_clients(&router, 2).await;

    relay.shutdown().await;
    relay.shutdown().await;

    for client in [&mut alice, &mut bob] {
        assert_eq!(read(client).await.as_deref(), Some(FAREWELL_NOTICE));
        assert_eq!(read(client).await.as_deref(), Some(EXIT_DIRECTIVE));
        assert_eq!(read(client).await, None);
    }
    assert_eq!(recorder.removed.lock().len(), 2);

    timeout(WAIT, relay.wait())
        .await
        .expect("listener did not stop")
        .unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
    // The router outlives the listener only as long as handles exist
    router.shutdown().await;
}

#[tokio::test]
async fn test_bind_conflict_is_reported() {
    let (relay, _) = start().await;
    let taken = relay.local_addr().port();

    let result = ChatRelay::start(
        ServerConfig::default().with_port(taken),
        Arc::new(Recorder::default()),
    )
    .await;
    assert!(matches!(result, Err(RelayError::Bind { .. })));

    relay.shutdown().await;
}
