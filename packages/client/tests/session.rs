//! Client sessions against a running relay.

use std::time::Duration;

use parlor_client::{
    ClientError,
    session::{ClientSession, connect},
};
use parlor_server::{Server, ServerConfig};
use parlor_shared::Username;
use tokio::{net::TcpStream, sync::mpsc, time::timeout};

const WAIT: Duration = Duration::from_secs(3);

/// Join as `name`, then forward history and live entries to `shown`.
async fn run_session(
    stream: TcpStream,
    name: &str,
    input: &mut mpsc::UnboundedReceiver<String>,
    shown: mpsc::UnboundedSender<String>,
) -> Result<(), ClientError> {
    let name = Username::parse(name).unwrap();
    let (session, history) = ClientSession::join(stream, &name).await?;
    for entry in history {
        shown.send(entry).ok();
    }
    session
        .run(input, |entry| {
            shown.send(entry.to_string()).ok();
        })
        .await
}

#[tokio::test]
async fn test_two_clients_see_each_other() {
    // テスト項目: 2 つのクライアントが互いのチャットを受信し、退出通知も届く
    // given (前提条件):
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let server_task = tokio::spawn(server.run_until(std::future::pending::<()>()));

    let (alice_in, mut alice_rx) = mpsc::unbounded_channel::<String>();
    let (alice_shown_tx, mut alice_shown) = mpsc::unbounded_channel::<String>();
    let alice_stream = connect(&addr).await.unwrap();
    let alice = tokio::spawn(async move {
        run_session(alice_stream, "alice", &mut alice_rx, alice_shown_tx).await
    });
    let joined = timeout(WAIT, alice_shown.recv()).await.unwrap().unwrap();
    assert!(joined.ends_with("[Server] 'alice' has joined."));

    let (bob_in, mut bob_rx) = mpsc::unbounded_channel::<String>();
    let (bob_shown_tx, mut bob_shown) = mpsc::unbounded_channel::<String>();
    let bob_stream = connect(&addr).await.unwrap();
    let bob = tokio::spawn(async move {
        run_session(bob_stream, "bob", &mut bob_rx, bob_shown_tx).await
    });
    for expected in ["'alice' has joined.", "'bob' has joined."] {
        let entry = timeout(WAIT, bob_shown.recv()).await.unwrap().unwrap();
        assert!(entry.ends_with(expected), "{entry}");
    }
    let entry = timeout(WAIT, alice_shown.recv()).await.unwrap().unwrap();
    assert!(entry.ends_with("'bob' has joined."), "{entry}");

    // when (操作):
    bob_in.send("hi alice".to_string()).unwrap();
    drop(bob_in);

    // then (期待する結果):
    assert!(timeout(WAIT, bob).await.unwrap().unwrap().is_ok());
    let chat = timeout(WAIT, alice_shown.recv()).await.unwrap().unwrap();
    assert!(chat.ends_with("[bob] hi alice"), "{chat}");
    let left = timeout(WAIT, alice_shown.recv()).await.unwrap().unwrap();
    assert!(left.ends_with("[Server] 'bob' has left."), "{left}");

    drop(alice_in);
    assert!(timeout(WAIT, alice).await.unwrap().unwrap().is_ok());
    server_task.abort();
}
