//! A single connection to the chat relay.

use parlor_shared::{
    Envelope, Username,
    frame::DEFAULT_MAX_FRAME_LEN,
    message::{EnvelopeError, read_envelope, write_envelope},
};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::mpsc,
};

use crate::error::ClientError;

const INBOUND_QUEUE_CAPACITY: usize = 64;

/// Open a TCP connection to the relay.
pub async fn connect(addr: &str) -> Result<TcpStream, ClientError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| ClientError::ConnectionError(format!("{}: {}", addr, e)))?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// A connection that has joined the room.
pub struct ClientSession<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
}

impl<S> ClientSession<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Send the join request and wait for the room history.
    ///
    /// Returns the session together with the full chat log as replayed by the
    /// server.
    pub async fn join(stream: S, username: &Username) -> Result<(Self, Vec<String>), ClientError> {
        let (mut reader, mut writer) = tokio::io::split(stream);

        write_envelope(
            &mut writer,
            &Envelope::Join {
                name: username.to_string(),
            },
        )
        .await?;

        let history = match read_envelope(&mut reader, DEFAULT_MAX_FRAME_LEN).await? {
            Envelope::StartingState { history } => history,
            other => return Err(ClientError::UnexpectedMessage(other.kind())),
        };
        tracing::info!("Joined as '{}' ({} entries in history)", username, history.len());

        Ok((Self { reader, writer }, history))
    }

    /// Relay chat until the user leaves or the connection is lost.
    ///
    /// Every entry the server pushes is handed to `display`, and each line from
    /// `input` goes out as a chat message. When `input` closes the session sends
    /// a leave notice and returns `Ok(())`. Losing the connection returns a
    /// [`ClientError::ConnectionError`].
    pub async fn run<F>(
        self,
        input: &mut mpsc::UnboundedReceiver<String>,
        mut display: F,
    ) -> Result<(), ClientError>
    where
        F: FnMut(&str),
    {
        let Self { mut reader, mut writer } = self;

        // Reads run on their own task so a partially received frame survives
        // the select below picking the input branch.
        let (inbound_tx, mut inbound_rx) =
            mpsc::channel::<Result<Envelope, EnvelopeError>>(INBOUND_QUEUE_CAPACITY);
        let read_task = tokio::spawn(async move {
            loop {
                let result = read_envelope(&mut reader, DEFAULT_MAX_FRAME_LEN).await;
                let failed = result.is_err();
                if inbound_tx.send(result).await.is_err() || failed {
                    break;
                }
            }
        });

        let result = loop {
            tokio::select! {
                inbound = inbound_rx.recv() => match inbound {
                    Some(Ok(Envelope::NewChat { text })) => display(&text),
                    Some(Ok(other)) => break Err(ClientError::UnexpectedMessage(other.kind())),
                    Some(Err(e)) if e.is_closed() => {
                        tracing::info!("Server closed the connection");
                        break Err(ClientError::ConnectionError("Connection lost".to_string()));
                    }
                    Some(Err(e)) => {
                        tracing::warn!("Read error: {}", e);
                        break Err(e.into());
                    }
                    None => break Err(ClientError::ConnectionError("Connection lost".to_string())),
                },
                line = input.recv() => match line {
                    Some(text) => {
                        if let Err(e) = write_envelope(&mut writer, &Envelope::NewChat { text }).await {
                            tracing::warn!("Failed to send message: {}", e);
                            break Err(e.into());
                        }
                    }
                    None => {
                        if let Err(e) = write_envelope(&mut writer, &Envelope::Leave).await {
                            tracing::debug!("Failed to send leave: {}", e);
                        }
                        writer.shutdown().await.ok();
                        break Ok(());
                    }
                },
            }
        };

        read_task.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};

    async fn expect(server: &mut DuplexStream) -> Envelope {
        read_envelope(server, DEFAULT_MAX_FRAME_LEN)
            .await
            .expect("read from client")
    }

    #[tokio::test]
    async fn test_session_joins_and_displays_history() {
        // テスト項目: 参加要求を送り、受け取った履歴とその後のチャットを表示する
        // given (前提条件):
        let (client, mut server) = duplex(4096);
        let username = Username::parse("alice").unwrap();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel();

        let server_task = tokio::spawn(async move {
            assert_eq!(
                expect(&mut server).await,
                Envelope::Join {
                    name: "alice".to_string()
                }
            );
            write_envelope(
                &mut server,
                &Envelope::StartingState {
                    history: vec!["[t][Server] 'alice' has joined.".to_string()],
                },
            )
            .await
            .unwrap();
            assert_eq!(
                expect(&mut server).await,
                Envelope::NewChat {
                    text: "hello".to_string()
                }
            );
            write_envelope(
                &mut server,
                &Envelope::NewChat {
                    text: "[t][alice] hello".to_string(),
                },
            )
            .await
            .unwrap();
            assert_eq!(expect(&mut server).await, Envelope::Leave);
        });

        // when (操作):
        let (shown_tx, mut shown_rx) = mpsc::unbounded_channel::<String>();
        input_tx.send("hello".to_string()).unwrap();
        let session = tokio::spawn(async move {
            let (session, history) = ClientSession::join(client, &username).await.unwrap();
            for entry in &history {
                shown_tx.send(entry.clone()).unwrap();
            }
            session
                .run(&mut input_rx, |entry| {
                    shown_tx.send(entry.to_string()).unwrap();
                })
                .await
        });
        let first = shown_rx.recv().await.unwrap();
        let second = shown_rx.recv().await.unwrap();
        drop(input_tx);

        // then (期待する結果):
        assert_eq!(first, "[t][Server] 'alice' has joined.");
        assert_eq!(second, "[t][alice] hello");
        assert!(session.await.unwrap().is_ok());
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_server_close_is_connection_error() {
        // テスト項目: サーバーが接続を閉じた場合、再接続対象のエラーになる
        // given (前提条件):
        let (client, mut server) = duplex(4096);
        let username = Username::parse("bob").unwrap();
        let (_input_tx, mut input_rx) = mpsc::unbounded_channel();

        let server_task = tokio::spawn(async move {
            expect(&mut server).await;
            write_envelope(&mut server, &Envelope::StartingState { history: vec![] })
                .await
                .unwrap();
            drop(server);
        });

        // when (操作):
        let (session, history) = ClientSession::join(client, &username).await.unwrap();
        let result = session.run(&mut input_rx, |_| {}).await;

        // then (期待する結果):
        assert!(history.is_empty());
        assert!(matches!(result, Err(ClientError::ConnectionError(_))));
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unexpected_reply_to_join() {
        // テスト項目: 参加要求への応答が starting-state 以外ならプロトコルエラーになる
        // given (前提条件):
        let (client, mut server) = duplex(4096);
        let username = Username::parse("carol").unwrap();

        let server_task = tokio::spawn(async move {
            expect(&mut server).await;
            write_envelope(&mut server, &Envelope::Leave).await.unwrap();
        });

        // when (操作):
        let result = ClientSession::join(client, &username).await.map(|_| ());

        // then (期待する結果):
        assert!(matches!(result, Err(ClientError::UnexpectedMessage("leave"))));
        server_task.await.unwrap();
    }
}
