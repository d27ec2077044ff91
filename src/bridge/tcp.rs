//! Socket binding of the control protocol.
//!
//! [`TcpBridge`] connects to the control port served by the bridge helper and
//! speaks the frame protocol from [`super::wire`]. It does no timing of its
//! own; the resolver bounds every attempt, handshake included. One connection carries one
//! strictly sequential request/reply conversation; the only multi-frame reply
//! is `store`, whose exported bytes arrive as `write` frames before the final
//! `ok`/`error`.

use super::wire::{read_frame, write_frame, Reply, Request, WireError};
use super::{
    ConnectFailure, ControlSession, Document, EngineBridge, Endpoint, InputStreamHandle,
    LoadOptions, ObjectId, OutputStream,
};
use crate::error::ConvertError;
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::net::TcpStream;
use tracing::debug;

/// Connects to an engine control socket.
#[derive(Debug, Clone)]
pub struct TcpBridge {
    client_name: String,
}

impl Default for TcpBridge {
    fn default() -> Self {
        Self {
            client_name: concat!("oowrap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl TcpBridge {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
        }
    }
}

#[async_trait]
impl EngineBridge for TcpBridge {
    type Session = TcpSession;

    async fn connect(&self, endpoint: &Endpoint) -> Result<TcpSession, ConnectFailure> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::ConnectionRefused => ConnectFailure::NoListener(e),
                _ => ConnectFailure::Fatal(format!("connect to {endpoint}: {e}")),
            })?;
        stream.set_nodelay(true).ok();

        let mut session = TcpSession {
            stream,
            engine: String::new(),
        };
        let hello = Request::Hello {
            client: self.client_name.clone(),
        };
        match session.call(&hello).await {
            Ok(Reply::Welcome { engine }) => {
                debug!("Control session established with {engine} at {endpoint}");
                session.engine = engine;
                Ok(session)
            }
            Ok(other) => Err(ConnectFailure::Fatal(format!(
                "unexpected handshake reply: {other:?}"
            ))),
            Err(e) => Err(ConnectFailure::Fatal(format!("handshake failed: {e}"))),
        }
    }
}

/// One established control connection.
#[derive(Debug)]
pub struct TcpSession {
    stream: TcpStream,
    engine: String,
}

impl TcpSession {
    /// Engine identification from the handshake.
    pub fn engine(&self) -> &str {
        &self.engine
    }

    async fn send(&mut self, request: &Request) -> Result<(), ConvertError> {
        write_frame(&mut self.stream, request)
            .await
            .map_err(wire_error)
    }

    async fn recv(&mut self) -> Result<Reply, ConvertError> {
        read_frame(&mut self.stream).await.map_err(wire_error)
    }

    /// Send `request` and read its reply. An `error` reply becomes
    /// [`ConvertError::Engine`].
    async fn call(&mut self, request: &Request) -> Result<Reply, ConvertError> {
        self.send(request).await?;
        match self.recv().await? {
            Reply::Error { message } => Err(ConvertError::Engine { message }),
            reply => Ok(reply),
        }
    }

    async fn call_ok(&mut self, request: &Request) -> Result<(), ConvertError> {
        match self.call(request).await? {
            Reply::Ok => Ok(()),
            other => Err(unexpected(request, &other)),
        }
    }
}

#[async_trait]
impl ControlSession for TcpSession {
    async fn create_input_stream(
        &mut self,
        data: Vec<u8>,
    ) -> Result<InputStreamHandle, ConvertError> {
        let request = Request::CreateInputStream { data };
        match self.call(&request).await? {
            Reply::Handle { id } => Ok(InputStreamHandle(ObjectId(id))),
            other => Err(unexpected(&request, &other)),
        }
    }

    async fn load(
        &mut self,
        input: InputStreamHandle,
        options: LoadOptions,
    ) -> Result<Document, ConvertError> {
        let request = Request::Load {
            input: input.0 .0,
            hidden: options.hidden,
            read_only: options.read_only,
            as_template: options.as_template,
            interactive: options.interactive,
        };
        match self.call(&request).await? {
            Reply::Document { id, variant } => Ok(Document::new(variant, ObjectId(id))),
            other => Err(unexpected(&request, &other)),
        }
    }

    async fn refresh(&mut self, document: &Document) -> Result<(), ConvertError> {
        self.call_ok(&Request::Refresh {
            document: document.id().0,
        })
        .await
    }

    async fn store(
        &mut self,
        document: &Document,
        filter: &str,
        sink: &mut dyn OutputStream,
    ) -> Result<(), ConvertError> {
        self.send(&Request::Store {
            document: document.id().0,
            filter: filter.to_string(),
        })
        .await?;

        // A failing sink must not desync the conversation: keep draining
        // frames until the engine finishes, then report the sink error.
        let mut sink_error: Option<std::io::Error> = None;
        loop {
            let reply = self.recv().await?;
            let step = match reply {
                Reply::Write { data } => sink.write_bytes(&data),
                Reply::Flush => sink.flush(),
                Reply::CloseOutput => sink.close_output(),
                Reply::Ok => break,
                Reply::Error { message } => {
                    return Err(match sink_error {
                        Some(source) => ConvertError::OutputWrite { source },
                        None => ConvertError::Engine { message },
                    });
                }
                other => {
                    return Err(ConvertError::protocol(format!(
                        "unexpected reply during store: {other:?}"
                    )))
                }
            };
            if let Err(e) = step {
                if sink_error.is_none() {
                    debug!("Output sink failed, draining remaining export frames: {e}");
                    sink_error = Some(e);
                }
            }
        }

        match sink_error {
            Some(source) => Err(ConvertError::OutputWrite { source }),
            None => Ok(()),
        }
    }

    async fn close(&mut self, document: Document) -> Result<(), ConvertError> {
        self.call_ok(&Request::Close {
            document: document.id().0,
        })
        .await
    }

    async fn terminate(&mut self) -> Result<(), ConvertError> {
        self.call_ok(&Request::Terminate).await
    }
}

fn wire_error(e: WireError) -> ConvertError {
    ConvertError::protocol(e.to_string())
}

fn unexpected(request: &Request, reply: &Reply) -> ConvertError {
    let op = match request {
        Request::Hello { .. } => "hello",
        Request::CreateInputStream { .. } => "create_input_stream",
        Request::Load { .. } => "load",
        Request::Refresh { .. } => "refresh",
        Request::Store { .. } => "store",
        Request::Close { .. } => "close",
        Request::Terminate => "terminate",
    };
    ConvertError::protocol(format!("unexpected reply to {op}: {reply:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::DocumentKind;
    use crate::pipeline::sink::{OutputSink, SharedBuffer};
    use tokio::net::TcpListener;

    /// A scripted in-process engine: answers each request with the replies
    /// produced by `script`, until the client hangs up.
    async fn fake_engine<F>(script: F) -> (u16, tokio::task::JoinHandle<Vec<Request>>)
    where
        F: Fn(&Request) -> Vec<Reply> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut seen = Vec::new();
            while let Ok(request) = read_frame::<_, Request>(&mut socket).await {
                for reply in script(&request) {
                    write_frame(&mut socket, &reply).await.unwrap();
                }
                seen.push(request);
            }
            seen
        });
        (port, handle)
    }

    fn happy_engine(request: &Request) -> Vec<Reply> {
        match request {
            Request::Hello { .. } => vec![Reply::Welcome {
                engine: "FakeOffice 1.0".into(),
            }],
            Request::CreateInputStream { .. } => vec![Reply::Handle { id: 1 }],
            Request::Load { .. } => vec![Reply::Document {
                id: 2,
                variant: DocumentKind::Text,
            }],
            Request::Store { .. } => vec![
                Reply::Write {
                    data: b"%PDF-1.7\n".to_vec(),
                },
                Reply::Write {
                    data: b"%%EOF\n".to_vec(),
                },
                Reply::Flush,
                Reply::CloseOutput,
                Reply::Ok,
            ],
            _ => vec![Reply::Ok],
        }
    }

    #[tokio::test]
    async fn full_exchange_against_fake_engine() {
        let (port, server) = fake_engine(happy_engine).await;
        let bridge = TcpBridge::default();
        let mut session = bridge
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap();
        assert_eq!(session.engine(), "FakeOffice 1.0");

        let input = session.create_input_stream(b"hello".to_vec()).await.unwrap();
        let doc = session.load(input, LoadOptions::hidden()).await.unwrap();
        assert_eq!(doc.kind(), DocumentKind::Text);
        session.refresh(&doc).await.unwrap();

        let buffer = SharedBuffer::default();
        let mut sink = OutputSink::new(buffer.clone());
        session
            .store(&doc, "writer_pdf_Export", &mut sink)
            .await
            .unwrap();
        assert!(sink.is_closed());
        assert_eq!(buffer.contents(), b"%PDF-1.7\n%%EOF\n");

        session.close(doc).await.unwrap();
        session.terminate().await.unwrap();
        drop(session);

        let seen = server.await.unwrap();
        assert!(matches!(seen[0], Request::Hello { .. }));
        assert_eq!(
            seen[1],
            Request::CreateInputStream {
                data: b"hello".to_vec()
            }
        );
        assert!(matches!(
            seen[2],
            Request::Load {
                input: 1,
                hidden: true,
                interactive: false,
                ..
            }
        ));
        assert_eq!(seen.last(), Some(&Request::Terminate));
    }

    #[tokio::test]
    async fn engine_error_is_verbatim() {
        let (port, _server) = fake_engine(|req| match req {
            Request::Hello { .. } => vec![Reply::Welcome {
                engine: "FakeOffice".into(),
            }],
            _ => vec![Reply::Error {
                message: "General input/output error".into(),
            }],
        })
        .await;
        let mut session = TcpBridge::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap();
        let err = session.create_input_stream(Vec::new()).await.unwrap_err();
        match err {
            ConvertError::Engine { message } => assert_eq!(message, "General input/output error"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct FailingSink {
        writes: usize,
    }

    impl OutputStream for FailingSink {
        fn write_bytes(&mut self, _data: &[u8]) -> std::io::Result<()> {
            self.writes += 1;
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "reader went away"))
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn close_output(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn sink_failure_drains_and_keeps_session_usable() {
        let (port, server) = fake_engine(happy_engine).await;
        let mut session = TcpBridge::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
            .unwrap();
        let doc = Document::new(DocumentKind::Text, ObjectId(2));

        let mut sink = FailingSink { writes: 0 };
        let err = session.store(&doc, "Text (encoded)", &mut sink).await.unwrap_err();
        assert!(matches!(err, ConvertError::OutputWrite { .. }), "got: {err:?}");
        assert_eq!(sink.writes, 2);

        // The conversation is still in step: close gets its own `ok`.
        session.close(doc).await.unwrap();
        drop(session);
        assert!(matches!(
            server.await.unwrap().last(),
            Some(Request::Close { document: 2 })
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_no_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        match TcpBridge::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
        {
            Err(ConnectFailure::NoListener(_)) => {}
            Err(other) => panic!("expected NoListener, got {other}"),
            Ok(_) => panic!("nothing should be listening on port {port}"),
        }
    }

    #[tokio::test]
    async fn bad_handshake_is_fatal() {
        let (port, _server) = fake_engine(|_| vec![Reply::Ok]).await;
        match TcpBridge::default()
            .connect(&Endpoint::new("127.0.0.1", port))
            .await
        {
            Err(ConnectFailure::Fatal(detail)) => assert!(detail.contains("handshake")),
            Err(other) => panic!("expected Fatal, got {other}"),
            Ok(_) => panic!("handshake should have failed"),
        }
    }
}
