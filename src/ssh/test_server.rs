//! In-process SSH server used by session and tunnel tests.
//!
//! The server accepts a single connection, authenticates with a fixed
//! password or [`PUBLIC_KEY`], answers every `exec` with the configured
//! remote `DOCKER_HOST` and echoes whatever is written to forwarded
//! channels.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use russh::keys::PublicKey;
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use super::test_keys::{PLAIN_PRIVATE_KEY, PUBLIC_KEY};

/// Password the server accepts.
pub(super) const PASSWORD: &str = "hunter2";

/// What the server saw from its client.
#[derive(Debug, Default)]
pub(super) struct Observed {
    pub(super) commands: Vec<String>,
    pub(super) streamlocal_paths: Vec<String>,
    pub(super) tcpip_targets: Vec<(String, u32)>,
}

/// A running server and the means to inspect it.
pub(super) struct TestServer {
    pub(super) addr: SocketAddr,
    pub(super) observed: Arc<Mutex<Observed>>,
    pub(super) finished: oneshot::Receiver<()>,
}

impl TestServer {
    /// Start a server whose shell reports `remote_docker_host`.
    pub(super) async fn start(remote_docker_host: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test ssh server");
        let addr = listener.local_addr().expect("test ssh server address");
        let observed = Arc::new(Mutex::new(Observed::default()));
        let handler = ServerHandler {
            authorized: PublicKey::from_openssh(PUBLIC_KEY).expect("valid test key"),
            remote_docker_host: remote_docker_host.to_owned(),
            observed: Arc::clone(&observed),
        };
        let config = Arc::new(server::Config {
            auth_rejection_time: Duration::ZERO,
            auth_rejection_time_initial: Some(Duration::ZERO),
            keys: vec![
                russh::keys::decode_secret_key(PLAIN_PRIVATE_KEY, None).expect("host key"),
            ],
            ..server::Config::default()
        });

        let (done, finished) = oneshot::channel();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept ssh client");
            if let Ok(running) = server::run_stream(config, socket, handler).await {
                let _ended = running.await;
            }
            let _sent = done.send(());
        });

        Self {
            addr,
            observed,
            finished,
        }
    }

    /// `ssh://` URL reaching this server with the accepted password.
    pub(super) fn url_with_password(&self) -> String {
        format!("ssh://dev:{PASSWORD}@{}:{}", self.addr.ip(), self.addr.port())
    }

    /// `ssh://` URL reaching this server without credentials.
    pub(super) fn url(&self) -> String {
        format!("ssh://dev@{}:{}", self.addr.ip(), self.addr.port())
    }

    /// Snapshot of the client requests seen so far.
    pub(super) fn observed(&self) -> std::sync::MutexGuard<'_, Observed> {
        self.observed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct ServerHandler {
    authorized: PublicKey,
    remote_docker_host: String,
    observed: Arc<Mutex<Observed>>,
}

impl ServerHandler {
    fn record(&self, update: impl FnOnce(&mut Observed)) {
        update(&mut self.observed.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

async fn echo(channel: Channel<Msg>) {
    let (mut reader, mut writer) = tokio::io::split(channel.into_stream());
    let _copied = tokio::io::copy(&mut reader, &mut writer).await;
}

impl server::Handler for ServerHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, _user: &str, password: &str) -> Result<Auth, Self::Error> {
        Ok(if password == PASSWORD {
            Auth::Accept
        } else {
            Auth::reject()
        })
    }

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(if public_key.key_data() == self.authorized.key_data() {
            Auth::Accept
        } else {
            Auth::reject()
        })
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        self.record(|seen| seen.commands.push(command));
        session.channel_success(channel)?;
        session.data(
            channel,
            CryptoVec::from(format!("{}\n", self.remote_docker_host)),
        )?;
        session.exit_status_request(channel, 0)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }

    async fn channel_open_direct_streamlocal(
        &mut self,
        channel: Channel<Msg>,
        socket_path: &str,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let path = socket_path.to_owned();
        self.record(|seen| seen.streamlocal_paths.push(path));
        tokio::spawn(echo(channel));
        Ok(true)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let target = (host_to_connect.to_owned(), port_to_connect);
        self.record(|seen| seen.tcpip_targets.push(target));
        tokio::spawn(echo(channel));
        Ok(true)
    }
}
