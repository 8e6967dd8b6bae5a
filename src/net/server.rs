use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;

use crate::facade::ShardedStore;
use crate::types::Value;

use super::{
    DEFAULT_PORT, MAX_MESSAGE_BYTES, OP_GET, OP_GET_PREFIX, OP_SET, OP_STAT, STATUS_BAD_FRAME,
    STATUS_INTERNAL, STATUS_INVALID_ARGUMENT, STATUS_OK, STREAM_END, STREAM_PAIR,
};

/// Capacity of the channel between the blocking scan drain and the
/// response writer; matches the store-side scan channel so a slow client
/// backpressures all the way into the shard workers.
const PREFIX_FORWARD_CAPACITY: usize = 100;

#[derive(Clone, Debug)]
pub struct RemoteServerConfig {
    pub bind_address: SocketAddr,
    pub max_connections: usize,
}

impl Default for RemoteServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 1024,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid server configuration: {0}")]
    InvalidConfig(String),
}

/// TCP front-end exposing the store over the binary protocol.
pub struct RemoteStoreServer {
    bind_address: SocketAddr,
    max_connections: usize,
    store: ShardedStore,
}

impl RemoteStoreServer {
    pub fn new(store: ShardedStore, config: RemoteServerConfig) -> Result<Self, ServerError> {
        if config.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be greater than zero".into(),
            ));
        }
        Ok(Self {
            bind_address: config.bind_address,
            max_connections: config.max_connections,
            store,
        })
    }

    /// Binds the configured address and returns the listener, so callers
    /// (and tests) can learn the actual port before serving.
    pub async fn bind_listener(&self) -> Result<TcpListener, ServerError> {
        Ok(TcpListener::bind(self.bind_address).await?)
    }

    /// Accepts connections until `shutdown` resolves.
    pub async fn run_until_shutdown<F>(&self, shutdown: F) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = self.bind_listener().await?;
        self.run_until_shutdown_with_listener(listener, shutdown)
            .await
    }

    pub async fn run_until_shutdown_with_listener<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!(address = %listener.local_addr()?, "key-value server listening");

        let semaphore = Arc::new(Semaphore::new(self.max_connections));
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received; stopping server");
                    break;
                }
                accept_res = listener.accept() => {
                    let (socket, peer_addr) = match accept_res {
                        Ok(inner) => inner,
                        Err(err) => {
                            tracing::error!(?err, "failed to accept incoming connection");
                            continue;
                        }
                    };

                    let permit = match semaphore.clone().try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            tracing::warn!(?peer_addr, "maximum concurrent clients reached; dropping connection");
                            drop(socket);
                            continue;
                        }
                    };

                    let store = self.store.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        tracing::debug!(?peer_addr, "client connected");
                        if let Err(err) = serve_connection(store, socket).await {
                            tracing::debug!(?peer_addr, ?err, "connection terminated");
                        }
                        tracing::debug!(?peer_addr, "client disconnected");
                    });
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection(store: ShardedStore, socket: TcpStream) -> std::io::Result<()> {
    socket.set_nodelay(true).ok();
    let (read_half, write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    loop {
        let mut opcode = [0u8; 1];
        match reader.read_exact(&mut opcode).await {
            Ok(_) => {}
            // Clean end of the request stream.
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err),
        }

        match opcode[0] {
            OP_SET => handle_set(&store, &mut reader, &mut writer).await?,
            OP_GET => handle_get(&store, &mut reader, &mut writer).await?,
            OP_GET_PREFIX => handle_get_prefix(&store, &mut reader, &mut writer).await?,
            OP_STAT => handle_stat(&store, &mut writer).await?,
            other => {
                tracing::warn!(opcode = other, "unknown opcode; closing connection");
                writer.write_all(&[STATUS_BAD_FRAME]).await?;
                writer.flush().await?;
                return Ok(());
            }
        }
    }
}

async fn handle_set<R, W>(
    store: &ShardedStore,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let key_bytes = read_short_field(reader).await?;

    let value_len = reader.read_u32().await? as usize;
    if value_len > MAX_MESSAGE_BYTES {
        tracing::warn!(value_len, "set value exceeds the message cap");
        writer.write_all(&[STATUS_BAD_FRAME]).await?;
        writer.flush().await?;
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "value exceeds message cap",
        ));
    }
    let mut value = vec![0u8; value_len];
    reader.read_exact(&mut value).await?;

    let Ok(key) = String::from_utf8(key_bytes) else {
        writer.write_all(&[STATUS_INVALID_ARGUMENT]).await?;
        return writer.flush().await;
    };

    let store = store.clone();
    let status = match spawn_blocking(move || store.set(&key, Value::from(value))).await {
        Ok(Ok(())) => STATUS_OK,
        Ok(Err(err)) if err.is_invalid_argument() => {
            tracing::debug!(%err, "rejected set");
            STATUS_INVALID_ARGUMENT
        }
        Ok(Err(err)) => {
            tracing::error!(?err, "set failed");
            STATUS_INTERNAL
        }
        Err(join_err) => {
            tracing::error!(?join_err, "blocking set panicked");
            STATUS_INTERNAL
        }
    };

    writer.write_all(&[status]).await?;
    writer.flush().await
}

async fn handle_get<R, W>(
    store: &ShardedStore,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let key_bytes = read_short_field(reader).await?;
    let Ok(key) = String::from_utf8(key_bytes) else {
        writer.write_all(&[STATUS_INVALID_ARGUMENT]).await?;
        return writer.flush().await;
    };

    let store = store.clone();
    match spawn_blocking(move || store.get(&key)).await {
        Ok(Some(value)) => {
            writer.write_all(&[STATUS_OK, 1]).await?;
            writer.write_u32(value.len() as u32).await?;
            writer.write_all(value.as_slice()).await?;
        }
        Ok(None) => {
            writer.write_all(&[STATUS_OK, 0]).await?;
        }
        Err(join_err) => {
            tracing::error!(?join_err, "blocking get panicked");
            writer.write_all(&[STATUS_INTERNAL]).await?;
        }
    }
    writer.flush().await
}

async fn handle_get_prefix<R, W>(
    store: &ShardedStore,
    reader: &mut R,
    writer: &mut W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let prefix_bytes = read_short_field(reader).await?;
    let Ok(prefix) = String::from_utf8(prefix_bytes) else {
        writer.write_all(&[STATUS_INVALID_ARGUMENT]).await?;
        return writer.flush().await;
    };

    tracing::debug!(%prefix, "running full prefix scan");

    let (tx, mut rx) = mpsc::channel::<(String, Value)>(PREFIX_FORWARD_CAPACITY);
    let scan_store = store.clone();
    spawn_blocking(move || {
        for pair in scan_store.scan_prefix(&prefix) {
            // A failed send means the client went away; dropping the scan
            // iterator stops the shard workers.
            if tx.blocking_send(pair).is_err() {
                break;
            }
        }
    });

    writer.write_all(&[STATUS_OK]).await?;
    let mut count = 0u64;
    while let Some((key, value)) = rx.recv().await {
        writer.write_all(&[STREAM_PAIR]).await?;
        writer.write_u16(key.len() as u16).await?;
        writer.write_all(key.as_bytes()).await?;
        writer.write_u32(value.len() as u32).await?;
        writer.write_all(value.as_slice()).await?;
        count += 1;
    }
    writer.write_all(&[STREAM_END]).await?;
    writer.flush().await?;

    tracing::debug!(matches = count, "prefix scan streamed");
    Ok(())
}

async fn handle_stat<W>(store: &ShardedStore, writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let stats = store.stats();
    writer.write_all(&[STATUS_OK]).await?;
    writer.write_u64(stats.total_keys).await?;
    writer.write_u64(stats.total_size_bytes).await?;
    writer.write_u64(stats.set_ops).await?;
    writer.write_u64(stats.get_ops).await?;
    writer.write_u64(stats.prefix_ops).await?;
    writer.flush().await
}

async fn read_short_field<R>(reader: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await? as usize;
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}
