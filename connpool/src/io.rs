//! I/O façade - asynchronous operations bound to a slot.
//!
//! Each operation validates only that the slot is present, then runs on its
//! own local task and reports through a single-shot callback. Slot state is
//! not checked: I/O on a slot that is still connecting completes with
//! `NotConnected`. Closing a slot cancels its pending operations, which
//! complete with `ConnectionAborted`.

use std::io;
use std::rc::Rc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_util::bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::connector::Connector;
use crate::error::{PoolError, Result};
use crate::pool::ConnectionPool;
use crate::slot::{SlotContext, SlotId, SlotInfo};

/// Buffer size handed to each read.
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Completion of a single read.
#[derive(Debug)]
pub enum ReadEvent {
    /// Bytes read. The buffer belongs to the callback.
    Data(BytesMut),
    /// The peer closed its write side.
    Eof,
    Failed(io::Error),
}

/// A slot's connected stream, split so reads and writes can be in flight together.
///
/// Writes (and shutdown) queue on the writer lock in submission order.
pub(crate) struct Transport<S> {
    reader: Rc<Mutex<ReadHalf<S>>>,
    writer: Rc<Mutex<WriteHalf<S>>>,
    closed: CancellationToken,
}

impl<S: AsyncRead + AsyncWrite> Transport<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: Rc::new(Mutex::new(reader)),
            writer: Rc::new(Mutex::new(writer)),
            closed: CancellationToken::new(),
        }
    }
}

impl<S> Drop for Transport<S> {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

type ReaderHandle<S> = (Rc<Mutex<ReadHalf<S>>>, CancellationToken);
type WriterHandle<S> = (Rc<Mutex<WriteHalf<S>>>, CancellationToken);

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "slot is still connecting")
}

fn aborted() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "slot closed")
}

impl<C: Connector> ConnectionPool<C> {
    /// Read once from the slot's connection.
    pub fn read_socket<F>(&self, id: SlotId, callback: F) -> Result<()>
    where
        F: FnOnce(ReadEvent) + 'static,
    {
        let Some((reader, closed)) = self.reader(id)? else {
            tokio::task::spawn_local(async move { callback(ReadEvent::Failed(not_connected())) });
            return Ok(());
        };

        tokio::task::spawn_local(async move {
            let read = async move {
                let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
                let n = reader.lock().await.read_buf(&mut buf).await?;
                Ok::<_, io::Error>((n, buf))
            };

            let event = tokio::select! {
                _ = closed.cancelled() => ReadEvent::Failed(aborted()),
                result = read => match result {
                    Ok((0, _)) => ReadEvent::Eof,
                    Ok((_, buf)) => ReadEvent::Data(buf),
                    Err(e) => ReadEvent::Failed(e),
                },
            };

            trace!(slot = %id, ?event, "Read completed");
            callback(event);
        });
        Ok(())
    }

    /// Write all of `data` to the slot's connection.
    ///
    /// `data` is copied before this returns.
    pub fn write_socket<F>(&self, id: SlotId, data: &[u8], callback: F) -> Result<()>
    where
        F: FnOnce(io::Result<()>) + 'static,
    {
        let handle = self.writer(id)?;

        let mut payload = Vec::new();
        payload
            .try_reserve_exact(data.len())
            .map_err(|_| PoolError::NoMemory)?;
        payload.extend_from_slice(data);

        let Some((writer, closed)) = handle else {
            tokio::task::spawn_local(async move { callback(Err(not_connected())) });
            return Ok(());
        };

        tokio::task::spawn_local(async move {
            let write = async move {
                let mut writer = writer.lock().await;
                writer.write_all(&payload).await?;
                writer.flush().await
            };

            let result = tokio::select! {
                _ = closed.cancelled() => Err(aborted()),
                result = write => result,
            };

            trace!(slot = %id, ok = result.is_ok(), "Write completed");
            callback(result);
        });
        Ok(())
    }

    /// Half-close: shut down the write side of the slot's connection.
    pub fn shutdown_socket<F>(&self, id: SlotId, callback: F) -> Result<()>
    where
        F: FnOnce(io::Result<()>) + 'static,
    {
        let Some((writer, closed)) = self.writer(id)? else {
            tokio::task::spawn_local(async move { callback(Err(not_connected())) });
            return Ok(());
        };

        tokio::task::spawn_local(async move {
            let shutdown = async move { writer.lock().await.shutdown().await };

            let result = tokio::select! {
                _ = closed.cancelled() => Err(aborted()),
                result = shutdown => result,
            };

            debug!(slot = %id, ok = result.is_ok(), "Shutdown completed");
            callback(result);
        });
        Ok(())
    }

    /// Release the slot's connection and free its index.
    ///
    /// The id is invalid afterwards until a new connect attempt reuses the
    /// index. `callback` runs on the reactor once the slot is gone.
    pub fn close_socket<F>(&self, id: SlotId, callback: F) -> Result<()>
    where
        F: FnOnce() + 'static,
    {
        let slot = self
            .shared
            .state
            .borrow_mut()
            .slots
            .remove(id)
            .ok_or(PoolError::SocketNotExist(id))?;

        info!(slot = %id, state = slot.state.as_str(), "Closing slot");
        drop(slot);

        tokio::task::spawn_local(async move { callback() });
        Ok(())
    }

    /// Attach `ctx` to the slot, replacing any earlier context.
    pub fn attach_ctx(&self, id: SlotId, ctx: SlotContext) -> Result<()> {
        let previous = self.shared.state.borrow_mut().slots.get_mut(id)?.ctx.replace(ctx);
        // Released with no pool borrow held.
        drop(previous);
        Ok(())
    }

    /// Clear the slot's context, returning what was attached.
    pub fn detach_ctx(&self, id: SlotId) -> Result<Option<SlotContext>> {
        Ok(self.shared.state.borrow_mut().slots.get_mut(id)?.ctx.take())
    }

    pub fn slot_info(&self, id: SlotId) -> Option<SlotInfo> {
        self.shared.state.borrow().slots.info(id)
    }

    fn reader(&self, id: SlotId) -> Result<Option<ReaderHandle<C::Stream>>> {
        let state = self.shared.state.borrow();
        let slot = state.slots.get(id)?;
        Ok(slot
            .transport
            .as_ref()
            .map(|t| (Rc::clone(&t.reader), t.closed.clone())))
    }

    fn writer(&self, id: SlotId) -> Result<Option<WriterHandle<C::Stream>>> {
        let state = self.shared.state.borrow();
        let slot = state.slots.get(id)?;
        Ok(slot
            .transport
            .as_ref()
            .map(|t| (Rc::clone(&t.writer), t.closed.clone())))
    }
}
