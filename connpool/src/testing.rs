//! Scripted connector for driving the pool without a network.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::time::Instant;

use crate::connector::Connector;
use crate::pool::ConnectionPool;

const DUPLEX_BUFFER: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Connect after `latency`, handing the far end to the test.
    Accept { latency: Duration },
    Refuse,
    /// Never complete.
    Hang,
    /// Fail in `allocate`, before any attempt starts.
    AllocFail,
}

impl Script {
    pub fn accept() -> Self {
        Self::Accept {
            latency: Duration::ZERO,
        }
    }

    pub fn accept_after(ms: u64) -> Self {
        Self::Accept {
            latency: Duration::from_millis(ms),
        }
    }
}

struct ScriptState {
    queued: VecDeque<Script>,
    fallback: Script,
    attempts: Vec<Instant>,
    peers: VecDeque<DuplexStream>,
}

/// Plays queued outcomes in order, then repeats `fallback`.
#[derive(Clone)]
pub(crate) struct ScriptedConnector {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedConnector {
    pub fn new(fallback: Script) -> Self {
        Self {
            state: Rc::new(RefCell::new(ScriptState {
                queued: VecDeque::new(),
                fallback,
                attempts: Vec::new(),
                peers: VecDeque::new(),
            })),
        }
    }

    pub fn push(&self, script: Script) {
        self.state.borrow_mut().queued.push_back(script);
    }

    /// Connect attempts that reached the `connect` phase.
    pub fn attempts(&self) -> usize {
        self.state.borrow().attempts.len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.borrow().attempts.clone()
    }

    /// Far end of the oldest accepted connection not yet taken.
    pub fn next_peer(&self) -> Option<DuplexStream> {
        self.state.borrow_mut().peers.pop_front()
    }
}

#[async_trait(?Send)]
impl Connector for ScriptedConnector {
    type Socket = ();
    type Stream = DuplexStream;

    fn allocate(&self, _addr: SocketAddr) -> io::Result<()> {
        let mut state = self.state.borrow_mut();
        if matches!(state.queued.front(), Some(Script::AllocFail)) {
            state.queued.pop_front();
            return Err(io::Error::other("too many open files"));
        }
        Ok(())
    }

    async fn connect(&self, _socket: (), _addr: SocketAddr) -> io::Result<DuplexStream> {
        let script = {
            let mut state = self.state.borrow_mut();
            state.attempts.push(Instant::now());
            let fallback = state.fallback;
            state.queued.pop_front().unwrap_or(fallback)
        };

        match script {
            Script::Accept { latency } => {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                let (ours, theirs) = tokio::io::duplex(DUPLEX_BUFFER);
                self.state.borrow_mut().peers.push_back(theirs);
                Ok(ours)
            }
            Script::Refuse | Script::AllocFail => {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused))
            }
            Script::Hang => std::future::pending().await,
        }
    }
}

/// Let spawned local tasks run without advancing the clock.
pub(crate) async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Slot context that reads pool state when dropped.
pub(crate) struct StatsOnDrop {
    pub pool: ConnectionPool<ScriptedConnector>,
    /// `in_use` as seen from inside the drop.
    pub seen: Rc<Cell<Option<usize>>>,
}

impl Drop for StatsOnDrop {
    fn drop(&mut self) {
        self.seen.set(Some(self.pool.stats().in_use));
    }
}
