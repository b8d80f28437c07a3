use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::bail;
use hyper::Uri;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::requester::ClientFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// No idle client right now. Transient: every lease is eventually returned.
    #[error("no idle client available")]
    Exhausted,
    #[error("client pool is closed")]
    Closed,
}

/// Counts of clients per set, read under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOccupancy {
    pub idle: usize,
    pub in_use: usize,
    pub created: usize,
}

struct PoolState<R> {
    idle: VecDeque<R>,
    in_use: usize,
    created: usize,
    // Slots whose client is still being built.
    reserved: usize,
}

/// A fixed-size set of clients shared by the workers of one run.
///
/// Idle clients sit in a deque behind a mutex, the semaphore holds one permit
/// per idle client so [`ClientPool::acquire`] can sleep instead of polling.
/// A fetched client is handed out as a [`ClientLease`], which puts it back on drop.
pub struct ClientPool<R> {
    state: Mutex<PoolState<R>>,
    available: Semaphore,
    capacity: usize,
}

impl<R> ClientPool<R> {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                idle: VecDeque::with_capacity(capacity),
                in_use: 0,
                created: 0,
                reserved: 0,
            }),
            available: Semaphore::new(0),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<R>> {
        // Nothing panics while holding the lock, the state is consistent either way.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates one client and makes it idle.
    pub fn add_client<F>(&self, factory: &F, target: &Uri) -> anyhow::Result<()>
    where
        F: ClientFactory<Client = R>,
    {
        {
            let mut state = self.lock();
            if state.created + state.reserved >= self.capacity {
                bail!("Client pool is full at {} clients", self.capacity);
            }
            state.reserved += 1;
        }
        let client = match factory.create(target) {
            Ok(client) => client,
            Err(e) => {
                self.lock().reserved -= 1;
                return Err(e);
            }
        };
        {
            let mut state = self.lock();
            state.reserved -= 1;
            state.idle.push_back(client);
            state.created += 1;
        }
        self.available.add_permits(1);
        Ok(())
    }

    /// Takes an idle client without waiting.
    pub fn try_fetch(self: &Arc<Self>) -> Result<ClientLease<R>, PoolError> {
        match self.available.try_acquire() {
            Ok(permit) => permit.forget(),
            Err(tokio::sync::TryAcquireError::NoPermits) => return Err(PoolError::Exhausted),
            Err(tokio::sync::TryAcquireError::Closed) => return Err(PoolError::Closed),
        }
        self.checkout()
    }

    /// Waits until a client is idle and takes it. Cancel safe.
    pub async fn acquire(self: &Arc<Self>) -> Result<ClientLease<R>, PoolError> {
        self.available
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?
            .forget();
        self.checkout()
    }

    /// Wakes every waiter in [`ClientPool::acquire`] with [`PoolError::Closed`].
    pub fn close(&self) {
        self.available.close();
    }

    #[must_use]
    pub fn occupancy(&self) -> PoolOccupancy {
        let state = self.lock();
        PoolOccupancy {
            idle: state.idle.len(),
            in_use: state.in_use,
            created: state.created,
        }
    }

    // Callers hold a forgotten permit, so an idle client is present.
    fn checkout(self: &Arc<Self>) -> Result<ClientLease<R>, PoolError> {
        let mut state = self.lock();
        let client = state.idle.pop_front().ok_or(PoolError::Exhausted)?;
        state.in_use += 1;
        Ok(ClientLease {
            pool: Arc::clone(self),
            client: Some(client),
        })
    }

    fn return_client(&self, client: R) {
        {
            let mut state = self.lock();
            state.idle.push_back(client);
            state.in_use -= 1;
        }
        self.available.add_permits(1);
    }
}

/// A client taken from a [`ClientPool`]. Returned to the pool when dropped.
pub struct ClientLease<R> {
    pool: Arc<ClientPool<R>>,
    client: Option<R>,
}

impl<R> ClientLease<R> {
    /// Gives the client back to the pool.
    #[inline]
    pub fn release(self) {
        drop(self);
    }
}

impl<R> Deref for ClientLease<R> {
    type Target = R;

    fn deref(&self) -> &R {
        self.client.as_ref().expect("lease holds its client until dropped")
    }
}

impl<R> DerefMut for ClientLease<R> {
    fn deref_mut(&mut self) -> &mut R {
        self.client.as_mut().expect("lease holds its client until dropped")
    }
}

impl<R> Drop for ClientLease<R> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.return_client(client);
        }
    }
}
