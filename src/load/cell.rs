//! Single-flight, at-most-once load memoization.
//!
//! Every record owns one [`LoadCell`]. The first caller drives the load; callers
//! arriving while it runs subscribe to its outcome instead of starting their own.
//! Success is remembered forever. Failure and cancellation return the cell to
//! idle so a later call retries just that path.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::util::{Error, Result};

type Outcome = std::result::Result<(), Arc<Error>>;

enum CellState {
    Idle,
    InFlight(watch::Receiver<Option<Outcome>>),
    Loaded,
}

enum Role {
    Done,
    Waiter(watch::Receiver<Option<Outcome>>),
    Driver(watch::Sender<Option<Outcome>>),
}

/// Load state of one record.
pub struct LoadCell {
    state: Mutex<CellState>,
}

impl LoadCell {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Idle),
        }
    }

    /// True once a load has completed successfully.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.state.lock(), CellState::Loaded)
    }

    /// True while some caller is driving a load.
    pub fn is_in_flight(&self) -> bool {
        matches!(*self.state.lock(), CellState::InFlight(_))
    }

    /// Run `load` at most once across all callers of this cell.
    ///
    /// `load` is only polled if this call becomes the driver; otherwise it is
    /// dropped unpolled and the shared outcome is returned.
    pub async fn run<F>(&self, load: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        let mut load = Some(load);
        loop {
            let role = {
                let mut state = self.state.lock();
                match &*state {
                    CellState::Loaded => Role::Done,
                    CellState::InFlight(rx) => Role::Waiter(rx.clone()),
                    CellState::Idle => {
                        let (tx, rx) = watch::channel(None);
                        *state = CellState::InFlight(rx);
                        Role::Driver(tx)
                    }
                }
            };

            match role {
                Role::Done => return Ok(()),
                Role::Waiter(mut rx) => loop {
                    let current = rx.borrow_and_update().clone();
                    if let Some(outcome) = current {
                        return outcome.map_err(Error::shared);
                    }
                    if rx.changed().await.is_err() {
                        // Driver was dropped mid-flight; compete for the cell again.
                        break;
                    }
                },
                Role::Driver(tx) => {
                    let Some(load) = load.take() else {
                        return Err(Error::invalid("load future already consumed"));
                    };
                    let guard = DriverGuard {
                        cell: self,
                        tx: Some(tx),
                    };
                    let res = load.await;
                    return guard.finish(res);
                }
            }
        }
    }
}

impl Default for LoadCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LoadCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.lock() {
            CellState::Idle => "idle",
            CellState::InFlight(_) => "in-flight",
            CellState::Loaded => "loaded",
        };
        f.debug_tuple("LoadCell").field(&state).finish()
    }
}

/// Resets the cell if the driving future is dropped before finishing.
struct DriverGuard<'a> {
    cell: &'a LoadCell,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl DriverGuard<'_> {
    fn finish(mut self, res: Result<()>) -> Result<()> {
        let Some(tx) = self.tx.take() else {
            return res;
        };
        let (next, outcome, res) = match res {
            Ok(()) => (CellState::Loaded, Ok(()), Ok(())),
            Err(err) => {
                let shared = Arc::new(err);
                let replay = Error::shared(Arc::clone(&shared));
                (CellState::Idle, Err(shared), Err(replay))
            }
        };
        *self.cell.state.lock() = next;
        tx.send_replace(Some(outcome));
        res
    }
}

impl Drop for DriverGuard<'_> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            *self.cell.state.lock() = CellState::Idle;
        }
    }
}
