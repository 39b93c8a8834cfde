//! Library initialization and teardown.
//!
//! A [`Runtime`] owns the process-global pieces: the parsed options
//! database and the world communicator. At most one may exist at a time;
//! dropping it releases the slot for a later re-initialization (useful in
//! tests).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::OptionsDb;
use crate::error::Error;
use crate::parallel::Comm;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

pub struct Runtime {
    options: OptionsDb,
    world: Arc<dyn Comm>,
}

impl Runtime {
    /// Initialize from command-line style arguments. Fails with
    /// `InvalidState` if a runtime already exists.
    pub fn init<I, S>(args: I) -> Result<Runtime, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if INITIALIZED.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidState("runtime is already initialized"));
        }
        let options = OptionsDb::from_args(args);

        #[cfg(feature = "mpi")]
        let world: Arc<dyn Comm> = Arc::new(crate::parallel::mpi_comm::MpiComm::new());
        #[cfg(not(feature = "mpi"))]
        let world: Arc<dyn Comm> = Arc::new(crate::parallel::SerialComm);

        tracing::debug!(
            rank = world.rank(),
            size = world.size(),
            options = options.len(),
            "runtime initialized"
        );
        Ok(Runtime { options, world })
    }

    pub fn options(&self) -> &OptionsDb {
        &self.options
    }

    pub fn world(&self) -> Arc<dyn Comm> {
        self.world.clone()
    }

    pub fn rank(&self) -> usize {
        self.world.rank()
    }

    pub fn size(&self) -> usize {
        self.world.size()
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.world.barrier();
        INITIALIZED.store(false, Ordering::SeqCst);
        tracing::debug!("runtime finalized");
    }
}
