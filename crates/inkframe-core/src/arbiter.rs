//! Single authority over who may touch the storage volume.
//!
//! The card is wired either to the application (SPI) or to the host (USB
//! card reader), never both. The mode flag below is the only thing deciding
//! which, and every application access goes through [`StorageArbiter::storage`]
//! or [`StorageArbiter::begin_job`], both of which check it first.

use log::{info, warn};

use crate::storage::{FileStore, StorageError};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StorageMode {
    ApplicationOwned,
    HostExposed,
}

impl StorageMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApplicationOwned => "application",
            Self::HostExposed => "host",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArbiterError {
    /// An image job holds the storage.
    Busy,
    AlreadyExposed,
    NotExposed,
    /// The host link refused the transition. The mode is unchanged.
    Link,
}

impl ArbiterError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::AlreadyExposed => "already_exposed",
            Self::NotExposed => "not_exposed",
            Self::Link => "link",
        }
    }
}

/// The path that publishes the volume to the host.
pub trait HostLink {
    type Error: core::fmt::Debug;

    /// Hands the volume to the host.
    fn publish(&mut self) -> Result<(), Self::Error>;

    /// Takes the volume back from the host.
    fn withdraw(&mut self) -> Result<(), Self::Error>;
}

/// Proof that an image job holds the storage.
///
/// Only [`StorageArbiter::begin_job`] creates one and only
/// [`StorageArbiter::finish_job`] consumes it, so at most one job is active.
#[must_use = "a job ticket must be returned with finish_job"]
#[derive(Debug)]
pub struct JobTicket {
    _private: (),
}

pub struct StorageArbiter<S, L> {
    store: S,
    link: L,
    mode: StorageMode,
    job_active: bool,
}

impl<S, L> StorageArbiter<S, L>
where
    S: FileStore,
    L: HostLink,
{
    /// Starts application owned. The link is expected to route the card to
    /// the application already.
    pub fn new(store: S, link: L) -> Self {
        Self {
            store,
            link,
            mode: StorageMode::ApplicationOwned,
            job_active: false,
        }
    }

    pub fn current_mode(&self) -> StorageMode {
        self.mode
    }

    pub fn is_host_exposed(&self) -> bool {
        self.mode == StorageMode::HostExposed
    }

    pub fn job_active(&self) -> bool {
        self.job_active
    }

    pub fn request_host_exposure(&mut self) -> Result<(), ArbiterError> {
        if self.is_host_exposed() {
            return Err(ArbiterError::AlreadyExposed);
        }
        if self.job_active {
            return Err(ArbiterError::Busy);
        }

        self.link.publish().map_err(|err| {
            warn!("arbiter: publish failed err={:?}", err);
            ArbiterError::Link
        })?;
        self.mode = StorageMode::HostExposed;
        info!("arbiter: mode={}", self.mode.as_str());
        Ok(())
    }

    pub fn request_application_ownership(&mut self) -> Result<(), ArbiterError> {
        if !self.is_host_exposed() {
            return Err(ArbiterError::NotExposed);
        }

        self.link.withdraw().map_err(|err| {
            warn!("arbiter: withdraw failed err={:?}", err);
            ArbiterError::Link
        })?;
        self.mode = StorageMode::ApplicationOwned;
        info!("arbiter: mode={}", self.mode.as_str());
        Ok(())
    }

    /// Storage access for one application operation.
    pub fn storage(&mut self) -> Result<&mut S, StorageError> {
        if self.is_host_exposed() {
            return Err(StorageError::Unavailable);
        }
        Ok(&mut self.store)
    }

    /// Marks an image job as holding the storage until `finish_job`.
    pub fn begin_job(&mut self) -> Result<JobTicket, StorageError> {
        if self.is_host_exposed() {
            return Err(StorageError::Unavailable);
        }
        if self.job_active {
            warn!("arbiter: job already active");
            return Err(StorageError::Unavailable);
        }

        self.job_active = true;
        Ok(JobTicket { _private: () })
    }

    pub fn finish_job(&mut self, ticket: JobTicket) {
        let JobTicket { _private: () } = ticket;
        self.job_active = false;
    }

    /// Releases the storage subsystem for shutdown.
    pub fn release(&mut self) {
        self.store.release();
        info!("arbiter: storage released mode={}", self.mode.as_str());
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, RecordingLink};

    fn arbiter() -> StorageArbiter<MemoryStore, RecordingLink> {
        StorageArbiter::new(MemoryStore::new(), RecordingLink::default())
    }

    #[test]
    fn starts_application_owned() {
        let arbiter = arbiter();

        assert_eq!(arbiter.current_mode(), StorageMode::ApplicationOwned);
        assert_eq!(arbiter.current_mode(), arbiter.current_mode());
        assert!(!arbiter.is_host_exposed());
    }

    #[test]
    fn exposure_round_trip_drives_link() {
        let mut arbiter = arbiter();

        arbiter.request_host_exposure().unwrap();
        assert_eq!(arbiter.current_mode(), StorageMode::HostExposed);
        assert_eq!(arbiter.current_mode(), StorageMode::HostExposed);
        assert_eq!(
            arbiter.request_host_exposure(),
            Err(ArbiterError::AlreadyExposed)
        );

        arbiter.request_application_ownership().unwrap();
        assert_eq!(arbiter.current_mode(), StorageMode::ApplicationOwned);
        assert_eq!(
            arbiter.request_application_ownership(),
            Err(ArbiterError::NotExposed)
        );

        assert_eq!(arbiter.link().published, 1);
        assert_eq!(arbiter.link().withdrawn, 1);
    }

    #[test]
    fn exposure_is_rejected_while_job_in_flight() {
        let mut arbiter = arbiter();
        let ticket = arbiter.begin_job().unwrap();

        assert_eq!(arbiter.request_host_exposure(), Err(ArbiterError::Busy));
        assert_eq!(arbiter.current_mode(), StorageMode::ApplicationOwned);
        assert_eq!(arbiter.link().published, 0);

        arbiter.finish_job(ticket);
        assert_eq!(arbiter.request_host_exposure(), Ok(()));
    }

    #[test]
    fn exposed_storage_fails_fast() {
        let mut arbiter = arbiter();
        arbiter.request_host_exposure().unwrap();

        assert_eq!(arbiter.storage().err(), Some(StorageError::Unavailable));
        assert_eq!(arbiter.begin_job().err(), Some(StorageError::Unavailable));
        assert!(!arbiter.job_active());
    }

    #[test]
    fn failed_link_keeps_mode() {
        let mut arbiter = StorageArbiter::new(
            MemoryStore::new(),
            RecordingLink {
                fail: true,
                ..RecordingLink::default()
            },
        );

        assert_eq!(arbiter.request_host_exposure(), Err(ArbiterError::Link));
        assert_eq!(arbiter.current_mode(), StorageMode::ApplicationOwned);
    }

    #[test]
    fn second_job_is_refused() {
        let mut arbiter = arbiter();
        let ticket = arbiter.begin_job().unwrap();

        assert!(arbiter.begin_job().is_err());
        arbiter.finish_job(ticket);
        assert!(!arbiter.job_active());
    }

    #[test]
    fn job_and_exposure_never_overlap() {
        // Deterministic pseudo-random walk over every operation.
        let mut arbiter = arbiter();
        let mut ticket = None;
        let mut seed = 0x2545_f491_u32;

        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;

            match seed % 4 {
                0 => {
                    let _ = arbiter.request_host_exposure();
                }
                1 => {
                    let _ = arbiter.request_application_ownership();
                }
                2 => {
                    if ticket.is_none() {
                        ticket = arbiter.begin_job().ok();
                    }
                }
                _ => {
                    if let Some(active) = ticket.take() {
                        arbiter.finish_job(active);
                    }
                }
            }

            assert!(!(arbiter.job_active() && arbiter.is_host_exposed()));
            assert_eq!(arbiter.job_active(), ticket.is_some());
        }
    }
}
