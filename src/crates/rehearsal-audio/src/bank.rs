//! Instrument loading and caching
//!
//! Instruments are loaded on background threads and cached by program
//! number, so switching between pieces that share instruments costs nothing.

use crate::{EngineError, Instrument, InstrumentError, InstrumentSource, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Where an instrument is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
    Failed,
}

#[derive(Clone)]
enum Slot {
    Loading,
    Ready(Arc<dyn Instrument>),
    Failed(InstrumentError),
}

/// Loads and caches instruments
pub struct InstrumentBank {
    source: Arc<dyn InstrumentSource>,
    /// Cached instruments by program number
    slots: Arc<RwLock<HashMap<u8, Slot>>>,
    /// Background loads that have not been joined yet
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InstrumentBank {
    pub fn new(source: Arc<dyn InstrumentSource>) -> Self {
        InstrumentBank {
            source,
            slots: Arc::new(RwLock::new(HashMap::new())),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Start loading every instrument that is not cached yet
    ///
    /// Failed instruments are retried. Returns immediately.
    pub fn preload(&self, ids: &[u8]) {
        for &id in ids {
            {
                let mut slots = self.slots.write();
                match slots.get(&id) {
                    Some(Slot::Loading) | Some(Slot::Ready(_)) => continue,
                    Some(Slot::Failed(_)) | None => {
                        slots.insert(id, Slot::Loading);
                    }
                }
            }

            let source = Arc::clone(&self.source);
            let slots = Arc::clone(&self.slots);
            let spawned = thread::Builder::new()
                .name(format!("instrument-{}", id))
                .spawn(move || {
                    let loaded = source.load(id);
                    let mut slots = slots.write();
                    // The bank may have been cleared while we were loading
                    let Some(slot) = slots.get_mut(&id) else {
                        return;
                    };
                    if !matches!(slot, Slot::Loading) {
                        return;
                    }
                    *slot = match loaded {
                        Ok(instrument) => {
                            log::debug!("Instrument {} ready", id);
                            Slot::Ready(instrument)
                        }
                        Err(e) => {
                            log::warn!("Instrument {} failed to load: {}", id, e);
                            Slot::Failed(e)
                        }
                    };
                });

            match spawned {
                Ok(handle) => self.workers.lock().push(handle),
                Err(e) => {
                    log::warn!("Could not start loader for instrument {}: {}", id, e);
                    self.slots.write().insert(
                        id,
                        Slot::Failed(InstrumentError::Load {
                            id,
                            reason: e.to_string(),
                        }),
                    );
                }
            }
        }
    }

    /// Load an instrument on the calling thread, using the cache if possible
    pub fn load_blocking(&self, id: u8) -> std::result::Result<Arc<dyn Instrument>, InstrumentError> {
        if let Some(instrument) = self.get(id) {
            return Ok(instrument);
        }

        let loaded = self.source.load(id);
        let mut slots = self.slots.write();
        match loaded {
            Ok(instrument) => {
                slots.insert(id, Slot::Ready(Arc::clone(&instrument)));
                Ok(instrument)
            }
            Err(e) => {
                slots.insert(id, Slot::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Block until every background load started so far has finished
    pub fn wait(&self) {
        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                log::warn!("Instrument loader thread panicked");
            }
        }
    }

    /// A ready instrument, if it is cached
    pub fn get(&self, id: u8) -> Option<Arc<dyn Instrument>> {
        match self.slots.read().get(&id) {
            Some(Slot::Ready(instrument)) => Some(Arc::clone(instrument)),
            _ => None,
        }
    }

    pub fn status(&self, id: u8) -> Option<LoadStatus> {
        self.slots.read().get(&id).map(|slot| match slot {
            Slot::Loading => LoadStatus::Loading,
            Slot::Ready(_) => LoadStatus::Ready,
            Slot::Failed(_) => LoadStatus::Failed,
        })
    }

    /// Check that every instrument in `ids` can play right now
    ///
    /// Instruments that were never requested are preloaded and reported as
    /// not ready.
    pub fn ensure_ready(&self, ids: &[u8]) -> Result<()> {
        let mut pending = Vec::new();
        let mut missing = Vec::new();
        {
            let slots = self.slots.read();
            for &id in ids {
                match slots.get(&id) {
                    Some(Slot::Ready(_)) => {}
                    Some(Slot::Failed(e)) => return Err(EngineError::InstrumentLoad(e.clone())),
                    Some(Slot::Loading) => pending.push(id),
                    None => missing.push(id),
                }
            }
        }

        if !missing.is_empty() {
            self.preload(&missing);
            pending.extend(missing);
        }
        if pending.is_empty() {
            Ok(())
        } else {
            pending.sort_unstable();
            Err(EngineError::NotReady(pending))
        }
    }

    /// Number of cached instruments, ready or not
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Whether every id has finished loading; starts no loads
    pub fn all_ready(&self, ids: &[u8]) -> bool {
        let slots = self.slots.read();
        ids.iter().all(|id| matches!(slots.get(id), Some(Slot::Ready(_))))
    }

    /// Drop every cached instrument
    ///
    /// Loads still in flight finish on their own and are discarded.
    pub fn clear(&self) {
        self.slots.write().clear();
        self.workers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSource;

    #[test]
    fn test_preload_and_cache() {
        let source = RecordingSource::new();
        let bank = InstrumentBank::new(Arc::new(source.clone()));

        bank.preload(&[0, 52]);
        bank.wait();
        assert_eq!(bank.status(0), Some(LoadStatus::Ready));
        assert_eq!(bank.status(52), Some(LoadStatus::Ready));
        assert!(bank.ensure_ready(&[0, 52]).is_ok());

        // Already cached, no second load
        bank.preload(&[0]);
        bank.wait();
        assert_eq!(source.loads(), 2);
    }

    #[test]
    fn test_unrequested_instrument_is_not_ready() {
        let bank = InstrumentBank::new(Arc::new(RecordingSource::new()));
        assert!(matches!(bank.ensure_ready(&[5]), Err(EngineError::NotReady(ids)) if ids == vec![5]));
        bank.wait();
        assert!(bank.ensure_ready(&[5]).is_ok());
    }

    #[test]
    fn test_failed_load_is_remembered() {
        let source = RecordingSource::new().failing_instrument(7);
        let bank = InstrumentBank::new(Arc::new(source));
        bank.preload(&[7]);
        bank.wait();

        assert_eq!(bank.status(7), Some(LoadStatus::Failed));
        assert!(matches!(
            bank.ensure_ready(&[0, 7]),
            Err(EngineError::InstrumentLoad(InstrumentError::Load { id: 7, .. }))
        ));
        assert!(bank.load_blocking(7).is_err());
    }

    #[test]
    fn test_pending_load_reports_not_ready() {
        let source = RecordingSource::new().gated();
        let bank = InstrumentBank::new(Arc::new(source.clone()));
        bank.preload(&[0]);

        assert_eq!(bank.status(0), Some(LoadStatus::Loading));
        assert!(matches!(bank.ensure_ready(&[0]), Err(EngineError::NotReady(_))));

        source.open_gate();
        bank.wait();
        assert!(bank.ensure_ready(&[0]).is_ok());
    }

    #[test]
    fn test_clear_releases_instruments() {
        let bank = InstrumentBank::new(Arc::new(RecordingSource::new()));
        assert!(bank.load_blocking(3).is_ok());
        assert_eq!(bank.len(), 1);
        bank.clear();
        assert!(bank.is_empty());
        assert!(bank.get(3).is_none());
    }
}
