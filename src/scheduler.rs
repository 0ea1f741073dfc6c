//! 64-way slice scheduling: a fixed-size rayon thread pool where
//! each worker dequeues a slice index and runs that slice's pipeline to
//! completion before taking another. Grounded on `utils::parallel`'s
//! `ParallelExecutor` wrapper around a dedicated `rayon::ThreadPool`.

use crate::error::Result;
use crate::schema::NUM_SLICES;
use log::error;
use rayon::prelude::*;
use std::sync::Mutex;

/// Runs `work` once per slice index `0..NUM_SLICES` on a dedicated pool
/// sized to `threads` (0 meaning "let rayon pick a default"), collecting
/// every slice's result. The first error encountered is returned after all
/// in-flight slices finish — remaining workers complete their current
/// slice rather than being interrupted mid-write, matching the "no partial
/// database on failure" contract enforced by the caller removing the
/// staging directory.
pub fn run_all_slices<F, T>(threads: usize, work: F) -> Result<Vec<T>>
where
    F: Fn(u32) -> Result<T> + Send + Sync,
    T: Send,
{
    let mut builder = rayon::ThreadPoolBuilder::new();
    if threads > 0 {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| crate::error::MerylError::internal(format!("failed to build thread pool: {e}")))?;

    let first_error: Mutex<Option<crate::error::MerylError>> = Mutex::new(None);

    let results: Vec<Option<T>> = pool.install(|| {
        (0..NUM_SLICES)
            .into_par_iter()
            .map(|slice| match work(slice) {
                Ok(value) => Some(value),
                Err(e) => {
                    error!("slice {slice} failed: {e}");
                    let mut guard = first_error.lock().unwrap();
                    if guard.is_none() {
                        *guard = Some(e);
                    }
                    None
                }
            })
            .collect()
    });

    if let Some(e) = first_error.into_inner().unwrap() {
        return Err(e);
    }

    Ok(results.into_iter().map(|r| r.expect("no error recorded but slice produced no value")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_every_slice_exactly_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        run_all_slices(4, move |slice| {
            seen2.lock().unwrap().push(slice);
            Ok(slice * 2)
        })
        .unwrap();
        let mut got = seen.lock().unwrap().clone();
        got.sort_unstable();
        assert_eq!(got, (0..NUM_SLICES).collect::<Vec<_>>());
    }

    #[test]
    fn propagates_first_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        let result = run_all_slices(2, move |slice| {
            counter2.fetch_add(1, Ordering::SeqCst);
            if slice == 5 {
                Err(crate::error::MerylError::internal("boom"))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        // every slice still ran to completion.
        assert_eq!(counter.load(Ordering::SeqCst), NUM_SLICES as usize);
    }
}
