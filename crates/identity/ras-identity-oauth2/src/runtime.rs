//! Runtime plumbing for the blocking facades.

use crate::error::{OAuth2Error, OAuth2Result};
use std::future::Future;
use tokio::runtime::{Builder, Handle, Runtime, RuntimeFlavor};
use tracing::warn;

/// A current-thread runtime owned by a blocking facade.
///
/// Shut down in the background on drop so the facade can be dropped from
/// inside another runtime without panicking.
pub(crate) struct OwnedRuntime(Option<Runtime>);

impl OwnedRuntime {
    pub(crate) fn new() -> OAuth2Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("ras-oauth2-blocking")
            .build()
            .map_err(|e| OAuth2Error::Configuration(format!("failed to create runtime: {}", e)))?;
        Ok(Self(Some(runtime)))
    }

    fn runtime(&self) -> &Runtime {
        match &self.0 {
            Some(runtime) => runtime,
            None => unreachable!("runtime is only taken on drop"),
        }
    }

    /// Run on the calling thread. Refuses to run inside an async runtime,
    /// where blocking would stall the caller's scheduler.
    pub(crate) fn block_on<T, F, Fut>(&self, make_future: F) -> OAuth2Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OAuth2Result<T>>,
    {
        if Handle::try_current().is_ok() {
            return Err(OAuth2Error::Configuration(
                "blocking client called from inside an async runtime; \
                 use the async or adaptive client there"
                    .to_string(),
            ));
        }
        self.runtime().block_on(make_future())
    }

    /// Run to completion from any context.
    ///
    /// On a multi-thread runtime the calling worker hands its queued tasks to
    /// the other workers before blocking, so tasks holding a lock the work
    /// needs keep running. A current-thread runtime has no other worker to
    /// hand them to, and blocking it would stall those tasks forever, so the
    /// call is refused there.
    pub(crate) fn block_on_anywhere<T, F, Fut>(&self, make_future: F) -> OAuth2Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OAuth2Result<T>>,
    {
        let Ok(handle) = Handle::try_current() else {
            return self.runtime().block_on(make_future());
        };

        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(OAuth2Error::Configuration(
                "blocking call made from a current-thread async runtime; \
                 use the async methods there"
                    .to_string(),
            ));
        }

        warn!("Blocking call made from inside an async runtime; handing off worker tasks");
        let runtime = self.runtime();
        tokio::task::block_in_place(move || runtime.block_on(make_future()))
    }
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_outside_runtime() {
        let runtime = OwnedRuntime::new().unwrap();
        let value = runtime.block_on(|| async { Ok::<_, OAuth2Error>(42) }).unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_block_on_inside_runtime_is_refused() {
        let runtime = OwnedRuntime::new().unwrap();
        let result = runtime.block_on(|| async { Ok::<_, OAuth2Error>(1) });
        assert!(matches!(result, Err(OAuth2Error::Configuration(_))));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_block_on_anywhere_refused_on_current_thread_runtime() {
        let runtime = OwnedRuntime::new().unwrap();
        let result = runtime.block_on_anywhere(|| async { Ok::<_, OAuth2Error>("done") });
        assert!(matches!(result, Err(OAuth2Error::Configuration(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_block_on_anywhere_waits_for_sibling_task() {
        let runtime = OwnedRuntime::new().unwrap();
        let lock = std::sync::Arc::new(tokio::sync::Mutex::new(0));

        // Holder is queued on this runtime and must still make progress
        let guard = lock.clone().lock_owned().await;
        let holder = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            drop(guard);
        });

        let value = runtime
            .block_on_anywhere(|| async {
                let mut value = lock.lock().await;
                *value += 1;
                Ok::<_, OAuth2Error>(*value)
            })
            .unwrap();

        assert_eq!(value, 1);
        holder.await.unwrap();
    }

    #[test]
    fn test_block_on_anywhere_outside_runtime() {
        let runtime = OwnedRuntime::new().unwrap();
        let value = runtime
            .block_on_anywhere(|| async { Ok::<_, OAuth2Error>(7) })
            .unwrap();
        assert_eq!(value, 7);
    }
}
