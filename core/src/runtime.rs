// Shared Tokio runtime for foreign callers
//
// Mobile hosts call into the engine from their own threads, outside any Tokio
// context. Timers still need a runtime to live on, so those callers share one
// lazily built process-wide runtime.

use crate::platform::ScanError;
use tokio::runtime::{Builder, Handle, Runtime};

static GLOBAL_RT: parking_lot::RwLock<Option<Runtime>> = parking_lot::RwLock::new(None);

/// Handle of the current runtime, or of the shared one when called from
/// outside Tokio.
pub fn handle() -> Result<Handle, ScanError> {
    if let Ok(handle) = Handle::try_current() {
        return Ok(handle);
    }
    global_handle()
}

fn global_handle() -> Result<Handle, ScanError> {
    let rt_read = GLOBAL_RT.read();
    if let Some(rt) = &*rt_read {
        return Ok(rt.handle().clone());
    }
    drop(rt_read);

    let mut rt_write = GLOBAL_RT.write();
    if let Some(rt) = &*rt_write {
        return Ok(rt.handle().clone());
    }

    tracing::info!("Initializing shared Tokio runtime for beacon timers");
    let rt = Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("beacon-timers")
        .enable_time()
        .build()
        .map_err(|e| ScanError::RuntimeUnavailable {
            message: e.to_string(),
        })?;
    let handle = rt.handle().clone();
    *rt_write = Some(rt);
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_runtime_outside_tokio() {
        let handle = handle().expect("runtime");
        let value = handle
            .block_on(handle.spawn(async { 7 }))
            .expect("task");
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_prefers_current_runtime() {
        let handle = handle().expect("runtime");
        assert_eq!(
            handle.runtime_flavor(),
            tokio::runtime::RuntimeFlavor::CurrentThread
        );
    }
}
