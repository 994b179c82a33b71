use std::{future::Future, io, sync::OnceLock, thread};

use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

fn fallback_runtime() -> io::Result<&'static Runtime> {
    static RUNTIME: OnceLock<io::Result<Runtime>> = OnceLock::new();

    RUNTIME
        .get_or_init(|| {
            tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .thread_name("ossfs-blocking")
                .build()
        })
        .as_ref()
        .map_err(|err| io::Error::new(err.kind(), err.to_string()))
}

/// Drives `future` to completion on the calling thread.
///
/// Inside a multi-threaded tokio runtime the worker is handed over with
/// `block_in_place`. A current-thread runtime cannot be blocked, so the
/// future runs on a scoped thread against the shared background runtime.
/// Fails only when that background runtime cannot be started.
pub fn block_on<Fut, T>(future: Fut) -> io::Result<T>
where
    Fut: Future<Output = T> + Send,
    T: Send,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        Ok(_) => {
            let runtime = fallback_runtime()?;
            Ok(thread::scope(|scope| {
                scope
                    .spawn(|| runtime.block_on(future))
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            }))
        }
        Err(_) => Ok(fallback_runtime()?.block_on(future)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_on_without_runtime() {
        let result = block_on(async { 40 + 2 }).unwrap();
        assert_eq!(result, 42);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_block_on_inside_runtime() {
        let result = block_on(async {
            tokio::task::yield_now().await;
            "ready"
        })
        .unwrap();
        assert_eq!(result, "ready");
    }

    #[tokio::test]
    async fn test_block_on_inside_current_thread_runtime() {
        let result = block_on(async { vec![1u8, 2, 3].len() }).unwrap();
        assert_eq!(result, 3);
    }
}
