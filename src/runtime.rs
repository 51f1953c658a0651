use crate::Result;

#[cfg(feature = "rt-tokio")]
use crate::Error;

use std::future::Future;

/// Drive an async installer call to completion on the selected runtime.
pub(crate) fn block_on_result<T>(future: impl Future<Output = Result<T>>) -> Result<T> {
    block_on(future)?
}

#[cfg(feature = "rt-async-io")]
pub(crate) fn block_on<T>(future: impl Future<Output = T>) -> Result<T> {
    Ok(async_io::block_on(future))
}

#[cfg(feature = "rt-tokio")]
pub(crate) fn block_on<T>(future: impl Future<Output = T>) -> Result<T> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(Error::invalid_input(
            "blocking API cannot run inside a tokio runtime; use the async Installer API",
        ));
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::IoError {
            context: format!("init tokio runtime: {e}"),
        })?;

    Ok(rt.block_on(future))
}
