//! Failure boundary around scheduled work.
//!
//! Every scheduled tick and every task run goes through [`supervise`], which
//! turns errors and panics into log events so one broken cycle never stops a
//! timer loop or a worker.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::{error, warn};

use crate::NodeError;

/// How a supervised operation ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Supervised {
    Completed,
    Failed,
    Panicked,
}

pub async fn supervise<F>(operation: &str, fut: F) -> Supervised
where
    F: Future<Output = Result<(), NodeError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Supervised::Completed,
        Ok(Err(e)) => {
            warn!(%operation, error = %e, code = e.code(), "operation failed");
            Supervised::Failed
        }
        Err(panic) => {
            error!(%operation, panic = %panic_message(panic.as_ref()), "operation panicked");
            Supervised::Panicked
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn errors_and_panics_become_outcomes() {
        assert_eq!(supervise("ok", async { Ok(()) }).await, Supervised::Completed);
        assert_eq!(
            supervise("err", async { Err(NodeError::Other("boom".into())) }).await,
            Supervised::Failed
        );
        let outcome = supervise("panic", async {
            let v: Vec<u8> = Vec::new();
            if v.is_empty() {
                panic!("tick exploded");
            }
            Ok(())
        })
        .await;
        assert_eq!(outcome, Supervised::Panicked);
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
    }
}
