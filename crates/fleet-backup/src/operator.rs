//! Operator interrupt listener.
//!
//! The operator ends the backup by pressing Enter or Ctrl-C. Stdin is read
//! on a dedicated OS thread, never on the runtime's blocking pool, so a
//! read that never returns cannot hold up process exit. A closed or
//! redirected stdin is not an operator request.

use std::future::Future;
use std::io::BufRead;

use fleet_core::stop::StopSignal;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// What the operator did to end the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorEvent {
    /// A line was entered on stdin.
    Keypress,
    /// Ctrl-C (SIGINT) was received.
    Interrupt,
}

/// Wait until the operator asks the program to end.
pub async fn wait_for_operator() -> OperatorEvent {
    let (tx, rx) = oneshot::channel();
    let spawned = std::thread::Builder::new()
        .name(String::from("operator-input"))
        .spawn(move || {
            let mut line = String::new();
            if matches!(std::io::stdin().lock().read_line(&mut line), Ok(n) if n > 0) {
                let _ = tx.send(());
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "cannot read stdin, only Ctrl-C will end the program");
    }

    listen(rx).await
}

/// Drive `run` until it ends on its own or `operator` resolves.
///
/// Whichever finishes first wins. When the operator wins, `stop` is set
/// and `run` is awaited so it can leave its current step cleanly.
pub async fn race_until_stopped<R, O>(run: R, operator: O, stop: &StopSignal) -> R::Output
where
    R: Future,
    O: Future<Output = OperatorEvent>,
{
    tokio::pin!(run);

    let finished = tokio::select! {
        output = &mut run => Some(output),
        event = operator => {
            info!(event = ?event, "stop requested by operator");
            None
        }
    };

    match finished {
        Some(output) => output,
        None => {
            let _ = stop.request_stop();
            run.await
        }
    }
}

/// Resolve on the first of a keypress notification or Ctrl-C.
async fn listen(keypress: oneshot::Receiver<()>) -> OperatorEvent {
    let keypress = async {
        if keypress.await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = keypress => OperatorEvent::Keypress,
        () = interrupt => OperatorEvent::Interrupt,
    }
}
