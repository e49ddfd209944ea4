use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::errors::{local_code, RpcError};
use crate::request::Request;
use crate::response::Response;
use crate::transport::status::is_successful;
use crate::transport::{ProgressRelay, Transport, TransportState};

/// Signals from one exchange task back to the queue driver. The driver owns
/// all bookkeeping; a late signal for a deregistered sequence is discarded
/// there.
#[derive(Debug)]
pub(crate) enum ExchangeSignal {
    State { seq: u64, state: TransportState },
    Terminal { seq: u64, outcome: TerminalOutcome },
}

#[derive(Debug)]
pub(crate) enum TerminalOutcome {
    Completed(Response),
    Failed(RpcError),
}

/// Drive one request over its selected transport and report exactly one
/// terminal outcome. Cancellation wins any race against the wire; a
/// cancelled exchange reports nothing because the driver already resolved
/// the caller.
pub(crate) async fn run_exchange(
    request: Request,
    transport: Arc<dyn Transport>,
    signal_tx: mpsc::Sender<ExchangeSignal>,
    mut cancel_rx: oneshot::Receiver<()>,
    local_file: bool,
) {
    let seq = request.seq();

    let wire = match transport.prepare(&request) {
        Ok(wire) => wire,
        Err(err) => {
            send_terminal(
                &signal_tx,
                seq,
                TerminalOutcome::Failed(RpcError::from(err).with_seq(seq)),
            )
            .await;
            return;
        }
    };

    if !send_state(&signal_tx, seq, TransportState::Configured).await {
        return;
    }
    if !send_state(&signal_tx, seq, TransportState::Sending).await {
        return;
    }

    let relay = {
        let tx = signal_tx.clone();
        ProgressRelay::new(move |state| {
            if tx.try_send(ExchangeSignal::State { seq, state }).is_err() {
                tracing::trace!(seq, ?state, "progress signal dropped");
            }
        })
    };

    let performed = tokio::select! {
        _ = &mut cancel_rx => {
            tracing::debug!(seq, transport = transport.name(), "exchange cancelled in flight");
            return;
        }
        result = transport.perform(&wire, &relay) => result,
    };

    let outcome = match performed {
        Err(failure) => {
            TerminalOutcome::Failed(RpcError::transport(0, failure.to_string()).with_seq(seq))
        }
        Ok(reply) => {
            if !is_successful(Some(reply.status), true, local_file) {
                TerminalOutcome::Failed(
                    RpcError::transport(
                        i64::from(reply.status),
                        format!("http status {}", reply.status),
                    )
                    .with_seq(seq),
                )
            } else {
                match Response::decode(
                    request.response_kind,
                    reply.status,
                    reply.headers,
                    &reply.body,
                ) {
                    Err(err) => TerminalOutcome::Failed(err.with_seq(seq)),
                    // A success status with nothing in it is not a success:
                    // completion is demoted to failure when content is absent.
                    Ok(response) if response.content.is_none() => TerminalOutcome::Failed(
                        RpcError::local(local_code::NO_DATA, "response carried no content")
                            .with_seq(seq),
                    ),
                    Ok(response) => TerminalOutcome::Completed(response),
                }
            }
        }
    };

    send_terminal(&signal_tx, seq, outcome).await;
}

async fn send_state(tx: &mpsc::Sender<ExchangeSignal>, seq: u64, state: TransportState) -> bool {
    tx.send(ExchangeSignal::State { seq, state }).await.is_ok()
}

async fn send_terminal(tx: &mpsc::Sender<ExchangeSignal>, seq: u64, outcome: TerminalOutcome) {
    if tx
        .send(ExchangeSignal::Terminal { seq, outcome })
        .await
        .is_err()
    {
        tracing::trace!(seq, "driver gone before terminal delivery");
    }
}
