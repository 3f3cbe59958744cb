//! A communication channel used to send/receive messages to/from other parties.

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use futures::future::try_join_all;
use serde::{Serialize, de::DeserializeOwned};
use tokio::{
    sync::{
        Mutex,
        mpsc::{Receiver, Sender, channel, error::SendError},
    },
    time::timeout,
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be serialized (before sending it out).
    SerdeError(String),
    /// The message is a Vec, but not of the expected length.
    InvalidLength,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} during {}", self.reason, self.phase)
    }
}

impl std::error::Error for Error {}

/// A communication channel used to send/receive messages to/from another party.
///
/// Channels are assumed to be reliable, ordered and authenticated per link, but nothing is
/// assumed about the honesty of the content.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        phase: &str,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
        phase: &str,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Sends raw bytes to the other party, mapping transport failures to [`Error`].
pub(crate) async fn send_raw_to(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: Vec<u8>,
) -> Result<(), Error> {
    channel
        .send_bytes_to(party, phase, msg)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
}

/// Receives raw bytes from the other party, mapping transport failures to [`Error`].
pub(crate) async fn recv_raw_from(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<Vec<u8>, Error> {
    channel
        .recv_bytes_from(party, phase)
        .await
        .map_err(|e| Error {
            phase: phase.to_string(),
            reason: ErrorKind::RecvError(format!("{e:?}")),
        })
}

/// Serializes and sends an MPC message to the other party.
pub async fn send_to<S: Serialize>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &[S],
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    send_raw_to(channel, party, phase, msg).await
}

/// Receives and deserializes an MPC message from the other party.
pub async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<Vec<T>, Error> {
    let msg = recv_raw_from(channel, party, phase).await?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// Receives and deserializes a Vec from the other party (while checking the length).
pub async fn recv_vec_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    len: usize,
) -> Result<Vec<T>, Error> {
    let v: Vec<T> = recv_from(channel, party, phase).await?;
    if v.len() == len {
        Ok(v)
    } else {
        Err(Error {
            phase: phase.to_string(),
            reason: ErrorKind::InvalidLength,
        })
    }
}

/// Sends `msg` to every other party and receives one message of the same length from each.
///
/// The returned Vec is indexed by party; the entry of party `i` itself is its own message.
pub async fn broadcast<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    msg: &[T],
) -> Result<Vec<Vec<T>>, Error> {
    try_join_all(
        (0..n)
            .filter(|k| *k != i)
            .map(|k| send_to(channel, k, phase, msg)),
    )
    .await?;
    let received = try_join_all(
        (0..n)
            .filter(|k| *k != i)
            .map(|k| recv_vec_from::<T>(channel, k, phase, msg.len())),
    )
    .await?;
    let mut received = received.into_iter();
    let mut all = Vec::with_capacity(n);
    for k in 0..n {
        if k == i {
            all.push(msg.to_vec());
        } else if let Some(v) = received.next() {
            all.push(v);
        }
    }
    Ok(all)
}

/// A simple asynchronous channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
    bytes_sent: AtomicUsize,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        Self::channels_with_capacity(parties, 1024)
    }

    /// Creates channels that buffer at most `buffer_capacity` messages per direction.
    ///
    /// With a capacity of 1, a send blocks until the previous message has been received, which
    /// approximates blocking socket semantics.
    pub fn channels_with_capacity(parties: usize, buffer_capacity: usize) -> Vec<Self> {
        let mut channels = vec![];
        for _ in 0..parties {
            let mut s = vec![];
            let mut r = vec![];
            for _ in 0..parties {
                s.push(None);
                r.push(None);
            }
            channels.push(SimpleChannel {
                s,
                r,
                bytes_sent: AtomicUsize::new(0),
            });
        }
        for a in 0..parties {
            for b in 0..parties {
                if a == b {
                    continue;
                }
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].r[a] = Some(Mutex::new(recv_a_to_b));
            }
        }
        channels
    }

    /// The total number of bytes sent over this channel so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent.load(Ordering::Relaxed)
    }
}

/// The error raised by `recv` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncRecvError {
    /// There is no connection to the requested party.
    NoSuchParty(usize),
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

/// The error raised by `send` calls of a [`SimpleChannel`].
#[derive(Debug)]
pub enum AsyncSendError {
    /// There is no connection to the requested party.
    NoSuchParty(usize),
    /// The receiving end has been dropped.
    Closed(SendError<Vec<u8>>),
}

impl Channel for SimpleChannel {
    type SendError = AsyncSendError;
    type RecvError = AsyncRecvError;

    async fn send_bytes_to(
        &self,
        p: usize,
        phase: &str,
        msg: Vec<u8>,
    ) -> Result<(), AsyncSendError> {
        let Some(sender) = self.s.get(p).and_then(Option::as_ref) else {
            return Err(AsyncSendError::NoSuchParty(p));
        };
        self.bytes_sent.fetch_add(msg.len(), Ordering::Relaxed);
        trace!(party = p, phase, bytes = msg.len(), "sending msg");
        sender.send(msg).await.map_err(AsyncSendError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize, phase: &str) -> Result<Vec<u8>, AsyncRecvError> {
        let Some(receiver) = self.r.get(p).and_then(Option::as_ref) else {
            return Err(AsyncRecvError::NoSuchParty(p));
        };
        let mut receiver = receiver.lock().await;
        match timeout(Duration::from_secs(10 * 60), receiver.recv()).await {
            Ok(Some(bytes)) => {
                trace!(party = p, phase, bytes = bytes.len(), "received msg");
                Ok(bytes)
            }
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_collects_all_messages() -> Result<(), Error> {
        let channels = SimpleChannel::channels(3);
        let results = try_join_all(
            channels
                .iter()
                .enumerate()
                .map(|(i, ch)| async move { broadcast(ch, i, 3, "test", &[i as u32 * 10]).await }),
        )
        .await?;
        for received in results {
            assert_eq!(received, vec![vec![0], vec![10], vec![20]]);
        }
        assert!(channels[0].bytes_sent() > 0);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_length_is_rejected() -> Result<(), Error> {
        let [a, b]: [SimpleChannel; 2] = SimpleChannel::channels(2)
            .try_into()
            .expect("parties is 2");
        send_to(&a, 1, "test", &[1u8, 2, 3]).await?;
        let err = recv_vec_from::<u8>(&b, 0, "test", 2).await.unwrap_err();
        assert!(matches!(err.reason, ErrorKind::InvalidLength));
        Ok(())
    }
}
