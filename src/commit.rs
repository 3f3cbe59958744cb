//! Hash commitments, commit-and-open and multi-party coin tossing.

use rand::{SeedableRng, random};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::warn;

use crate::{
    channel::{self, Channel, ErrorKind, broadcast},
    error::Error,
};

/// Represents a cryptographic commitment as a fixed-size 32-byte array (a BLAKE3 hash).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commitment(pub(crate) [u8; 32]);

/// Commits to a value using the BLAKE3 cryptographic hash function.
///
/// This is not a general-purpose commitment scheme, the input value is assumed to have high
/// entropy. [`commit_and_open`] ensures this by appending a random nonce.
pub fn commit(value: &[u8]) -> Commitment {
    Commitment(blake3::hash(value).into())
}

/// Verifies if a given value matches a previously generated commitment.
pub fn open_commitment(commitment: &Commitment, value: &[u8]) -> bool {
    blake3::hash(value) == blake3::Hash::from(commitment.0)
}

fn serialize<T: Serialize>(value: &T, phase: &str) -> Result<Vec<u8>, Error> {
    let bytes = bincode::serialize(value).map_err(|e| channel::Error {
        phase: phase.to_string(),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    Ok(bytes)
}

/// The bytes that are committed to: the serialized value, a nonce and the sender's index.
fn committed_bytes<T: Serialize>(
    value: &T,
    nonce: &[u8; 32],
    party: usize,
) -> Result<Vec<u8>, Error> {
    let mut bytes = serialize(value, "commitment")?;
    bytes.extend_from_slice(nonce);
    bytes.extend_from_slice(&(party as u16).to_be_bytes());
    Ok(bytes)
}

/// Broadcasts `msg` and makes sure that no party sent different messages to different parties.
///
/// After the exchange every party sends the hashes of all messages it received to everyone else,
/// and all views have to agree. With two parties there is no third view to compare with.
pub async fn verified_broadcast<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    msg: &[T],
) -> Result<Vec<Vec<T>>, Error> {
    let all = broadcast(channel, i, n, phase, msg).await?;
    if n <= 2 {
        return Ok(all);
    }
    let mut digests = Vec::with_capacity(n);
    for msg in &all {
        digests.push(*blake3::hash(&serialize(msg, phase)?).as_bytes());
    }
    let views = broadcast(channel, i, n, &format!("{phase} verification"), &digests).await?;
    if let Some(k) = views.iter().position(|view| *view != digests) {
        warn!(party = k, phase, "parties received different broadcast messages");
        return Err(Error::InconsistentBroadcast);
    }
    Ok(all)
}

/// Commits to `value`, broadcasts the commitment, then opens it to everyone.
///
/// Returns the values of all parties, indexed by party, once every commitment has been verified.
/// No party can choose its value after having seen the values of others, and since the
/// commitments go through [`verified_broadcast`], all honest parties open the same values.
pub async fn commit_and_open<T: Clone + Serialize + DeserializeOwned>(
    channel: &impl Channel,
    i: usize,
    n: usize,
    phase: &str,
    value: &T,
) -> Result<Vec<T>, Error> {
    let nonce = random::<[u8; 32]>();
    let commitment = commit(&committed_bytes(value, &nonce, i)?);
    let commitments =
        verified_broadcast(channel, i, n, &format!("{phase} comm"), &[commitment]).await?;

    let openings = broadcast(
        channel,
        i,
        n,
        &format!("{phase} open"),
        &[(value.clone(), nonce)],
    )
    .await?;

    let mut values = Vec::with_capacity(n);
    for (k, (commitment, opening)) in commitments.into_iter().zip(openings).enumerate() {
        let (Some(commitment), Some((value, nonce))) =
            (commitment.into_iter().next(), opening.into_iter().next())
        else {
            return Err(Error::CommitmentMismatch);
        };
        if k != i && !open_commitment(&commitment, &committed_bytes(&value, &nonce, k)?) {
            return Err(Error::CommitmentMismatch);
        }
        values.push(value);
    }
    Ok(values)
}

/// Multi-party coin tossing to generate shared randomness in a secure, distributed manner.
///
/// Every party commits to a random 256-bit seed contribution, all contributions are opened and
/// XORed into the seed of a `ChaCha20Rng` that is identical at all parties.
pub async fn shared_rng(channel: &impl Channel, i: usize, n: usize) -> Result<ChaCha20Rng, Error> {
    let buf = random::<[u8; 32]>();
    let bufs = commit_and_open(channel, i, n, "RNG", &buf).await?;
    let mut buf_xor = [0u8; 32];
    for buf in bufs {
        buf_xor
            .iter_mut()
            .zip(&buf)
            .for_each(|(buf_xor_byte, buf_byte)| *buf_xor_byte ^= *buf_byte);
    }
    Ok(ChaCha20Rng::from_seed(buf_xor))
}
