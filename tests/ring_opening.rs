use futures::future::join_all;
use macopen::{
    Error,
    channel::SimpleChannel,
    config::Config,
    player::Player,
    prep::{Dealer, MaskQueue},
    ring_check::RingMacCheck,
    value::{RingValue, Share},
    z2k::Z2k,
};

mod common;

struct Party {
    key: Z2k,
    shares: Vec<Share<Z2k>>,
    masks: Option<MaskQueue<Z2k>>,
}

fn setup(n: usize, seed: u64, secrets: &[Z2k], checks: usize) -> Vec<Party> {
    let mut dealer = Dealer::<Z2k>::new(n, seed);
    let shares = common::deal(&mut dealer, secrets);
    let masks = dealer.masks(checks);
    dealer
        .mac_key_shares()
        .iter()
        .zip(shares)
        .zip(masks)
        .map(|((key, shares), masks)| Party {
            key: *key,
            shares,
            masks: Some(masks),
        })
        .collect()
}

async fn open_and_check(
    config: Config,
    direct: bool,
    parties: Vec<Party>,
) -> Vec<Result<Vec<Z2k>, Error>> {
    let n = parties.len();
    let channels = SimpleChannel::channels(n);
    join_all(
        channels
            .iter()
            .zip(parties)
            .enumerate()
            .map(|(i, (ch, party))| async move {
                let player = Player::new(ch, i, n)?;
                let mut opening = if direct {
                    RingMacCheck::direct(party.key, &config)
                } else {
                    RingMacCheck::new(party.key, &config)
                };
                if let Some(masks) = party.masks {
                    opening.set_prep(masks);
                }
                let opened = opening.open(&party.shares, &player).await?;
                assert_eq!(opening.waiting_for_check(), party.shares.len());
                opening.check(&player).await?;
                assert_eq!(opening.waiting_for_check(), 0);
                Ok::<_, Error>(opened)
            }),
    )
    .await
}

fn secrets() -> Vec<Z2k> {
    (0..16u128)
        .map(|i| Z2k::from((i << 100) | (i * 0x0123_4567_89ab_cdef)))
        .collect()
}

#[tokio::test]
async fn partial_openings_reveal_the_low_bits() -> Result<(), Error> {
    common::init_tracing();
    let secrets = secrets();
    let expected: Vec<Z2k> = secrets.iter().map(|s| s.low_k()).collect();
    for (n, opening_sum) in [(3, 0), (4, 5), (4, 4), (4, 2), (1, 0)] {
        for direct in [false, true] {
            let parties = setup(n, 1, &secrets, 1);
            let config = Config::default().with_opening_sum(opening_sum);
            for opened in open_and_check(config, direct, parties).await {
                assert_eq!(opened?, expected, "n = {n}, opening_sum = {opening_sum}");
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn tampered_share_fails_the_check() -> Result<(), Error> {
    let mut parties = setup(3, 2, &secrets(), 1);
    parties[1].shares[4].value = parties[1].shares[4].value + Z2k::from(1u64);
    for result in open_and_check(Config::default(), false, parties).await {
        assert!(matches!(result, Err(Error::MacCheckFailed)));
    }
    Ok(())
}

#[tokio::test]
async fn tampering_with_the_hidden_bits_is_detected() -> Result<(), Error> {
    let mut parties = setup(4, 3, &secrets(), 1);
    parties[2].shares[0].value = parties[2].shares[0].value + Z2k::from(1u128 << 64);
    for result in open_and_check(Config::default(), true, parties).await {
        assert!(matches!(
            result,
            Err(Error::MacCheckFailed | Error::InconsistentOpening)
        ));
    }
    Ok(())
}

#[tokio::test]
async fn check_needs_masks() -> Result<(), Error> {
    let mut parties = setup(2, 4, &secrets(), 0);
    for party in &mut parties {
        party.masks = None;
    }
    for result in open_and_check(Config::default(), false, parties).await {
        assert!(matches!(result, Err(Error::MissingPreprocessing)));
    }

    let parties = setup(2, 4, &secrets(), 0);
    for result in open_and_check(Config::default(), false, parties).await {
        assert!(matches!(result, Err(Error::PreprocessingExhausted)));
    }
    Ok(())
}

#[tokio::test]
async fn false_opening_added_to_the_check_is_detected() -> Result<(), Error> {
    let parties = setup(3, 5, &[Z2k::from(7u64)], 1);
    let n = parties.len();
    let channels = SimpleChannel::channels(n);
    let results = join_all(
        channels
            .iter()
            .zip(parties)
            .enumerate()
            .map(|(i, (ch, party))| async move {
                let player = Player::new(ch, i, n)?;
                let mut opening = RingMacCheck::new(party.key, &Config::default());
                if let Some(masks) = party.masks {
                    opening.set_prep(masks);
                }
                opening
                    .add_to_check(party.shares[0], Z2k::from(999u64), &player)
                    .await?;
                assert_eq!(opening.waiting_for_check(), 1);
                opening.check(&player).await
            }),
    )
    .await;
    for result in results {
        assert!(matches!(
            result,
            Err(Error::MacCheckFailed | Error::InconsistentOpening)
        ));
    }
    Ok(())
}
