use futures::future::try_join_all;
use macopen::{
    Error,
    buf::{self, ByteBuf, ReportType},
    channel::SimpleChannel,
    config::Config,
    field::Fp,
    player::Player,
    tree_sum::{Topology, TreeSum},
    value::{MacValue, RingValue, Value},
    z2k::Z2k,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

mod common;

async fn sum_all<T: Value>(config: Config, inputs: Vec<Vec<T>>) -> Result<Vec<Vec<T>>, Error> {
    let channels = SimpleChannel::channels(inputs.len());
    sum_over(&channels, config, inputs).await
}

async fn sum_over<T: Value>(
    channels: &[SimpleChannel],
    config: Config,
    inputs: Vec<Vec<T>>,
) -> Result<Vec<Vec<T>>, Error> {
    let n = inputs.len();
    try_join_all(
        channels
            .iter()
            .zip(inputs)
            .enumerate()
            .map(|(i, (ch, mut values))| async move {
                let player = Player::new(ch, i, n)?;
                let mut tree_sum = TreeSum::new(&config);
                tree_sum.run(&mut values, &player).await?;
                Ok::<_, Error>(values)
            }),
    )
    .await
}

fn random_inputs(n: usize, len: usize, seed: u64) -> Vec<Vec<Fp>> {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    (0..n)
        .map(|_| (0..len).map(|_| Fp::random(&mut rng)).collect())
        .collect()
}

#[tokio::test]
async fn every_topology_sums_correctly() -> Result<(), Error> {
    common::init_tracing();
    let mut seen = vec![];
    for n in 1..=6 {
        for opening_sum in [0, 2, 3, 4, 5] {
            for len in [0, 1, n, 2 * n + 1, 17] {
                let config = Config::default().with_opening_sum(opening_sum);
                seen.push(Topology::select(opening_sum, n, len));
                let inputs = random_inputs(n, len, (n * 100 + opening_sum * 10 + len) as u64);
                let expected = common::sum_columns(&inputs);
                for result in sum_all(config, inputs).await? {
                    assert_eq!(result, expected, "n = {n}, opening_sum = {opening_sum}");
                }
            }
        }
    }
    assert!(seen.contains(&Topology::Tree));
    assert!(seen.contains(&Topology::Ring));
    assert!(seen.contains(&Topology::RotatedStar));
    Ok(())
}

#[tokio::test]
async fn ring_with_four_players() -> Result<(), Error> {
    let config = Config::default().with_opening_sum(5);
    assert_eq!(Topology::select(5, 4, 16), Topology::Ring);
    let inputs = random_inputs(4, 16, 4);
    let expected = common::sum_columns(&inputs);
    for result in sum_all(config, inputs).await? {
        assert_eq!(result, expected);
    }
    Ok(())
}

#[tokio::test]
async fn ring_and_star_complete_over_single_slot_channels() -> Result<(), Error> {
    for (n, opening_sum) in [(4, 5), (5, 5), (4, 4), (6, 6), (7, 8)] {
        let topology = Topology::select(opening_sum, n, 40);
        assert_ne!(topology, Topology::Tree);
        let channels = SimpleChannel::channels_with_capacity(n, 1);
        let inputs = random_inputs(n, 40, n as u64);
        let expected = common::sum_columns(&inputs);
        let config = Config::default().with_opening_sum(opening_sum);
        for result in sum_over(&channels, config, inputs).await? {
            assert_eq!(result, expected, "{topology:?} with n = {n}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn huge_fan_in_sums_in_one_round() -> Result<(), Error> {
    let config = Config::default().with_opening_sum(usize::MAX);
    assert_eq!(Topology::select(usize::MAX, 3, 8), Topology::Tree);
    let inputs = random_inputs(3, 8, 12);
    let expected = common::sum_columns(&inputs);
    for result in sum_all(config, inputs).await? {
        assert_eq!(result, expected);
    }
    Ok(())
}

#[tokio::test]
async fn tree_rooted_anywhere_with_small_fanout() -> Result<(), Error> {
    for base_player in [0, 3, 6, 10] {
        let config = Config::default()
            .with_opening_sum(2)
            .with_max_broadcast(2)
            .with_base_player(base_player);
        let inputs = random_inputs(7, 5, base_player as u64);
        let expected = common::sum_columns(&inputs);
        for result in sum_all(config, inputs).await? {
            assert_eq!(result, expected, "base_player = {base_player}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn declared_lengths_open_low_bytes() -> Result<(), Error> {
    let n = 4;
    let secret = Z2k::from((5u128 << 64) | 1234);
    let mut rng = ChaCha20Rng::seed_from_u64(9);
    let mut shares: Vec<Z2k> = (1..n).map(|_| Z2k::random(&mut rng)).collect();
    let rest = shares.iter().fold(secret, |acc, share| acc - *share);
    shares.push(rest);

    let channels = SimpleChannel::channels(n);
    let results = try_join_all(channels.iter().zip(shares).enumerate().map(
        |(i, (ch, share))| async move {
            let player = Player::new(ch, i, n)?;
            let mut tree_sum = TreeSum::new(&Config::default().with_opening_sum(2));
            let mut values = [share];
            tree_sum
                .run_with_lengths(&mut values, &[Some(Z2k::K_BYTES)], &player)
                .await?;
            Ok::<_, Error>(values[0])
        },
    ))
    .await?;
    for opened in results {
        assert_eq!(opened.low_k(), Z2k::from(1234u64));
    }
    Ok(())
}

#[tokio::test]
async fn oversized_declared_length_is_rejected() -> Result<(), Error> {
    let channels = SimpleChannel::channels(1);
    let player = Player::new(&channels[0], 0, 1)?;
    let mut tree_sum = TreeSum::new(&Config::default());
    let result = tree_sum
        .run_with_lengths(&mut [Fp::ONE], &[Some(9)], &player)
        .await;
    assert!(matches!(
        result,
        Err(Error::Serialization(buf::Error::LengthTooLarge { declared: 9, size: 8 }))
    ));
    Ok(())
}

#[tokio::test]
async fn missing_terminator_is_a_serialization_fault() -> Result<(), Error> {
    let channels = SimpleChannel::channels(2);
    let root = Player::new(&channels[0], 0, 2)?;
    let leaf = Player::new(&channels[1], 1, 2)?;
    leaf.send_to(0, &ByteBuf::from(7u64.to_le_bytes().to_vec()))
        .await?;

    let mut tree_sum = TreeSum::new(&Config::default().with_opening_sum(2));
    let result = tree_sum.run(&mut [Fp::ONE], &root).await;
    assert!(matches!(
        result,
        Err(Error::Serialization(buf::Error::MissingTerminator))
    ));
    Ok(())
}

#[tokio::test]
async fn surplus_values_are_a_serialization_fault() -> Result<(), Error> {
    let channels = SimpleChannel::channels(2);
    let root = Player::new(&channels[0], 0, 2)?;
    let leaf = Player::new(&channels[1], 1, 2)?;
    let mut msg = ByteBuf::new();
    msg.append(&5u64.to_le_bytes());
    msg.append(&0x100u64.to_le_bytes());
    msg.append_terminator();
    leaf.send_to(0, &msg).await?;

    let mut tree_sum = TreeSum::new(&Config::default().with_opening_sum(2));
    let result = tree_sum.run(&mut [Fp::ONE], &root).await;
    assert!(matches!(
        result,
        Err(Error::Serialization(buf::Error::TrailingBytes(8)))
    ));
    Ok(())
}

#[tokio::test]
async fn send_buffer_is_reused() -> Result<(), Error> {
    let n = 3;
    let channels = SimpleChannel::channels(n);
    let capacities = try_join_all(channels.iter().enumerate().map(|(i, ch)| async move {
        let player = Player::new(ch, i, n)?;
        let mut tree_sum = TreeSum::new(&Config::default().with_opening_sum(2));
        let mut values = vec![Fp::from(i as u64); 32];
        tree_sum.run(&mut values, &player).await?;
        let first = tree_sum.report_size(ReportType::Capacity);
        tree_sum.run(&mut values, &player).await?;
        Ok::<_, Error>((first, tree_sum.report_size(ReportType::Capacity)))
    }))
    .await?;
    for (first, second) in capacities {
        assert_eq!(first, second);
    }
    Ok(())
}

#[tokio::test]
async fn single_value_convenience() -> Result<(), Error> {
    let n = 5;
    let channels = SimpleChannel::channels(n);
    let sums = try_join_all(channels.iter().enumerate().map(|(i, ch)| async move {
        let player = Player::new(ch, i, n)?;
        let mut tree_sum = TreeSum::new(&Config::default());
        tree_sum.run_one(Fp::from(i as u64 + 1), &player).await
    }))
    .await?;
    assert_eq!(sums, vec![Fp::from(15); n]);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn topologies_are_equivalent(
        n in 1usize..9,
        len in 0usize..40,
        seed in any::<u64>(),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .expect("runtime");
        let inputs = random_inputs(n, len, seed);
        let expected = common::sum_columns(&inputs);
        for opening_sum in [2, n, n + 1, n + 2] {
            let config = Config::default().with_opening_sum(opening_sum);
            let results = rt
                .block_on(sum_all(config, inputs.clone()))
                .expect("aggregation failed");
            for result in results {
                prop_assert_eq!(&result, &expected);
            }
        }
    }
}
