use std::sync::Arc;
use std::time::Duration;

use mixer_core::decoder::{MismatchPolicy, Verdict, decode};
use mixer_core::wire::{AckCode, KNOWN_REPLIES};
use mixer_core::{ActionKind, Recipe, RunState, Sequencer};
use mixer_hardware::SimulatedChannel;
use mixer_traits::clock::test_clock::ManualClock;
use proptest::prelude::*;

fn action_strategy() -> impl Strategy<Value = ActionKind> {
    prop_oneof![
        Just(ActionKind::Tare),
        (0u8..8, 1u32..500).prop_map(|(pump, grams)| ActionKind::Dispense { pump, grams }),
        (1u64..5_000).prop_map(|ms| ActionKind::Mix {
            duration: Duration::from_millis(ms)
        }),
        (1u64..200).prop_map(|ms| ActionKind::Wait {
            duration: Duration::from_millis(ms)
        }),
    ]
}

fn is_command(k: &ActionKind) -> bool {
    !matches!(k, ActionKind::Wait { .. })
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    // At most one command is ever outstanding, and every command step is
    // sent exactly once, in recipe order.
    #[test]
    fn commands_never_overlap(
        steps in prop::collection::vec(action_strategy(), 0..12),
        latency_ms in 0u64..60,
    ) {
        let clock = ManualClock::new();
        let ch = KNOWN_REPLIES.iter().fold(
            SimulatedChannel::responsive(Arc::new(clock.clone()), Duration::from_millis(latency_ms)),
            |ch, (word, ack)| ch.reply_to(word, ack.byte()),
        );
        let mut seq = Sequencer::builder()
            .with_channel(ch)
            .with_clock(Arc::new(clock.clone()))
            .with_ack_timeout(None)
            .build()
            .unwrap();

        let recipe = steps.iter().cloned().fold(Recipe::new("prop"), Recipe::then);
        let h = seq.submit(recipe).unwrap();

        let mut ticks = 0;
        loop {
            let st = seq.tick(h).unwrap();
            let commands_done = steps.iter().take(st.completed).filter(|k| is_command(k)).count();
            prop_assert!(st.commands_sent <= commands_done + 1);
            if st.state != RunState::Running {
                prop_assert_eq!(st.state, RunState::Completed);
                break;
            }
            clock.advance(Duration::from_millis(5));
            ticks += 1;
            prop_assert!(ticks < 100_000, "run did not finish");
        }

        let expected: Vec<Vec<u8>> = steps
            .iter()
            .filter(|k| is_command(k))
            .map(|k| match k.protocol() {
                mixer_core::action::Protocol::Command { payload, .. } => payload,
                mixer_core::action::Protocol::Timed(_) => unreachable!(),
            })
            .collect();
        prop_assert_eq!(seq.channel().sent(), expected.as_slice());
    }

    // Discard never reports a mismatch and never consumes past the ack.
    #[test]
    fn discard_consumes_through_first_ack(buf in prop::collection::vec(0u8..128, 0..64)) {
        let ack = AckCode::new(b't').unwrap();
        let d = decode(&buf, ack, MismatchPolicy::Discard);
        match buf.iter().position(|&b| b == b't') {
            Some(i) => {
                prop_assert_eq!(d.verdict, Verdict::Matched);
                prop_assert_eq!(d.consumed, i + 1);
            }
            None => {
                prop_assert_eq!(d.verdict, Verdict::Absent);
                prop_assert_eq!(d.consumed, buf.len());
            }
        }
    }

    // Error policy only ever looks at the first byte and consumes at most one.
    #[test]
    fn error_policy_inspects_first_byte_only(buf in prop::collection::vec(0u8..128, 0..64)) {
        let ack = AckCode::new(b'd').unwrap();
        let d = decode(&buf, ack, MismatchPolicy::Error);
        prop_assert!(d.consumed <= 1);
        match buf.first() {
            None => prop_assert_eq!(d.verdict, Verdict::Absent),
            Some(&b'd') => prop_assert_eq!(d.verdict, Verdict::Matched),
            Some(&b) => prop_assert_eq!(d.verdict, Verdict::Unexpected(b)),
        }
    }
}
