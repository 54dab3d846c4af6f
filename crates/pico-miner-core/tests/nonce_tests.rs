//! Ping-pong result buffers: readout sequencing, settle retries and golden
//! nonce preservation.

mod common;

use common::{frame, slot, BusEvent, MockBus};
use pico_miner_core::config::{MAX_HARVEST_PASSES, SLOT_SIZE, UFM_1_15D3};
use pico_miner_core::nonce::NonceBuffers;

fn golden(s: &[u8; SLOT_SIZE]) -> u32 {
    u32::from_le_bytes([s[0], s[1], s[2], s[3]])
}

/// Slot whose trailer bytes are equal (an unsettled readout).
fn unsettled(golden: u32, nonce: u32) -> [u8; SLOT_SIZE] {
    let mut s = slot(golden, nonce);
    s[10] = 0x55;
    s[11] = 0x55;
    s
}

mod roles {
    use super::*;

    #[test]
    fn starts_filling_buffer_zero() {
        let buffers = NonceBuffers::<1>::new();
        assert_eq!(buffers.filling(), 0);
        assert_eq!(buffers.stable(), 1);
    }

    #[test]
    fn harvest_fills_then_flips() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0xA1, 7)]));
        let mut buffers = NonceBuffers::<1>::new();

        buffers.harvest(&mut bus);

        assert_eq!(buffers.filling(), 1);
        assert_eq!(*buffers.buffer(0).slot(0), slot(0xA1, 7));
        assert_eq!(*buffers.buffer(1).slot(0), [0; SLOT_SIZE]);
    }

    #[test]
    fn swap_twice_is_identity() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0x11, 1), slot(0x22, 2)]));
        let mut buffers = NonceBuffers::<2>::new();
        buffers.harvest(&mut bus);

        let before = buffers.clone();
        buffers.swap();
        assert_ne!(buffers.filling(), before.filling());
        buffers.swap();
        assert_eq!(buffers, before);
    }

    #[test]
    fn consecutive_harvests_alternate_buffers() {
        let mut bus = MockBus::new();
        for n in 1..=4u32 {
            bus.queue_frame(frame(&[slot(0, n)]));
        }
        let mut buffers = NonceBuffers::<1>::new();

        for n in 1..=4u32 {
            let target = buffers.filling();
            buffers.harvest(&mut bus);
            assert_eq!(*buffers.buffer(target).slot(0), slot(0, n));
        }
        assert_eq!(buffers.filling(), 0);
    }

    #[test]
    fn clear_zeroes_both_buffers_and_keeps_roles() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0x33, 3)]));
        let mut buffers = NonceBuffers::<1>::new();
        buffers.harvest(&mut bus);

        buffers.clear();
        assert_eq!(buffers.filling(), 1);
        assert_eq!(*buffers.buffer(0).slot(0), [0; SLOT_SIZE]);
        assert_eq!(*buffers.buffer(1).slot(0), [0; SLOT_SIZE]);
    }
}

mod readout {
    use super::*;

    #[test]
    fn strobe_sequence_for_one_pass() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0, 1), slot(0, 2)]));
        let mut buffers = NonceBuffers::<2>::new();
        buffers.harvest(&mut bus);

        let mut expected = vec![
            BusEvent::ReadStrobe(false),
            BusEvent::WriteStart(true),
            BusEvent::WriteStart(false),
        ];
        for _ in 0..2 * SLOT_SIZE / 2 {
            expected.push(BusEvent::ReadStrobe(true));
            expected.push(BusEvent::ReadStrobe(false));
        }
        assert_eq!(bus.events(), expected);
    }

    #[test]
    fn pipes_are_read_in_order() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0xAA, 10), slot(0xBB, 20)]));
        let mut buffers = NonceBuffers::<2>::new();
        buffers.harvest(&mut bus);

        assert_eq!(golden(buffers.buffer(0).slot(0)), 0xAA);
        assert_eq!(golden(buffers.buffer(0).slot(1)), 0xBB);
    }

    #[test]
    fn copy_out_is_memory_order_and_truncates() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0x01, 1)]));
        bus.queue_frame(frame(&[slot(0x02, 2)]));
        let mut buffers = NonceBuffers::<1>::new();
        buffers.harvest(&mut bus);
        buffers.harvest(&mut bus);

        let mut out = [0xEEu8; 64];
        let n = buffers.copy_out(&mut out);
        assert_eq!(n, UFM_1_15D3.result_region_size(1));
        assert_eq!(&out[..12], &slot(0x01, 1));
        assert_eq!(&out[12..24], &slot(0x02, 2));
        assert!(out[24..].iter().all(|b| *b == 0xEE));

        let mut short = [0u8; 5];
        assert_eq!(buffers.copy_out(&mut short), 5);
        assert_eq!(short, slot(0x01, 1)[..5]);
    }
}

mod settle {
    use super::*;

    #[test]
    fn settled_readout_takes_one_pass() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0, 1)]));
        let mut buffers = NonceBuffers::<1>::new();

        let harvest = buffers.harvest(&mut bus);
        assert_eq!(harvest.passes, 1);
        assert!(harvest.settled);
        assert_eq!(bus.snapshots(), 1);
    }

    #[test]
    fn equal_trailer_bytes_trigger_another_pass() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[unsettled(0, 1)]));
        bus.queue_frame(frame(&[unsettled(0, 2)]));
        bus.queue_frame(frame(&[slot(0, 3)]));
        let mut buffers = NonceBuffers::<1>::new();

        let harvest = buffers.harvest(&mut bus);
        assert_eq!(harvest.passes, 3);
        assert!(harvest.settled);
        assert_eq!(*buffers.buffer(0).slot(0), slot(0, 3));
    }

    #[test]
    fn only_last_pipe_trailer_is_checked() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[unsettled(0, 1), slot(0, 2)]));
        let mut buffers = NonceBuffers::<2>::new();

        assert_eq!(buffers.harvest(&mut bus).passes, 1);
    }

    #[test]
    fn pass_cap_is_tolerated() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[unsettled(0, 9)]));
        let mut buffers = NonceBuffers::<1>::new();

        let harvest = buffers.harvest(&mut bus);
        assert_eq!(harvest.passes, MAX_HARVEST_PASSES);
        assert!(!harvest.settled);
        assert_eq!(bus.snapshots(), usize::from(MAX_HARVEST_PASSES));
        // Roles still flip and the last readout is kept.
        assert_eq!(buffers.filling(), 1);
        assert_eq!(*buffers.buffer(0).slot(0), unsettled(0, 9));
    }
}

mod preservation {
    use super::*;

    #[test]
    fn new_golden_nonce_keeps_previous_one_visible() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0xA1, 1)]));
        bus.queue_frame(frame(&[slot(0xB2, 2)]));
        bus.queue_frame(frame(&[slot(0xB2, 3)]));
        let mut buffers = NonceBuffers::<1>::new();

        buffers.harvest(&mut bus); // buffer 0 <- A
        let second = buffers.harvest(&mut bus); // buffer 1 <- B
        assert_eq!(second.preserved, 0);

        // Buffer 0 still holds A, buffer 1 holds B and B is still on the
        // bus: A moves into buffer 1 before buffer 0 is overwritten.
        let third = buffers.harvest(&mut bus);
        assert_eq!(third.preserved, 1);
        assert_eq!(golden(buffers.buffer(0).slot(0)), 0xB2);
        assert_eq!(golden(buffers.buffer(1).slot(0)), 0xA1);
        // Only the golden nonce is carried over.
        assert_eq!(&buffers.buffer(1).slot(0)[4..], &slot(0xB2, 2)[4..]);
    }

    #[test]
    fn matching_golden_nonces_are_not_copied() {
        let mut bus = MockBus::new();
        for n in 1..=3u32 {
            bus.queue_frame(frame(&[slot(0, n)]));
        }
        let mut buffers = NonceBuffers::<1>::new();

        let total: u8 = (0..3).map(|_| buffers.harvest(&mut bus).preserved).sum();
        assert_eq!(total, 0);
    }

    #[test]
    fn previous_golden_nonce_survives_further_ticks() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0xA1, 1)]));
        for n in 2..=6u32 {
            bus.queue_frame(frame(&[slot(0xB2, n)]));
        }
        let mut buffers = NonceBuffers::<1>::new();
        buffers.harvest(&mut bus);
        buffers.harvest(&mut bus);

        for _ in 0..4 {
            buffers.harvest(&mut bus);
            let mut seen = [
                golden(buffers.buffer(0).slot(0)),
                golden(buffers.buffer(1).slot(0)),
            ];
            seen.sort_unstable();
            assert_eq!(seen, [0xA1, 0xB2]);
        }
    }

    #[test]
    fn no_copy_when_bus_moved_on() {
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0xA1, 1)]));
        bus.queue_frame(frame(&[slot(0xB2, 2)]));
        bus.queue_frame(frame(&[slot(0xD4, 3)]));
        let mut buffers = NonceBuffers::<1>::new();

        buffers.harvest(&mut bus);
        buffers.harvest(&mut bus);
        let third = buffers.harvest(&mut bus);

        assert_eq!(third.preserved, 0);
        assert_eq!(golden(buffers.buffer(0).slot(0)), 0xD4);
        assert_eq!(golden(buffers.buffer(1).slot(0)), 0xB2);
    }

    #[test]
    fn pipes_are_preserved_independently() {
        // Pipeline 1 never finds a golden nonce.
        let mut bus = MockBus::new();
        bus.queue_frame(frame(&[slot(0x10, 1), slot(0, 1)]));
        bus.queue_frame(frame(&[slot(0x11, 2), slot(0, 2)]));
        bus.queue_frame(frame(&[slot(0x11, 3), slot(0, 3)]));
        let mut buffers = NonceBuffers::<2>::new();

        buffers.harvest(&mut bus);
        buffers.harvest(&mut bus);
        let third = buffers.harvest(&mut bus);

        assert_eq!(third.preserved, 1);
        assert_eq!(golden(buffers.buffer(1).slot(0)), 0x10);
        assert_eq!(golden(buffers.buffer(1).slot(1)), 0);
    }
}
