use mmos_ipc::input::{InputEvent, KeyKind, Modifiers, PointerKind};
use mmos_ipc::{PopError, PushError, SharedRegion, INPUT_QUEUE_CAPACITY};
use std::collections::VecDeque;
use std::sync::Arc;

struct Rng(u64);

impl Rng {
    fn new(seed: u64) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        ((x.wrapping_mul(0x2545F4914F6CDD1D)) >> 32) as u32
    }

    fn gen_range(&mut self, max_exclusive: u32) -> u32 {
        if max_exclusive == 0 {
            return 0;
        }
        self.next_u32() % max_exclusive
    }

    fn event(&mut self) -> InputEvent {
        let modifiers = Modifiers::from_bits_retain(self.next_u32() as u8);
        let x = self.next_u32() as i16 as i32;
        let y = self.next_u32() as i16 as i32;
        match self.gen_range(4) {
            0 => InputEvent::pointer(PointerKind::Down, x, y, modifiers),
            1 => InputEvent::pointer(PointerKind::Drag, x, y, modifiers),
            2 => InputEvent::wheel(x, y, (self.gen_range(7) as f32) - 3.0, modifiers),
            _ => {
                let c = char::from_u32(0x20 + self.gen_range(0x5F)).unwrap_or('?');
                InputEvent::key(KeyKind::Down, c, self.next_u32() as i32, modifiers)
            }
        }
    }
}

#[test]
fn input_ring_single_thread_fuzz() {
    let region = SharedRegion::heap("fuzz", 1, 1).unwrap();
    let ring = region.input_ring();
    let mut model: VecDeque<InputEvent> = VecDeque::new();

    let mut rng = Rng::new(0x1234_5678_9ABC_DEF0);
    for _ in 0..50_000 {
        match rng.gen_range(3) {
            0 => {
                // Bursts of pushes so the ring regularly fills up.
                for _ in 0..rng.gen_range(40) {
                    let ev = rng.event();
                    match ring.try_push(&ev) {
                        Ok(()) => model.push_back(ev),
                        Err(PushError::Full) => assert_eq!(model.len(), INPUT_QUEUE_CAPACITY),
                        Err(PushError::Corrupt) => panic!("corrupt"),
                    }
                }
            }
            1 => match ring.try_pop() {
                Ok(v) => {
                    let expected = model.pop_front().expect("model has data");
                    assert_eq!(v, expected);
                }
                Err(PopError::Empty) => assert!(model.is_empty()),
                Err(PopError::Corrupt) => panic!("corrupt"),
            },
            _ => {
                let ev = rng.event();
                if ring.try_push(&ev).is_ok() {
                    model.push_back(ev);
                }
                if let Ok(v) = ring.try_pop() {
                    let expected = model.pop_front().expect("model has data");
                    assert_eq!(v, expected);
                }
            }
        }
        assert_eq!(ring.len(), model.len());
    }

    while let Ok(v) = ring.try_pop() {
        let expected = model.pop_front().expect("model has data");
        assert_eq!(v, expected);
    }
    assert!(model.is_empty());
}

#[test]
fn input_ring_spsc_concurrent() {
    let region = Arc::new(SharedRegion::heap("spsc", 1, 1).unwrap());
    let producer = region.clone();
    let consumer = region.clone();

    const N: i32 = 100_000;

    let t_prod = std::thread::spawn(move || {
        let ring = producer.input_ring();
        for i in 0..N {
            let ev = InputEvent::key(KeyKind::Up, 'k', i, Modifiers::empty());
            while ring.try_push(&ev) == Err(PushError::Full) {
                std::hint::spin_loop();
            }
        }
    });

    let t_cons = std::thread::spawn(move || {
        let ring = consumer.input_ring();
        for i in 0..N {
            let ev = loop {
                match ring.try_pop() {
                    Ok(ev) => break ev,
                    Err(PopError::Empty) => std::hint::spin_loop(),
                    Err(PopError::Corrupt) => panic!("corrupt"),
                }
            };
            match ev {
                InputEvent::KeyUp(key) => assert_eq!(key.key_code, i),
                other => panic!("unexpected {other:?}"),
            }
        }
    });

    t_prod.join().unwrap();
    t_cons.join().unwrap();
    assert!(region.input_ring().is_empty());
}
