mod common;

use mmos_ipc::{Command, InputEvent, KeyKind, Layer, Modifiers, PointerKind};
use mmos_runtime::{DemoKernel, ExecutionMode, KernelProxy, Session};
use proptest::prelude::*;

use common::host_driven;

#[derive(Debug, Clone)]
enum Step {
    Input(InputEvent),
    Command(Command),
    Tick,
}

fn run(mode: ExecutionMode, script: &[Step]) -> Vec<(u32, u32, u32, Vec<u32>)> {
    let session = Session::new(format!("equiv-{mode:?}"), host_driven(64, 48));
    let mut proxy = session
        .start(mode, Box::new(DemoKernel::new()))
        .expect("start");

    let mut frames = Vec::new();
    for step in script {
        match step {
            Step::Input(event) => {
                proxy.submit_input(*event).expect("submit");
            }
            Step::Command(command) => {
                proxy.request_command(command.clone()).expect("command");
            }
            Step::Tick => {
                proxy.tick().expect("tick");
                frames.push((
                    proxy.frame_count(),
                    proxy.width(),
                    proxy.height(),
                    proxy.current_frame().to_vec(),
                ));
            }
        }
    }
    assert!(proxy.shutdown().is_clean());
    frames
}

fn assert_equivalent(script: &[Step]) {
    let local = run(ExecutionMode::Local, script);
    let thread = run(ExecutionMode::Thread, script);
    assert_eq!(local.len(), thread.len());
    for (i, (l, t)) in local.iter().zip(&thread).enumerate() {
        assert_eq!((l.0, l.1, l.2), (t.0, t.1, t.2), "tick {i}");
        assert!(l.3 == t.3, "frame {i} differs between local and thread");
    }
}

#[test]
fn scripted_session_renders_identically() {
    let mut script = vec![Step::Tick];
    for i in 0..20 {
        script.push(Step::Input(InputEvent::pointer(
            PointerKind::Move,
            i * 3,
            i * 2,
            Modifiers::empty(),
        )));
        script.push(Step::Tick);
    }
    script.extend([
        Step::Input(InputEvent::pointer(PointerKind::Down, 10, 2, Modifiers::empty())),
        Step::Input(InputEvent::pointer(PointerKind::Up, 10, 2, Modifiers::empty())),
        Step::Input(InputEvent::key(KeyKind::Down, 'd', 68, Modifiers::CTRL)),
        Step::Input(InputEvent::wheel(20, 20, -3.0, Modifiers::empty())),
        Step::Command(Command::AddLayer(Layer::Notification)),
        Step::Command(Command::GoHome),
        Step::Tick,
        Step::Tick,
        Step::Command(Command::Sleep),
        Step::Tick,
        Step::Input(InputEvent::key(KeyKind::Down, 'x', 88, Modifiers::empty())),
        Step::Tick,
        Step::Command(Command::Wake),
        Step::Tick,
        Step::Command(Command::Resize {
            width: 32,
            height: 40,
        }),
        Step::Tick,
        Step::Input(InputEvent::pointer(PointerKind::Drag, 31, 39, Modifiers::SHIFT)),
        Step::Tick,
        Step::Command(Command::HomeButton),
        Step::Tick,
    ]);
    assert_equivalent(&script);
}

#[test]
fn shutdown_command_is_applied_on_the_next_tick() {
    let script = [
        Step::Tick,
        Step::Input(InputEvent::pointer(PointerKind::Down, 4, 4, Modifiers::empty())),
        Step::Tick,
        Step::Command(Command::Shutdown),
        Step::Tick,
    ];
    let local = run(ExecutionMode::Local, &script);
    let thread = run(ExecutionMode::Thread, &script);
    assert_eq!(local.len(), 3);
    assert_eq!(local.last().map(|f| f.0), Some(2));
    assert_eq!(local, thread);
}

#[test]
fn overflowing_the_queue_drops_the_same_events() {
    let mut script = Vec::new();
    for i in 0..200 {
        script.push(Step::Input(InputEvent::key(
            KeyKind::Down,
            'a',
            i,
            Modifiers::empty(),
        )));
    }
    script.push(Step::Tick);
    script.push(Step::Tick);
    assert_equivalent(&script);
}

fn step() -> impl Strategy<Value = Step> {
    let pointer = (0i32..64, 0i32..48, 0usize..4).prop_map(|(x, y, k)| {
        let kind = [
            PointerKind::Down,
            PointerKind::Up,
            PointerKind::Drag,
            PointerKind::Move,
        ][k];
        Step::Input(InputEvent::pointer(kind, x, y, Modifiers::empty()))
    });
    let key = (b'a'..=b'z', any::<bool>()).prop_map(|(c, ctrl)| {
        let modifiers = if ctrl { Modifiers::CTRL } else { Modifiers::empty() };
        Step::Input(InputEvent::key(KeyKind::Down, c as char, i32::from(c), modifiers))
    });
    let command = prop_oneof![
        Just(Command::Sleep),
        Just(Command::Wake),
        Just(Command::GoHome),
        Just(Command::HomeButton),
        Just(Command::AddLayer(Layer::Popup)),
        Just(Command::RemoveLayer(Layer::Popup)),
        (1u32..300).prop_map(Command::SetFrameRate),
    ]
    .prop_map(Step::Command);
    prop_oneof![
        3 => pointer,
        2 => key,
        1 => command,
        3 => Just(Step::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 8,
        rng_algorithm: proptest::test_runner::RngAlgorithm::ChaCha,
        rng_seed: proptest::test_runner::RngSeed::Fixed(0xE0_1D),
        .. ProptestConfig::default()
    })]

    #[test]
    fn random_scripts_render_identically(script in prop::collection::vec(step(), 1..60)) {
        assert_equivalent(&script);
    }
}
